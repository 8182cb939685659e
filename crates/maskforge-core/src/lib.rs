//! maskforge-core: Raster mask and overlay editing engine (sans-IO).
//!
//! Two editors share one engine:
//!
//! - the **mask** editor paints a black/white selection mask over a
//!   source image with a brush, rectangles, or a magic wand, and hands
//!   the mask to a remote inpainting service;
//! - the **overlay** editor places, drags, resizes and rotates secondary
//!   images over the source, applies a grayscale filter, and exports the
//!   composite.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. Fetching images, talking to
//! the generation service, and persisting history are left to the
//! front ends (`maskforge-cli`, `maskforge-wasm`) through the
//! [`ImageGenerationService`] and [`Storage`] traits.

pub mod buffer;
pub mod coords;
pub mod export;
pub mod filter;
pub mod overlay;
pub mod painter;
pub mod select;
pub mod service;
pub mod session;
pub mod store;
pub mod types;

pub use buffer::{BLACK, BlobFormat, Color, PixelBuffer, WHITE};
pub use coords::{CoordinateMapper, DisplaySize};
pub use export::EncodedImage;
pub use filter::Filter;
pub use overlay::{Overlay, OverlayId, OverlayLimits, OverlayManager, Placement, TransformOp};
pub use painter::{MaskPainter, StrokeMode};
pub use select::{FillStatus, FloodFill, Tolerance};
pub use service::{
    AspectRatio, EditRequest, GenerateRequest, GenerationError, ImageGenerationService,
    RemixRequest,
};
pub use session::{
    DrawMode, EditSession, FinalizeOutcome, FinalizeTicket, Flavor, OverlayMode, SessionState,
};
pub use store::{GenerationRecord, GenerationStore, MemoryStorage, NewGeneration, Storage, StoreError};
pub use types::{
    Dimensions, EditorConfig, EditorError, ExportFormat, ExportOptions, Point, RgbaImage,
};
