//! Shared types for the maskforge editing engine.

use serde::{Deserialize, Serialize};

use crate::overlay::OverlayId;
use crate::service::GenerationError;
use crate::session::SessionState;

/// Re-export `RgbaImage` so downstream crates can hand decoded rasters
/// to the engine without depending on `image` directly.
pub use image::RgbaImage;

/// A 2D point in buffer (image) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// The origin.
    pub const ORIGIN: Self = Self::new(0.0, 0.0);

    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    ///
    /// Avoids the square root for comparison purposes.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// Component-wise difference `self - other`.
    #[must_use]
    pub fn delta_from(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }

    /// The pixel containing this point, or `None` when it lies outside
    /// `dimensions`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_pixel(self, dimensions: Dimensions) -> Option<(u32, u32)> {
        let x = self.x.floor();
        let y = self.y.floor();
        if x < 0.0 || y < 0.0 || x >= f64::from(dimensions.width) || y >= f64::from(dimensions.height)
        {
            return None;
        }
        Some((x as u32, y as u32))
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new set of dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Output encoding for composited images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG with a quality in `1..=100`.
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
    /// WebP (the `image` crate only ships a lossless WebP encoder).
    WebP,
}

impl ExportFormat {
    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Conventional file extension, without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
            Self::WebP => "webp",
        }
    }
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self::WebP
    }
}

/// Options for re-encoding a composited image before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Images wider than this are downscaled, preserving aspect ratio.
    pub max_width: u32,
    /// Output encoding.
    pub format: ExportFormat,
}

impl ExportOptions {
    /// Default maximum export width in pixels.
    pub const DEFAULT_MAX_WIDTH: u32 = 1920;
    /// Default JPEG quality when JPEG is selected without an explicit one.
    pub const DEFAULT_JPEG_QUALITY: u8 = 80;
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            max_width: Self::DEFAULT_MAX_WIDTH,
            format: ExportFormat::default(),
        }
    }
}

/// Tunable parameters for an edit session.
///
/// Every field has a default, so partial JSON configs deserialize. Call [`validate`](Self::validate) after deserializing
/// user-supplied values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Brush line width in buffer units.
    pub brush_width: f64,

    /// Size of the resize (bottom-right) and rotate (top-left) handle
    /// zones on an overlay, in buffer units.
    pub handle_margin: f64,

    /// Relative scale change per buffer unit of horizontal resize drag.
    pub resize_sensitivity: f64,

    /// Overlay scale never drops below this value.
    pub min_overlay_scale: f64,

    /// Fraction of the canvas an added overlay is fitted into.
    pub overlay_fit_fraction: f64,

    /// Magic-wand tolerance used when none is given explicitly.
    pub default_tolerance: u8,

    /// When set, magic-wand fills are processed incrementally, at most
    /// this many pixels per [`advance_selection`] call.
    ///
    /// [`advance_selection`]: crate::session::EditSession::advance_selection
    pub fill_chunk_pixels: Option<usize>,

    /// Composite export options.
    pub export: ExportOptions,
}

impl EditorConfig {
    /// Default brush width.
    pub const DEFAULT_BRUSH_WIDTH: f64 = 20.0;
    /// Default handle margin.
    pub const DEFAULT_HANDLE_MARGIN: f64 = 20.0;
    /// Default resize sensitivity.
    pub const DEFAULT_RESIZE_SENSITIVITY: f64 = 0.01;
    /// Default minimum overlay scale.
    pub const DEFAULT_MIN_OVERLAY_SCALE: f64 = 0.1;
    /// Default overlay fit fraction.
    pub const DEFAULT_OVERLAY_FIT_FRACTION: f64 = 0.5;
    /// Default magic-wand tolerance.
    pub const DEFAULT_TOLERANCE: u8 = 30;

    /// Check every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidConfig`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), EditorError> {
        let positive = [
            ("brush_width", self.brush_width),
            ("handle_margin", self.handle_margin),
            ("min_overlay_scale", self.min_overlay_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(EditorError::InvalidConfig(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !self.resize_sensitivity.is_finite() {
            return Err(EditorError::InvalidConfig(format!(
                "resize_sensitivity must be finite, got {}",
                self.resize_sensitivity
            )));
        }
        if !(self.overlay_fit_fraction > 0.0 && self.overlay_fit_fraction <= 1.0) {
            return Err(EditorError::InvalidConfig(format!(
                "overlay_fit_fraction must be in (0, 1], got {}",
                self.overlay_fit_fraction
            )));
        }
        if self.default_tolerance > 100 {
            return Err(EditorError::InvalidTolerance(self.default_tolerance));
        }
        if self.fill_chunk_pixels == Some(0) {
            return Err(EditorError::InvalidConfig(
                "fill_chunk_pixels must be at least 1".into(),
            ));
        }
        if self.export.max_width == 0 {
            return Err(EditorError::InvalidConfig(
                "export.max_width must be at least 1".into(),
            ));
        }
        if let ExportFormat::Jpeg { quality } = self.export.format
            && !(1..=100).contains(&quality)
        {
            return Err(EditorError::InvalidConfig(format!(
                "JPEG quality must be in 1..=100, got {quality}"
            )));
        }
        Ok(())
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            brush_width: Self::DEFAULT_BRUSH_WIDTH,
            handle_margin: Self::DEFAULT_HANDLE_MARGIN,
            resize_sensitivity: Self::DEFAULT_RESIZE_SENSITIVITY,
            min_overlay_scale: Self::DEFAULT_MIN_OVERLAY_SCALE,
            overlay_fit_fraction: Self::DEFAULT_OVERLAY_FIT_FRACTION,
            default_tolerance: Self::DEFAULT_TOLERANCE,
            fill_chunk_pixels: None,
            export: ExportOptions::default(),
        }
    }
}

/// Errors produced by the editing engine.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits. Variants carrying foreign errors are
/// serialized as their `Display` string.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// A buffer was requested with a zero-sized axis, or raw pixel data
    /// does not match `width * height * 4`.
    #[error("invalid buffer dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A pixel access fell outside the buffer.
    #[error("pixel ({x}, {y}) is outside the {width}x{height} buffer")]
    OutOfBounds {
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Buffer width.
        width: u32,
        /// Buffer height.
        height: u32,
    },

    /// Magic-wand tolerance outside `0..=100`.
    #[error("tolerance must be in 0..=100, got {0}")]
    InvalidTolerance(u8),

    /// The operation is not accepted in the session's current state.
    #[error("cannot {operation} while the session is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the session was in.
        state: SessionState,
    },

    /// The operation belongs to the other editor flavor.
    #[error("cannot {operation} in this editor flavor")]
    WrongFlavor {
        /// The rejected operation.
        operation: &'static str,
    },

    /// No overlay with the given id exists.
    #[error("no overlay with id {0}")]
    UnknownOverlay(OverlayId),

    /// Finalize was requested with a blank prompt.
    #[error("an edit prompt is required")]
    EmptyPrompt,

    /// An incremental region selection is still running.
    #[error("a region selection is still in progress")]
    Busy,

    /// Encoding an artifact failed.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The remote generation service failed.
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Editor configuration is invalid.
    #[error("invalid editor configuration: {0}")]
    InvalidConfig(String),
}

/// Serde-compatible proxy for `EditorError`.
///
/// Only the message survives for variants wrapping foreign or borrowed
/// data; those deserialize as [`EditorError::InvalidConfig`].
#[derive(Serialize, Deserialize)]
enum EditorErrorProxy {
    EmptyInput,
    InvalidDimensions { width: u32, height: u32 },
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },
    InvalidTolerance(u8),
    UnknownOverlay(OverlayId),
    EmptyPrompt,
    Busy,
    Encode(String),
    Generation(GenerationError),
    Message(String),
}

impl Serialize for EditorError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => EditorErrorProxy::EmptyInput,
            Self::InvalidDimensions { width, height } => EditorErrorProxy::InvalidDimensions {
                width: *width,
                height: *height,
            },
            Self::OutOfBounds {
                x,
                y,
                width,
                height,
            } => EditorErrorProxy::OutOfBounds {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
            },
            Self::InvalidTolerance(t) => EditorErrorProxy::InvalidTolerance(*t),
            Self::UnknownOverlay(id) => EditorErrorProxy::UnknownOverlay(*id),
            Self::EmptyPrompt => EditorErrorProxy::EmptyPrompt,
            Self::Busy => EditorErrorProxy::Busy,
            Self::Encode(msg) => EditorErrorProxy::Encode(msg.clone()),
            Self::Generation(e) => EditorErrorProxy::Generation(e.clone()),
            Self::ImageDecode(_)
            | Self::InvalidState { .. }
            | Self::WrongFlavor { .. }
            | Self::InvalidConfig(_) => EditorErrorProxy::Message(self.to_string()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EditorError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = EditorErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            EditorErrorProxy::EmptyInput => Self::EmptyInput,
            EditorErrorProxy::InvalidDimensions { width, height } => {
                Self::InvalidDimensions { width, height }
            }
            EditorErrorProxy::OutOfBounds {
                x,
                y,
                width,
                height,
            } => Self::OutOfBounds {
                x,
                y,
                width,
                height,
            },
            EditorErrorProxy::InvalidTolerance(t) => Self::InvalidTolerance(t),
            EditorErrorProxy::UnknownOverlay(id) => Self::UnknownOverlay(id),
            EditorErrorProxy::EmptyPrompt => Self::EmptyPrompt,
            EditorErrorProxy::Busy => Self::Busy,
            EditorErrorProxy::Encode(msg) => Self::Encode(msg),
            EditorErrorProxy::Generation(e) => Self::Generation(e),
            EditorErrorProxy::Message(msg) => Self::InvalidConfig(msg),
        })
    }
}
