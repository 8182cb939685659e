//! Tolerance-based region growing ("magic wand").
//!
//! Starting from a seed pixel, explores 4-connected neighbors whose RGB
//! color lies within a Euclidean distance of the seed color and marks
//! them selected (opaque black) in the mask. Alpha is ignored.
//!
//! The fill is iterative with an explicit stack, and membership is a
//! flat `Vec<bool>` indexed by `y * width + x`, so memory stays at one
//! byte per pixel plus the stack even for megapixel regions. Worst case
//! every pixel is visited once.
//!
//! [`FloodFill`] can also be driven incrementally with a pixel budget
//! per call, so an interactive caller can spread a large fill across
//! several event-loop turns.

use serde::{Deserialize, Serialize};

use crate::buffer::{BLACK, PixelBuffer};
use crate::types::{Dimensions, EditorError};

/// Magic-wand tolerance on a `0..=100` scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Tolerance(u8);

impl Tolerance {
    /// Largest accepted tolerance.
    pub const MAX: Self = Self(100);

    /// Create a tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidTolerance`] above 100.
    pub fn new(value: u8) -> Result<Self, EditorError> {
        if value > 100 {
            return Err(EditorError::InvalidTolerance(value));
        }
        Ok(Self(value))
    }

    /// The raw `0..=100` value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Maximum accepted RGB distance from the seed color.
    ///
    /// A straight `tolerance * 2.55` map. It is not normalized to the
    /// largest possible RGB distance (about 441), so even 100 does not
    /// reach every color.
    #[must_use]
    pub fn distance_threshold(self) -> f64 {
        f64::from(self.0) * 2.55
    }
}

impl TryFrom<u8> for Tolerance {
    type Error = EditorError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for u8 {
    fn from(t: Tolerance) -> Self {
        t.0
    }
}

/// Progress of an incremental fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillStatus {
    /// Work remains; call [`FloodFill::step`] again.
    Pending {
        /// Pixels selected so far.
        selected: usize,
    },
    /// The fill has finished.
    Complete {
        /// Total pixels selected.
        selected: usize,
    },
}

impl FillStatus {
    /// Whether the fill has finished.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete { .. })
    }

    /// Pixels selected so far.
    #[must_use]
    pub const fn selected(self) -> usize {
        match self {
            Self::Pending { selected } | Self::Complete { selected } => selected,
        }
    }
}

/// One in-progress region selection.
///
/// Holds the exploration state only; the source and mask buffers are
/// passed to each [`step`](Self::step) so their owner keeps exclusive
/// control between steps.
#[derive(Debug, Clone)]
pub struct FloodFill {
    dimensions: Dimensions,
    seed_rgb: [u8; 3],
    threshold_sq: f64,
    visited: Vec<bool>,
    stack: Vec<(u32, u32)>,
    selected: usize,
}

impl FloodFill {
    /// Prepare a fill from `seed` over `source`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::OutOfBounds`] if the seed lies outside
    /// `source`.
    pub fn new(
        source: &PixelBuffer,
        seed: (u32, u32),
        tolerance: Tolerance,
    ) -> Result<Self, EditorError> {
        let seed_color = source.get(seed.0, seed.1)?;
        let [r, g, b, _] = seed_color.0;
        let dimensions = source.dimensions();
        let threshold = tolerance.distance_threshold();

        let mut visited = vec![false; dimensions.pixel_count()];
        visited[index(dimensions, seed.0, seed.1)] = true;

        Ok(Self {
            dimensions,
            seed_rgb: [r, g, b],
            threshold_sq: threshold * threshold,
            visited,
            stack: vec![seed],
            selected: 0,
        })
    }

    /// Process at most `budget` pixels, writing selected ones into `mask`.
    ///
    /// `source` and `mask` must have the dimensions the fill was created
    /// with; mismatched buffers finish the fill immediately without
    /// touching them.
    pub fn step(
        &mut self,
        source: &PixelBuffer,
        mask: &mut PixelBuffer,
        budget: usize,
    ) -> FillStatus {
        if source.dimensions() != self.dimensions || mask.dimensions() != self.dimensions {
            log::warn!(
                "flood fill buffers changed size ({}x{} expected); abandoning fill",
                self.dimensions.width,
                self.dimensions.height
            );
            self.stack.clear();
            return self.status();
        }

        let width = self.dimensions.width;
        let height = self.dimensions.height;
        let src = source.image();
        let dst = mask.image_mut();

        let mut processed = 0;
        while processed < budget {
            let Some((x, y)) = self.stack.pop() else {
                break;
            };
            processed += 1;

            let [r, g, b, _] = src.get_pixel(x, y).0;
            if !self.within_threshold([r, g, b]) {
                continue;
            }

            dst.put_pixel(x, y, BLACK);
            self.selected += 1;

            if x + 1 < width {
                self.visit(x + 1, y);
            }
            if x > 0 {
                self.visit(x - 1, y);
            }
            if y + 1 < height {
                self.visit(x, y + 1);
            }
            if y > 0 {
                self.visit(x, y - 1);
            }
        }

        log::trace!(
            "flood fill step: processed {processed}, selected {}, {} queued",
            self.selected,
            self.stack.len()
        );
        self.status()
    }

    /// Run the fill to completion, returning the number of selected
    /// pixels.
    pub fn run(mut self, source: &PixelBuffer, mask: &mut PixelBuffer) -> usize {
        self.step(source, mask, usize::MAX).selected()
    }

    /// Current progress without doing any work.
    #[must_use]
    pub const fn status(&self) -> FillStatus {
        if self.stack.is_empty() {
            FillStatus::Complete {
                selected: self.selected,
            }
        } else {
            FillStatus::Pending {
                selected: self.selected,
            }
        }
    }

    fn visit(&mut self, x: u32, y: u32) {
        let i = index(self.dimensions, x, y);
        if !self.visited[i] {
            self.visited[i] = true;
            self.stack.push((x, y));
        }
    }

    fn within_threshold(&self, rgb: [u8; 3]) -> bool {
        let dist_sq: i32 = rgb
            .iter()
            .zip(self.seed_rgb)
            .map(|(&c, s)| {
                let d = i32::from(c) - i32::from(s);
                d * d
            })
            .sum();
        f64::from(dist_sq) <= self.threshold_sq
    }
}

const fn index(dimensions: Dimensions, x: u32, y: u32) -> usize {
    y as usize * dimensions.width as usize + x as usize
}

/// Select the region connected to `seed` whose colors are within
/// `tolerance` of the seed color, writing it into `mask`.
///
/// Deterministic: the same source, seed, and tolerance always select the
/// same pixels. Pixels outside the region are left untouched, so
/// repeated selections accumulate.
///
/// # Errors
///
/// Returns [`EditorError::OutOfBounds`] if the seed lies outside
/// `source`. Returns [`EditorError::InvalidDimensions`] if `mask` does
/// not match `source`.
pub fn select(
    source: &PixelBuffer,
    mask: &mut PixelBuffer,
    seed: (u32, u32),
    tolerance: Tolerance,
) -> Result<usize, EditorError> {
    if mask.dimensions() != source.dimensions() {
        return Err(EditorError::InvalidDimensions {
            width: mask.width(),
            height: mask.height(),
        });
    }
    let fill = FloodFill::new(source, seed, tolerance)?;
    Ok(fill.run(source, mask))
}
