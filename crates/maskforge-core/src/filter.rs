//! In-place image filters for the overlay editor.

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;

/// A whole-image color filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// Replace RGB with the mean of the three channels, rounded to the
    /// nearest integer.
    Grayscale,
}

impl Filter {
    /// Apply the filter to every pixel. Alpha is never touched.
    pub fn apply(self, buffer: &mut PixelBuffer) {
        match self {
            Self::Grayscale => {
                for pixel in buffer.image_mut().pixels_mut() {
                    let [r, g, b, _] = pixel.0;
                    let sum = u16::from(r) + u16::from(g) + u16::from(b);
                    // A third of an integer never ties, so +1 rounds to nearest.
                    #[allow(clippy::cast_possible_truncation)]
                    let avg = ((sum + 1) / 3) as u8;
                    pixel.0[..3].fill(avg);
                }
            }
        }
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grayscale => write!(f, "grayscale"),
        }
    }
}
