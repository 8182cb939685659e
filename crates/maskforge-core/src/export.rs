//! Encoding edited buffers into upload-ready artifacts.
//!
//! Two artifacts leave the engine: the selection mask, always a PNG
//! with the source image's exact dimensions, and the overlay composite,
//! downscaled to a maximum width and re-encoded in a configurable
//! format.

use image::ImageEncoder;
use image::imageops::FilterType;

use crate::buffer::{BlobFormat, PixelBuffer};
use crate::types::{Dimensions, EditorError, ExportFormat, ExportOptions, RgbaImage};

/// An encoded raster plus what a consumer needs to label it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Encoded bytes.
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`.
    pub format: ExportFormat,
    /// Pixel size of the encoded image.
    pub dimensions: Dimensions,
}

impl EncodedImage {
    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Encode a mask as an RGBA PNG of identical dimensions.
///
/// # Errors
///
/// Returns [`EditorError::Encode`] if the PNG encoder fails.
pub fn encode_mask_png(mask: &PixelBuffer) -> Result<Vec<u8>, EditorError> {
    mask.to_encoded_blob(BlobFormat::Png)
}

/// Size after fitting `dimensions` to at most `max_width` wide.
///
/// Narrower images are unchanged. Height follows the aspect ratio,
/// rounded, and never drops below one pixel.
#[must_use]
pub fn fitted_dimensions(dimensions: Dimensions, max_width: u32) -> Dimensions {
    if dimensions.width <= max_width {
        return dimensions;
    }
    let height =
        f64::from(dimensions.height) * f64::from(max_width) / f64::from(dimensions.width);
    // Bounded above by the original height.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let height = (height.round() as u32).max(1);
    Dimensions::new(max_width, height)
}

/// Downscale to the configured maximum width and encode.
///
/// # Errors
///
/// Returns [`EditorError::InvalidConfig`] for a zero `max_width` or a
/// JPEG quality outside `1..=100`, and [`EditorError::Encode`] if the
/// encoder fails.
pub fn optimize(buffer: &PixelBuffer, options: &ExportOptions) -> Result<EncodedImage, EditorError> {
    if options.max_width == 0 {
        return Err(EditorError::InvalidConfig(
            "export.max_width must be at least 1".into(),
        ));
    }

    let target = fitted_dimensions(buffer.dimensions(), options.max_width);
    let resized;
    let image: &RgbaImage = if target == buffer.dimensions() {
        buffer.image()
    } else {
        log::debug!(
            "downscaling composite from {}x{} to {}x{}",
            buffer.width(),
            buffer.height(),
            target.width,
            target.height
        );
        resized = image::imageops::resize(
            buffer.image(),
            target.width,
            target.height,
            FilterType::Triangle,
        );
        &resized
    };

    let bytes = encode_rgba(image, options.format)?;
    Ok(EncodedImage {
        bytes,
        format: options.format,
        dimensions: target,
    })
}

fn encode_rgba(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, EditorError> {
    let mut bytes = Vec::new();
    let (w, h) = image.dimensions();
    let result = match format {
        ExportFormat::Png => image::codecs::png::PngEncoder::new(&mut bytes).write_image(
            image.as_raw(),
            w,
            h,
            image::ExtendedColorType::Rgba8,
        ),
        ExportFormat::WebP => image::codecs::webp::WebPEncoder::new_lossless(&mut bytes)
            .write_image(image.as_raw(), w, h, image::ExtendedColorType::Rgba8),
        ExportFormat::Jpeg { quality } => {
            if !(1..=100).contains(&quality) {
                return Err(EditorError::InvalidConfig(format!(
                    "JPEG quality must be in 1..=100, got {quality}"
                )));
            }
            // JPEG has no alpha channel.
            let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality).write_image(
                rgb.as_raw(),
                w,
                h,
                image::ExtendedColorType::Rgb8,
            )
        }
    };
    result.map_err(|e| EditorError::Encode(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{ImageFormat, Rgba};

    use super::*;
    use crate::buffer::{BLACK, WHITE};

    #[test]
    fn mask_png_round_trips_exact_dimensions() {
        let mut mask = PixelBuffer::new(13, 7, WHITE).unwrap();
        mask.set(3, 4, BLACK).unwrap();
        let png = encode_mask_png(&mask).unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
        let decoded = PixelBuffer::decode(&png).unwrap();
        assert_eq!(decoded, mask);
    }

    #[test]
    fn fitted_dimensions_keeps_narrow_images() {
        let d = Dimensions::new(800, 600);
        assert_eq!(fitted_dimensions(d, 1920), d);
        assert_eq!(fitted_dimensions(d, 800), d);
    }

    #[test]
    fn fitted_dimensions_rounds_height() {
        // 1000 * 1920 / 3000 = 640 exactly; 1001 * 1920 / 3000 = 640.64.
        assert_eq!(
            fitted_dimensions(Dimensions::new(3000, 1000), 1920),
            Dimensions::new(1920, 640)
        );
        assert_eq!(
            fitted_dimensions(Dimensions::new(3000, 1001), 1920),
            Dimensions::new(1920, 641)
        );
        assert_eq!(
            fitted_dimensions(Dimensions::new(5000, 1), 100),
            Dimensions::new(100, 1)
        );
    }

    #[test]
    fn optimize_downscales_wide_images() {
        let buf = PixelBuffer::new(400, 100, Rgba([10, 120, 200, 255])).unwrap();
        let options = ExportOptions {
            max_width: 200,
            format: ExportFormat::Png,
        };
        let out = optimize(&buf, &options).unwrap();
        assert_eq!(out.dimensions, Dimensions::new(200, 50));
        assert_eq!(out.mime_type(), "image/png");
        let decoded = PixelBuffer::decode(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), Dimensions::new(200, 50));
        assert_eq!(decoded.get(100, 25).unwrap(), Rgba([10, 120, 200, 255]));
    }

    #[test]
    fn optimize_encodes_each_format() {
        let buf = PixelBuffer::new(16, 16, WHITE).unwrap();
        let cases = [
            (ExportFormat::Png, ImageFormat::Png),
            (ExportFormat::WebP, ImageFormat::WebP),
            (ExportFormat::Jpeg { quality: 80 }, ImageFormat::Jpeg),
        ];
        for (format, expected) in cases {
            let out = optimize(
                &buf,
                &ExportOptions {
                    max_width: 1920,
                    format,
                },
            )
            .unwrap();
            assert_eq!(image::guess_format(&out.bytes).unwrap(), expected);
            assert_eq!(out.dimensions, Dimensions::new(16, 16));
        }
    }

    #[test]
    fn optimize_rejects_bad_options() {
        let buf = PixelBuffer::new(4, 4, WHITE).unwrap();
        let zero_width = ExportOptions {
            max_width: 0,
            format: ExportFormat::Png,
        };
        assert!(matches!(
            optimize(&buf, &zero_width),
            Err(EditorError::InvalidConfig(_))
        ));
        let bad_quality = ExportOptions {
            max_width: 10,
            format: ExportFormat::Jpeg { quality: 0 },
        };
        assert!(matches!(
            optimize(&buf, &bad_quality),
            Err(EditorError::InvalidConfig(_))
        ));
    }
}
