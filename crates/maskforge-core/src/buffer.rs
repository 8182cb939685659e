//! Owned RGBA raster storage.
//!
//! [`PixelBuffer`] backs both the source image and the selection mask.
//! It always holds exactly `width * height * 4` bytes; every operation
//! that writes pixels preserves that length.

use image::{ImageEncoder, Rgba};
use tiny_skia::{ColorU8, Pixmap, PixmapMut};

use crate::types::{Dimensions, EditorError, RgbaImage};

/// One straight-alpha RGBA pixel.
pub type Color = Rgba<u8>;

/// Opaque black: a *selected* mask pixel.
pub const BLACK: Color = Rgba([0, 0, 0, 255]);

/// Opaque white: an *unselected* mask pixel.
pub const WHITE: Color = Rgba([255, 255, 255, 255]);

/// Encodings a [`PixelBuffer`] can be serialized to directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobFormat {
    /// Lossless RGBA PNG.
    Png,
    /// Lossless RGBA WebP.
    WebP,
}

/// Raw RGBA raster with fixed dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    image: RgbaImage,
}

impl PixelBuffer {
    /// Create a buffer filled with a single color.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if either axis is zero.
    pub fn new(width: u32, height: u32, fill: Color) -> Result<Self, EditorError> {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimensions { width, height });
        }
        Ok(Self {
            image: RgbaImage::from_pixel(width, height, fill),
        })
    }

    /// Create a fully unselected (white) mask.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if either axis is zero.
    pub fn blank_mask(dimensions: Dimensions) -> Result<Self, EditorError> {
        Self::new(dimensions.width, dimensions.height, WHITE)
    }

    /// Wrap an already decoded image.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if the image is empty.
    pub fn from_image(image: RgbaImage) -> Result<Self, EditorError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(EditorError::InvalidDimensions {
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(Self { image })
    }

    /// Build a buffer from raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if either axis is zero
    /// or `pixels.len() != width * height * 4`.
    pub fn from_raw(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, EditorError> {
        let image = RgbaImage::from_raw(width, height, pixels)
            .ok_or(EditorError::InvalidDimensions { width, height })?;
        Self::from_image(image)
    }

    /// Decode encoded image bytes (PNG, JPEG, BMP, WebP) into RGBA.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::EmptyInput`] if `bytes` is empty.
    /// Returns [`EditorError::ImageDecode`] if the format is unrecognized
    /// or the data is corrupt.
    pub fn decode(bytes: &[u8]) -> Result<Self, EditorError> {
        if bytes.is_empty() {
            return Err(EditorError::EmptyInput);
        }
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Self::from_image(image)
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Both axes.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.image.width(), self.image.height())
    }

    /// Whether `(x, y)` addresses a pixel of this buffer.
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height()
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<(), EditorError> {
        if self.contains(x, y) {
            Ok(())
        } else {
            Err(EditorError::OutOfBounds {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }

    /// Read one pixel.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::OutOfBounds`] outside the buffer.
    pub fn get(&self, x: u32, y: u32) -> Result<Color, EditorError> {
        self.check_bounds(x, y)?;
        Ok(*self.image.get_pixel(x, y))
    }

    /// Write one pixel.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::OutOfBounds`] outside the buffer.
    pub fn set(&mut self, x: u32, y: u32, color: Color) -> Result<(), EditorError> {
        self.check_bounds(x, y)?;
        self.image.put_pixel(x, y, color);
        Ok(())
    }

    /// Set every pixel to `color`.
    pub fn fill(&mut self, color: Color) {
        for pixel in self.image.pixels_mut() {
            *pixel = color;
        }
    }

    /// Overwrite this buffer's pixels with `other`'s.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if the sizes differ.
    pub fn copy_from(&mut self, other: &Self) -> Result<(), EditorError> {
        if self.dimensions() != other.dimensions() {
            return Err(EditorError::InvalidDimensions {
                width: other.width(),
                height: other.height(),
            });
        }
        self.image.copy_from_slice(other.image.as_raw());
        Ok(())
    }

    /// Raw RGBA bytes, row-major.
    #[must_use]
    pub fn as_raw(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Count pixels equal to `color`.
    #[must_use]
    pub fn count(&self, color: Color) -> usize {
        self.image.pixels().filter(|p| **p == color).count()
    }

    /// Borrow the underlying image.
    #[must_use]
    pub const fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub(crate) const fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Consume the buffer, returning the underlying image.
    #[must_use]
    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    /// Encode the buffer in a lossless format.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Encode`] if the encoder fails.
    pub fn to_encoded_blob(&self, format: BlobFormat) -> Result<Vec<u8>, EditorError> {
        let mut bytes = Vec::new();
        let (w, h) = (self.width(), self.height());
        let result = match format {
            BlobFormat::Png => image::codecs::png::PngEncoder::new(&mut bytes).write_image(
                self.image.as_raw(),
                w,
                h,
                image::ExtendedColorType::Rgba8,
            ),
            BlobFormat::WebP => image::codecs::webp::WebPEncoder::new_lossless(&mut bytes)
                .write_image(self.image.as_raw(), w, h, image::ExtendedColorType::Rgba8),
        };
        result.map_err(|e| EditorError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Borrow the pixels as a tiny-skia canvas.
    ///
    /// tiny-skia expects premultiplied alpha. Only call this on buffers
    /// whose pixels are all opaque (masks are), where premultiplied and
    /// straight alpha coincide.
    pub(crate) fn opaque_pixmap_mut(&mut self) -> Option<PixmapMut<'_>> {
        let (w, h) = (self.width(), self.height());
        PixmapMut::from_bytes(&mut self.image, w, h)
    }

    /// Copy into a premultiplied tiny-skia pixmap.
    pub(crate) fn to_pixmap(&self) -> Option<Pixmap> {
        let mut pixmap = Pixmap::new(self.width(), self.height())?;
        for (dst, src) in pixmap.pixels_mut().iter_mut().zip(self.image.pixels()) {
            let [r, g, b, a] = src.0;
            *dst = ColorU8::from_rgba(r, g, b, a).premultiply();
        }
        Some(pixmap)
    }

    /// Overwrite this buffer with a premultiplied pixmap of equal size.
    pub(crate) fn load_pixmap(&mut self, pixmap: &Pixmap) {
        for (dst, src) in self.image.pixels_mut().zip(pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_has_rgba_length() {
        let buf = PixelBuffer::new(7, 3, WHITE).unwrap();
        assert_eq!(buf.as_raw().len(), 7 * 3 * 4);
        assert_eq!(buf.count(WHITE), 21);
    }

    #[test]
    fn zero_sized_buffer_is_rejected() {
        assert!(matches!(
            PixelBuffer::new(0, 5, WHITE),
            Err(EditorError::InvalidDimensions {
                width: 0,
                height: 5
            })
        ));
    }

    #[test]
    fn from_raw_rejects_length_mismatch() {
        let result = PixelBuffer::from_raw(2, 2, vec![0; 15]);
        assert!(matches!(result, Err(EditorError::InvalidDimensions { .. })));
    }

    #[test]
    fn get_and_set_round_trip() {
        let mut buf = PixelBuffer::new(4, 4, WHITE).unwrap();
        buf.set(2, 3, Rgba([10, 20, 30, 40])).unwrap();
        assert_eq!(buf.get(2, 3).unwrap(), Rgba([10, 20, 30, 40]));
        assert_eq!(buf.get(3, 2).unwrap(), WHITE);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut buf = PixelBuffer::new(4, 4, WHITE).unwrap();
        assert!(matches!(
            buf.get(4, 0),
            Err(EditorError::OutOfBounds { x: 4, y: 0, .. })
        ));
        assert!(matches!(
            buf.set(0, 4, BLACK),
            Err(EditorError::OutOfBounds { x: 0, y: 4, .. })
        ));
    }

    #[test]
    fn fill_overwrites_everything() {
        let mut buf = PixelBuffer::new(5, 5, BLACK).unwrap();
        buf.set(1, 1, Rgba([9, 9, 9, 9])).unwrap();
        buf.fill(WHITE);
        assert_eq!(buf.count(WHITE), 25);
    }

    #[test]
    fn clone_is_independent() {
        let original = PixelBuffer::new(3, 3, WHITE).unwrap();
        let mut copy = original.clone();
        copy.set(0, 0, BLACK).unwrap();
        assert_eq!(original.get(0, 0).unwrap(), WHITE);
        assert_eq!(copy.get(0, 0).unwrap(), BLACK);
    }

    #[test]
    fn copy_from_requires_matching_size() {
        let mut a = PixelBuffer::new(3, 3, WHITE).unwrap();
        let b = PixelBuffer::new(3, 4, BLACK).unwrap();
        assert!(a.copy_from(&b).is_err());
        let c = PixelBuffer::new(3, 3, BLACK).unwrap();
        a.copy_from(&c).unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn png_blob_decodes_back_to_same_pixels() {
        let mut buf = PixelBuffer::new(6, 4, WHITE).unwrap();
        buf.set(5, 3, BLACK).unwrap();
        let png = buf.to_encoded_blob(BlobFormat::Png).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        let decoded = PixelBuffer::decode(&png).unwrap();
        assert_eq!(decoded, buf);
    }

    #[test]
    fn decode_empty_input_fails() {
        assert!(matches!(
            PixelBuffer::decode(&[]),
            Err(EditorError::EmptyInput)
        ));
    }

    #[test]
    fn decode_corrupt_input_fails() {
        assert!(matches!(
            PixelBuffer::decode(&[0xFF, 0x00, 0x13]),
            Err(EditorError::ImageDecode(_))
        ));
    }

    #[test]
    fn pixmap_round_trip_preserves_opaque_pixels() {
        let mut buf = PixelBuffer::new(2, 1, WHITE).unwrap();
        buf.set(1, 0, Rgba([12, 200, 99, 255])).unwrap();
        let pixmap = buf.to_pixmap().unwrap();
        let mut back = PixelBuffer::new(2, 1, BLACK).unwrap();
        back.load_pixmap(&pixmap);
        assert_eq!(back, buf);
    }
}
