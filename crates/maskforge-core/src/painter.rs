//! Brush and rectangle edits on a selection mask.
//!
//! The painter keeps two copies of the mask: the live buffer that
//! strokes draw into and the last *committed* baseline. Rectangle
//! previews are redrawn from the baseline on every pointer move, so an
//! uncommitted rectangle never accumulates into the mask.

use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Stroke, Transform};

use crate::buffer::{BLACK, PixelBuffer, WHITE};
use crate::types::{Dimensions, EditorError, Point};

/// How an in-progress stroke turns pointer motion into mask pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeMode {
    /// Freehand line segments with round caps and joins.
    Brush,
    /// Axis-aligned filled rectangle from the anchor to the pointer.
    Rectangle,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStroke {
    mode: StrokeMode,
    /// Where the stroke started. Rectangles always span from here.
    anchor: Point,
    /// The previous brush point; segments are drawn from here.
    last: Point,
}

/// Applies strokes to an owned mask buffer.
#[derive(Debug, Clone)]
pub struct MaskPainter {
    mask: PixelBuffer,
    baseline: PixelBuffer,
    brush_width: f64,
    stroke: Option<ActiveStroke>,
}

impl MaskPainter {
    /// Create a painter over a fully unselected mask.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if either axis is zero.
    pub fn new(dimensions: Dimensions, brush_width: f64) -> Result<Self, EditorError> {
        let mask = PixelBuffer::blank_mask(dimensions)?;
        Ok(Self {
            baseline: mask.clone(),
            mask,
            brush_width,
            stroke: None,
        })
    }

    /// The live mask, including any uncommitted preview.
    #[must_use]
    pub const fn mask(&self) -> &PixelBuffer {
        &self.mask
    }

    /// The last committed mask.
    #[must_use]
    pub const fn baseline(&self) -> &PixelBuffer {
        &self.baseline
    }

    pub(crate) const fn mask_mut(&mut self) -> &mut PixelBuffer {
        &mut self.mask
    }

    /// Whether a stroke is between [`begin_stroke`](Self::begin_stroke)
    /// and [`end_stroke`](Self::end_stroke).
    #[must_use]
    pub const fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// The point the active stroke last reached, if one is active.
    #[must_use]
    pub fn last_point(&self) -> Option<Point> {
        self.stroke.map(|stroke| stroke.last)
    }

    /// Brush line width in buffer units.
    #[must_use]
    pub const fn brush_width(&self) -> f64 {
        self.brush_width
    }

    /// Record the anchor of a new stroke.
    ///
    /// Nothing is drawn until the pointer moves. A stroke already in
    /// progress is abandoned without being committed.
    pub fn begin_stroke(&mut self, mode: StrokeMode, point: Point) {
        if self.stroke.is_some() {
            self.restore_baseline();
        }
        self.stroke = Some(ActiveStroke {
            mode,
            anchor: point,
            last: point,
        });
    }

    /// Extend the active stroke to `point`.
    ///
    /// Brush strokes draw one segment from the previous point and advance
    /// it. Rectangle strokes restore the baseline and redraw the
    /// rectangle spanned by the anchor and `point`. Without an active
    /// stroke this does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if the mask cannot be
    /// borrowed as a raster canvas.
    pub fn continue_stroke(&mut self, point: Point) -> Result<(), EditorError> {
        let Some(stroke) = self.stroke.as_mut() else {
            return Ok(());
        };
        match stroke.mode {
            StrokeMode::Brush => {
                let from = stroke.last;
                stroke.last = point;
                stroke_segment(&mut self.mask, from, point, self.brush_width)
            }
            StrokeMode::Rectangle => {
                let anchor = stroke.anchor;
                stroke.last = point;
                self.mask.copy_from(&self.baseline)?;
                fill_rect(&mut self.mask, anchor, point);
                Ok(())
            }
        }
    }

    /// Finish the active stroke and commit the mask as the new baseline.
    ///
    /// Calling it again without further input changes nothing.
    pub fn end_stroke(&mut self) {
        if self.stroke.take().is_some() {
            self.commit();
        }
    }

    /// Reset the whole mask to unselected and commit.
    pub fn clear(&mut self) {
        self.stroke = None;
        self.mask.fill(WHITE);
        self.baseline.fill(WHITE);
    }

    /// Make the live mask the baseline.
    pub fn commit(&mut self) {
        // Both buffers share dimensions for the painter's whole life.
        let _ = self.baseline.copy_from(&self.mask);
    }

    fn restore_baseline(&mut self) {
        let _ = self.mask.copy_from(&self.baseline);
    }
}

/// The rectangle spanned by two corners, as `(top_left, width, height)`,
/// independent of drag direction.
#[must_use]
pub fn normalized_rect(anchor: Point, point: Point) -> (Point, f64, f64) {
    (
        Point::new(anchor.x.min(point.x), anchor.y.min(point.y)),
        (point.x - anchor.x).abs(),
        (point.y - anchor.y).abs(),
    )
}

/// Fill the pixels whose centers fall inside the rectangle spanned by
/// `a` and `b` with opaque black, clipped to the mask. Degenerate or
/// fully outside rectangles draw nothing.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn fill_rect(mask: &mut PixelBuffer, a: Point, b: Point) {
    let dims = mask.dimensions();
    let (max_x, max_y) = (f64::from(dims.width), f64::from(dims.height));
    let (top_left, w, h) = normalized_rect(a, b);
    let left = top_left.x.round().clamp(0.0, max_x);
    let top = top_left.y.round().clamp(0.0, max_y);
    let right = (top_left.x + w).round().clamp(0.0, max_x);
    let bottom = (top_left.y + h).round().clamp(0.0, max_y);
    // Also rejects NaN edges.
    if !(right > left && bottom > top) {
        return;
    }
    let rect = Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32);
    imageproc::drawing::draw_filled_rect_mut(mask.image_mut(), rect, BLACK);
}

/// Stroke one black segment with round caps onto an opaque mask.
///
/// Anti-aliasing is off so the mask stays strictly black and white.
#[allow(clippy::cast_possible_truncation)]
fn stroke_segment(
    mask: &mut PixelBuffer,
    from: Point,
    to: Point,
    width: f64,
) -> Result<(), EditorError> {
    let dims = mask.dimensions();
    let mut pixmap = mask
        .opaque_pixmap_mut()
        .ok_or(EditorError::InvalidDimensions {
            width: dims.width,
            height: dims.height,
        })?;

    let mut paint = Paint::default();
    paint.set_color_rgba8(0, 0, 0, 255);
    paint.anti_alias = false;

    // A zero-length segment is just its round cap: a filled dot.
    if from.distance_squared(to) < f64::EPSILON {
        if let Some(dot) =
            PathBuilder::from_circle(from.x as f32, from.y as f32, (width / 2.0) as f32)
        {
            pixmap.fill_path(&dot, &paint, FillRule::Winding, Transform::identity(), None);
        }
        return Ok(());
    }

    let mut pb = PathBuilder::new();
    pb.move_to(from.x as f32, from.y as f32);
    pb.line_to(to.x as f32, to.y as f32);
    let Some(path) = pb.finish() else {
        return Ok(());
    };

    let stroke = Stroke {
        width: width as f32,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
    Ok(())
}
