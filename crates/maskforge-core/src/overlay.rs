//! Draggable, resizable, rotatable image overlays.
//!
//! [`OverlayManager`] owns an ordered collection of [`Overlay`]s. The
//! order is the paint order: later entries paint on top and win
//! hit-tests. Pointer interactions resolve to a [`TransformOp`] through
//! [`OverlayManager::hit_test`], which checks named zones of each
//! overlay's box: a square at the top-left corner rotates, a square at
//! the bottom-right corner resizes, and everything else drags.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tiny_skia::{FilterQuality, PixmapPaint, Transform};

use crate::buffer::PixelBuffer;
use crate::types::{Dimensions, EditorConfig, EditorError, Point};

/// Stable identifier of an overlay within its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The transform a pointer interaction applies to an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformOp {
    /// No overlay was hit.
    None,
    /// Move the overlay with the pointer.
    Drag,
    /// Scale the overlay by horizontal pointer motion.
    Resize,
    /// Point the overlay's rotation at the pointer.
    Rotate,
}

/// Where a newly added overlay is placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Fit into a fraction of the canvas, preserving aspect ratio, and
    /// center it.
    Fit,
    /// Explicit top-left position and scale.
    At {
        /// Top-left corner in buffer coordinates.
        position: Point,
        /// Scale relative to the image's native size.
        scale: f64,
    },
}

/// Interaction geometry and limits shared by all overlays.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayLimits {
    /// Side length of the resize and rotate corner zones.
    pub handle_margin: f64,
    /// Relative scale change per buffer unit of resize drag.
    pub resize_sensitivity: f64,
    /// Lower bound on overlay scale.
    pub min_scale: f64,
    /// Fraction of the canvas [`Placement::Fit`] fits into.
    pub fit_fraction: f64,
}

impl Default for OverlayLimits {
    fn default() -> Self {
        Self {
            handle_margin: 20.0,
            resize_sensitivity: 0.01,
            min_scale: 0.1,
            fit_fraction: 0.5,
        }
    }
}

impl From<&EditorConfig> for OverlayLimits {
    fn from(config: &EditorConfig) -> Self {
        Self {
            handle_margin: config.handle_margin,
            resize_sensitivity: config.resize_sensitivity,
            min_scale: config.min_overlay_scale,
            fit_fraction: config.overlay_fit_fraction,
        }
    }
}

/// A positioned, scaled, rotated secondary image.
#[derive(Debug, Clone)]
pub struct Overlay {
    id: OverlayId,
    source: Rc<PixelBuffer>,
    position: Point,
    scale: f64,
    rotation: f64,
}

impl Overlay {
    /// This overlay's id.
    #[must_use]
    pub const fn id(&self) -> OverlayId {
        self.id
    }

    /// The overlay image, shared read-only.
    #[must_use]
    pub fn source(&self) -> &PixelBuffer {
        &self.source
    }

    /// Top-left corner in buffer coordinates.
    #[must_use]
    pub const fn position(&self) -> Point {
        self.position
    }

    /// Scale relative to the image's native size.
    #[must_use]
    pub const fn scale(&self) -> f64 {
        self.scale
    }

    /// Rotation in degrees, clockwise in buffer space (y points down).
    #[must_use]
    pub const fn rotation(&self) -> f64 {
        self.rotation
    }

    /// Native image size, before scaling.
    #[must_use]
    pub fn base_size(&self) -> (f64, f64) {
        (
            f64::from(self.source.width()),
            f64::from(self.source.height()),
        )
    }

    /// Displayed size: the native size times the scale.
    #[must_use]
    pub fn size(&self) -> (f64, f64) {
        let (w, h) = self.base_size();
        (w * self.scale, h * self.scale)
    }

    /// Center of the overlay's box.
    #[must_use]
    pub fn center(&self) -> Point {
        let (w, h) = self.size();
        Point::new(self.position.x + w / 2.0, self.position.y + h / 2.0)
    }

    /// `point` expressed relative to the box's top-left corner, with the
    /// overlay's rotation undone. Equals the plain offset when the
    /// rotation is zero.
    fn to_local(&self, point: Point) -> Point {
        let center = self.center();
        let (w, h) = self.size();
        let (sin, cos) = (-self.rotation.to_radians()).sin_cos();
        let d = point.delta_from(center);
        let x = d.x.mul_add(cos, -(d.y * sin));
        let y = d.x.mul_add(sin, d.y * cos);
        Point::new(x + w / 2.0, y + h / 2.0)
    }

    /// Which transform a press at `point` would start, or
    /// [`TransformOp::None`] if it misses the box.
    #[must_use]
    pub fn zone_at(&self, point: Point, margin: f64) -> TransformOp {
        let local = self.to_local(point);
        let (w, h) = self.size();
        if local.x < 0.0 || local.y < 0.0 || local.x > w || local.y > h {
            return TransformOp::None;
        }
        if local.x > w - margin && local.y > h - margin {
            TransformOp::Resize
        } else if local.x < margin && local.y < margin {
            TransformOp::Rotate
        } else {
            TransformOp::Drag
        }
    }

    /// Map from overlay-image pixels to buffer coordinates.
    #[allow(clippy::cast_possible_truncation)]
    fn transform(&self) -> Transform {
        let center = self.center();
        Transform::from_rotate_at(self.rotation as f32, center.x as f32, center.y as f32)
            .pre_concat(Transform::from_translate(
                self.position.x as f32,
                self.position.y as f32,
            ))
            .pre_concat(Transform::from_scale(self.scale as f32, self.scale as f32))
    }
}

/// Ordered overlay collection with hit-testing and transforms.
#[derive(Debug, Clone)]
pub struct OverlayManager {
    canvas: Dimensions,
    limits: OverlayLimits,
    overlays: Vec<Overlay>,
    selected: Option<OverlayId>,
    next_id: u64,
}

impl OverlayManager {
    /// Create an empty manager for a canvas of the given size.
    #[must_use]
    pub const fn new(canvas: Dimensions, limits: OverlayLimits) -> Self {
        Self {
            canvas,
            limits,
            overlays: Vec::new(),
            selected: None,
            next_id: 1,
        }
    }

    /// Add an overlay on top of the paint order and select it.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidConfig`] if an explicit scale is not
    /// a positive finite number.
    pub fn add(
        &mut self,
        image: Rc<PixelBuffer>,
        placement: Placement,
    ) -> Result<OverlayId, EditorError> {
        let (iw, ih) = (f64::from(image.width()), f64::from(image.height()));
        let (cw, ch) = (f64::from(self.canvas.width), f64::from(self.canvas.height));

        let (position, scale) = match placement {
            Placement::Fit => {
                let f = self.limits.fit_fraction;
                let scale = (cw * f / iw).min(ch * f / ih);
                let position = Point::new(iw.mul_add(-scale, cw) / 2.0, ih.mul_add(-scale, ch) / 2.0);
                (position, scale)
            }
            Placement::At { position, scale } => {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(EditorError::InvalidConfig(format!(
                        "overlay scale must be positive, got {scale}"
                    )));
                }
                (position, scale)
            }
        };

        let id = OverlayId(self.next_id);
        self.next_id += 1;
        self.overlays.push(Overlay {
            id,
            source: image,
            position,
            scale,
            rotation: 0.0,
        });
        self.selected = Some(id);
        log::debug!("added overlay {id} at ({:.1}, {:.1}) scale {scale:.3}", position.x, position.y);
        Ok(id)
    }

    /// Topmost overlay under `point` and the transform a press there
    /// starts. `(None, TransformOp::None)` when nothing is hit.
    #[must_use]
    pub fn hit_test(&self, point: Point) -> (Option<OverlayId>, TransformOp) {
        self.overlays
            .iter()
            .rev()
            .find_map(|o| match o.zone_at(point, self.limits.handle_margin) {
                TransformOp::None => None,
                op => Some((Some(o.id), op)),
            })
            .unwrap_or((None, TransformOp::None))
    }

    /// Move an overlay by a buffer-space displacement.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn apply_drag(&mut self, id: OverlayId, delta: Point) -> Result<(), EditorError> {
        let overlay = self.get_mut(id)?;
        overlay.position = Point::new(overlay.position.x + delta.x, overlay.position.y + delta.y);
        Ok(())
    }

    /// Scale an overlay by `1 + dx * sensitivity`, never below the
    /// minimum scale.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn apply_resize(&mut self, id: OverlayId, dx: f64) -> Result<(), EditorError> {
        let OverlayLimits {
            resize_sensitivity,
            min_scale,
            ..
        } = self.limits;
        let overlay = self.get_mut(id)?;
        let proposed = overlay.scale * dx.mul_add(resize_sensitivity, 1.0);
        // NaN from non-finite input falls through to the minimum.
        overlay.scale = if proposed >= min_scale { proposed } else { min_scale };
        Ok(())
    }

    /// Rotate an overlay so its angle is that of the vector from its
    /// center to `pointer`, in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn apply_rotate(&mut self, id: OverlayId, pointer: Point) -> Result<(), EditorError> {
        let overlay = self.get_mut(id)?;
        let center = overlay.center();
        overlay.rotation = (pointer.y - center.y).atan2(pointer.x - center.x).to_degrees();
        Ok(())
    }

    /// Set an overlay's rotation directly, in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn set_rotation(&mut self, id: OverlayId, degrees: f64) -> Result<(), EditorError> {
        self.get_mut(id)?.rotation = degrees;
        Ok(())
    }

    /// Delete an overlay, clearing the selection if it was selected.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn remove(&mut self, id: OverlayId) -> Result<Overlay, EditorError> {
        let index = self
            .overlays
            .iter()
            .position(|o| o.id == id)
            .ok_or(EditorError::UnknownOverlay(id))?;
        if self.selected == Some(id) {
            self.selected = None;
        }
        Ok(self.overlays.remove(index))
    }

    /// Paint every overlay onto `destination`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidDimensions`] if a buffer cannot be
    /// converted to a raster canvas.
    pub fn composite(&self, destination: &mut PixelBuffer) -> Result<(), EditorError> {
        let dims = destination.dimensions();
        let invalid = EditorError::InvalidDimensions {
            width: dims.width,
            height: dims.height,
        };
        let mut canvas = destination.to_pixmap().ok_or(invalid)?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        for overlay in &self.overlays {
            let Some(layer) = overlay.source.to_pixmap() else {
                continue;
            };
            canvas.draw_pixmap(0, 0, layer.as_ref(), &paint, overlay.transform(), None);
        }
        destination.load_pixmap(&canvas);
        Ok(())
    }

    /// Make `id` the selected overlay.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn select(&mut self, id: OverlayId) -> Result<(), EditorError> {
        self.get(id)?;
        self.selected = Some(id);
        Ok(())
    }

    /// Clear the selection.
    pub const fn deselect(&mut self) {
        self.selected = None;
    }

    /// The selected overlay's id, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<OverlayId> {
        self.selected
    }

    /// Look up an overlay.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::UnknownOverlay`] for an unknown id.
    pub fn get(&self, id: OverlayId) -> Result<&Overlay, EditorError> {
        self.overlays
            .iter()
            .find(|o| o.id == id)
            .ok_or(EditorError::UnknownOverlay(id))
    }

    fn get_mut(&mut self, id: OverlayId) -> Result<&mut Overlay, EditorError> {
        self.overlays
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or(EditorError::UnknownOverlay(id))
    }

    /// Overlays in paint order, bottom first.
    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter()
    }

    /// Number of overlays.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.overlays.len()
    }

    /// Whether there are no overlays.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Size of the canvas overlays are placed on.
    #[must_use]
    pub const fn canvas(&self) -> Dimensions {
        self.canvas
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::buffer::{BLACK, WHITE};

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn manager() -> OverlayManager {
        OverlayManager::new(Dimensions::new(400, 200), OverlayLimits::default())
    }

    fn image(w: u32, h: u32, color: Rgba<u8>) -> Rc<PixelBuffer> {
        Rc::new(PixelBuffer::new(w, h, color).unwrap())
    }

    fn at(x: f64, y: f64, scale: f64) -> Placement {
        Placement::At {
            position: Point::new(x, y),
            scale,
        }
    }

    #[test]
    fn fit_placement_uses_half_canvas_and_centers() {
        let mut m = manager();
        // 400x200 canvas: x fit = 200/100 = 2.0, y fit = 100/100 = 1.0.
        let id = m.add(image(100, 100, RED), Placement::Fit).unwrap();
        let o = m.get(id).unwrap();
        assert!((o.scale() - 1.0).abs() < f64::EPSILON);
        assert_eq!(o.size(), (100.0, 100.0));
        assert_eq!(o.position(), Point::new(150.0, 50.0));
        assert_eq!(o.center(), Point::new(200.0, 100.0));
    }

    #[test]
    fn add_selects_newest_and_appends_on_top() {
        let mut m = manager();
        let a = m.add(image(10, 10, RED), Placement::Fit).unwrap();
        let b = m.add(image(10, 10, BLUE), Placement::Fit).unwrap();
        assert_ne!(a, b);
        assert_eq!(m.selected(), Some(b));
        let order: Vec<_> = m.iter().map(Overlay::id).collect();
        assert_eq!(order, vec![a, b]);
    }

    #[test]
    fn explicit_scale_must_be_positive() {
        let mut m = manager();
        assert!(m.add(image(10, 10, RED), at(0.0, 0.0, 0.0)).is_err());
        assert!(m.is_empty());
    }

    #[test]
    fn hit_test_prefers_topmost() {
        let mut m = manager();
        let below = m.add(image(100, 100, RED), at(0.0, 0.0, 1.0)).unwrap();
        let above = m.add(image(100, 100, BLUE), at(50.0, 0.0, 1.0)).unwrap();
        assert_eq!(m.hit_test(Point::new(75.0, 50.0)), (Some(above), TransformOp::Drag));
        assert_eq!(m.hit_test(Point::new(30.0, 50.0)), (Some(below), TransformOp::Drag));
        assert_eq!(m.hit_test(Point::new(300.0, 150.0)), (None, TransformOp::None));
    }

    #[test]
    fn hit_test_corner_zones() {
        let mut m = manager();
        let id = m.add(image(100, 100, RED), at(10.0, 10.0, 1.0)).unwrap();
        assert_eq!(m.hit_test(Point::new(105.0, 105.0)), (Some(id), TransformOp::Resize));
        assert_eq!(m.hit_test(Point::new(15.0, 15.0)), (Some(id), TransformOp::Rotate));
        // Bottom-left and top-right corners are ordinary drag area.
        assert_eq!(m.hit_test(Point::new(15.0, 105.0)), (Some(id), TransformOp::Drag));
        assert_eq!(m.hit_test(Point::new(105.0, 15.0)), (Some(id), TransformOp::Drag));
    }

    #[test]
    fn hit_test_follows_rotation() {
        let mut m = manager();
        let id = m.add(image(200, 20, RED), at(100.0, 90.0, 1.0)).unwrap();
        // Unrotated, a point well above the thin bar misses it.
        assert_eq!(m.hit_test(Point::new(200.0, 30.0)).0, None);
        // Rotate to vertical: the same point is now inside.
        m.apply_rotate(id, Point::new(200.0, 200.0)).unwrap();
        assert!((m.get(id).unwrap().rotation() - 90.0).abs() < 1e-9);
        assert_eq!(m.hit_test(Point::new(200.0, 30.0)).0, Some(id));
    }

    #[test]
    fn drag_moves_position() {
        let mut m = manager();
        let id = m.add(image(10, 10, RED), at(5.0, 5.0, 1.0)).unwrap();
        m.apply_drag(id, Point::new(10.0, -3.0)).unwrap();
        assert_eq!(m.get(id).unwrap().position(), Point::new(15.0, 2.0));
    }

    #[test]
    fn resize_scales_size_with_base() {
        let mut m = manager();
        let id = m.add(image(40, 20, RED), at(0.0, 0.0, 1.0)).unwrap();
        m.apply_resize(id, 50.0).unwrap();
        let o = m.get(id).unwrap();
        assert!((o.scale() - 1.5).abs() < 1e-12);
        assert!((o.size().0 - 60.0).abs() < 1e-9);
        assert!((o.size().1 - 30.0).abs() < 1e-9);
    }

    #[test]
    fn resize_clamps_at_minimum_scale() {
        let mut m = manager();
        let id = m.add(image(40, 20, RED), at(0.0, 0.0, 0.2)).unwrap();
        m.apply_resize(id, -100.0).unwrap();
        assert!((m.get(id).unwrap().scale() - 0.1).abs() < f64::EPSILON);

        for _ in 0..10 {
            m.apply_resize(id, -1000.0).unwrap();
            assert!((m.get(id).unwrap().scale() - 0.1).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn rotate_points_at_pointer() {
        let mut m = manager();
        let id = m.add(image(20, 20, RED), at(90.0, 90.0, 1.0)).unwrap();
        // Center is (100, 100).
        m.apply_rotate(id, Point::new(100.0, 150.0)).unwrap();
        assert!((m.get(id).unwrap().rotation() - 90.0).abs() < 1e-9);
        m.apply_rotate(id, Point::new(50.0, 100.0)).unwrap();
        assert!((m.get(id).unwrap().rotation() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn remove_clears_selection_only_for_selected() {
        let mut m = manager();
        let a = m.add(image(10, 10, RED), Placement::Fit).unwrap();
        let b = m.add(image(10, 10, BLUE), Placement::Fit).unwrap();
        m.remove(a).unwrap();
        assert_eq!(m.selected(), Some(b));
        m.remove(b).unwrap();
        assert_eq!(m.selected(), None);
        assert!(m.is_empty());
        assert!(matches!(m.remove(b), Err(EditorError::UnknownOverlay(id)) if id == b));
    }

    #[test]
    fn transforms_on_unknown_id_fail() {
        let mut m = manager();
        let ghost = OverlayId(99);
        assert!(m.apply_drag(ghost, Point::ORIGIN).is_err());
        assert!(m.apply_resize(ghost, 1.0).is_err());
        assert!(m.apply_rotate(ghost, Point::ORIGIN).is_err());
        assert!(m.select(ghost).is_err());
    }

    #[test]
    fn composite_paints_in_order() {
        let mut m = OverlayManager::new(Dimensions::new(40, 40), OverlayLimits::default());
        m.add(image(20, 20, RED), at(0.0, 0.0, 1.0)).unwrap();
        m.add(image(20, 20, BLUE), at(10.0, 10.0, 1.0)).unwrap();

        let mut dest = PixelBuffer::new(40, 40, WHITE).unwrap();
        m.composite(&mut dest).unwrap();

        assert_eq!(dest.get(5, 5).unwrap(), RED);
        assert_eq!(dest.get(15, 15).unwrap(), BLUE);
        assert_eq!(dest.get(25, 25).unwrap(), BLUE);
        assert_eq!(dest.get(35, 35).unwrap(), WHITE);
        assert_eq!(dest.get(35, 5).unwrap(), WHITE);
    }

    #[test]
    fn composite_applies_scale() {
        let mut m = OverlayManager::new(Dimensions::new(40, 40), OverlayLimits::default());
        m.add(image(10, 10, BLACK), at(0.0, 0.0, 2.0)).unwrap();
        let mut dest = PixelBuffer::new(40, 40, WHITE).unwrap();
        m.composite(&mut dest).unwrap();
        assert_eq!(dest.get(15, 15).unwrap(), BLACK);
        assert_eq!(dest.get(25, 25).unwrap(), WHITE);
    }

    #[test]
    fn composite_blends_translucent_overlays() {
        let mut m = OverlayManager::new(Dimensions::new(4, 4), OverlayLimits::default());
        m.add(image(4, 4, Rgba([0, 0, 0, 0])), at(0.0, 0.0, 1.0)).unwrap();
        let mut dest = PixelBuffer::new(4, 4, RED).unwrap();
        m.composite(&mut dest).unwrap();
        assert_eq!(dest.count(RED), 16);
    }
}
