//! Browser binding for maskforge edit sessions.
//!
//! [`WasmEditor`] wraps one [`EditSession`] for JavaScript. Pointer
//! events arrive in display coordinates (relative to the canvas
//! element's top-left corner) and are mapped to buffer space with the
//! display size last passed to `setDisplaySize`.
//!
//! Fetching images and calling the generation service stay in
//! JavaScript. The remote edit is split in two: `beginFinalize` returns
//! the mask PNG to upload, and `finalizeSucceeded` / `finalizeFailed`
//! report the outcome. Errors are thrown as JSON-serialized
//! `EditorError` strings.

use maskforge_core::{
    DisplaySize, DrawMode, EditSession, EditorConfig, EditorError, Filter, FinalizeOutcome,
    FinalizeTicket, Flavor, GenerationError, OverlayId, OverlayManager, OverlayMode, PixelBuffer,
    Placement, Point, Tolerance,
};
use wasm_bindgen::prelude::*;

/// Install the panic hook so Rust panics show up in the browser console.
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// One edit session, driven from JavaScript.
#[wasm_bindgen]
pub struct WasmEditor {
    session: EditSession,
    ticket: Option<FinalizeTicket>,
}

#[wasm_bindgen]
impl WasmEditor {
    /// Create a mask (inpainting) editor. `config_json` is an optional
    /// JSON `EditorConfig`.
    #[wasm_bindgen(js_name = maskEditor)]
    pub fn mask_editor(config_json: Option<String>) -> Result<Self, JsValue> {
        Self::create(Flavor::Mask, config_json.as_deref())
    }

    /// Create an overlay (compositing) editor.
    #[wasm_bindgen(js_name = overlayEditor)]
    pub fn overlay_editor(config_json: Option<String>) -> Result<Self, JsValue> {
        Self::create(Flavor::Overlay, config_json.as_deref())
    }

    /// Mark the source image at `url` as being fetched.
    #[wasm_bindgen(js_name = startLoading)]
    pub fn start_loading(&mut self, url: &str) -> Result<(), JsValue> {
        self.session.start_loading(url).map_err(to_js)
    }

    /// Hand over the fetched image bytes.
    #[wasm_bindgen(js_name = finishLoading)]
    pub fn finish_loading(&mut self, bytes: &[u8]) -> Result<(), JsValue> {
        self.session.finish_loading(bytes).map_err(to_js)
    }

    /// Report that fetching the image failed.
    #[wasm_bindgen(js_name = failLoading)]
    pub fn fail_loading(&mut self, reason: &str) -> Result<(), JsValue> {
        self.session.fail_loading(reason).map_err(to_js)
    }

    /// Load an already fetched image in one step.
    pub fn load(&mut self, url: &str, bytes: &[u8]) -> Result<(), JsValue> {
        self.session.load(url, bytes).map_err(to_js)
    }

    /// Size the canvas is currently displayed at, in CSS pixels.
    #[wasm_bindgen(js_name = setDisplaySize)]
    pub fn set_display_size(&mut self, width: f64, height: f64) -> Result<(), JsValue> {
        self.session
            .set_display_size(DisplaySize::new(width, height))
            .map_err(to_js)
    }

    /// Press at a display-space point: start a stroke, a wand fill, or
    /// an overlay transform.
    #[wasm_bindgen(js_name = pointerDown)]
    pub fn pointer_down(&mut self, x: f64, y: f64) -> Result<(), JsValue> {
        let point = self.map(x, y);
        self.session.pointer_down(point).map_err(to_js)
    }

    /// Move to a display-space point, extending the active interaction.
    #[wasm_bindgen(js_name = pointerMove)]
    pub fn pointer_move(&mut self, x: f64, y: f64) -> Result<(), JsValue> {
        let point = self.map(x, y);
        self.session.pointer_move(point).map_err(to_js)
    }

    /// Release at a display-space point and commit.
    #[wasm_bindgen(js_name = pointerUp)]
    pub fn pointer_up(&mut self, x: f64, y: f64) -> Result<(), JsValue> {
        let point = self.map(x, y);
        self.session.pointer_up(point).map_err(to_js)
    }

    /// The pointer left the canvas; commit where it is.
    #[wasm_bindgen(js_name = pointerLeave)]
    pub fn pointer_leave(&mut self) {
        self.session.pointer_leave();
    }

    /// Run one chunk of a pending magic-wand selection. Returns `true`
    /// once it has finished.
    #[wasm_bindgen(js_name = advanceSelection)]
    pub fn advance_selection(&mut self) -> Result<bool, JsValue> {
        self.session
            .advance_selection()
            .map(|status| status.is_complete())
            .map_err(to_js)
    }

    /// `"brush"`, `"rectangle"`, or `"wand"`. The wand uses `tolerance`
    /// (0-100) or the configured default.
    #[wasm_bindgen(js_name = setDrawMode)]
    pub fn set_draw_mode(&mut self, mode: &str, tolerance: Option<u8>) -> Result<(), JsValue> {
        let tolerance = tolerance.unwrap_or(self.session.config().default_tolerance);
        let mode = parse_draw_mode(mode, tolerance).map_err(to_js)?;
        self.session.set_draw_mode(mode).map_err(to_js)
    }

    /// `"image"`, `"filter"`, or `"text"`.
    #[wasm_bindgen(js_name = setOverlayMode)]
    pub fn set_overlay_mode(&mut self, mode: &str) -> Result<(), JsValue> {
        let mode = parse_overlay_mode(mode).map_err(to_js)?;
        self.session.set_overlay_mode(mode).map_err(to_js)
    }

    /// Reset the mask to fully unselected.
    #[wasm_bindgen(js_name = clearMask)]
    pub fn clear_mask(&mut self) -> Result<(), JsValue> {
        self.session.clear_mask().map_err(to_js)
    }

    /// Add an overlay from encoded image bytes, fitted and centered.
    /// Returns its id.
    #[wasm_bindgen(js_name = addOverlay)]
    pub fn add_overlay(&mut self, bytes: &[u8]) -> Result<u64, JsValue> {
        let image = PixelBuffer::decode(bytes).map_err(to_js)?;
        self.session
            .add_overlay(image, Placement::Fit)
            .map(|id| id.0)
            .map_err(to_js)
    }

    /// Remove the overlay with `id`.
    #[wasm_bindgen(js_name = removeOverlay)]
    pub fn remove_overlay(&mut self, id: u64) -> Result<(), JsValue> {
        self.session.remove_overlay(OverlayId(id)).map_err(to_js)
    }

    /// Selected overlay id, if any.
    #[wasm_bindgen(js_name = selectedOverlay)]
    pub fn selected_overlay(&self) -> Option<u64> {
        self.session
            .overlays()
            .and_then(OverlayManager::selected)
            .map(|id| id.0)
    }

    /// Grayscale the base image (filter mode only).
    #[wasm_bindgen(js_name = applyGrayscale)]
    pub fn apply_grayscale(&mut self) -> Result<(), JsValue> {
        self.session.apply_filter(Filter::Grayscale).map_err(to_js)
    }

    /// Current mask as PNG bytes.
    #[wasm_bindgen(js_name = maskPng)]
    pub fn mask_png(&self) -> Result<Vec<u8>, JsValue> {
        self.session.export_mask().map_err(to_js)
    }

    /// Full-size RGBA pixels of the composite, for drawing a preview
    /// into an `ImageData`.
    #[wasm_bindgen(js_name = previewPixels)]
    pub fn preview_pixels(&self) -> Result<Vec<u8>, JsValue> {
        self.session
            .composite_preview()
            .map(|composite| composite.as_raw().to_vec())
            .map_err(to_js)
    }

    /// Encode the optimized composite and close the session.
    pub fn composite(&mut self) -> Result<Vec<u8>, JsValue> {
        self.session
            .finalize_composite()
            .map(|encoded| encoded.bytes)
            .map_err(to_js)
    }

    /// MIME type `composite` encodes to.
    #[wasm_bindgen(js_name = compositeMimeType)]
    pub fn composite_mime_type(&self) -> String {
        self.session.config().export.format.mime_type().to_owned()
    }

    /// Start the remote edit: returns the mask PNG to upload with the
    /// source image URL and prompt.
    #[wasm_bindgen(js_name = beginFinalize)]
    pub fn begin_finalize(&mut self, prompt: &str) -> Result<Vec<u8>, JsValue> {
        let ticket = self.session.begin_finalize(prompt).map_err(to_js)?;
        let mask = ticket.request().mask_png.clone();
        self.ticket = Some(ticket);
        Ok(mask)
    }

    /// Report the edited image URL. Returns `false` if the session was
    /// closed meanwhile and the result was discarded.
    #[wasm_bindgen(js_name = finalizeSucceeded)]
    pub fn finalize_succeeded(&mut self, url: String) -> Result<bool, JsValue> {
        let outcome = self.complete(Ok(url))?;
        Ok(matches!(outcome, FinalizeOutcome::Edited { .. }))
    }

    /// Report a failed remote edit. The session returns to ready with
    /// the mask intact.
    #[wasm_bindgen(js_name = finalizeFailed)]
    pub fn finalize_failed(&mut self, message: String) -> Result<(), JsValue> {
        self.complete(Err(GenerationError::Network(message)))
            .map(|_| ())
    }

    /// Lifecycle state name, e.g. `"Ready"`.
    pub fn state(&self) -> String {
        self.session.state().to_string()
    }

    /// Release all buffers. Results of an in-flight edit are discarded.
    pub fn close(&mut self) {
        self.session.close();
    }
}

impl WasmEditor {
    fn create(flavor: Flavor, config_json: Option<&str>) -> Result<Self, JsValue> {
        let config = parse_config(config_json).map_err(to_js)?;
        let session = EditSession::new(flavor, config).map_err(to_js)?;
        Ok(Self {
            session,
            ticket: None,
        })
    }

    fn map(&self, x: f64, y: f64) -> Point {
        self.session.map_display_point(Point::new(x, y))
    }

    fn complete(
        &mut self,
        result: Result<String, GenerationError>,
    ) -> Result<FinalizeOutcome, JsValue> {
        let Some(ticket) = self.ticket.take() else {
            return Err(to_js(EditorError::InvalidState {
                operation: "complete a finalize",
                state: self.session.state(),
            }));
        };
        match self.session.complete_finalize(ticket, result) {
            Ok(outcome) => Ok(outcome),
            // The caller reported this failure; nothing more to surface.
            Err(EditorError::Generation(_)) => Ok(FinalizeOutcome::Discarded),
            Err(e) => Err(to_js(e)),
        }
    }
}

fn parse_config(json: Option<&str>) -> Result<EditorConfig, EditorError> {
    match json {
        None => Ok(EditorConfig::default()),
        Some(json) => serde_json::from_str(json)
            .map_err(|e| EditorError::InvalidConfig(format!("invalid config JSON: {e}"))),
    }
}

fn parse_draw_mode(mode: &str, tolerance: u8) -> Result<DrawMode, EditorError> {
    match mode {
        "brush" => Ok(DrawMode::Brush),
        "rectangle" => Ok(DrawMode::Rectangle),
        "wand" => Ok(DrawMode::MagicWand(Tolerance::new(tolerance)?)),
        other => Err(EditorError::InvalidConfig(format!(
            "unknown draw mode {other:?}"
        ))),
    }
}

fn parse_overlay_mode(mode: &str) -> Result<OverlayMode, EditorError> {
    match mode {
        "image" => Ok(OverlayMode::Image),
        "filter" => Ok(OverlayMode::Filter),
        "text" => Ok(OverlayMode::Text),
        other => Err(EditorError::InvalidConfig(format!(
            "unknown overlay mode {other:?}"
        ))),
    }
}

/// Serialize an error for JavaScript.
fn to_js(error: EditorError) -> JsValue {
    let json = serde_json::to_string(&error)
        .unwrap_or_else(|ser_err| format!("\"serialization error: {ser_err}\""));
    JsValue::from_str(&json)
}
