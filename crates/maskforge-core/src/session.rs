//! Edit session state machine.
//!
//! An [`EditSession`] owns every buffer of one editing session: the
//! decoded source image plus either a selection mask (the
//! [`Flavor::Mask`] inpainting editor) or an overlay collection (the
//! [`Flavor::Overlay`] local editor). Pointer input arrives as
//! buffer-space points, already mapped with the session's
//! [`CoordinateMapper`].
//!
//! ```text
//! Uninitialized -> Loading -> Ready <-> Interacting
//!                     |         |
//!                     v         v
//!                  Failed    Finalizing -> Closed
//! ```
//!
//! The session suspends at two points only: while the source image is
//! fetched (between [`start_loading`](EditSession::start_loading) and
//! [`finish_loading`](EditSession::finish_loading)) and while the remote
//! edit call is in flight (between
//! [`begin_finalize`](EditSession::begin_finalize) and
//! [`complete_finalize`](EditSession::complete_finalize)). Each
//! [`FinalizeTicket`] carries the session epoch it was issued in, so a
//! result arriving after the session was closed is discarded instead of
//! resurrecting it.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::coords::{CoordinateMapper, DisplaySize};
use crate::export::{self, EncodedImage};
use crate::filter::Filter;
use crate::overlay::{OverlayId, OverlayManager, Placement, TransformOp};
use crate::painter::{MaskPainter, StrokeMode};
use crate::select::{self, FillStatus, FloodFill, Tolerance};
use crate::service::{EditRequest, GenerationError, ImageGenerationService};
use crate::types::{EditorConfig, EditorError, Point};

/// Lifecycle state of an [`EditSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No buffers allocated yet.
    Uninitialized,
    /// The source image is being fetched and decoded.
    Loading,
    /// Buffers allocated; accepts mode changes and pointer input.
    Ready,
    /// A stroke, transform, or incremental selection is in progress.
    Interacting,
    /// The edited artifact has been handed off and a result is awaited.
    Finalizing,
    /// Terminal. All buffers are released.
    Closed,
    /// The source image could not be loaded. Retry with a new load.
    Failed,
}

impl SessionState {
    /// Whether pointer input is processed in this state.
    #[must_use]
    pub const fn accepts_pointer(self) -> bool {
        matches!(self, Self::Ready | Self::Interacting)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Which editor a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flavor {
    /// Selection-mask editor for remote inpainting.
    Mask,
    /// Overlay compositing editor.
    Overlay,
}

/// Pointer interpretation in the mask flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawMode {
    /// Freehand brush.
    Brush,
    /// Rectangle drag.
    Rectangle,
    /// Click-to-select region growing.
    MagicWand(Tolerance),
}

/// Pointer interpretation in the overlay flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OverlayMode {
    /// Place and transform overlays.
    #[default]
    Image,
    /// Apply whole-image filters.
    Filter,
    /// Text placement. Pointer input is ignored.
    Text,
}

/// Result of a completed finalize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The service produced an edited image.
    Edited {
        /// Location of the edited image.
        url: String,
    },
    /// The session was closed or restarted while the call was in flight,
    /// so the result was dropped.
    Discarded,
}

/// A finalize in flight: the request to send and the epoch it belongs to.
#[derive(Debug, Clone)]
pub struct FinalizeTicket {
    epoch: u64,
    request: EditRequest,
}

impl FinalizeTicket {
    /// The edit request to submit.
    #[must_use]
    pub const fn request(&self) -> &EditRequest {
        &self.request
    }
}

#[derive(Debug, Clone)]
enum Workspace {
    Mask(MaskPainter),
    Overlay(OverlayManager),
}

#[derive(Debug, Clone)]
enum Interaction {
    Stroke,
    Fill(FloodFill),
    Transform {
        id: OverlayId,
        op: TransformOp,
        last: Point,
    },
}

/// One editing session over one source image.
#[derive(Debug, Clone)]
pub struct EditSession {
    flavor: Flavor,
    config: EditorConfig,
    state: SessionState,
    epoch: u64,
    image_url: Option<String>,
    source: Option<PixelBuffer>,
    workspace: Option<Workspace>,
    mapper: CoordinateMapper,
    draw_mode: DrawMode,
    overlay_mode: OverlayMode,
    interaction: Option<Interaction>,
}

impl EditSession {
    /// Create an uninitialized session.
    ///
    /// # Errors
    ///
    /// Returns the first problem [`EditorConfig::validate`] finds.
    pub fn new(flavor: Flavor, config: EditorConfig) -> Result<Self, EditorError> {
        config.validate()?;
        Ok(Self {
            flavor,
            config,
            state: SessionState::Uninitialized,
            epoch: 0,
            image_url: None,
            source: None,
            workspace: None,
            mapper: CoordinateMapper::identity(),
            draw_mode: DrawMode::Brush,
            overlay_mode: OverlayMode::default(),
            interaction: None,
        })
    }

    // ---- Lifecycle --------------------------------------------------------

    /// Start loading the source image at `image_url`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] unless the session is
    /// `Uninitialized` or `Failed`.
    pub fn start_loading(&mut self, image_url: impl Into<String>) -> Result<(), EditorError> {
        self.require_state(
            "load an image",
            &[SessionState::Uninitialized, SessionState::Failed],
        )?;
        self.epoch += 1;
        self.image_url = Some(image_url.into());
        self.transition(SessionState::Loading);
        Ok(())
    }

    /// Decode the fetched source image and allocate the session buffers.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] unless `Loading`. Decode
    /// failures move the session to `Failed` and are returned.
    pub fn finish_loading(&mut self, bytes: &[u8]) -> Result<(), EditorError> {
        self.require_state("finish loading", &[SessionState::Loading])?;
        let source = match PixelBuffer::decode(bytes) {
            Ok(source) => source,
            Err(e) => {
                log::warn!("source image failed to decode: {e}");
                self.transition(SessionState::Failed);
                return Err(e);
            }
        };

        let dims = source.dimensions();
        let workspace = match self.flavor {
            Flavor::Mask => match MaskPainter::new(dims, self.config.brush_width) {
                Ok(painter) => Workspace::Mask(painter),
                Err(e) => {
                    self.transition(SessionState::Failed);
                    return Err(e);
                }
            },
            Flavor::Overlay => Workspace::Overlay(OverlayManager::new(dims, (&self.config).into())),
        };

        log::debug!("loaded {}x{} source image", dims.width, dims.height);
        self.source = Some(source);
        self.workspace = Some(workspace);
        self.mapper = CoordinateMapper::identity();
        self.interaction = None;
        self.transition(SessionState::Ready);
        Ok(())
    }

    /// Record that fetching the source image failed.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] unless `Loading`.
    pub fn fail_loading(&mut self, reason: &str) -> Result<(), EditorError> {
        self.require_state("fail loading", &[SessionState::Loading])?;
        log::warn!("source image failed to load: {reason}");
        self.transition(SessionState::Failed);
        Ok(())
    }

    /// [`start_loading`](Self::start_loading) followed by
    /// [`finish_loading`](Self::finish_loading).
    ///
    /// # Errors
    ///
    /// See the two steps.
    pub fn load(&mut self, image_url: impl Into<String>, bytes: &[u8]) -> Result<(), EditorError> {
        self.start_loading(image_url)?;
        self.finish_loading(bytes)
    }

    /// Close the session and release its buffers. Any finalize still in
    /// flight will be discarded. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        self.release();
        self.transition(SessionState::Closed);
    }

    // ---- Coordinates ------------------------------------------------------

    /// Update the on-screen size the canvas is displayed at.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] before an image is loaded
    /// and [`EditorError::InvalidConfig`] for a non-positive size.
    pub fn set_display_size(&mut self, display: DisplaySize) -> Result<(), EditorError> {
        let Some(source) = self.source.as_ref() else {
            return Err(self.invalid_state("set the display size"));
        };
        self.mapper = CoordinateMapper::new(source.dimensions(), display)?;
        Ok(())
    }

    /// Map a point relative to the displayed canvas into buffer space.
    #[must_use]
    pub fn map_display_point(&self, display: Point) -> Point {
        self.mapper.to_buffer(display)
    }

    // ---- Modes ------------------------------------------------------------

    /// Switch the mask flavor's pointer interpretation.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the overlay flavor and
    /// [`EditorError::InvalidState`] outside `Ready`.
    pub fn set_draw_mode(&mut self, mode: DrawMode) -> Result<(), EditorError> {
        const OP: &str = "switch draw mode";
        self.require_flavor(Flavor::Mask, OP)?;
        self.require_ready(OP)?;
        log::debug!("draw mode {:?} -> {mode:?}", self.draw_mode);
        self.draw_mode = mode;
        Ok(())
    }

    /// Switch the overlay flavor's pointer interpretation. Leaving
    /// [`OverlayMode::Image`] deselects the active overlay.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor and
    /// [`EditorError::InvalidState`] outside `Ready`.
    pub fn set_overlay_mode(&mut self, mode: OverlayMode) -> Result<(), EditorError> {
        const OP: &str = "switch overlay mode";
        self.require_flavor(Flavor::Overlay, OP)?;
        self.require_ready(OP)?;
        if mode != OverlayMode::Image
            && let Some(Workspace::Overlay(overlays)) = self.workspace.as_mut()
        {
            overlays.deselect();
        }
        log::debug!("overlay mode {:?} -> {mode:?}", self.overlay_mode);
        self.overlay_mode = mode;
        Ok(())
    }

    // ---- Pointer input ----------------------------------------------------

    /// Press at a buffer-space point.
    ///
    /// Starts a brush or rectangle stroke, runs (or, with
    /// `fill_chunk_pixels` set, starts) a magic-wand selection, or
    /// starts the overlay transform under the pointer. Ignored outside
    /// `Ready`/`Interacting`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Busy`] while an incremental selection is
    /// running.
    pub fn pointer_down(&mut self, point: Point) -> Result<(), EditorError> {
        if !self.state.accepts_pointer() {
            log::debug!("ignoring pointer down while {}", self.state);
            return Ok(());
        }
        if matches!(self.interaction, Some(Interaction::Fill(_))) {
            return Err(EditorError::Busy);
        }
        if self.interaction.is_some() {
            // The previous release never arrived.
            self.finish_interaction();
        }

        let interaction = match self.workspace.as_mut() {
            None => None,
            Some(Workspace::Mask(painter)) => match self.draw_mode {
                DrawMode::Brush => {
                    painter.begin_stroke(StrokeMode::Brush, point);
                    Some(Interaction::Stroke)
                }
                DrawMode::Rectangle => {
                    painter.begin_stroke(StrokeMode::Rectangle, point);
                    Some(Interaction::Stroke)
                }
                DrawMode::MagicWand(tolerance) => {
                    let Some(source) = self.source.as_ref() else {
                        return Ok(());
                    };
                    let Some(seed) = point.to_pixel(source.dimensions()) else {
                        log::warn!(
                            "ignoring magic wand click outside the canvas at ({:.1}, {:.1})",
                            point.x,
                            point.y
                        );
                        return Ok(());
                    };
                    if self.config.fill_chunk_pixels.is_some() {
                        Some(Interaction::Fill(FloodFill::new(source, seed, tolerance)?))
                    } else {
                        let selected = select::select(source, painter.mask_mut(), seed, tolerance)?;
                        painter.commit();
                        log::debug!("magic wand selected {selected} pixels");
                        None
                    }
                }
            },
            Some(Workspace::Overlay(overlays)) => {
                if self.overlay_mode != OverlayMode::Image {
                    return Ok(());
                }
                match overlays.hit_test(point) {
                    (Some(id), op) => {
                        overlays.select(id)?;
                        Some(Interaction::Transform {
                            id,
                            op,
                            last: point,
                        })
                    }
                    (None, _) => {
                        overlays.deselect();
                        None
                    }
                }
            }
        };

        if let Some(interaction) = interaction {
            self.interaction = Some(interaction);
            self.transition(SessionState::Interacting);
        }
        Ok(())
    }

    /// Move to a buffer-space point, extending the active stroke or
    /// transform. Hover without an interaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Busy`] while an incremental selection is
    /// running.
    pub fn pointer_move(&mut self, point: Point) -> Result<(), EditorError> {
        if !self.state.accepts_pointer() {
            return Ok(());
        }
        match (self.interaction.as_mut(), self.workspace.as_mut()) {
            (Some(Interaction::Fill(_)), _) => Err(EditorError::Busy),
            (Some(Interaction::Stroke), Some(Workspace::Mask(painter))) => {
                painter.continue_stroke(point)
            }
            (Some(Interaction::Transform { id, op, last }), Some(Workspace::Overlay(overlays))) => {
                let delta = point.delta_from(*last);
                match op {
                    TransformOp::Drag => overlays.apply_drag(*id, delta)?,
                    TransformOp::Resize => overlays.apply_resize(*id, delta.x)?,
                    TransformOp::Rotate => overlays.apply_rotate(*id, point)?,
                    TransformOp::None => {}
                }
                *last = point;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Release at a buffer-space point: extend to `point`, then commit
    /// the stroke or end the transform.
    ///
    /// A release where the stroke already is adds nothing, so a click
    /// without movement leaves the mask untouched.
    ///
    /// # Errors
    ///
    /// Propagates errors from the final move; the interaction ends
    /// regardless.
    pub fn pointer_up(&mut self, point: Point) -> Result<(), EditorError> {
        if matches!(self.interaction, None | Some(Interaction::Fill(_))) {
            return Ok(());
        }
        let at_release = matches!(
            self.workspace.as_ref(),
            Some(Workspace::Mask(painter)) if painter.last_point() == Some(point)
        );
        let result = if at_release {
            Ok(())
        } else {
            self.pointer_move(point)
        };
        self.finish_interaction();
        result
    }

    /// The pointer left the canvas: commit the stroke or end the
    /// transform where it is.
    pub fn pointer_leave(&mut self) {
        self.finish_interaction();
    }

    /// Advance an incremental magic-wand selection by one chunk.
    ///
    /// Returns to `Ready` once the selection completes.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::InvalidState`] when no selection is
    /// running.
    pub fn advance_selection(&mut self) -> Result<FillStatus, EditorError> {
        let budget = self.config.fill_chunk_pixels.unwrap_or(usize::MAX);
        let not_selecting = self.invalid_state("advance a selection");
        let (Some(Interaction::Fill(fill)), Some(source), Some(Workspace::Mask(painter))) = (
            self.interaction.as_mut(),
            self.source.as_ref(),
            self.workspace.as_mut(),
        ) else {
            return Err(not_selecting);
        };

        let status = fill.step(source, painter.mask_mut(), budget);
        if status.is_complete() {
            painter.commit();
            log::debug!("magic wand selected {} pixels", status.selected());
            self.interaction = None;
            self.transition(SessionState::Ready);
        }
        Ok(status)
    }

    /// Whether an incremental selection is still running.
    #[must_use]
    pub const fn is_selecting(&self) -> bool {
        matches!(self.interaction, Some(Interaction::Fill(_)))
    }

    // ---- Mask flavor ------------------------------------------------------

    /// Reset the mask to fully unselected.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the overlay flavor and
    /// [`EditorError::InvalidState`] outside `Ready`.
    pub fn clear_mask(&mut self) -> Result<(), EditorError> {
        const OP: &str = "clear the mask";
        self.require_flavor(Flavor::Mask, OP)?;
        self.require_ready(OP)?;
        if let Some(Workspace::Mask(painter)) = self.workspace.as_mut() {
            painter.clear();
        }
        Ok(())
    }

    /// Encode the current mask as PNG without leaving `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the overlay flavor,
    /// [`EditorError::InvalidState`] outside `Ready`, and
    /// [`EditorError::Encode`] if encoding fails.
    pub fn export_mask(&self) -> Result<Vec<u8>, EditorError> {
        const OP: &str = "export the mask";
        self.require_flavor(Flavor::Mask, OP)?;
        self.require_ready(OP)?;
        let painter = self.painter().ok_or_else(|| self.invalid_state(OP))?;
        export::encode_mask_png(painter.mask())
    }

    /// Hand the mask off for remote editing.
    ///
    /// Encodes the mask, moves to `Finalizing`, and returns the ticket
    /// whose request the caller submits. Pass the service's answer to
    /// [`complete_finalize`](Self::complete_finalize).
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the overlay flavor,
    /// [`EditorError::Busy`] during an incremental selection,
    /// [`EditorError::InvalidState`] outside `Ready`,
    /// [`EditorError::EmptyPrompt`] for a blank prompt, and
    /// [`EditorError::Encode`] if the mask cannot be encoded.
    pub fn begin_finalize(&mut self, prompt: &str) -> Result<FinalizeTicket, EditorError> {
        const OP: &str = "finalize an edit";
        self.require_flavor(Flavor::Mask, OP)?;
        self.require_ready(OP)?;
        if prompt.trim().is_empty() {
            return Err(EditorError::EmptyPrompt);
        }
        let (Some(image_url), Some(painter)) = (self.image_url.clone(), self.painter()) else {
            return Err(self.invalid_state(OP));
        };
        let mask_png = export::encode_mask_png(painter.mask())?;
        self.transition(SessionState::Finalizing);
        Ok(FinalizeTicket {
            epoch: self.epoch,
            request: EditRequest {
                image_url,
                mask_png,
                prompt: prompt.to_owned(),
            },
        })
    }

    /// Apply the outcome of a finalize started with
    /// [`begin_finalize`](Self::begin_finalize).
    ///
    /// Success closes the session. Failure returns it to `Ready` with
    /// the mask intact so the caller can retry. A ticket from before a
    /// close or reload yields [`FinalizeOutcome::Discarded`].
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::Generation`] when the service failed.
    pub fn complete_finalize(
        &mut self,
        ticket: FinalizeTicket,
        result: Result<String, GenerationError>,
    ) -> Result<FinalizeOutcome, EditorError> {
        if ticket.epoch != self.epoch || self.state != SessionState::Finalizing {
            log::warn!("discarding finalize result; session is {}", self.state);
            return Ok(FinalizeOutcome::Discarded);
        }
        match result {
            Ok(url) => {
                self.release();
                self.transition(SessionState::Closed);
                Ok(FinalizeOutcome::Edited { url })
            }
            Err(e) => {
                log::warn!("edit failed, keeping the mask for retry: {e}");
                self.transition(SessionState::Ready);
                Err(e.into())
            }
        }
    }

    /// Submit the mask to `service` and apply the result.
    ///
    /// # Errors
    ///
    /// See [`begin_finalize`](Self::begin_finalize) and
    /// [`complete_finalize`](Self::complete_finalize).
    #[allow(clippy::future_not_send)]
    pub async fn finalize<S: ImageGenerationService>(
        &mut self,
        service: &S,
        prompt: &str,
    ) -> Result<FinalizeOutcome, EditorError> {
        let ticket = self.begin_finalize(prompt)?;
        let result = service.edit(ticket.request()).await;
        self.complete_finalize(ticket, result)
    }

    // ---- Overlay flavor ---------------------------------------------------

    /// Add an overlay image on top and select it.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor,
    /// [`EditorError::InvalidState`] outside `Ready`, and
    /// [`EditorError::InvalidConfig`] for a bad explicit scale.
    pub fn add_overlay(
        &mut self,
        image: PixelBuffer,
        placement: Placement,
    ) -> Result<OverlayId, EditorError> {
        let overlays = self.overlays_mut()?;
        overlays.add(Rc::new(image), placement)
    }

    /// Delete an overlay.
    ///
    /// # Errors
    ///
    /// As [`add_overlay`](Self::add_overlay), plus
    /// [`EditorError::UnknownOverlay`].
    pub fn remove_overlay(&mut self, id: OverlayId) -> Result<(), EditorError> {
        self.overlays_mut()?.remove(id)?;
        Ok(())
    }

    /// Mutable access to the overlays while `Ready`.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor and
    /// [`EditorError::InvalidState`] outside `Ready`.
    pub fn overlays_mut(&mut self) -> Result<&mut OverlayManager, EditorError> {
        const OP: &str = "edit overlays";
        self.require_flavor(Flavor::Overlay, OP)?;
        self.require_ready(OP)?;
        let state = self.state;
        match self.workspace.as_mut() {
            Some(Workspace::Overlay(overlays)) => Ok(overlays),
            _ => Err(EditorError::InvalidState {
                operation: OP,
                state,
            }),
        }
    }

    /// Filter the source image in place. Only accepted in
    /// [`OverlayMode::Filter`].
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor and
    /// [`EditorError::InvalidState`] outside `Ready` or filter mode.
    pub fn apply_filter(&mut self, filter: Filter) -> Result<(), EditorError> {
        const OP: &str = "apply a filter";
        self.require_flavor(Flavor::Overlay, OP)?;
        self.require_ready(OP)?;
        if self.overlay_mode != OverlayMode::Filter {
            return Err(self.invalid_state("apply a filter outside filter mode"));
        }
        let state = self.state;
        let Some(source) = self.source.as_mut() else {
            return Err(EditorError::InvalidState {
                operation: OP,
                state,
            });
        };
        filter.apply(source);
        log::debug!("applied {filter} filter");
        Ok(())
    }

    /// Render the source with every overlay painted on, at full size.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor and
    /// [`EditorError::InvalidState`] outside `Ready`.
    pub fn composite_preview(&self) -> Result<PixelBuffer, EditorError> {
        const OP: &str = "preview the composite";
        self.require_flavor(Flavor::Overlay, OP)?;
        self.require_ready(OP)?;
        self.render_composite(OP)
    }

    /// Render, downscale and encode the composite, then close.
    ///
    /// The composite goes back to the caller; no remote call is made.
    ///
    /// # Errors
    ///
    /// Returns [`EditorError::WrongFlavor`] in the mask flavor and
    /// [`EditorError::InvalidState`] outside `Ready`. Encoding failures
    /// leave the session `Ready`.
    pub fn finalize_composite(&mut self) -> Result<EncodedImage, EditorError> {
        const OP: &str = "finalize a composite";
        self.require_flavor(Flavor::Overlay, OP)?;
        self.require_ready(OP)?;
        self.transition(SessionState::Finalizing);
        let encoded = self
            .render_composite(OP)
            .and_then(|composite| export::optimize(&composite, &self.config.export));
        match encoded {
            Ok(encoded) => {
                self.release();
                self.transition(SessionState::Closed);
                Ok(encoded)
            }
            Err(e) => {
                self.transition(SessionState::Ready);
                Err(e)
            }
        }
    }

    // ---- Accessors --------------------------------------------------------

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Which editor this session drives.
    #[must_use]
    pub const fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// The configuration the session was created with.
    #[must_use]
    pub const fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Active mask-flavor draw mode.
    #[must_use]
    pub const fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    /// Active overlay-flavor mode.
    #[must_use]
    pub const fn overlay_mode(&self) -> OverlayMode {
        self.overlay_mode
    }

    /// Location of the source image, once loading has started.
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    /// The decoded source image.
    #[must_use]
    pub const fn source(&self) -> Option<&PixelBuffer> {
        self.source.as_ref()
    }

    /// The live mask (mask flavor).
    #[must_use]
    pub fn mask(&self) -> Option<&PixelBuffer> {
        self.painter().map(MaskPainter::mask)
    }

    /// The overlay collection (overlay flavor).
    #[must_use]
    pub const fn overlays(&self) -> Option<&OverlayManager> {
        match &self.workspace {
            Some(Workspace::Overlay(overlays)) => Some(overlays),
            _ => None,
        }
    }

    /// The display-to-buffer mapping in effect.
    #[must_use]
    pub const fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    // ---- Internals --------------------------------------------------------

    const fn painter(&self) -> Option<&MaskPainter> {
        match &self.workspace {
            Some(Workspace::Mask(painter)) => Some(painter),
            _ => None,
        }
    }

    fn render_composite(&self, operation: &'static str) -> Result<PixelBuffer, EditorError> {
        let (Some(source), Some(overlays)) = (self.source.as_ref(), self.overlays()) else {
            return Err(self.invalid_state(operation));
        };
        let mut composite = source.clone();
        overlays.composite(&mut composite)?;
        Ok(composite)
    }

    fn finish_interaction(&mut self) {
        match self.interaction.take() {
            Some(Interaction::Stroke) => {
                if let Some(Workspace::Mask(painter)) = self.workspace.as_mut() {
                    painter.end_stroke();
                }
            }
            Some(fill @ Interaction::Fill(_)) => {
                // Selections end by completing, not by pointer release.
                self.interaction = Some(fill);
                return;
            }
            Some(Interaction::Transform { .. }) => {}
            None => return,
        }
        if self.state == SessionState::Interacting {
            self.transition(SessionState::Ready);
        }
    }

    fn release(&mut self) {
        self.source = None;
        self.workspace = None;
        self.interaction = None;
        self.epoch += 1;
    }

    fn transition(&mut self, to: SessionState) {
        log::debug!("session {} -> {to}", self.state);
        self.state = to;
    }

    const fn invalid_state(&self, operation: &'static str) -> EditorError {
        EditorError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn require_state(
        &self,
        operation: &'static str,
        allowed: &[SessionState],
    ) -> Result<(), EditorError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(self.invalid_state(operation))
        }
    }

    fn require_ready(&self, operation: &'static str) -> Result<(), EditorError> {
        if self.is_selecting() {
            return Err(EditorError::Busy);
        }
        self.require_state(operation, &[SessionState::Ready])
    }

    fn require_flavor(&self, flavor: Flavor, operation: &'static str) -> Result<(), EditorError> {
        if self.flavor == flavor {
            Ok(())
        } else {
            Err(EditorError::WrongFlavor { operation })
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::buffer::{BLACK, BlobFormat, WHITE};
    use crate::types::Dimensions;

    const GRAY: Rgba<u8> = Rgba([200, 200, 200, 255]);

    fn png(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        PixelBuffer::new(width, height, color)
            .unwrap()
            .to_encoded_blob(BlobFormat::Png)
            .unwrap()
    }

    fn mask_session() -> EditSession {
        let mut s = EditSession::new(Flavor::Mask, EditorConfig::default()).unwrap();
        s.load("https://img/source.png", &png(100, 100, GRAY)).unwrap();
        s
    }

    fn overlay_session() -> EditSession {
        let mut s = EditSession::new(Flavor::Overlay, EditorConfig::default()).unwrap();
        s.load("https://img/base.png", &png(200, 200, WHITE)).unwrap();
        s
    }

    fn black_at(s: &EditSession, x: u32, y: u32) -> bool {
        s.mask().unwrap().get(x, y).unwrap() == BLACK
    }

    #[test]
    fn new_session_is_uninitialized() {
        let s = EditSession::new(Flavor::Mask, EditorConfig::default()).unwrap();
        assert_eq!(s.state(), SessionState::Uninitialized);
        assert!(s.source().is_none());
        assert!(s.mask().is_none());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EditorConfig {
            brush_width: 0.0,
            ..EditorConfig::default()
        };
        assert!(matches!(
            EditSession::new(Flavor::Mask, config),
            Err(EditorError::InvalidConfig(_))
        ));
    }

    #[test]
    fn load_allocates_white_mask() {
        let s = mask_session();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.image_url(), Some("https://img/source.png"));
        let mask = s.mask().unwrap();
        assert_eq!(mask.dimensions(), Dimensions::new(100, 100));
        assert_eq!(mask.count(WHITE), 100 * 100);
    }

    #[test]
    fn decode_failure_fails_session_and_disables_input() {
        let mut s = EditSession::new(Flavor::Mask, EditorConfig::default()).unwrap();
        assert!(s.load("u", b"definitely not an image").is_err());
        assert_eq!(s.state(), SessionState::Failed);

        s.pointer_down(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(s.state(), SessionState::Failed);
        assert!(matches!(
            s.set_draw_mode(DrawMode::Rectangle),
            Err(EditorError::InvalidState { .. })
        ));

        // A fresh load recovers.
        s.load("u2", &png(4, 4, GRAY)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn fetch_failure_fails_session() {
        let mut s = EditSession::new(Flavor::Overlay, EditorConfig::default()).unwrap();
        s.start_loading("https://img/missing.png").unwrap();
        assert_eq!(s.state(), SessionState::Loading);
        assert!(s.start_loading("again").is_err());
        s.fail_loading("404").unwrap();
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[test]
    fn display_points_map_to_buffer() {
        let mut s = mask_session();
        s.set_display_size(DisplaySize::new(50.0, 25.0)).unwrap();
        assert_eq!(s.map_display_point(Point::new(25.0, 5.0)), Point::new(50.0, 20.0));
        assert!(
            EditSession::new(Flavor::Mask, EditorConfig::default())
                .unwrap()
                .set_display_size(DisplaySize::new(10.0, 10.0))
                .is_err()
        );
    }

    #[test]
    fn brush_stroke_round_trip() {
        let mut s = mask_session();
        s.pointer_down(Point::new(10.0, 10.0)).unwrap();
        assert_eq!(s.state(), SessionState::Interacting);
        s.pointer_move(Point::new(30.0, 10.0)).unwrap();
        s.pointer_up(Point::new(30.0, 10.0)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(black_at(&s, 20, 10));
        assert!(!black_at(&s, 20, 40));
    }

    #[test]
    fn click_without_move_paints_nothing() {
        let mut s = mask_session();
        s.pointer_down(Point::new(50.0, 50.0)).unwrap();
        s.pointer_up(Point::new(50.0, 50.0)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.mask().unwrap().count(WHITE), 100 * 100);

        // Releasing elsewhere still extends the stroke to the release point.
        s.pointer_down(Point::new(10.0, 10.0)).unwrap();
        s.pointer_up(Point::new(40.0, 10.0)).unwrap();
        assert!(black_at(&s, 25, 10));
    }

    #[test]
    fn rectangle_preview_does_not_accumulate() {
        let mut s = mask_session();
        s.set_draw_mode(DrawMode::Rectangle).unwrap();
        s.pointer_down(Point::new(10.0, 10.0)).unwrap();
        s.pointer_move(Point::new(80.0, 80.0)).unwrap();
        s.pointer_move(Point::new(20.0, 20.0)).unwrap();
        s.pointer_up(Point::new(20.0, 20.0)).unwrap();
        assert!(black_at(&s, 15, 15));
        assert!(!black_at(&s, 50, 50));
    }

    #[test]
    fn pointer_leave_commits_stroke() {
        let mut s = mask_session();
        s.set_draw_mode(DrawMode::Rectangle).unwrap();
        s.pointer_down(Point::new(0.0, 0.0)).unwrap();
        s.pointer_move(Point::new(10.0, 10.0)).unwrap();
        s.pointer_leave();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(black_at(&s, 5, 5));
    }

    #[test]
    fn mode_switch_rejected_while_interacting() {
        let mut s = mask_session();
        s.pointer_down(Point::new(5.0, 5.0)).unwrap();
        let err = s.set_draw_mode(DrawMode::Rectangle).unwrap_err();
        assert!(matches!(
            err,
            EditorError::InvalidState {
                state: SessionState::Interacting,
                ..
            }
        ));
        assert_eq!(s.draw_mode(), DrawMode::Brush);
    }

    #[test]
    fn magic_wand_selects_synchronously() {
        let mut s = mask_session();
        s.set_draw_mode(DrawMode::MagicWand(Tolerance::new(1).unwrap()))
            .unwrap();
        s.pointer_down(Point::new(50.5, 50.5)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.mask().unwrap().count(BLACK), 100 * 100);
    }

    #[test]
    fn magic_wand_outside_canvas_is_ignored() {
        let mut s = mask_session();
        s.set_draw_mode(DrawMode::MagicWand(Tolerance::MAX)).unwrap();
        s.pointer_down(Point::new(-1.0, 50.0)).unwrap();
        s.pointer_down(Point::new(100.0, 50.0)).unwrap();
        assert_eq!(s.mask().unwrap().count(BLACK), 0);
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn chunked_magic_wand_reports_busy_until_done() {
        let config = EditorConfig {
            fill_chunk_pixels: Some(100),
            ..EditorConfig::default()
        };
        let mut s = EditSession::new(Flavor::Mask, config).unwrap();
        s.load("u", &png(30, 30, GRAY)).unwrap();
        s.set_draw_mode(DrawMode::MagicWand(Tolerance::new(0).unwrap()))
            .unwrap();
        assert!(s.advance_selection().is_err());

        s.pointer_down(Point::new(3.0, 3.0)).unwrap();
        assert!(s.is_selecting());
        assert_eq!(s.state(), SessionState::Interacting);
        assert!(matches!(
            s.pointer_down(Point::new(4.0, 4.0)),
            Err(EditorError::Busy)
        ));
        assert!(matches!(
            s.pointer_move(Point::new(4.0, 4.0)),
            Err(EditorError::Busy)
        ));
        s.pointer_up(Point::new(3.0, 3.0)).unwrap();
        s.pointer_leave();
        assert!(s.is_selecting());
        assert!(matches!(s.begin_finalize("x"), Err(EditorError::Busy)));

        let mut steps = 0;
        let status = loop {
            steps += 1;
            let status = s.advance_selection().unwrap();
            if status.is_complete() {
                break status;
            }
        };
        assert!(steps >= 9);
        assert_eq!(status.selected(), 900);
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.mask().unwrap().count(BLACK), 900);
    }

    #[test]
    fn clear_mask_resets_everything() {
        let mut s = mask_session();
        s.pointer_down(Point::new(10.0, 10.0)).unwrap();
        s.pointer_up(Point::new(90.0, 90.0)).unwrap();
        assert!(s.mask().unwrap().count(BLACK) > 0);
        s.clear_mask().unwrap();
        assert_eq!(s.mask().unwrap().count(WHITE), 100 * 100);
    }

    #[test]
    fn flavor_specific_operations_are_rejected() {
        let mut mask = mask_session();
        assert!(matches!(
            mask.set_overlay_mode(OverlayMode::Filter),
            Err(EditorError::WrongFlavor { .. })
        ));
        assert!(matches!(
            mask.add_overlay(PixelBuffer::new(2, 2, WHITE).unwrap(), Placement::Fit),
            Err(EditorError::WrongFlavor { .. })
        ));
        assert!(mask.finalize_composite().is_err());

        let mut overlay = overlay_session();
        assert!(matches!(
            overlay.set_draw_mode(DrawMode::Rectangle),
            Err(EditorError::WrongFlavor { .. })
        ));
        assert!(matches!(overlay.clear_mask(), Err(EditorError::WrongFlavor { .. })));
        assert!(matches!(overlay.export_mask(), Err(EditorError::WrongFlavor { .. })));
    }

    #[test]
    fn export_mask_is_png_of_source_size() {
        let s = mask_session();
        let bytes = s.export_mask().unwrap();
        let decoded = PixelBuffer::decode(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), Dimensions::new(100, 100));
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn finalize_failure_keeps_mask_for_retry() {
        let mut s = mask_session();
        s.pointer_down(Point::new(10.0, 10.0)).unwrap();
        s.pointer_up(Point::new(40.0, 10.0)).unwrap();
        let before = s.mask().unwrap().clone();

        let ticket = s.begin_finalize("a red balloon").unwrap();
        assert_eq!(s.state(), SessionState::Finalizing);
        assert_eq!(ticket.request().image_url, "https://img/source.png");
        assert_eq!(ticket.request().prompt, "a red balloon");

        let err = s
            .complete_finalize(ticket, Err(GenerationError::Network("offline".into())))
            .unwrap_err();
        assert!(matches!(err, EditorError::Generation(GenerationError::Network(_))));
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.mask().unwrap(), &before);

        let ticket = s.begin_finalize("a red balloon").unwrap();
        let outcome = s
            .complete_finalize(ticket, Ok("https://img/edited.png".into()))
            .unwrap();
        assert_eq!(
            outcome,
            FinalizeOutcome::Edited {
                url: "https://img/edited.png".into()
            }
        );
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.mask().is_none());
        assert!(s.source().is_none());
    }

    #[test]
    fn blank_prompt_is_rejected() {
        let mut s = mask_session();
        assert!(matches!(s.begin_finalize("   "), Err(EditorError::EmptyPrompt)));
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn result_after_close_is_discarded() {
        let mut s = mask_session();
        let ticket = s.begin_finalize("sky").unwrap();
        s.close();
        assert_eq!(s.state(), SessionState::Closed);
        let outcome = s
            .complete_finalize(ticket, Ok("https://img/late.png".into()))
            .unwrap();
        assert_eq!(outcome, FinalizeOutcome::Discarded);
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn closed_session_ignores_input() {
        let mut s = mask_session();
        s.close();
        s.close();
        s.pointer_down(Point::new(1.0, 1.0)).unwrap();
        assert!(s.clear_mask().is_err());
        assert!(s.start_loading("u").is_err());
    }

    #[test]
    fn overlay_pointer_transforms() {
        let mut s = overlay_session();
        let id = s
            .add_overlay(
                PixelBuffer::new(40, 40, BLACK).unwrap(),
                Placement::At {
                    position: Point::new(50.0, 50.0),
                    scale: 1.0,
                },
            )
            .unwrap();

        // Drag from the middle.
        s.pointer_down(Point::new(70.0, 70.0)).unwrap();
        assert_eq!(s.state(), SessionState::Interacting);
        s.pointer_move(Point::new(80.0, 75.0)).unwrap();
        s.pointer_up(Point::new(80.0, 75.0)).unwrap();
        let overlay = s.overlays().unwrap().get(id).unwrap();
        assert_eq!(overlay.position(), Point::new(60.0, 55.0));

        // Resize from the bottom-right zone; box is now 60..100 x 55..95.
        s.pointer_down(Point::new(95.0, 90.0)).unwrap();
        s.pointer_move(Point::new(105.0, 90.0)).unwrap();
        s.pointer_up(Point::new(105.0, 90.0)).unwrap();
        let overlay = s.overlays().unwrap().get(id).unwrap();
        assert!((overlay.scale() - 1.1).abs() < 1e-9);

        // Rotate from the top-left zone toward straight below the center.
        s.pointer_down(Point::new(62.0, 57.0)).unwrap();
        let center = s.overlays().unwrap().get(id).unwrap().center();
        s.pointer_up(Point::new(center.x, center.y + 50.0)).unwrap();
        let overlay = s.overlays().unwrap().get(id).unwrap();
        assert!((overlay.rotation() - 90.0).abs() < 1e-9);
        assert_eq!(s.state(), SessionState::Ready);
    }

    #[test]
    fn clicking_empty_canvas_deselects() {
        let mut s = overlay_session();
        s.add_overlay(PixelBuffer::new(10, 10, BLACK).unwrap(), Placement::Fit)
            .unwrap();
        assert!(s.overlays().unwrap().selected().is_some());
        s.pointer_down(Point::new(1.0, 1.0)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert!(s.overlays().unwrap().selected().is_none());
    }

    #[test]
    fn leaving_image_mode_deselects_and_ignores_pointer() {
        let mut s = overlay_session();
        let id = s
            .add_overlay(PixelBuffer::new(10, 10, BLACK).unwrap(), Placement::Fit)
            .unwrap();
        s.set_overlay_mode(OverlayMode::Text).unwrap();
        assert!(s.overlays().unwrap().selected().is_none());
        let before = s.overlays().unwrap().get(id).unwrap().position();
        s.pointer_down(Point::new(100.0, 100.0)).unwrap();
        s.pointer_move(Point::new(150.0, 150.0)).unwrap();
        assert_eq!(s.state(), SessionState::Ready);
        assert_eq!(s.overlays().unwrap().get(id).unwrap().position(), before);
    }

    #[test]
    fn grayscale_filter_needs_filter_mode() {
        let mut s = EditSession::new(Flavor::Overlay, EditorConfig::default()).unwrap();
        s.load("u", &png(4, 4, Rgba([30, 60, 90, 255]))).unwrap();
        assert!(matches!(
            s.apply_filter(Filter::Grayscale),
            Err(EditorError::InvalidState { .. })
        ));
        s.set_overlay_mode(OverlayMode::Filter).unwrap();
        s.apply_filter(Filter::Grayscale).unwrap();
        assert_eq!(s.source().unwrap().get(0, 0).unwrap(), Rgba([60, 60, 60, 255]));
    }

    #[test]
    fn remove_overlay_updates_collection() {
        let mut s = overlay_session();
        let id = s
            .add_overlay(PixelBuffer::new(10, 10, BLACK).unwrap(), Placement::Fit)
            .unwrap();
        s.remove_overlay(id).unwrap();
        assert!(s.overlays().unwrap().is_empty());
        assert!(matches!(
            s.remove_overlay(id),
            Err(EditorError::UnknownOverlay(_))
        ));
    }

    #[test]
    fn finalize_composite_encodes_and_closes() {
        let mut s = overlay_session();
        s.add_overlay(
            PixelBuffer::new(20, 20, BLACK).unwrap(),
            Placement::At {
                position: Point::new(0.0, 0.0),
                scale: 1.0,
            },
        )
        .unwrap();
        let preview = s.composite_preview().unwrap();
        assert_eq!(preview.get(5, 5).unwrap(), BLACK);
        assert_eq!(preview.get(150, 150).unwrap(), WHITE);
        assert_eq!(s.state(), SessionState::Ready);

        let encoded = s.finalize_composite().unwrap();
        assert_eq!(encoded.dimensions, Dimensions::new(200, 200));
        assert_eq!(encoded.mime_type(), "image/webp");
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.overlays().is_none());
    }
}
