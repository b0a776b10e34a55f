//! Per-image annotation surface: pointer events in, store mutations out.
//!
//! Each visible page image gets one [`AnnotationSurface`]. It holds only the
//! drag state and the redraw bookkeeping; markers themselves live in the
//! [`LineStore`] so that replication and export see every edit.
//!
//! ```text
//!            pointer_down near a marker
//!   Idle ─────────────────────────────────▶ Dragging { index }
//!    ▲  click ⇒ add_line                       │ pointer_move ⇒ update_line(index, x)
//!    └──────────── pointer_up / pointer_leave ─┘
//! ```
//!
//! Drag positions are not clamped: a marker dragged past the image edge keeps
//! a negative or larger-than-width x, exactly as the pointer reported it.

use crate::config::DEFAULT_HIT_TOLERANCE_PX;
use crate::error::CutlineError;
use crate::interaction::Interaction;
use crate::store::{ImageId, LineStore};
use tracing::debug;

/// A pointer position as reported by the host, plus where the image starts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    /// Horizontal pointer position in host coordinates.
    pub client_x: f64,
    /// Left edge of the image in the same coordinates.
    pub surface_left: f64,
}

impl PointerEvent {
    pub fn new(client_x: f64, surface_left: f64) -> Self {
        Self {
            client_x,
            surface_left,
        }
    }

    /// Pointer x relative to the image's left edge.
    pub fn image_x(&self) -> f64 {
        self.client_x - self.surface_left
    }
}

/// Interaction state of one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    /// A marker is grabbed; `index` is its position in the store sequence.
    Dragging { index: usize },
}

/// What a redraw must paint: the image and its marker x positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: ImageId,
    pub markers: Vec<f64>,
}

/// Interactive overlay for one page image.
#[derive(Debug, Clone)]
pub struct AnnotationSurface {
    image: ImageId,
    state: DragState,
    tolerance: f64,
    loaded: bool,
    /// Sequence as of the last redraw; `None` forces the next redraw.
    drawn: Option<Vec<f64>>,
}

impl AnnotationSurface {
    pub fn new(image: impl Into<ImageId>) -> Self {
        Self::with_tolerance(image, DEFAULT_HIT_TOLERANCE_PX)
    }

    pub fn with_tolerance(image: impl Into<ImageId>, tolerance: f64) -> Self {
        Self {
            image: image.into(),
            state: DragState::Idle,
            tolerance,
            loaded: false,
            drawn: None,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    // ── Pointer events ────────────────────────────────────────────────────

    /// Grab the first marker within tolerance of the pointer, if any.
    ///
    /// Returns the grabbed index.
    pub fn pointer_down(&mut self, store: &LineStore, event: PointerEvent) -> Option<usize> {
        let x = event.image_x();
        let hit = store
            .lines(&self.image)
            .iter()
            .position(|&line_x| (line_x - x).abs() < self.tolerance);
        if let Some(index) = hit {
            debug!("{}: grabbed marker {} at x={:.1}", self.image, index, x);
            self.state = DragState::Dragging { index };
        }
        hit
    }

    /// Move the grabbed marker to the pointer. No-op while idle.
    pub fn pointer_move(&mut self, store: &mut LineStore, event: PointerEvent) -> Result<(), CutlineError> {
        let DragState::Dragging { index } = self.state else {
            return Ok(());
        };
        store.update_line(&self.image, index, event.image_x())
    }

    /// Release the grabbed marker.
    pub fn pointer_up(&mut self) {
        self.state = DragState::Idle;
    }

    /// Pointer left the surface; same as a release.
    pub fn pointer_leave(&mut self) {
        self.pointer_up();
    }

    /// Add a marker at the pointer. Ignored while a drag is held.
    ///
    /// Returns `true` when a marker was added.
    pub fn click(&mut self, store: &mut LineStore, event: PointerEvent) -> bool {
        if self.is_dragging() {
            return false;
        }
        store.add_line(&self.image, event.image_x());
        true
    }

    // ── Actions ───────────────────────────────────────────────────────────

    /// "Remove last" button. Disabled (returns `None`) when there are no markers.
    pub fn remove_last(&mut self, store: &mut LineStore) -> Option<f64> {
        if !self.can_edit(store) {
            return None;
        }
        store.remove_line(&self.image)
    }

    /// "Replicate" button: ask for a mode, then copy this image's markers.
    ///
    /// Disabled when there are no markers. Returns how many images received a copy.
    pub fn replicate(&mut self, store: &mut LineStore, ui: &mut dyn Interaction) -> usize {
        if !self.can_edit(store) {
            return 0;
        }
        match ui.choose_replicate_mode() {
            Some(mode) => store.replicate_lines(&self.image, mode.only_empty()),
            None => 0,
        }
    }

    /// Whether the per-image buttons are enabled.
    pub fn can_edit(&self, store: &LineStore) -> bool {
        store.line_count(&self.image) > 0
    }

    // ── Redraw policy ─────────────────────────────────────────────────────

    /// The underlying image finished loading; the next frame must be drawn.
    pub fn mark_loaded(&mut self) {
        self.loaded = true;
        self.drawn = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Return a frame to paint if the image is loaded and its markers changed
    /// since the last paint. The caller clears the overlay and draws every
    /// marker of the frame at full image height.
    pub fn take_redraw(&mut self, store: &LineStore) -> Option<Frame> {
        if !self.loaded {
            return None;
        }
        let current = store.lines(&self.image);
        if self.drawn.as_deref() == Some(current) {
            return None;
        }
        self.drawn = Some(current.to_vec());
        Some(Frame {
            image: self.image.clone(),
            markers: current.to_vec(),
        })
    }
}
