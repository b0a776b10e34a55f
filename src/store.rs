//! In-memory line store: which vertical markers sit on which page image.
//!
//! One [`LineStore`] lives for one active project. It is owned by the
//! [`crate::session::Session`] and replaced wholesale when another project is
//! activated or a new PDF is uploaded. There is no global instance.
//!
//! Each image maps to its marker x-offsets **in insertion order**. Display
//! order is by x (see [`LineStore::markers`]), but "remove last" always pops
//! the most recently added marker, wherever it sits on the page.

use crate::error::CutlineError;
use std::collections::BTreeMap;
use tracing::debug;

/// Page image identifier, canonically `img_NNN.jpg`.
pub type ImageId = String;

/// Mapping from image to its marker x-offsets (image pixel space).
pub type LinesMap = BTreeMap<ImageId, Vec<f64>>;

/// Marker state for one project session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineStore {
    lines: LinesMap,
    /// Working set that replication fans out over (the visible images).
    images: Vec<ImageId>,
}

impl LineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a saved mapping and a working set.
    pub fn with_lines(lines: LinesMap, images: Vec<ImageId>) -> Self {
        Self { lines, images }
    }

    // ── Reads ─────────────────────────────────────────────────────────────

    /// Markers of `image` in insertion order. Unknown images read as empty.
    pub fn lines(&self, image: &str) -> &[f64] {
        self.lines.get(image).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Markers of `image` sorted by x, ready to draw.
    pub fn markers(&self, image: &str) -> Vec<f64> {
        let mut xs = self.lines(image).to_vec();
        xs.sort_by(f64::total_cmp);
        xs
    }

    pub fn line_count(&self, image: &str) -> usize {
        self.lines(image).len()
    }

    /// Total number of markers across every image.
    pub fn total_lines(&self) -> usize {
        self.lines.values().map(Vec::len).sum()
    }

    /// The full mapping, including images outside the current working set.
    pub fn mapping(&self) -> &LinesMap {
        &self.lines
    }

    pub fn images(&self) -> &[ImageId] {
        &self.images
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Append a marker at `x`.
    pub fn add_line(&mut self, image: &str, x: f64) {
        debug!("add_line {} x={:.1}", image, x);
        self.lines.entry(image.to_string()).or_default().push(x);
    }

    /// Remove the most recently added marker. Returns it, or `None` when empty.
    pub fn remove_line(&mut self, image: &str) -> Option<f64> {
        let removed = self.lines.get_mut(image).and_then(Vec::pop);
        if let Some(x) = removed {
            debug!("remove_line {} x={:.1}", image, x);
        }
        removed
    }

    /// Move marker `index` of `image` to `x`.
    ///
    /// # Errors
    /// [`CutlineError::LineIndexOutOfRange`] when no marker has that index;
    /// the store is left untouched.
    pub fn update_line(&mut self, image: &str, index: usize, x: f64) -> Result<(), CutlineError> {
        let len = self.line_count(image);
        match self.lines.get_mut(image).and_then(|v| v.get_mut(index)) {
            Some(slot) => {
                *slot = x;
                Ok(())
            }
            None => Err(CutlineError::LineIndexOutOfRange {
                image: image.to_string(),
                index,
                len,
            }),
        }
    }

    /// Copy the markers of `source` onto every other image of the working set.
    ///
    /// With `only_empty` the copy lands only on images that have no markers
    /// yet. A source without markers changes nothing. Returns how many images
    /// received a copy.
    pub fn replicate_lines(&mut self, source: &str, only_empty: bool) -> usize {
        let source_lines = self.lines(source).to_vec();
        if source_lines.is_empty() {
            return 0;
        }

        let mut touched = 0;
        for image in &self.images {
            if image == source {
                continue;
            }
            let target = self.lines.entry(image.clone()).or_default();
            if only_empty && !target.is_empty() {
                continue;
            }
            *target = source_lines.clone();
            touched += 1;
        }
        debug!(
            "replicate_lines from {} (only_empty={}) → {} images",
            source, only_empty, touched
        );
        touched
    }

    /// Replace the whole mapping.
    pub fn load_lines(&mut self, lines: LinesMap) {
        self.lines = lines;
    }

    /// Replace the working set.
    pub fn set_images(&mut self, images: Vec<ImageId>) {
        self.images = images;
    }
}
