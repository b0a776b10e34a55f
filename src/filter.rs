//! Visible-image filtering: exact lookup by name/number, or a numeric range.
//!
//! The filter never touches the project's image list; it only derives the
//! visible subset. At most one filter is active at a time and switching from
//! one kind to the other needs the user's confirmation. A declined
//! confirmation, a rejected input or an empty result leave everything as it
//! was.

use crate::error::CutlineError;
use crate::interaction::Interaction;
use crate::store::ImageId;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_IMAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"img_(\d+)\.jpg").unwrap());

/// Format a page number as a canonical image id: `5` → `img_005.jpg`.
pub fn canonical_name(number: u64) -> ImageId {
    format!("img_{number:03}.jpg")
}

/// Normalise user input to an image id.
///
/// Canonical names pass through, integers become `img_NNN.jpg`, anything
/// else is returned unchanged (and will usually not match).
pub fn normalize_image_name(input: &str) -> ImageId {
    let input = input.trim();
    if input.starts_with("img_") && input.ends_with(".jpg") {
        return input.to_string();
    }
    match input.parse::<u64>() {
        Ok(n) => canonical_name(n),
        Err(_) => input.to_string(),
    }
}

/// The page number embedded in an image id, if it follows the naming pattern.
pub fn image_number(image: &str) -> Option<i64> {
    RE_IMAGE_NUMBER
        .captures(image)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Which filter is active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterState {
    #[default]
    None,
    SingleMatch(ImageId),
    Range { from: i64, to: i64 },
}

impl FilterState {
    pub fn is_active(&self) -> bool {
        !matches!(self, FilterState::None)
    }
}

/// Result of a filter request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterChange {
    /// The visible set changed; it now holds `visible` images.
    Applied { visible: usize },
    /// The user declined the confirmation; nothing changed.
    Declined,
    /// Clear was requested with no active filter.
    NothingToClear,
}

/// Full image list plus the derived visible subset.
#[derive(Debug, Clone, Default)]
pub struct ImageFilter {
    all: Vec<ImageId>,
    visible: Vec<ImageId>,
    state: FilterState,
}

impl ImageFilter {
    pub fn new(images: Vec<ImageId>) -> Self {
        Self {
            visible: images.clone(),
            all: images,
            state: FilterState::None,
        }
    }

    pub fn all(&self) -> &[ImageId] {
        &self.all
    }

    pub fn visible(&self) -> &[ImageId] {
        &self.visible
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    /// Show only the image matching `input` (`5`, `005` or `img_005.jpg`).
    ///
    /// # Errors
    /// * [`CutlineError::Validation`] — empty input
    /// * [`CutlineError::NotFound`] — no image has that name
    pub fn search(&mut self, input: &str, ui: &mut dyn Interaction) -> Result<FilterChange, CutlineError> {
        if input.trim().is_empty() {
            return Err(CutlineError::Validation(
                "Enter an image number or name".into(),
            ));
        }
        if matches!(self.state, FilterState::Range { .. })
            && !ui.confirm("A range filter is active. Discard it and search?")
        {
            return Ok(FilterChange::Declined);
        }

        let target = normalize_image_name(input);
        let Some(found) = self.all.iter().find(|img| **img == target).cloned() else {
            return Err(CutlineError::NotFound(format!("Image not found: {target}")));
        };

        debug!("filter: single match {}", found);
        self.visible = vec![found.clone()];
        self.state = FilterState::SingleMatch(found);
        Ok(FilterChange::Applied { visible: 1 })
    }

    /// Show images whose page number lies in `from..=to`.
    ///
    /// # Errors
    /// * [`CutlineError::Validation`] — missing or non-integer bounds, or `from > to`
    /// * [`CutlineError::NotFound`] — no image in range
    pub fn apply_range(
        &mut self,
        from: &str,
        to: &str,
        ui: &mut dyn Interaction,
    ) -> Result<FilterChange, CutlineError> {
        let (from, to) = parse_range(from, to)?;

        if matches!(self.state, FilterState::SingleMatch(_))
            && !ui.confirm("A search is active. Discard it and apply the range?")
        {
            return Ok(FilterChange::Declined);
        }

        let matched: Vec<ImageId> = self
            .all
            .iter()
            .filter(|img| image_number(img).is_some_and(|n| n >= from && n <= to))
            .cloned()
            .collect();

        if matched.is_empty() {
            return Err(CutlineError::NotFound(format!(
                "No images found in range {from}-{to}"
            )));
        }

        debug!("filter: range {}-{} → {} images", from, to, matched.len());
        let visible = matched.len();
        self.visible = matched;
        self.state = FilterState::Range { from, to };
        Ok(FilterChange::Applied { visible })
    }

    /// Drop the active filter and show every image again, after confirmation.
    pub fn clear(&mut self, ui: &mut dyn Interaction) -> FilterChange {
        if !self.state.is_active() {
            return FilterChange::NothingToClear;
        }
        if !ui.confirm("Clear filters and show all images?") {
            return FilterChange::Declined;
        }
        self.visible = self.all.clone();
        self.state = FilterState::None;
        FilterChange::Applied {
            visible: self.visible.len(),
        }
    }
}

fn parse_range(from: &str, to: &str) -> Result<(i64, i64), CutlineError> {
    let (from, to) = (from.trim(), to.trim());
    if from.is_empty() || to.is_empty() {
        return Err(CutlineError::Validation(
            "Enter both ends of the range".into(),
        ));
    }
    let (Ok(from), Ok(to)) = (from.parse::<i64>(), to.parse::<i64>()) else {
        return Err(CutlineError::Validation("Enter valid numbers".into()));
    };
    if from > to {
        return Err(CutlineError::Validation(format!(
            "Range start must not be greater than range end ({from} > {to})"
        )));
    }
    Ok((from, to))
}
