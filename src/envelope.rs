//! Export envelope: the on-disk form of a project's lines.
//!
//! Saved lines reach us in one of two shapes:
//!
//! ```text
//! bare      {"img_001.jpg": [10, 20], "img_002.jpg": []}
//! envelope  {"lines": {"img_001.jpg": [10, 20]}, "line_gap": 6.5,
//!            "exported_at": "2026-10-18T09:12:00Z", "total_lines": 2}
//! ```
//!
//! [`SavedLines`] accepts either and [`SavedLines::into_lines`] unwraps it.
//! The envelope is recognised by its `lines` object; the metadata fields are
//! optional because older exports omit them. `exported_at` is written as
//! RFC 3339 but read leniently: a naive timestamp such as
//! `2026-10-18T10:00:00.123456` is taken as UTC, anything unparsable is dropped.

use crate::config::DEFAULT_LINE_GAP;
use crate::store::{LineStore, LinesMap};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Wrapped export of a project's lines with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEnvelope {
    pub lines: LinesMap,
    #[serde(default = "default_line_gap")]
    pub line_gap: f64,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_timestamp"
    )]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_lines: Option<usize>,
}

fn default_line_gap() -> f64 {
    DEFAULT_LINE_GAP
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .and_then(parse_timestamp))
}

/// Parse an RFC 3339 timestamp, or a naive ISO 8601 one taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    text.parse::<NaiveDateTime>().ok().map(|naive| naive.and_utc())
}

impl ExportEnvelope {
    /// Snapshot the full mapping of `store`, stamped with the current time.
    pub fn from_store(store: &LineStore, line_gap: f64) -> Self {
        Self {
            lines: store.mapping().clone(),
            line_gap,
            exported_at: Some(Utc::now()),
            total_lines: Some(store.total_lines()),
        }
    }
}

/// Saved lines as returned by the backend: envelope or bare mapping.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SavedLines {
    Envelope(ExportEnvelope),
    Bare(LinesMap),
    /// `null` or a missing field.
    Empty(()),
}

impl Default for SavedLines {
    fn default() -> Self {
        SavedLines::Empty(())
    }
}

impl SavedLines {
    pub fn is_envelope(&self) -> bool {
        matches!(self, SavedLines::Envelope(_))
    }

    /// The image → lines mapping, whatever shape it arrived in.
    pub fn into_lines(self) -> LinesMap {
        match self {
            SavedLines::Envelope(env) => env.lines,
            SavedLines::Bare(map) => map,
            SavedLines::Empty(()) => LinesMap::new(),
        }
    }
}
