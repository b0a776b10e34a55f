//! Wire types for the conversion backend and the OCR service.

use crate::envelope::SavedLines;
use crate::store::{ImageId, LinesMap};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static RE_DISPOSITION_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename="?([^"]+)"?"#).unwrap());

/// One entry of `GET /api/projects`: either a bare name or a record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProjectEntry {
    Name(String),
    Record { name: String },
}

impl ProjectEntry {
    pub fn name(&self) -> &str {
        match self {
            ProjectEntry::Name(n) | ProjectEntry::Record { name: n } => n,
        }
    }
}

/// `GET /api/projects`, most recent first.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectList {
    pub projects: Vec<ProjectEntry>,
}

/// `POST /api/set-project/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectDetail {
    pub project: String,
    pub images: Vec<ImageId>,
    #[serde(default)]
    pub lines: SavedLines,
}

/// `POST /api/upload`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub project: String,
    pub images: Vec<ImageId>,
}

/// Body of `POST /api/export-lines`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRequest<'a> {
    pub lines: &'a LinesMap,
    pub line_gap: f64,
}

/// `POST /api/export-lines`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportResponse {
    #[serde(default)]
    pub total_lines: Option<usize>,
}

/// Body of `POST /api/process`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequest<'a> {
    pub project: &'a str,
    pub json_filename: &'a str,
}

/// Job status reported by the OCR service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
    /// Any other value (`idle`, …); polling continues.
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
            JobStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// `GET /api/process-status/{project}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Outcome of one status request.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReply {
    Status(StatusResponse),
    /// The service answered with a non-success HTTP status; the poll is skipped.
    Unavailable { http_status: u16 },
}

/// `GET /api/download-excel/{project}`.
#[derive(Debug, Clone)]
pub struct ResultFile {
    /// Name from `Content-Disposition`, when the service sent one.
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

/// Extract the file name from a `Content-Disposition` header value.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    RE_DISPOSITION_FILENAME
        .captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}
