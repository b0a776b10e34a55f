//! Error types for the cutlines library.
//!
//! Every failure is local to the action that triggered it. The session stays
//! usable after any [`CutlineError`] and the user may simply retry:
//!
//! * **Collaborator failures** — [`CutlineError::Network`] and
//!   [`CutlineError::Decode`] come from the conversion backend or the OCR
//!   service. They are surfaced as-is; nothing is retried.
//!
//! * **User input failures** — [`CutlineError::Validation`] and
//!   [`CutlineError::NotFound`] come from the filter and session layers and
//!   never change any state.
//!
//! * **OCR job outcomes** — [`CutlineError::JobFailed`],
//!   [`CutlineError::JobTimeout`] and [`CutlineError::Cancelled`] are kept
//!   apart so callers can tell "the service said no" from "we gave up waiting".

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the cutlines library.
#[derive(Debug, Error)]
pub enum CutlineError {
    // ── Collaborator errors ───────────────────────────────────────────────
    /// Request could not be sent, or the service answered with a non-success status.
    #[error("Request to '{endpoint}' failed: {reason}\nCheck that the service is running.")]
    Network { endpoint: String, reason: String },

    /// The service answered but the body was not in the expected shape.
    #[error("Unexpected response from '{endpoint}': {reason}")]
    Decode { endpoint: String, reason: String },

    // ── User input errors ─────────────────────────────────────────────────
    /// Bad input to a filter or search request.
    #[error("{0}")]
    Validation(String),

    /// No active project, no matching image, or nothing in range.
    #[error("{0}")]
    NotFound(String),

    // ── OCR job errors ────────────────────────────────────────────────────
    /// The OCR service reported `error` for the job.
    #[error("Processing failed for project '{project}': {message}")]
    JobFailed { project: String, message: String },

    /// Polling reached the attempt cap without a terminal status.
    #[error("Timeout: processing of '{project}' did not finish after {attempts} status checks")]
    JobTimeout { project: String, attempts: u32 },

    /// Polling was cancelled by the caller.
    #[error("Processing of '{project}' was cancelled")]
    Cancelled { project: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// `update_line` received an index that no line occupies.
    #[error("Line index {index} is out of range for '{image}' ({len} lines)")]
    LineIndexOutOfRange {
        image: String,
        index: usize,
        len: usize,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read a local input file.
    #[error("Failed to read '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A page image could not be decoded or encoded.
    #[error("Image error: {0}")]
    Image(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CutlineError {
    /// `true` for failures the user caused and can fix by changing input.
    pub fn is_user_error(&self) -> bool {
        matches!(self, CutlineError::Validation(_) | CutlineError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_timeout_display() {
        let e = CutlineError::JobTimeout {
            project: "proyecto_1".into(),
            attempts: 180,
        };
        let msg = e.to_string();
        assert!(msg.contains("180"), "got: {msg}");
        assert!(msg.starts_with("Timeout"));
    }

    #[test]
    fn job_failed_carries_service_message() {
        let e = CutlineError::JobFailed {
            project: "p".into(),
            message: "No se procesó ninguna imagen".into(),
        };
        assert!(e.to_string().contains("No se procesó ninguna imagen"));
    }

    #[test]
    fn index_out_of_range_display() {
        let e = CutlineError::LineIndexOutOfRange {
            image: "img_001.jpg".into(),
            index: 4,
            len: 2,
        };
        let msg = e.to_string();
        assert!(msg.contains("img_001.jpg"));
        assert!(msg.contains("2 lines"));
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(CutlineError::Validation("x".into()).is_user_error());
        assert!(CutlineError::NotFound("x".into()).is_user_error());
        assert!(!CutlineError::Cancelled { project: "p".into() }.is_user_error());
    }
}
