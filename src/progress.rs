//! Progress-callback trait for OCR job events.
//!
//! Pass a [`JobProgressCallback`] (or a [`ProgressCallback`] handle) to
//! [`crate::session::Session::process`] to receive events while the OCR job
//! runs: job accepted, every status poll, the downloaded result, or the
//! failure. The CLI turns these into a progress bar; tests count them.
//!
//! # Example
//!
//! ```rust
//! use cutlines::{JobProgressCallback, JobStatus};
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! struct CountingCallback {
//!     polls: AtomicU32,
//! }
//!
//! impl JobProgressCallback for CountingCallback {
//!     fn on_poll(&self, attempt: u32, _max: u32, status: &JobStatus, _progress: Option<&str>) {
//!         self.polls.store(attempt, Ordering::SeqCst);
//!         eprintln!("poll {attempt}: {status}");
//!     }
//! }
//! ```

use crate::service::JobStatus;
use std::path::Path;
use std::sync::Arc;

/// Called by the session while an OCR job is running.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait JobProgressCallback: Send + Sync {
    /// Called once the OCR service accepted the job.
    fn on_job_start(&self, project: &str) {
        let _ = project;
    }

    /// Called after every status poll that returned a status.
    ///
    /// # Arguments
    /// * `attempt`      — 1-indexed poll number
    /// * `max_attempts` — configured attempt cap
    /// * `status`       — status reported by the service
    /// * `progress`     — free-form progress text such as `"3/12"`, when present
    fn on_poll(&self, attempt: u32, max_attempts: u32, status: &JobStatus, progress: Option<&str>) {
        let _ = (attempt, max_attempts, status, progress);
    }

    /// Called when the result file has been saved.
    ///
    /// # Arguments
    /// * `path`  — where the file was written
    /// * `bytes` — size of the file
    fn on_download(&self, path: &Path, bytes: usize) {
        let _ = (path, bytes);
    }

    /// Called when the job ends without a result (failure, timeout, cancel).
    fn on_job_error(&self, project: &str, error: &str) {
        let _ = (project, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl JobProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type the session accepts.
pub type ProgressCallback = Arc<dyn JobProgressCallback>;

/// Rough completion percentage for a status, matching the stages the
/// progress bar moves through: accepted, processing, completed, saved.
pub fn stage_percent(status: &JobStatus) -> u8 {
    match status {
        JobStatus::Pending | JobStatus::Unknown => 25,
        JobStatus::Processing => 50,
        JobStatus::Completed => 90,
        JobStatus::Error => 0,
    }
}

/// Parse a `"done/total"` progress string into a fraction in `0.0..=1.0`.
pub fn parse_fraction(progress: &str) -> Option<f64> {
    let (done, total) = progress.split_once('/')?;
    let done: f64 = done.trim().parse().ok()?;
    let total: f64 = total.trim().parse().ok()?;
    if total <= 0.0 {
        return None;
    }
    Some((done / total).clamp(0.0, 1.0))
}
