//! Collaborator services reached over HTTP.
//!
//! Two independent services take part in a session:
//!
//! ```text
//! conversion backend  projects · set-project · upload · images · export-lines
//! OCR service         process · process-status · download-excel
//! ```
//!
//! [`Backend`] is the seam between the session controller and those
//! services. [`http::HttpBackend`] talks to the real services; tests plug in
//! a scripted implementation.
//!
//! Every call is fire-and-await: one request, no retry. A failed call comes
//! back as [`CutlineError::Network`] and the caller decides what to tell the
//! user.

pub mod http;
pub mod types;

pub use http::HttpBackend;
pub use types::{
    filename_from_disposition, ExportRequest, ExportResponse, JobStatus, ProcessRequest,
    ProjectDetail, ProjectEntry, ResultFile, StatusReply, StatusResponse, UploadResponse,
};

use crate::error::CutlineError;
use async_trait::async_trait;

/// The calls a session makes against its collaborators.
#[async_trait]
pub trait Backend: Send + Sync {
    /// `GET /api/projects` — project names, most recent first.
    async fn list_projects(&self) -> Result<Vec<String>, CutlineError>;

    /// `POST /api/set-project/{name}` — images and saved lines of a project.
    async fn set_project(&self, name: &str) -> Result<ProjectDetail, CutlineError>;

    /// `POST /api/upload` — multipart PDF upload.
    async fn upload_pdf(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, CutlineError>;

    /// `POST /api/export-lines`.
    async fn export_lines(&self, request: &ExportRequest<'_>) -> Result<ExportResponse, CutlineError>;

    /// `GET /api/images/{filename}` — raw image bytes.
    async fn fetch_image(&self, image: &str) -> Result<Vec<u8>, CutlineError>;

    /// `POST /api/process` — start the OCR job.
    async fn start_job(&self, request: &ProcessRequest<'_>) -> Result<(), CutlineError>;

    /// `GET /api/process-status/{project}`.
    async fn job_status(&self, project: &str) -> Result<StatusReply, CutlineError>;

    /// `GET /api/download-excel/{project}`.
    async fn download_result(&self, project: &str) -> Result<ResultFile, CutlineError>;
}
