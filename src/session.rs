//! Project session controller.
//!
//! A [`Session`] owns everything that belongs to the active project: the
//! [`LineStore`], the [`ImageFilter`], one [`AnnotationSurface`] per visible
//! image, and the project name. It sequences the collaborator calls:
//!
//! ```text
//! start ──▶ list projects ──▶ activate most recent
//! upload ─▶ conversion backend ──▶ fresh store
//! export ─▶ export-lines (full mapping + line_gap)
//! process ▶ start job ──▶ poll status ──▶ download result ──▶ file on disk
//! ```
//!
//! Every step fetches and validates first and mutates last, so a failed call
//! leaves the session exactly as it was.

use crate::config::SessionConfig;
use crate::envelope::ExportEnvelope;
use crate::error::CutlineError;
use crate::filter::{FilterChange, FilterState, ImageFilter};
use crate::interaction::Interaction;
use crate::poll::{poll_job, CancelToken, JobOutcome, PollPolicy};
use crate::progress::JobProgressCallback;
use crate::render;
use crate::service::{Backend, ExportRequest, ProcessRequest};
use crate::store::{ImageId, LineStore, LinesMap};
use crate::surface::{AnnotationSurface, Frame};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary of the project a session currently works on.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSummary {
    pub project: String,
    pub images: usize,
    pub lines: usize,
}

/// A result file saved by [`Session::process`].
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedResult {
    pub path: PathBuf,
    pub bytes: usize,
    /// Number of status polls it took.
    pub attempts: u32,
}

/// State and orchestration for one active project.
pub struct Session<B: Backend> {
    backend: B,
    config: SessionConfig,
    project: Option<String>,
    store: LineStore,
    filter: ImageFilter,
    surfaces: HashMap<ImageId, AnnotationSurface>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            project: None,
            store: LineStore::new(),
            filter: ImageFilter::default(),
            surfaces: HashMap::new(),
        }
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    pub fn store(&self) -> &LineStore {
        &self.store
    }

    /// Mutable store access for hosts that drive edits directly.
    pub fn store_mut(&mut self) -> &mut LineStore {
        &mut self.store
    }

    pub fn filter(&self) -> &ImageFilter {
        &self.filter
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Images currently mounted for editing.
    pub fn visible_images(&self) -> &[ImageId] {
        self.filter.visible()
    }

    pub fn summary(&self) -> Option<ProjectSummary> {
        self.project.as_ref().map(|p| ProjectSummary {
            project: p.clone(),
            images: self.filter.all().len(),
            lines: self.store.total_lines(),
        })
    }

    fn require_project(&self) -> Result<&str, CutlineError> {
        self.project
            .as_deref()
            .ok_or_else(|| CutlineError::NotFound("No active project".into()))
    }

    // ── Project lifecycle ────────────────────────────────────────────────

    /// List projects and activate the most recent one.
    ///
    /// Returns `None` when the backend has no projects yet.
    pub async fn start(&mut self) -> Result<Option<ProjectSummary>, CutlineError> {
        let projects = self.backend.list_projects().await?;
        let Some(latest) = projects.first() else {
            info!("No projects yet; upload a PDF to begin");
            return Ok(None);
        };
        let latest = latest.clone();
        self.activate_project(&latest).await.map(Some)
    }

    /// Load a project's images and saved lines, replacing the current session state.
    pub async fn activate_project(&mut self, name: &str) -> Result<ProjectSummary, CutlineError> {
        let detail = self.backend.set_project(name).await?;
        if detail.lines.is_envelope() {
            debug!("Saved lines for {} arrived as an export envelope", detail.project);
        }
        let lines = detail.lines.into_lines();
        self.replace_project(detail.project, detail.images, lines);
        let summary = self.summary().ok_or_else(|| {
            CutlineError::NotFound(format!("Project '{name}' did not activate"))
        })?;
        info!(
            "Activated {}: {} images, {} lines",
            summary.project, summary.images, summary.lines
        );
        Ok(summary)
    }

    /// Upload a PDF for conversion and start a fresh project from the result.
    pub async fn upload(&mut self, pdf: &Path) -> Result<ProjectSummary, CutlineError> {
        let bytes = tokio::fs::read(pdf)
            .await
            .map_err(|source| CutlineError::FileRead {
                path: pdf.to_path_buf(),
                source,
            })?;
        let filename = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let response = self.backend.upload_pdf(&filename, bytes).await?;
        self.replace_project(response.project, response.images, LinesMap::new());
        let summary = self
            .summary()
            .ok_or_else(|| CutlineError::NotFound("Upload did not create a project".into()))?;
        info!("Uploaded {} → {} ({} images)", filename, summary.project, summary.images);
        Ok(summary)
    }

    fn replace_project(&mut self, project: String, images: Vec<ImageId>, lines: LinesMap) {
        self.store = LineStore::with_lines(lines, images.clone());
        self.filter = ImageFilter::new(images);
        self.surfaces.clear();
        self.project = Some(project);
    }

    // ── Export ────────────────────────────────────────────────────────────

    /// Send every image's lines (not just the visible ones) to the backend.
    ///
    /// Returns the line count the backend reports, or the local count when
    /// the backend does not report one.
    pub async fn export(&self) -> Result<usize, CutlineError> {
        self.require_project()?;
        let request = ExportRequest {
            lines: self.store.mapping(),
            line_gap: self.config.line_gap,
        };
        let response = self.backend.export_lines(&request).await?;
        let total = response.total_lines.unwrap_or_else(|| self.store.total_lines());
        info!("Exported {} lines", total);
        Ok(total)
    }

    /// Snapshot the store as an export envelope.
    pub fn export_envelope(&self) -> ExportEnvelope {
        ExportEnvelope::from_store(&self.store, self.config.line_gap)
    }

    /// Write the export envelope to `path` as pretty JSON.
    pub async fn save_envelope(&self, path: &Path) -> Result<(), CutlineError> {
        let envelope = self.export_envelope();
        let json =
            serde_json::to_vec_pretty(&envelope).map_err(|e| CutlineError::OutputWriteFailed {
                path: path.to_path_buf(),
                source: std::io::Error::other(e),
            })?;
        write_file(path, &json).await
    }

    // ── OCR processing ───────────────────────────────────────────────────

    /// Start the OCR job, poll it to completion, and save the result file.
    ///
    /// # Errors
    /// * [`CutlineError::NotFound`] — no active project
    /// * [`CutlineError::JobFailed`] — the service reported `error`
    /// * [`CutlineError::JobTimeout`] — the attempt cap was reached
    /// * [`CutlineError::Cancelled`] — `cancel` fired
    /// * [`CutlineError::Network`] — any call failed
    pub async fn process(
        &self,
        cancel: &CancelToken,
        progress: &dyn JobProgressCallback,
    ) -> Result<DownloadedResult, CutlineError> {
        let project = self.require_project()?.to_string();
        let result = self.run_job(&project, cancel, progress).await;
        if let Err(ref e) = result {
            progress.on_job_error(&project, &e.to_string());
        }
        result
    }

    async fn run_job(
        &self,
        project: &str,
        cancel: &CancelToken,
        progress: &dyn JobProgressCallback,
    ) -> Result<DownloadedResult, CutlineError> {
        let request = ProcessRequest {
            project,
            json_filename: &self.config.json_filename,
        };
        self.backend.start_job(&request).await?;
        progress.on_job_start(project);

        let policy = PollPolicy {
            interval: self.config.poll_interval(),
            max_attempts: self.config.max_poll_attempts,
        };
        let backend = &self.backend;
        let outcome = poll_job(project, policy, cancel, progress, |_| {
            backend.job_status(project)
        })
        .await?;

        let attempts = match outcome {
            JobOutcome::Completed { attempts } => attempts,
            JobOutcome::Failed { reason } => {
                return Err(CutlineError::JobFailed {
                    project: project.to_string(),
                    message: reason,
                })
            }
            JobOutcome::TimedOut { attempts } => {
                return Err(CutlineError::JobTimeout {
                    project: project.to_string(),
                    attempts,
                })
            }
            JobOutcome::Cancelled { .. } => {
                return Err(CutlineError::Cancelled {
                    project: project.to_string(),
                })
            }
        };

        let file = self.backend.download_result(project).await?;
        let name = file
            .filename
            .as_deref()
            .and_then(safe_file_name)
            .unwrap_or_else(|| default_result_name(project));
        let path = self.config.download_dir.join(name);
        write_file(&path, &file.bytes).await?;
        progress.on_download(&path, file.bytes.len());
        info!("Saved result to {}", path.display());

        Ok(DownloadedResult {
            path,
            bytes: file.bytes.len(),
            attempts,
        })
    }

    // ── Images ────────────────────────────────────────────────────────────

    /// Fetch the page image bytes for `image`.
    pub async fn fetch_image(&self, image: &str) -> Result<Vec<u8>, CutlineError> {
        self.require_project()?;
        self.backend.fetch_image(image).await
    }

    /// Fetch a visible `image` and return it as PNG with its markers drawn on top.
    ///
    /// The fetched bytes count as the image load, so the surface paints a
    /// fresh frame.
    pub async fn preview(&mut self, image: &str) -> Result<Vec<u8>, CutlineError> {
        self.surface_mut(image)?;
        let bytes = self.fetch_image(image).await?;
        let frame = self.show_image(image)?;
        render::render_overlay_png(&bytes, &frame.markers)
    }

    // ── Filtering ────────────────────────────────────────────────────────

    /// Show only the image matching `input`.
    pub fn search(&mut self, input: &str, ui: &mut dyn Interaction) -> Result<FilterChange, CutlineError> {
        let change = self.filter.search(input, ui)?;
        self.sync_visible(change);
        Ok(change)
    }

    /// Show only images numbered `from..=to`.
    pub fn apply_range(
        &mut self,
        from: &str,
        to: &str,
        ui: &mut dyn Interaction,
    ) -> Result<FilterChange, CutlineError> {
        let change = self.filter.apply_range(from, to, ui)?;
        self.sync_visible(change);
        Ok(change)
    }

    /// Drop the active filter.
    pub fn clear_filter(&mut self, ui: &mut dyn Interaction) -> FilterChange {
        let change = self.filter.clear(ui);
        self.sync_visible(change);
        change
    }

    pub fn filter_state(&self) -> &FilterState {
        self.filter.state()
    }

    /// Replication fans out over the visible images only.
    fn sync_visible(&mut self, change: FilterChange) {
        if let FilterChange::Applied { .. } = change {
            self.store.set_images(self.filter.visible().to_vec());
            let visible = self.filter.visible();
            self.surfaces.retain(|image, _| visible.contains(image));
        }
    }

    // ── Surfaces ──────────────────────────────────────────────────────────

    /// Display a visible image: its surface counts as loaded and the current
    /// frame is returned. Later edits show up in [`Session::take_frames`].
    pub fn show_image(&mut self, image: &str) -> Result<Frame, CutlineError> {
        let (surface, store) = self.surface_mut(image)?;
        surface.mark_loaded();
        surface.take_redraw(store).ok_or_else(|| {
            CutlineError::NotFound(format!("Image '{image}' has nothing to draw"))
        })
    }

    /// Frames for every displayed image whose markers changed since its last
    /// frame, ordered by image name.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        let store = &self.store;
        let mut frames: Vec<Frame> = self
            .surfaces
            .values_mut()
            .filter_map(|surface| surface.take_redraw(store))
            .collect();
        frames.sort_by(|a, b| a.image.cmp(&b.image));
        frames
    }

    /// The annotation surface of a visible image, with mutable store access.
    ///
    /// Returns `NotFound` when `image` is not mounted (unknown or filtered out).
    pub fn surface_mut(
        &mut self,
        image: &str,
    ) -> Result<(&mut AnnotationSurface, &mut LineStore), CutlineError> {
        if !self.filter.visible().iter().any(|i| i == image) {
            return Err(CutlineError::NotFound(format!(
                "Image '{image}' is not in the visible set"
            )));
        }
        let tolerance = self.config.hit_tolerance_px;
        let surface = self
            .surfaces
            .entry(image.to_string())
            .or_insert_with(|| AnnotationSurface::with_tolerance(image, tolerance));
        Ok((surface, &mut self.store))
    }
}

fn default_result_name(project: &str) -> String {
    format!("{project}_resultado.xlsx")
}

/// Keep only the final path component of a server-supplied name.
fn safe_file_name(name: &str) -> Option<String> {
    let candidate = Path::new(name).file_name()?.to_string_lossy().into_owned();
    if candidate.is_empty() || candidate == ".." {
        warn!("Ignoring unusable result file name {:?}", name);
        return None;
    }
    Some(candidate)
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CutlineError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| CutlineError::OutputWriteFailed {
                path: path.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| CutlineError::OutputWriteFailed {
            path: path.to_path_buf(),
            source,
        })
}
