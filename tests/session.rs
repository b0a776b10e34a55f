//! Session-level integration tests.
//!
//! A scripted in-memory [`Backend`] stands in for the conversion backend and
//! the OCR service, so every test runs offline and deterministically. Status
//! polling uses a zero interval.

use async_trait::async_trait;
use cutlines::service::{
    ExportRequest, ExportResponse, ProcessRequest, ProjectDetail, ResultFile, StatusResponse,
    UploadResponse,
};
use cutlines::{
    AutoAnswer, Backend, CancelToken, CutlineError, FilterChange, FilterState,
    JobProgressCallback, JobStatus, LinesMap, NoopProgressCallback, PointerEvent,
    ProgressCallback, Session, SessionConfig, StatusReply,
};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Scripted backend ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedBackend {
    projects: Vec<String>,
    /// `set-project` bodies keyed by project name.
    details: HashMap<String, serde_json::Value>,
    upload: Option<(String, Vec<String>)>,
    statuses: Mutex<VecDeque<StatusReply>>,
    result_name: Option<String>,
    image_bytes: Vec<u8>,
    calls: Mutex<Vec<String>>,
    exported: Mutex<Option<(LinesMap, f64)>>,
    uploaded: Mutex<Option<(String, usize)>>,
    downloads: AtomicUsize,
}

impl ScriptedBackend {
    fn with_project(mut self, name: &str, detail: serde_json::Value) -> Self {
        self.projects.push(name.to_string());
        self.details.insert(name.to_string(), detail);
        self
    }

    fn with_statuses(self, statuses: &[JobStatus]) -> Self {
        *self.statuses.lock().unwrap() = statuses
            .iter()
            .map(|&status| {
                StatusReply::Status(StatusResponse {
                    status,
                    progress: None,
                    error_message: None,
                })
            })
            .collect();
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn list_projects(&self) -> Result<Vec<String>, CutlineError> {
        self.record("projects");
        Ok(self.projects.clone())
    }

    async fn set_project(&self, name: &str) -> Result<ProjectDetail, CutlineError> {
        self.record(format!("set-project {name}"));
        let body = self.details.get(name).cloned().ok_or_else(|| CutlineError::Network {
            endpoint: format!("http://backend/api/set-project/{name}"),
            reason: "HTTP 404 Not Found".into(),
        })?;
        serde_json::from_value(body).map_err(|e| CutlineError::Decode {
            endpoint: "set-project".into(),
            reason: e.to_string(),
        })
    }

    async fn upload_pdf(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadResponse, CutlineError> {
        self.record("upload");
        *self.uploaded.lock().unwrap() = Some((filename.to_string(), bytes.len()));
        let (project, images) = self.upload.clone().ok_or_else(|| CutlineError::Network {
            endpoint: "http://backend/api/upload".into(),
            reason: "HTTP 500 Internal Server Error".into(),
        })?;
        Ok(UploadResponse { project, images })
    }

    async fn export_lines(&self, request: &ExportRequest<'_>) -> Result<ExportResponse, CutlineError> {
        self.record("export-lines");
        *self.exported.lock().unwrap() = Some((request.lines.clone(), request.line_gap));
        Ok(ExportResponse { total_lines: None })
    }

    async fn fetch_image(&self, image: &str) -> Result<Vec<u8>, CutlineError> {
        self.record(format!("image {image}"));
        Ok(self.image_bytes.clone())
    }

    async fn start_job(&self, request: &ProcessRequest<'_>) -> Result<(), CutlineError> {
        self.record(format!("process {} {}", request.project, request.json_filename));
        Ok(())
    }

    async fn job_status(&self, _project: &str) -> Result<StatusReply, CutlineError> {
        self.record("status");
        let mut queue = self.statuses.lock().unwrap();
        let next = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        Ok(next.unwrap_or(StatusReply::Unavailable { http_status: 404 }))
    }

    async fn download_result(&self, _project: &str) -> Result<ResultFile, CutlineError> {
        self.record("download");
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(ResultFile {
            filename: self.result_name.clone(),
            bytes: b"PK\x03\x04 fake xlsx".to_vec(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(download_dir: &Path) -> SessionConfig {
    SessionConfig::builder()
        .poll_interval_ms(0)
        .max_poll_attempts(3)
        .download_dir(download_dir)
        .build()
        .unwrap()
}

fn images(n: u32) -> Vec<String> {
    (1..=n).map(|i| format!("img_{i:03}.jpg")).collect()
}

fn session(backend: ScriptedBackend) -> Session<ScriptedBackend> {
    Session::new(backend, config(Path::new(".")))
}

/// Backend with one project of `n` pages and a saved envelope on page 1.
fn one_project(n: u32) -> ScriptedBackend {
    ScriptedBackend::default().with_project(
        "proyecto_a",
        json!({
            "project": "proyecto_a",
            "images": images(n),
            "lines": { "lines": { "img_001.jpg": [10.0, 20.0] }, "line_gap": 6.5 }
        }),
    )
}

// ── Project lifecycle ────────────────────────────────────────────────────────

#[tokio::test]
async fn start_activates_most_recent_project() {
    let backend = one_project(2).with_project(
        "proyecto_old",
        json!({ "project": "proyecto_old", "images": [], "lines": {} }),
    );
    let mut s = session(backend);

    let summary = s.start().await.unwrap().expect("a project");
    assert_eq!(summary.project, "proyecto_a");
    assert_eq!(s.project(), Some("proyecto_a"));
    assert_eq!(
        s.backend().calls(),
        vec!["projects".to_string(), "set-project proyecto_a".to_string()]
    );
}

#[tokio::test]
async fn start_without_projects_leaves_session_idle() {
    let mut s = session(ScriptedBackend::default());
    assert!(s.start().await.unwrap().is_none());
    assert_eq!(s.project(), None);
    assert!(s.visible_images().is_empty());
}

#[tokio::test]
async fn envelope_lines_are_unwrapped_on_activation() {
    let mut s = session(one_project(2));
    let summary = s.activate_project("proyecto_a").await.unwrap();

    assert_eq!(summary.images, 2);
    assert_eq!(summary.lines, 2);
    assert_eq!(s.store().lines("img_001.jpg"), &[10.0, 20.0]);
    assert!(s.store().lines("img_002.jpg").is_empty());
    assert_eq!(s.visible_images(), images(2).as_slice());
}

#[tokio::test]
async fn envelope_with_naive_timestamp_activates() {
    let backend = ScriptedBackend::default().with_project(
        "proyecto_c",
        json!({
            "project": "proyecto_c",
            "images": images(2),
            "lines": {
                "lines": { "img_001.jpg": [10, 20] },
                "line_gap": 6.5,
                "exported_at": "2026-10-18T10:00:00.123456",
                "total_lines": 2
            }
        }),
    );
    let mut s = session(backend);

    let summary = s.activate_project("proyecto_c").await.unwrap();
    assert_eq!(summary.lines, 2);
    assert_eq!(s.store().lines("img_001.jpg"), &[10.0, 20.0]);
    assert!(s.store().lines("img_002.jpg").is_empty());
}

#[tokio::test]
async fn bare_mapping_loads_as_is() {
    let backend = ScriptedBackend::default().with_project(
        "proyecto_b",
        json!({
            "project": "proyecto_b",
            "images": images(3),
            "lines": { "img_003.jpg": [5.5] }
        }),
    );
    let mut s = session(backend);
    s.activate_project("proyecto_b").await.unwrap();
    assert_eq!(s.store().lines("img_003.jpg"), &[5.5]);
    assert_eq!(s.store().total_lines(), 1);
}

#[tokio::test]
async fn failed_activation_keeps_previous_state() {
    let mut s = session(one_project(2));
    s.activate_project("proyecto_a").await.unwrap();

    let err = s.activate_project("missing").await.unwrap_err();
    assert!(matches!(err, CutlineError::Network { .. }));
    assert_eq!(s.project(), Some("proyecto_a"));
    assert_eq!(s.store().lines("img_001.jpg"), &[10.0, 20.0]);
}

#[tokio::test]
async fn upload_starts_with_empty_lines() {
    let mut backend = one_project(2);
    backend.upload = Some(("proyecto_new".into(), images(4)));
    let mut s = session(backend);
    s.activate_project("proyecto_a").await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("extracto.pdf");
    std::fs::write(&pdf, b"%PDF-1.4 fake").unwrap();

    let summary = s.upload(&pdf).await.unwrap();
    assert_eq!(summary.project, "proyecto_new");
    assert_eq!(summary.images, 4);
    assert_eq!(summary.lines, 0);
    assert!(s.store().lines("img_001.jpg").is_empty());
    assert_eq!(
        s.backend().uploaded.lock().unwrap().clone(),
        Some(("extracto.pdf".to_string(), 13))
    );
}

#[tokio::test]
async fn upload_of_missing_file_is_a_read_error() {
    let mut s = session(ScriptedBackend::default());
    let err = s
        .upload(Path::new("/definitely/not/here.pdf"))
        .await
        .unwrap_err();
    assert!(matches!(err, CutlineError::FileRead { .. }));
    assert!(s.backend().calls().is_empty());
}

// ── Editing, filtering and export ────────────────────────────────────────────

#[tokio::test]
async fn export_sends_full_mapping_even_when_filtered() {
    let mut s = session(one_project(3));
    s.activate_project("proyecto_a").await.unwrap();
    {
        let (surface, store) = s.surface_mut("img_002.jpg").unwrap();
        surface.click(store, PointerEvent::new(140.0, 40.0));
    }

    let change = s.search("2", &mut AutoAnswer::yes()).unwrap();
    assert_eq!(change, FilterChange::Applied { visible: 1 });

    let total = s.export().await.unwrap();
    assert_eq!(total, 3);

    let (lines, gap) = s.backend().exported.lock().unwrap().clone().unwrap();
    assert_eq!(gap, 6.5);
    assert_eq!(lines["img_001.jpg"], vec![10.0, 20.0]);
    assert_eq!(lines["img_002.jpg"], vec![100.0]);
}

#[tokio::test]
async fn replicate_reaches_only_visible_images() {
    let mut s = session(one_project(5));
    s.activate_project("proyecto_a").await.unwrap();

    let change = s.apply_range("1", "3", &mut AutoAnswer::yes()).unwrap();
    assert_eq!(change, FilterChange::Applied { visible: 3 });
    assert_eq!(s.filter_state(), &FilterState::Range { from: 1, to: 3 });

    let (surface, store) = s.surface_mut("img_001.jpg").unwrap();
    let copied = surface.replicate(store, &mut AutoAnswer::yes());
    assert_eq!(copied, 2);

    assert_eq!(s.store().lines("img_003.jpg"), &[10.0, 20.0]);
    assert!(s.store().lines("img_004.jpg").is_empty());
    assert!(s.store().lines("img_005.jpg").is_empty());
}

#[tokio::test]
async fn filtered_out_image_has_no_surface() {
    let mut s = session(one_project(3));
    s.activate_project("proyecto_a").await.unwrap();
    s.search("img_001.jpg", &mut AutoAnswer::yes()).unwrap();

    let err = s.surface_mut("img_002.jpg").unwrap_err();
    assert!(matches!(err, CutlineError::NotFound(_)));

    assert_eq!(
        s.clear_filter(&mut AutoAnswer::yes()),
        FilterChange::Applied { visible: 3 }
    );
    assert!(s.surface_mut("img_002.jpg").is_ok());
}

#[tokio::test]
async fn declined_search_keeps_range() {
    let mut s = session(one_project(4));
    s.activate_project("proyecto_a").await.unwrap();
    s.apply_range("2", "4", &mut AutoAnswer::yes()).unwrap();

    let change = s.search("1", &mut AutoAnswer::no()).unwrap();
    assert_eq!(change, FilterChange::Declined);
    assert_eq!(s.visible_images().len(), 3);
}

#[tokio::test]
async fn drag_moves_saved_marker() {
    let mut s = session(one_project(1));
    s.activate_project("proyecto_a").await.unwrap();

    let (surface, store) = s.surface_mut("img_001.jpg").unwrap();
    assert_eq!(surface.pointer_down(store, PointerEvent::new(22.0, 0.0)), Some(1));
    surface.pointer_move(store, PointerEvent::new(60.0, 0.0)).unwrap();
    surface.pointer_up();

    assert_eq!(s.store().lines("img_001.jpg"), &[10.0, 60.0]);
}

#[tokio::test]
async fn shown_images_redraw_only_after_changes() {
    let mut s = session(one_project(2));
    s.activate_project("proyecto_a").await.unwrap();

    let frame = s.show_image("img_001.jpg").unwrap();
    assert_eq!(frame.markers, vec![10.0, 20.0]);
    assert!(s.take_frames().is_empty());

    {
        let (surface, store) = s.surface_mut("img_001.jpg").unwrap();
        surface.click(store, PointerEvent::new(35.0, 0.0));
    }
    {
        // Edited but never shown: no frame.
        let (surface, store) = s.surface_mut("img_002.jpg").unwrap();
        surface.click(store, PointerEvent::new(50.0, 0.0));
    }

    let frames = s.take_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].image, "img_001.jpg");
    assert_eq!(frames[0].markers, vec![10.0, 20.0, 35.0]);
    assert!(s.take_frames().is_empty());
}

#[tokio::test]
async fn preview_of_filtered_out_image_is_not_fetched() {
    let mut s = session(one_project(3));
    s.activate_project("proyecto_a").await.unwrap();
    s.search("1", &mut AutoAnswer::yes()).unwrap();

    let err = s.preview("img_003.jpg").await.unwrap_err();
    assert!(matches!(err, CutlineError::NotFound(_)));
    assert!(!s.backend().calls().iter().any(|c| c.starts_with("image")));
}

#[tokio::test]
async fn preview_draws_markers_on_fetched_image() {
    let mut page = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        30,
        4,
        image::Rgba([255, 255, 255, 255]),
    ))
    .write_to(&mut std::io::Cursor::new(&mut page), image::ImageFormat::Png)
    .unwrap();
    let mut backend = one_project(1);
    backend.image_bytes = page;

    let mut s = session(backend);
    s.activate_project("proyecto_a").await.unwrap();
    let png = s.preview("img_001.jpg").await.unwrap();

    let out = image::load_from_memory(&png).unwrap().to_rgba8();
    assert_eq!(*out.get_pixel(10, 0), cutlines::render::MARKER_COLOR);
    assert_eq!(*out.get_pixel(15, 0), image::Rgba([255, 255, 255, 255]));
}

// ── OCR processing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn process_downloads_once_after_completion() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = one_project(1).with_statuses(&[
        JobStatus::Processing,
        JobStatus::Processing,
        JobStatus::Completed,
    ]);
    backend.result_name = Some("proyecto_a_resultado.xlsx".into());
    let mut s = Session::new(backend, config(dir.path()));
    s.activate_project("proyecto_a").await.unwrap();

    let result = s
        .process(&CancelToken::new(), &NoopProgressCallback)
        .await
        .unwrap();

    assert_eq!(result.attempts, 3);
    assert_eq!(result.path, dir.path().join("proyecto_a_resultado.xlsx"));
    assert_eq!(std::fs::read(&result.path).unwrap(), b"PK\x03\x04 fake xlsx");
    assert_eq!(s.backend().downloads.load(Ordering::SeqCst), 1);

    let calls = s.backend().calls();
    assert!(calls.contains(&"process proyecto_a lines.json".to_string()));
    assert_eq!(calls.iter().filter(|c| *c == "status").count(), 3);
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    polls: AtomicUsize,
    downloads: AtomicUsize,
    errors: AtomicUsize,
}

impl JobProgressCallback for CountingProgress {
    fn on_job_start(&self, _project: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_poll(&self, _attempt: u32, _max: u32, _status: &JobStatus, _progress: Option<&str>) {
        self.polls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_download(&self, _path: &Path, _bytes: usize) {
        self.downloads.fetch_add(1, Ordering::SeqCst);
    }

    fn on_job_error(&self, _project: &str, _error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_handle_sees_every_stage() {
    let dir = tempfile::tempdir().unwrap();
    let backend = one_project(1).with_statuses(&[
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
    ]);
    let mut s = Session::new(backend, config(dir.path()));
    s.activate_project("proyecto_a").await.unwrap();

    let counter = Arc::new(CountingProgress::default());
    let handle: ProgressCallback = counter.clone();
    s.process(&CancelToken::new(), handle.as_ref()).await.unwrap();

    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.polls.load(Ordering::SeqCst), 3);
    assert_eq!(counter.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(counter.errors.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn progress_handle_sees_timeout_as_error() {
    let backend = one_project(1).with_statuses(&[JobStatus::Processing]);
    let mut s = session(backend);
    s.activate_project("proyecto_a").await.unwrap();

    let counter = Arc::new(CountingProgress::default());
    let handle: ProgressCallback = counter.clone();
    assert!(s.process(&CancelToken::new(), handle.as_ref()).await.is_err());
    assert_eq!(counter.errors.load(Ordering::SeqCst), 1);
    assert_eq!(counter.downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn process_falls_back_to_default_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let backend = one_project(1).with_statuses(&[JobStatus::Completed]);
    let mut s = Session::new(backend, config(dir.path()));
    s.activate_project("proyecto_a").await.unwrap();

    let result = s
        .process(&CancelToken::new(), &NoopProgressCallback)
        .await
        .unwrap();
    assert_eq!(
        result.path.file_name().unwrap(),
        "proyecto_a_resultado.xlsx"
    );
}

#[tokio::test]
async fn job_error_skips_download() {
    let dir = tempfile::tempdir().unwrap();
    let backend = one_project(1);
    *backend.statuses.lock().unwrap() = VecDeque::from(vec![StatusReply::Status(StatusResponse {
        status: JobStatus::Error,
        progress: None,
        error_message: Some("OCR engine crashed".into()),
    })]);
    let mut s = Session::new(backend, config(dir.path()));
    s.activate_project("proyecto_a").await.unwrap();

    let err = s
        .process(&CancelToken::new(), &NoopProgressCallback)
        .await
        .unwrap_err();
    match err {
        CutlineError::JobFailed { project, message } => {
            assert_eq!(project, "proyecto_a");
            assert_eq!(message, "OCR engine crashed");
        }
        other => panic!("expected JobFailed, got {other:?}"),
    }
    assert_eq!(s.backend().downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn never_finishing_job_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let backend = one_project(1).with_statuses(&[JobStatus::Processing]);
    let mut s = Session::new(backend, config(dir.path()));
    s.activate_project("proyecto_a").await.unwrap();

    let err = s
        .process(&CancelToken::new(), &NoopProgressCallback)
        .await
        .unwrap_err();
    assert!(matches!(err, CutlineError::JobTimeout { attempts: 3, .. }));
    assert_eq!(s.backend().downloads.load(Ordering::SeqCst), 0);
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn cancelled_job_skips_download() {
    let backend = one_project(1).with_statuses(&[JobStatus::Processing]);
    let mut s = session(backend);
    s.activate_project("proyecto_a").await.unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = s.process(&cancel, &NoopProgressCallback).await.unwrap_err();
    assert!(matches!(err, CutlineError::Cancelled { .. }));
    assert_eq!(s.backend().downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn process_requires_a_project() {
    let s = session(ScriptedBackend::default());
    let err = s
        .process(&CancelToken::new(), &NoopProgressCallback)
        .await
        .unwrap_err();
    assert!(matches!(err, CutlineError::NotFound(_)));
    assert!(s.backend().calls().is_empty());
}
