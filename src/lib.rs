//! # cutlines
//!
//! Annotate vertical cut lines on scanned page images, then hand them to an
//! OCR service that turns each column band into spreadsheet cells.
//!
//! ## Workflow
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Upload   conversion backend splits the PDF into img_NNN.jpg pages
//!  ├─ 2. Annotate click / drag vertical markers per page (LineStore)
//!  ├─ 3. Filter   narrow the working set by page name or number range
//!  ├─ 4. Export   full marker mapping + line_gap → backend
//!  └─ 5. Process  start OCR job, poll until done, download the result file
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cutlines::{CancelToken, HttpBackend, NoopProgressCallback, PointerEvent, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::default();
//!     let mut session = Session::new(HttpBackend::new(&config)?, config);
//!
//!     if session.start().await?.is_none() {
//!         session.upload("scan.pdf".as_ref()).await?;
//!     }
//!
//!     let (surface, store) = session.surface_mut("img_001.jpg")?;
//!     surface.click(store, PointerEvent::new(120.0, 0.0));
//!
//!     session.export().await?;
//!     let result = session.process(&CancelToken::new(), &NoopProgressCallback).await?;
//!     eprintln!("saved {}", result.path.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cutlines` binary (clap + anyhow + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod envelope;
pub mod error;
pub mod filter;
pub mod interaction;
pub mod poll;
pub mod progress;
pub mod render;
pub mod service;
pub mod session;
pub mod store;
pub mod surface;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{SessionConfig, SessionConfigBuilder};
pub use envelope::{ExportEnvelope, SavedLines};
pub use error::CutlineError;
pub use filter::{normalize_image_name, FilterChange, FilterState, ImageFilter};
pub use interaction::{AutoAnswer, Interaction, ReplicateMode};
pub use poll::{poll_job, CancelToken, JobOutcome, PollPolicy};
pub use progress::{JobProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{Backend, HttpBackend, JobStatus, StatusReply};
pub use session::{DownloadedResult, ProjectSummary, Session};
pub use store::{ImageId, LineStore, LinesMap};
pub use surface::{AnnotationSurface, DragState, Frame, PointerEvent};
