//! Bounded polling of the OCR job status.
//!
//! The job runs on the OCR service; all we can do is ask for its status on a
//! fixed interval. [`poll_job`] waits one interval, asks, and repeats until
//! the service reports a terminal status, the attempt cap is reached, or the
//! caller cancels through a [`CancelToken`]. The result is a tagged
//! [`JobOutcome`] rather than an error so callers can tell the cases apart.
//!
//! A poll that comes back with a non-success HTTP status is skipped (it still
//! counts as an attempt). A transport failure ends polling with
//! [`CutlineError::Network`].

use crate::error::CutlineError;
use crate::progress::JobProgressCallback;
use crate::service::{JobStatus, StatusReply};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The service reported `completed` on poll number `attempts`.
    Completed { attempts: u32 },
    /// The service reported `error`.
    Failed { reason: String },
    /// `attempts` polls went by without a terminal status.
    TimedOut { attempts: u32 },
    /// The caller cancelled after `attempts` polls.
    Cancelled { attempts: u32 },
}

/// Cloneable cancellation flag shared between the poller and whoever may stop it.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns on cancel.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Poll settings.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

/// Poll `fetch` until the job reaches a terminal status.
///
/// `fetch` is called with the 1-indexed attempt number and performs one
/// status request. Each attempt is preceded by a wait of `policy.interval`.
pub async fn poll_job<F, Fut>(
    project: &str,
    policy: PollPolicy,
    cancel: &CancelToken,
    progress: &dyn JobProgressCallback,
    mut fetch: F,
) -> Result<JobOutcome, CutlineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<StatusReply, CutlineError>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Polling for {} cancelled after {} attempts", project, attempt - 1);
                return Ok(JobOutcome::Cancelled { attempts: attempt - 1 });
            }
            _ = tokio::time::sleep(policy.interval) => {}
        }

        let status = match fetch(attempt).await? {
            StatusReply::Status(status) => status,
            StatusReply::Unavailable { http_status } => {
                warn!(
                    "Status poll {}/{} for {} returned HTTP {}; waiting",
                    attempt, policy.max_attempts, project, http_status
                );
                continue;
            }
        };

        debug!(
            "Poll {}/{} for {}: {} ({})",
            attempt,
            policy.max_attempts,
            project,
            status.status,
            status.progress.as_deref().unwrap_or("-")
        );
        progress.on_poll(
            attempt,
            policy.max_attempts,
            &status.status,
            status.progress.as_deref(),
        );

        match status.status {
            JobStatus::Completed => {
                info!("Job for {} completed after {} polls", project, attempt);
                return Ok(JobOutcome::Completed { attempts: attempt });
            }
            JobStatus::Error => {
                let reason = status
                    .error_message
                    .unwrap_or_else(|| "the OCR service reported an error".to_string());
                warn!("Job for {} failed: {}", project, reason);
                return Ok(JobOutcome::Failed { reason });
            }
            JobStatus::Pending | JobStatus::Processing | JobStatus::Unknown => {}
        }
    }

    warn!(
        "Job for {} did not finish after {} polls",
        project, policy.max_attempts
    );
    Ok(JobOutcome::TimedOut {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;
    use crate::service::StatusResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            max_attempts,
        }
    }

    fn reply(status: JobStatus) -> StatusReply {
        StatusReply::Status(StatusResponse {
            status,
            progress: None,
            error_message: None,
        })
    }

    /// Serve scripted replies; repeat the last one when the script runs out.
    fn scripted(
        replies: Vec<StatusReply>,
    ) -> (
        Arc<Mutex<u32>>,
        impl FnMut(u32) -> std::future::Ready<Result<StatusReply, CutlineError>>,
    ) {
        let calls = Arc::new(Mutex::new(0));
        let counter = calls.clone();
        let mut queue: VecDeque<StatusReply> = replies.into();
        let fetch = move |_attempt: u32| {
            *counter.lock().unwrap() += 1;
            let next = if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            };
            std::future::ready(Ok(next))
        };
        (calls, fetch)
    }

    #[tokio::test]
    async fn completes_on_third_poll() {
        let (calls, fetch) = scripted(vec![
            reply(JobStatus::Processing),
            reply(JobStatus::Processing),
            reply(JobStatus::Completed),
        ]);
        let outcome = poll_job("p", policy(10), &CancelToken::new(), &NoopProgressCallback, fetch)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Completed { attempts: 3 });
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn error_stops_immediately_with_message() {
        let (calls, fetch) = scripted(vec![
            reply(JobStatus::Pending),
            StatusReply::Status(StatusResponse {
                status: JobStatus::Error,
                progress: None,
                error_message: Some("Carpeta 'originales' no encontrada".into()),
            }),
            reply(JobStatus::Completed),
        ]);
        let outcome = poll_job("p", policy(10), &CancelToken::new(), &NoopProgressCallback, fetch)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            JobOutcome::Failed {
                reason: "Carpeta 'originales' no encontrada".into()
            }
        );
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn times_out_after_max_attempts() {
        let (calls, fetch) = scripted(vec![reply(JobStatus::Processing)]);
        let outcome = poll_job("p", policy(4), &CancelToken::new(), &NoopProgressCallback, fetch)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::TimedOut { attempts: 4 });
        assert_eq!(*calls.lock().unwrap(), 4);
    }

    #[tokio::test]
    async fn unavailable_polls_count_as_attempts() {
        let (_, fetch) = scripted(vec![
            StatusReply::Unavailable { http_status: 404 },
            reply(JobStatus::Completed),
        ]);
        let outcome = poll_job("p", policy(5), &CancelToken::new(), &NoopProgressCallback, fetch)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Completed { attempts: 2 });
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let fetch = |_attempt: u32| {
            std::future::ready(Err(CutlineError::Network {
                endpoint: "http://ocr/api/process-status/p".into(),
                reason: "connection refused".into(),
            }))
        };
        let err = poll_job("p", policy(5), &CancelToken::new(), &NoopProgressCallback, fetch)
            .await
            .unwrap_err();
        assert!(matches!(err, CutlineError::Network { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_polling() {
        let (calls, fetch) = scripted(vec![reply(JobStatus::Processing)]);
        let token = CancelToken::new();
        token.cancel();
        assert!(token.clone().is_cancelled());
        let outcome = poll_job("p", policy(5), &token, &NoopProgressCallback, fetch)
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Cancelled { attempts: 0 });
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn cancel_during_wait_interrupts_sleep() {
        let (_, fetch) = scripted(vec![reply(JobStatus::Processing)]);
        let token = CancelToken::new();
        let remote = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            remote.cancel();
        });
        let slow = PollPolicy {
            interval: Duration::from_secs(3600),
            max_attempts: 3,
        };
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            poll_job("p", slow, &token, &NoopProgressCallback, fetch),
        )
        .await
        .expect("cancel should interrupt the wait")
        .unwrap();
        assert_eq!(outcome, JobOutcome::Cancelled { attempts: 0 });
    }
}
