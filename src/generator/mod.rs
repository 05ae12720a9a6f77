//! Report generation ("Grant-Forge").
//!
//! This module defines the [`ReportGenerator`] trait so the console can be driven by the real
//! Grant-Forge service, by the built-in draft renderer, or by a scripted mock in tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::GenerationError;
use crate::request::{GrantRequest, RequestId};

mod http;
mod local;
pub mod pdf;

pub use http::HttpReportGenerator;
pub use local::LocalDraftGenerator;

/// Trait for producing a request's PDF report.
///
/// Implementations write the file somewhere the console can later stream it from and return
/// its path. A failure leaves nothing for the console to record; the operator retries by hand.
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(&self, request: &GrantRequest) -> Result<PathBuf, GenerationError>;
}

/// Where a request's report lives inside `report_dir`.
pub fn report_path(report_dir: &Path, id: RequestId) -> PathBuf {
    report_dir.join(format!("{}.pdf", id.0))
}

/// Write a report to its final path.
///
/// The bytes land in a `.tmp` sibling first and are renamed into place, so a failed write never
/// leaves a truncated `<id>.pdf` for a download or delivery to pick up.
pub async fn write_report(
    report_dir: &Path,
    id: RequestId,
    bytes: &[u8],
) -> Result<PathBuf, GenerationError> {
    tokio::fs::create_dir_all(report_dir).await?;
    let path = report_path(report_dir, id);
    let tmp = path.with_extension("pdf.tmp");

    let written = match tokio::fs::write(&tmp, bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, &path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await
            && cleanup.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(
                path = %tmp.display(),
                error = %cleanup,
                "Failed to remove partial report"
            );
        }
        return Err(e.into());
    }

    Ok(path)
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Mock generator for testing.
///
/// Returns scripted outcomes in FIFO order and records which requests it was asked to generate.
/// With nothing scripted, every call fails.
///
/// # Example
/// ```ignore
/// let generator = MockReportGenerator::new();
/// generator.add_response(Ok(PathBuf::from("/tmp/x.pdf")));
/// generator.add_response(Err(GenerationError::new("template missing")));
/// ```
#[derive(Clone, Default)]
pub struct MockReportGenerator {
    responses: Arc<Mutex<VecDeque<MockGeneration>>>,
    calls: Arc<Mutex<Vec<RequestId>>>,
}

enum MockGeneration {
    Immediate(Result<PathBuf, GenerationError>),
    /// Waits for the trigger before returning
    Triggered {
        response: Result<PathBuf, GenerationError>,
        trigger: oneshot::Receiver<()>,
    },
}

impl MockReportGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next unanswered call.
    pub fn add_response(&self, response: Result<PathBuf, GenerationError>) {
        self.responses
            .lock()
            .push_back(MockGeneration::Immediate(response));
    }

    /// Queue an outcome that is only returned once the returned sender fires (or is dropped).
    pub fn add_response_with_trigger(
        &self,
        response: Result<PathBuf, GenerationError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses.lock().push_back(MockGeneration::Triggered {
            response,
            trigger: rx,
        });
        tx
    }

    pub fn get_calls(&self) -> Vec<RequestId> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ReportGenerator for MockReportGenerator {
    async fn generate(&self, request: &GrantRequest) -> Result<PathBuf, GenerationError> {
        self.calls.lock().push(request.id);

        let next = self.responses.lock().pop_front();
        match next {
            Some(MockGeneration::Immediate(response)) => response,
            Some(MockGeneration::Triggered { response, trigger }) => {
                // Proceed whether the trigger fired or was dropped
                let _ = trigger.await;
                response
            }
            None => Err(GenerationError::new(format!(
                "No mock generation configured for request {}",
                request.id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::NewGrantRequest;

    #[tokio::test]
    async fn test_write_report_leaves_only_final_file() {
        let dir = tempfile::tempdir().unwrap();
        let id = RequestId(uuid::Uuid::new_v4());

        let path = write_report(dir.path(), id, b"%PDF-1.4").await.unwrap();

        assert_eq!(path, report_path(dir.path(), id));
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let id = RequestId(uuid::Uuid::new_v4());
        // A directory in the way makes the final rename fail
        std::fs::create_dir(report_path(dir.path(), id)).unwrap();

        assert!(write_report(dir.path(), id, b"%PDF-1.4").await.is_err());

        assert!(report_path(dir.path(), id).is_dir());
        assert!(!report_path(dir.path(), id).with_extension("pdf.tmp").exists());
    }

    fn request() -> GrantRequest {
        GrantRequest::new(NewGrantRequest::default(), chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_mock_returns_responses_in_order() {
        let mock = MockReportGenerator::new();
        mock.add_response(Ok(PathBuf::from("/tmp/first.pdf")));
        mock.add_response(Err(GenerationError::new("second failed")));

        let request = request();
        assert_eq!(
            mock.generate(&request).await,
            Ok(PathBuf::from("/tmp/first.pdf"))
        );
        assert_eq!(
            mock.generate(&request).await,
            Err(GenerationError::new("second failed"))
        );
        assert!(mock.generate(&request).await.is_err());
        assert_eq!(mock.get_calls(), vec![request.id; 3]);
    }

    #[tokio::test]
    async fn test_mock_with_trigger_blocks_until_fired() {
        let mock = MockReportGenerator::new();
        let trigger = mock.add_response_with_trigger(Ok(PathBuf::from("/tmp/x.pdf")));

        let mock_clone = mock.clone();
        let handle = tokio::spawn(async move { mock_clone.generate(&request()).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        trigger.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), Ok(PathBuf::from("/tmp/x.pdf")));
    }

    #[test]
    fn test_report_path_uses_full_id() {
        let id = RequestId::from(uuid::Uuid::new_v4());
        let path = report_path(Path::new("/var/reports"), id);
        assert_eq!(path, PathBuf::from(format!("/var/reports/{}.pdf", id.0)));
    }
}
