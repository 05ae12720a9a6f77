use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::{ReportGenerator, write_report};
use crate::domain::review::DraftReview;
use crate::error::GenerationError;
use crate::request::{GrantRequest, RequestFields};

/// Largest slice of an error body echoed back to the operator.
const MAX_ERROR_BODY: usize = 500;

/// Generator backed by the Grant-Forge service.
///
/// POSTs the request as JSON and expects the PDF bytes back in a 2xx response body, which it
/// writes to `<report_dir>/<id>.pdf`.
#[derive(Clone)]
pub struct HttpReportGenerator {
    client: reqwest::Client,
    endpoint: String,
    report_dir: PathBuf,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerationPayload<'a> {
    id: uuid::Uuid,
    fields: &'a RequestFields,
    recipient: Option<&'a str>,
    review: Option<DraftReview>,
}

impl HttpReportGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        report_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            report_dir: report_dir.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReportGenerator for HttpReportGenerator {
    #[tracing::instrument(
        skip(self, request),
        fields(request_id = %request.id, endpoint = %self.endpoint)
    )]
    async fn generate(&self, request: &GrantRequest) -> Result<PathBuf, GenerationError> {
        let payload = GenerationPayload {
            id: request.id.0,
            fields: &request.fields,
            recipient: request.recipient.as_deref(),
            review: request.review(),
        };

        tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Calling Grant-Forge");

        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::ACCEPT, "application/pdf")
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Grant-Forge request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            tracing::warn!(status = status.as_u16(), "Grant-Forge rejected the request");
            return Err(GenerationError::new(format!(
                "Grant-Forge returned {}: {}",
                status, body
            )));
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(GenerationError::new("Grant-Forge returned an empty report"));
        }
        if !bytes.starts_with(b"%PDF") {
            tracing::warn!("Grant-Forge response does not look like a PDF, storing it anyway");
        }

        let path = write_report(&self.report_dir, request.id, &bytes).await?;

        tracing::info!(path = %path.display(), size = bytes.len(), "Stored generated report");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::report_path;
    use crate::request::NewGrantRequest;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    /// Serve `app` on an ephemeral local port and return its URL.
    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/generate")
    }

    fn request() -> GrantRequest {
        GrantRequest::new(
            NewGrantRequest::from_form([("name", "Acme"), ("narrative", "A bakery")]).unwrap(),
            chrono::Utc::now(),
        )
    }

    fn generator(url: String, dir: &tempfile::TempDir) -> HttpReportGenerator {
        HttpReportGenerator::new(url, dir.path().join("reports"), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_success_writes_report() {
        let url = serve(Router::new().route(
            "/generate",
            post(|axum::Json(payload): axum::Json<serde_json::Value>| async move {
                assert_eq!(payload["fields"]["name"], "Acme");
                assert!(payload["review"]["risks"].is_array());
                b"%PDF-1.4 forged".to_vec()
            }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let request = request();

        let path = generator(url, &dir).generate(&request).await.unwrap();

        assert_eq!(path, report_path(&dir.path().join("reports"), request.id));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"%PDF-1.4 forged");
    }

    #[tokio::test]
    async fn test_server_error_is_generation_failure() {
        let url = serve(Router::new().route(
            "/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "x".repeat(2000)) }),
        ))
        .await;
        let dir = tempfile::tempdir().unwrap();
        let request = request();

        let err = generator(url, &dir).generate(&request).await.unwrap_err();

        assert!(err.message.contains("500"));
        assert!(err.message.contains(&"x".repeat(MAX_ERROR_BODY)));
        assert!(!err.message.contains(&"x".repeat(MAX_ERROR_BODY + 1)));
        assert!(!report_path(&dir.path().join("reports"), request.id).exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_generation_failure() {
        let url = serve(Router::new().route("/generate", post(|| async { "" }))).await;
        let dir = tempfile::tempdir().unwrap();
        let request = request();

        let err = generator(url, &dir).generate(&request).await.unwrap_err();

        assert!(err.message.contains("empty report"));
        assert!(!report_path(&dir.path().join("reports"), request.id).exists());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_generation_failure() {
        // Bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let dir = tempfile::tempdir().unwrap();

        let err = generator(format!("http://{addr}/generate"), &dir)
            .generate(&request())
            .await
            .unwrap_err();

        assert!(err.message.contains("Grant-Forge request failed"));
    }
}
