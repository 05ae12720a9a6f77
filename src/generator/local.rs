use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::{ReportGenerator, pdf, write_report};
use crate::error::GenerationError;
use crate::request::GrantRequest;

/// Generator used when no Grant-Forge endpoint is configured.
///
/// Renders a plain draft: the request's fields followed by its draft review.
#[derive(Debug, Clone)]
pub struct LocalDraftGenerator {
    report_dir: PathBuf,
}

impl LocalDraftGenerator {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }
}

#[async_trait]
impl ReportGenerator for LocalDraftGenerator {
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    async fn generate(&self, request: &GrantRequest) -> Result<PathBuf, GenerationError> {
        let document = pdf::render_text(&draft_lines(request));

        let path = write_report(&self.report_dir, request.id, &document).await?;

        tracing::info!(path = %path.display(), size = document.len(), "Rendered local draft");
        Ok(path)
    }
}

fn draft_lines(request: &GrantRequest) -> Vec<String> {
    let mut lines = vec![
        format!("Grant request draft: {}", request.title()),
        format!("Request ID: {}", request.id.0),
        format!("Created: {}", request.created_at.format("%Y-%m-%d %H:%M UTC")),
        String::new(),
        "Fields".to_string(),
    ];

    for (key, value) in &request.fields {
        let value = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(format!("  {key}: {value}"));
    }

    let Some(review) = request.review() else {
        lines.push(String::new());
        lines.push("No narrative supplied; add one to get a draft review.".to_string());
        return lines;
    };

    lines.push(String::new());
    lines.push(format!(
        "Draft review ({} words, {} characters)",
        review.metrics.words, review.metrics.chars
    ));
    lines.push(format!("  Summary: {}", review.summary));
    lines.push(format!("  Strengths: {}", review.strengths.join(", ")));
    if review.risks.is_empty() {
        lines.push("  Risks: none flagged".to_string());
    } else {
        lines.push(format!("  Risks: {}", review.risks.join(", ")));
    }
    lines.push("  Next steps:".to_string());
    lines.extend(review.next_steps.iter().map(|step| format!("    - {step}")));
    lines
}
