//! Draft review of a grant request's narrative.
//!
//! A quick heuristic pass over the free text an operator pasted into a request. It flags the
//! gaps reviewers most often bounce applications for (too short, no budget, no timeline) and is
//! sent to Grant-Forge alongside the fields, printed in local drafts, and shown on the admin list.

use serde::Serialize;

use super::request::GrantRequest;

/// Characters of the narrative kept as the summary.
pub const SUMMARY_CHARS: usize = 300;

/// Narratives with fewer words than this are flagged as thin.
pub const MIN_DETAILED_WORDS: usize = 50;

pub const RISK_TOO_LITTLE_DETAIL: &str = "Too little detail";
pub const RISK_NO_BUDGET: &str = "No budget mentioned";
pub const RISK_NO_TIMELINE: &str = "No timeline mentioned";

const NEXT_STEPS: [&str; 3] = [
    "Expand project description",
    "Add budget section",
    "Define timeline",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftMetrics {
    pub chars: usize,
    pub words: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftReview {
    pub summary: String,
    pub metrics: DraftMetrics,
    pub strengths: Vec<String>,
    pub risks: Vec<String>,
    pub next_steps: Vec<String>,
}

/// Review a narrative. Returns `None` when there is nothing to review.
pub fn review_draft(text: &str) -> Option<DraftReview> {
    if text.trim().is_empty() {
        return None;
    }

    let words = text.split_whitespace().count();
    let lowered = text.to_lowercase();

    let mut risks = Vec::new();
    if words < MIN_DETAILED_WORDS {
        risks.push(RISK_TOO_LITTLE_DETAIL.to_string());
    }
    if !lowered.contains("budget") {
        risks.push(RISK_NO_BUDGET.to_string());
    }
    if !lowered.contains("timeline") {
        risks.push(RISK_NO_TIMELINE.to_string());
    }

    let strength = if words > MIN_DETAILED_WORDS {
        "Clear intent"
    } else {
        "Concise idea"
    };

    Some(DraftReview {
        summary: text.chars().take(SUMMARY_CHARS).collect(),
        metrics: DraftMetrics {
            chars: text.chars().count(),
            words,
        },
        strengths: vec![strength.to_string()],
        risks,
        next_steps: NEXT_STEPS.iter().map(|s| s.to_string()).collect(),
    })
}

impl GrantRequest {
    /// Review this request's narrative, if it has one.
    pub fn review(&self) -> Option<DraftReview> {
        self.narrative().and_then(review_draft)
    }
}
