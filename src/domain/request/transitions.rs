//! Status transitions for grant requests.
//!
//! Every change to a request's lifecycle columns goes through [`GrantRequest::apply`], which
//! validates the move with [`RequestStatus::transition`] before touching any field. Storage
//! implementations call it while holding the row, so handlers never patch status fields directly.
//!
//! ```text
//! Created ──claim──> Running ──generated──> Generated ──delivered──> Delivered
//!                       │
//!                       └──release──> Created   (generation failed, row restored)
//!
//! any status ──archived──> Archived
//! ```
//!
//! Timestamps only move forward: `run_at` is stamped by the claim and `delivered_at` by the
//! delivery. A release restores the row exactly as it was before the claim, so a failed run
//! leaves no trace.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::error::{ConsoleError, Result};

use super::state::{GrantRequest, RequestStatus, stored_timestamp};

/// A requested change to a request's lifecycle columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Start a generation run.
    Claim { run_at: DateTime<Utc> },
    /// Abandon a run that did not produce a file.
    Release,
    /// Record the generated report.
    Generated { file_path: PathBuf },
    /// Record a successful delivery.
    Delivered {
        delivered_at: DateTime<Utc>,
        recipient: String,
    },
    /// Move out of the active workflow. Other fields are left untouched.
    Archived,
}

impl StatusUpdate {
    /// The status a request ends up in after this update.
    pub fn target(&self) -> RequestStatus {
        match self {
            StatusUpdate::Claim { .. } => RequestStatus::Running,
            StatusUpdate::Release => RequestStatus::Created,
            StatusUpdate::Generated { .. } => RequestStatus::Generated,
            StatusUpdate::Delivered { .. } => RequestStatus::Delivered,
            StatusUpdate::Archived => RequestStatus::Archived,
        }
    }
}

impl RequestStatus {
    /// Whether a request may move from `self` to `next`.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, next),
            (Created, Running)
                | (Running, Generated)
                | (Running, Created)
                | (Generated, Delivered)
                | (_, Archived)
        )
    }

    /// The single transition function: returns the next status or rejects the move.
    pub fn transition(
        self,
        update: &StatusUpdate,
    ) -> std::result::Result<RequestStatus, RequestStatus> {
        let next = update.target();
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(self)
        }
    }
}

impl GrantRequest {
    /// Apply a status update, returning the updated request.
    ///
    /// # Errors
    /// [`ConsoleError::InvalidTransition`] when the update is not allowed from the current
    /// status; the request is left as it was.
    pub fn apply(mut self, update: StatusUpdate) -> Result<GrantRequest> {
        let next = self
            .status
            .transition(&update)
            .map_err(|from| ConsoleError::InvalidTransition {
                id: self.id,
                from,
                to: update.target(),
            })?;

        match update {
            StatusUpdate::Claim { run_at } => {
                self.run_at = Some(stored_timestamp(run_at));
            }
            StatusUpdate::Release => {
                // A created request has never completed a run
                self.run_at = None;
                self.file_path = None;
            }
            StatusUpdate::Generated { file_path } => {
                self.file_path = Some(file_path);
            }
            StatusUpdate::Delivered {
                delivered_at,
                recipient,
            } => {
                self.delivered_at = Some(stored_timestamp(delivered_at));
                self.delivered_to = Some(recipient);
            }
            StatusUpdate::Archived => {}
        }

        self.status = next;
        Ok(self)
    }
}
