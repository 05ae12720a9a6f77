//! Request storage.
//!
//! This module defines the [`RequestStore`] trait, the persistence interface the console and
//! web layer are written against, plus its implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{ConsoleError, Result};
use crate::request::{GrantRequest, NewGrantRequest, RequestId, StatusUpdate};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Storage trait for persisting and querying grant requests.
///
/// `update_status` is the only way to change a stored request. Implementations load the row
/// under a lock, run [`GrantRequest::apply`] and write the result, so the forward-only status
/// machine holds no matter which handler asked for the change.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new request in the `created` status.
    async fn create(&self, input: NewGrantRequest) -> Result<GrantRequest>;

    /// All requests, newest first.
    async fn list(&self) -> Result<Vec<GrantRequest>>;

    /// Get a request by ID.
    ///
    /// # Errors
    /// [`ConsoleError::RequestNotFound`] if no such request exists.
    async fn get(&self, id: RequestId) -> Result<GrantRequest>;

    /// Validate and apply a status update, returning the updated request.
    ///
    /// # Errors
    /// - [`ConsoleError::RequestNotFound`] if no such request exists
    /// - [`ConsoleError::InvalidTransition`] if the update is not allowed from the stored status
    async fn update_status(&self, id: RequestId, update: StatusUpdate) -> Result<GrantRequest>;

    /// Permanently remove a request, returning the removed row.
    async fn delete(&self, id: RequestId) -> Result<GrantRequest>;

    /// IDs of requests that have been `running` since before `older_than`.
    async fn stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<RequestId>>;

    /// Return requests stuck in `running` to `created`.
    ///
    /// A run only stays `running` for the length of one generator call, so anything older than
    /// the cutoff belongs to a process that died mid-generation. Returns how many were released.
    #[tracing::instrument(skip(self))]
    async fn release_stale_runs(&self, older_than: DateTime<Utc>) -> Result<usize> {
        let mut released = 0;

        for id in self.stale_runs(older_than).await? {
            match self.update_status(id, StatusUpdate::Release).await {
                Ok(_) => released += 1,
                // Finished, archived, or deleted since we looked
                Err(ConsoleError::InvalidTransition { .. } | ConsoleError::RequestNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if released > 0 {
            tracing::warn!(
                released,
                "Released stale generation runs (likely due to a crash mid-run)"
            );
        }

        Ok(released)
    }
}
