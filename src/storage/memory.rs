//! In-memory request store.
//!
//! Used by the test suite and by the binary when no database is configured. State is lost on
//! restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::RequestStore;
use crate::error::{ConsoleError, Result};
use crate::request::{GrantRequest, NewGrantRequest, RequestId, RequestStatus, StatusUpdate};

#[derive(Clone, Default)]
pub struct InMemoryRequestStore {
    requests: Arc<Mutex<HashMap<RequestId, GrantRequest>>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn create(&self, input: NewGrantRequest) -> Result<GrantRequest> {
        input.validate()?;
        let request = GrantRequest::new(input, Utc::now());
        self.requests.lock().insert(request.id, request.clone());
        Ok(request)
    }

    async fn list(&self) -> Result<Vec<GrantRequest>> {
        let mut requests: Vec<_> = self.requests.lock().values().cloned().collect();
        requests.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.0.cmp(&a.id.0))
        });
        Ok(requests)
    }

    async fn get(&self, id: RequestId) -> Result<GrantRequest> {
        self.requests
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ConsoleError::RequestNotFound(id))
    }

    async fn update_status(&self, id: RequestId, update: StatusUpdate) -> Result<GrantRequest> {
        let mut requests = self.requests.lock();
        let current = requests
            .get(&id)
            .cloned()
            .ok_or(ConsoleError::RequestNotFound(id))?;
        let updated = current.apply(update)?;
        requests.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, id: RequestId) -> Result<GrantRequest> {
        self.requests
            .lock()
            .remove(&id)
            .ok_or(ConsoleError::RequestNotFound(id))
    }

    async fn stale_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<RequestId>> {
        Ok(self
            .requests
            .lock()
            .values()
            .filter(|r| r.status == RequestStatus::Running)
            .filter(|r| r.run_at.is_some_and(|run_at| run_at < older_than))
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn acme() -> NewGrantRequest {
        NewGrantRequest::from_form([("name", "Acme"), ("amount", "5000")]).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_fresh_ids() {
        let store = InMemoryRequestStore::new();
        let a = store.create(acme()).await.unwrap();
        let b = store.create(acme()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, RequestStatus::Created);
        assert_eq!(a.fields.get("amount"), Some(&json!(5000)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_list_is_newest_first() {
        let store = InMemoryRequestStore::new();
        let first = store.create(acme()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(acme()).await.unwrap();

        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_invalid_update_leaves_row_untouched() {
        let store = InMemoryRequestStore::new();
        let request = store.create(acme()).await.unwrap();

        let err = store
            .update_status(
                request.id,
                StatusUpdate::Generated {
                    file_path: PathBuf::from("/tmp/x.pdf"),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ConsoleError::InvalidTransition { .. }));
        assert_eq!(store.get(request.id).await.unwrap(), request);
    }

    #[tokio::test]
    async fn test_delete_then_everything_is_not_found() {
        let store = InMemoryRequestStore::new();
        let request = store.create(acme()).await.unwrap();
        assert_eq!(store.delete(request.id).await.unwrap().id, request.id);

        assert!(matches!(
            store.get(request.id).await,
            Err(ConsoleError::RequestNotFound(_))
        ));
        assert!(matches!(
            store.update_status(request.id, StatusUpdate::Archived).await,
            Err(ConsoleError::RequestNotFound(_))
        ));
        assert!(matches!(
            store.delete(request.id).await,
            Err(ConsoleError::RequestNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_release_stale_runs_only_touches_old_claims() {
        let store = InMemoryRequestStore::new();
        let stale = store.create(acme()).await.unwrap();
        let fresh = store.create(acme()).await.unwrap();

        let an_hour_ago = Utc::now() - chrono::Duration::hours(1);
        store
            .update_status(stale.id, StatusUpdate::Claim { run_at: an_hour_ago })
            .await
            .unwrap();
        store
            .update_status(fresh.id, StatusUpdate::Claim { run_at: Utc::now() })
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(10);
        assert_eq!(store.release_stale_runs(cutoff).await.unwrap(), 1);
        assert_eq!(store.get(stale.id).await.unwrap(), stale);
        assert_eq!(
            store.get(fresh.id).await.unwrap().status,
            RequestStatus::Running
        );
    }
}
