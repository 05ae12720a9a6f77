//! Grant request lifecycle.
//!
//! [`GrantConsole`] is what the admin routes call. Each operation is one synchronous step:
//! load or claim the request, make at most one collaborator call, and record the outcome through
//! [`RequestStore::update_status`]. Collaborator failures leave the stored request as it was
//! and are returned to the caller for the operator to retry by hand.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use parking_lot::Mutex;

use crate::error::{ConsoleError, Result};
use crate::generator::ReportGenerator;
use crate::mailer::Mailer;
use crate::request::{
    GrantRequest, NewGrantRequest, RequestId, RequestStatus, StatusUpdate, validate_address,
};
use crate::storage::RequestStore;

/// Shared handle to the store and collaborators. Cheap to clone.
#[derive(Clone)]
pub struct GrantConsole {
    store: Arc<dyn RequestStore>,
    generator: Arc<dyn ReportGenerator>,
    mailer: Arc<dyn Mailer>,
    /// Requests with a send in flight in this process
    deliveries: Arc<Mutex<HashSet<RequestId>>>,
}

/// Marks a delivery in flight until dropped.
struct DeliveryGuard {
    deliveries: Arc<Mutex<HashSet<RequestId>>>,
    id: RequestId,
}

impl Drop for DeliveryGuard {
    fn drop(&mut self) {
        self.deliveries.lock().remove(&self.id);
    }
}

impl GrantConsole {
    pub fn new(
        store: Arc<dyn RequestStore>,
        generator: Arc<dyn ReportGenerator>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            generator,
            mailer,
            deliveries: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    #[tracing::instrument(skip(self, input), fields(fields = input.fields.len()))]
    pub async fn create(&self, input: NewGrantRequest) -> Result<GrantRequest> {
        let request = self.store.create(input).await?;
        counter!("grant_console_transitions_total", "to" => RequestStatus::Created.as_str())
            .increment(1);
        tracing::info!(request_id = %request.id, "Created grant request");
        Ok(request)
    }

    pub async fn list(&self) -> Result<Vec<GrantRequest>> {
        self.store.list().await
    }

    pub async fn get(&self, id: RequestId) -> Result<GrantRequest> {
        self.store.get(id).await
    }

    /// Generate the request's report.
    ///
    /// The request is claimed (`running`) before the generator is called so a second run of the
    /// same request is rejected while the first is in flight. On failure the claim is released
    /// and the generator's error returned.
    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn run(&self, id: RequestId) -> Result<GrantRequest> {
        let claimed = self
            .store
            .update_status(id, StatusUpdate::Claim { run_at: Utc::now() })
            .await?;
        record_transition(RequestStatus::Running);

        let file_path = match self.generator.generate(&claimed).await {
            Ok(file_path) => file_path,
            Err(e) => {
                counter!("grant_console_generation_failures_total").increment(1);
                tracing::warn!(error = %e, "Report generation failed, releasing claim");
                if let Err(release_err) = self.store.update_status(id, StatusUpdate::Release).await
                {
                    // Archived or deleted while we were generating
                    tracing::warn!(error = %release_err, "Could not release generation claim");
                }
                return Err(e.into());
            }
        };

        match self
            .store
            .update_status(
                id,
                StatusUpdate::Generated {
                    file_path: file_path.clone(),
                },
            )
            .await
        {
            Ok(generated) => {
                record_transition(RequestStatus::Generated);
                tracing::info!(path = %file_path.display(), "Report generated");
                Ok(generated)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Request changed during generation, discarding report");
                remove_report(&file_path).await;
                Err(e)
            }
        }
    }

    /// Send the generated report and mark the request delivered.
    ///
    /// `recipient` overrides the address captured when the request was created. A second
    /// delivery of the same request while the first is still sending is rejected with
    /// [`ConsoleError::DeliveryInProgress`], so the recipient gets one mail.
    #[tracing::instrument(skip(self, recipient), fields(request_id = %id))]
    pub async fn deliver(&self, id: RequestId, recipient: Option<String>) -> Result<GrantRequest> {
        let _guard = self.begin_delivery(id)?;
        let request = self.store.get(id).await?;

        if !request.status.can_transition_to(RequestStatus::Delivered) {
            return Err(ConsoleError::InvalidTransition {
                id,
                from: request.status,
                to: RequestStatus::Delivered,
            });
        }
        let file_path = request
            .file_path
            .clone()
            .ok_or(ConsoleError::FileMissing(id))?;
        if !tokio::fs::try_exists(&file_path).await? {
            return Err(ConsoleError::FileMissing(id));
        }

        let recipient = recipient
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .or_else(|| request.recipient.clone())
            .ok_or_else(|| {
                ConsoleError::Validation("No recipient given and none on the request".to_string())
            })?;
        validate_address(&recipient)?;

        if let Err(e) = self.mailer.send(&file_path, &recipient, &request).await {
            counter!("grant_console_send_failures_total").increment(1);
            tracing::warn!(error = %e, "Delivery failed");
            return Err(e.into());
        }

        let delivered = self
            .store
            .update_status(
                id,
                StatusUpdate::Delivered {
                    delivered_at: Utc::now(),
                    recipient,
                },
            )
            .await?;
        record_transition(RequestStatus::Delivered);
        tracing::info!("Report delivered");
        Ok(delivered)
    }

    fn begin_delivery(&self, id: RequestId) -> Result<DeliveryGuard> {
        if !self.deliveries.lock().insert(id) {
            return Err(ConsoleError::DeliveryInProgress(id));
        }
        Ok(DeliveryGuard {
            deliveries: self.deliveries.clone(),
            id,
        })
    }

    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn archive(&self, id: RequestId) -> Result<GrantRequest> {
        let archived = self.store.update_status(id, StatusUpdate::Archived).await?;
        record_transition(RequestStatus::Archived);
        tracing::info!("Archived grant request");
        Ok(archived)
    }

    /// Remove the request and its generated report.
    #[tracing::instrument(skip(self), fields(request_id = %id))]
    pub async fn delete(&self, id: RequestId) -> Result<()> {
        let removed = self.store.delete(id).await?;
        if let Some(file_path) = &removed.file_path {
            remove_report(file_path).await;
        }
        counter!("grant_console_deletions_total").increment(1);
        tracing::info!("Deleted grant request");
        Ok(())
    }

    /// Open the request's generated report for streaming.
    pub async fn open_report(&self, id: RequestId) -> Result<(GrantRequest, tokio::fs::File)> {
        let request = self.store.get(id).await?;
        let file_path = request
            .file_path
            .as_ref()
            .ok_or(ConsoleError::FileMissing(id))?;

        let file = tokio::fs::File::open(file_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConsoleError::FileMissing(id)
            } else {
                ConsoleError::Io(e)
            }
        })?;

        Ok((request, file))
    }

    /// Release runs left `running` by a previous process.
    pub async fn release_stale_runs(&self, timeout: Duration) -> Result<usize> {
        let timeout = chrono::Duration::from_std(timeout)
            .map_err(|e| ConsoleError::Config(format!("Stale run timeout out of range: {e}")))?;
        self.store.release_stale_runs(Utc::now() - timeout).await
    }
}

fn record_transition(to: RequestStatus) {
    counter!("grant_console_transitions_total", "to" => to.as_str()).increment(1);
}

async fn remove_report(file_path: &std::path::Path) {
    match tokio::fs::remove_file(file_path).await {
        Ok(()) => tracing::debug!(path = %file_path.display(), "Removed report"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %file_path.display(), error = %e, "Failed to remove report")
        }
    }
}
