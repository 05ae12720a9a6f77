//! Report delivery.
//!
//! This module defines the [`Mailer`] trait used by the "mark delivered" action. The SMTP
//! implementation actually sends the report; [`ManualDelivery`] covers setups where the operator
//! mails it themselves and only confirms here.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::SendError;
use crate::request::{GrantRequest, RequestId};

mod smtp;

pub use smtp::SmtpMailer;

/// Trait for delivering a generated report to a recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver `file_path` to `recipient`.
    async fn send(
        &self,
        file_path: &Path,
        recipient: &str,
        request: &GrantRequest,
    ) -> Result<(), SendError>;
}

/// Mailer for operators who send reports outside the console.
///
/// Delivery is a confirmation: nothing is sent, the console only records who it went to.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualDelivery;

#[async_trait]
impl Mailer for ManualDelivery {
    async fn send(
        &self,
        file_path: &Path,
        recipient: &str,
        request: &GrantRequest,
    ) -> Result<(), SendError> {
        tracing::info!(
            request_id = %request.id,
            recipient,
            path = %file_path.display(),
            "Delivery confirmed by operator (no SMTP configured)"
        );
        Ok(())
    }
}

// ============================================================================
// Test/Mock Implementation
// ============================================================================

/// Record of a call made to the mock mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockDelivery {
    pub request_id: RequestId,
    pub file_path: PathBuf,
    pub recipient: String,
}

/// Mock mailer for testing.
///
/// Returns scripted outcomes in FIFO order; with nothing scripted every send succeeds.
#[derive(Clone, Default)]
pub struct MockMailer {
    responses: Arc<Mutex<VecDeque<MockSend>>>,
    calls: Arc<Mutex<Vec<MockDelivery>>>,
}

enum MockSend {
    Immediate(Result<(), SendError>),
    /// Waits for the trigger before returning
    Triggered {
        response: Result<(), SendError>,
        trigger: oneshot::Receiver<()>,
    },
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&self, response: Result<(), SendError>) {
        self.responses.lock().push_back(MockSend::Immediate(response));
    }

    /// Queue an outcome that is only returned once the returned sender fires (or is dropped).
    pub fn add_response_with_trigger(
        &self,
        response: Result<(), SendError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.responses.lock().push_back(MockSend::Triggered {
            response,
            trigger: rx,
        });
        tx
    }

    pub fn get_calls(&self) -> Vec<MockDelivery> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(
        &self,
        file_path: &Path,
        recipient: &str,
        request: &GrantRequest,
    ) -> Result<(), SendError> {
        self.calls.lock().push(MockDelivery {
            request_id: request.id,
            file_path: file_path.to_path_buf(),
            recipient: recipient.to_string(),
        });
        let next = self.responses.lock().pop_front();
        match next {
            Some(MockSend::Immediate(response)) => response,
            Some(MockSend::Triggered { response, trigger }) => {
                let _ = trigger.await;
                response
            }
            None => Ok(()),
        }
    }
}
