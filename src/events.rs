//! Progress and failure notifications.
//!
//! The coordinator writes to an [`UploadEvents`] registry; presentation code
//! reads from it either through callbacks or through [`UploadEvents::subscribe`].

use tokio::sync::mpsc;

use crate::error::UploadError;

/// Progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadStatus {
    pub part_number: u32,
    pub estimated_parts: u32,
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
}

/// Informational failure notice. Control flow never depends on it.
#[derive(Debug, Clone)]
pub struct UploadFailure {
    pub message: String,
    pub cause: UploadError,
}

#[derive(Debug, Clone)]
pub enum UploadEvent {
    Status(UploadStatus),
    Failure(UploadFailure),
}

type StatusHandler = Box<dyn Fn(&UploadStatus) + Send + Sync>;
type FailureHandler = Box<dyn Fn(&UploadFailure) + Send + Sync>;

/// Two independent subscriber lists, invoked synchronously in registration order.
#[derive(Default)]
pub struct UploadEvents {
    status: Vec<StatusHandler>,
    failure: Vec<FailureHandler>,
}

impl UploadEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status<F>(&mut self, handler: F)
    where
        F: Fn(&UploadStatus) + Send + Sync + 'static,
    {
        self.status.push(Box::new(handler));
    }

    pub fn on_failure<F>(&mut self, handler: F)
    where
        F: Fn(&UploadFailure) + Send + Sync + 'static,
    {
        self.failure.push(Box::new(handler));
    }

    /// Returns a receiver carrying both streams in production order.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<UploadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let failure_tx = tx.clone();
        self.on_status(move |status| {
            let _ = tx.send(UploadEvent::Status(*status));
        });
        self.on_failure(move |failure| {
            let _ = failure_tx.send(UploadEvent::Failure(failure.clone()));
        });
        rx
    }

    pub(crate) fn emit_status(&self, status: UploadStatus) {
        for handler in &self.status {
            handler(&status);
        }
    }

    pub(crate) fn emit_failure(&self, message: impl Into<String>, cause: UploadError) {
        if self.failure.is_empty() {
            return;
        }
        let failure = UploadFailure {
            message: message.into(),
            cause,
        };
        for handler in &self.failure {
            handler(&failure);
        }
    }
}

impl std::fmt::Debug for UploadEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadEvents")
            .field("status_handlers", &self.status.len())
            .field("failure_handlers", &self.failure.len())
            .finish()
    }
}
