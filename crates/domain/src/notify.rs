//! Notification collaborator.
//!
//! The services treat notifications as one-way outbound messages: dispatch
//! happens on a spawned task and the outcome never reaches the caller of
//! the primary operation. Failures are logged and dropped.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// Notification delivery failure.
#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification sender.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that only logs. The default runtime stand-in for a mail
/// provider integration.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        tracing::info!(%to, %subject, "notification sent");
        Ok(())
    }
}

/// A notification recorded by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentMail>,
    fail_on_send: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<RwLock<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Number of notifications delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// All notifications delivered so far.
    pub fn sent(&self) -> Vec<SentMail> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(NotifyError("simulated delivery failure".to_string()));
        }

        state.sent.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_mail() {
        let notifier = InMemoryNotifier::new();
        notifier
            .send("ada@example.com", "Hello", "Body")
            .await
            .unwrap();

        assert_eq!(notifier.sent_count(), 1);
        assert_eq!(notifier.sent()[0].subject, "Hello");
    }

    #[tokio::test]
    async fn fail_on_send() {
        let notifier = InMemoryNotifier::new();
        notifier.set_fail_on_send(true);

        let result = notifier.send("ada@example.com", "Hello", "Body").await;
        assert!(result.is_err());
        assert_eq!(notifier.sent_count(), 0);
    }
}
