//! Fire-and-forget notification dispatch.
//!
//! [`Notifier`] is a cheap cloneable handle over an unbounded channel. Sending never
//! blocks and never fails the caller; a dispatcher task drains the channel into a
//! [`NotificationSink`] and logs delivery failures. Messages from one sender arrive in
//! the order they were emitted.

use crate::errors::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// A best-effort text message channel.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Delivers one message. Failures are logged by the caller and never retried.
    async fn send(&self, message: &str) -> Result<()>;
}

/// Sink that only writes messages to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: &str) -> Result<()> {
        info!(target: "notifications", "{message}");
        Ok(())
    }
}

/// Handle used by the core to emit notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<String>,
}

impl Notifier {
    /// Spawns a dispatcher task delivering into `sink`.
    ///
    /// The task ends once every `Notifier` clone is dropped and the queue is drained.
    #[must_use]
    pub fn spawn(sink: Arc<dyn NotificationSink>) -> (Self, JoinHandle<()>) {
        let (notifier, mut rx) = Self::channel();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(&message).await {
                    warn!("Dropping notification after delivery failure: {}", e);
                }
            }
            debug!("Notification dispatcher stopped");
        });
        (notifier, handle)
    }

    /// A notifier paired with the raw receiving end, for callers that deliver
    /// messages themselves.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queues `message` for delivery. Never blocks and never fails.
    pub fn notify(&self, message: impl Into<String>) {
        if self.tx.send(message.into()).is_err() {
            warn!("Notification dispatcher is gone, message dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::errors::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FlakySink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NotificationSink for FlakySink {
        async fn send(&self, message: &str) -> Result<()> {
            if message.contains("fail") {
                return Err(Error::Notification {
                    message: "channel offline".to_string(),
                });
            }
            self.delivered.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dispatcher_delivers_in_order_and_survives_failures() {
        let sink = Arc::new(FlakySink::default());
        let (notifier, handle) = Notifier::spawn(Arc::clone(&sink) as Arc<dyn NotificationSink>);

        notifier.notify("first");
        notifier.notify("please fail");
        notifier.notify("third");
        drop(notifier);
        handle.await.unwrap();

        let delivered = sink.delivered.lock().unwrap().clone();
        assert_eq!(delivered, vec!["first".to_string(), "third".to_string()]);
    }

    #[tokio::test]
    async fn test_notify_after_dispatcher_gone_does_not_panic() {
        let (notifier, rx) = Notifier::channel();
        drop(rx);
        notifier.notify("nobody listens");
    }

    #[tokio::test]
    async fn test_log_sink_accepts_messages() {
        assert!(LogSink.send("hello").await.is_ok());
    }
}
