//! Transfer notifications
//!
//! Completed transfers are handed to a [`NotificationGateway`] from a
//! dedicated actor task so gateway latency never holds up a transfer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                LedgerEngine (many tasks)              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ NotifierHandle::notify (try_send)
//!                       ▼
//!            mpsc::channel (bounded, drops when full)
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              NotifierActor (single task)              │
//! │        gateway.notify(&event) → log on failure        │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::{metrics::Metrics, types::TransferCompleted, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Sink for completed-transfer events
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Deliver one event. Errors are logged by the caller, never retried.
    async fn notify(&self, event: &TransferCompleted) -> Result<()>;
}

/// Gateway that only writes the event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationGateway for LogNotifier {
    async fn notify(&self, event: &TransferCompleted) -> Result<()> {
        tracing::info!(
            transfer_id = %event.transfer_id,
            transaction_id = %event.transaction_id,
            sender = ?event.sender.as_ref().map(|s| s.as_str()),
            receiver = %event.receiver,
            amount = %event.amount,
            mode = %event.mode,
            "Transfer notification"
        );
        Ok(())
    }
}

/// Message sent to the notifier actor
enum NotifierMessage {
    /// Deliver an event
    Deliver(TransferCompleted),

    /// Reply once every earlier message has been handled
    Flush { response: oneshot::Sender<()> },

    /// Stop after the messages already queued
    Shutdown,
}

/// Actor that owns the gateway
struct NotifierActor {
    gateway: Arc<dyn NotificationGateway>,
    mailbox: mpsc::Receiver<NotifierMessage>,
    metrics: Metrics,
}

impl NotifierActor {
    async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                NotifierMessage::Deliver(event) => {
                    if let Err(e) = self.gateway.notify(&event).await {
                        self.metrics.notification_failures.inc();
                        tracing::error!(
                            transfer_id = %event.transfer_id,
                            error = %e,
                            "Notification delivery failed"
                        );
                    }
                }
                NotifierMessage::Flush { response } => {
                    let _ = response.send(());
                }
                NotifierMessage::Shutdown => break,
            }
        }

        tracing::debug!("Notifier stopped");
    }
}

/// Handle for queueing notifications
#[derive(Clone)]
pub struct NotifierHandle {
    sender: Option<mpsc::Sender<NotifierMessage>>,
    metrics: Metrics,
}

impl std::fmt::Debug for NotifierHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierHandle")
            .field("enabled", &self.sender.is_some())
            .finish()
    }
}

impl NotifierHandle {
    /// Handle that discards every event
    pub fn disabled(metrics: Metrics) -> Self {
        Self {
            sender: None,
            metrics,
        }
    }

    /// Queue an event without waiting. A full or closed mailbox drops it.
    pub fn notify(&self, event: TransferCompleted) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(NotifierMessage::Deliver(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(NotifierMessage::Deliver(event))) => {
                self.metrics.notifications_dropped.inc();
                tracing::warn!(
                    transfer_id = %event.transfer_id,
                    "Notifier mailbox full, dropping notification"
                );
            }
            Err(_) => {
                self.metrics.notifications_dropped.inc();
                tracing::warn!("Notifier stopped, dropping notification");
            }
        }
    }

    /// Wait until every event queued before this call has been handled
    pub async fn flush(&self) -> Result<()> {
        let Some(sender) = &self.sender else {
            return Ok(());
        };

        let (tx, rx) = oneshot::channel();
        sender
            .send(NotifierMessage::Flush { response: tx })
            .await
            .map_err(|_| Error::Concurrency("Notifier mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Stop the actor after the queued events
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(sender) = &self.sender {
            sender
                .send(NotifierMessage::Shutdown)
                .await
                .map_err(|_| Error::Concurrency("Notifier mailbox closed".to_string()))?;
        }
        Ok(())
    }
}

/// Spawn the notifier actor
pub fn spawn_notifier(
    gateway: Arc<dyn NotificationGateway>,
    mailbox_capacity: usize,
    metrics: Metrics,
) -> NotifierHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = NotifierActor {
        gateway,
        mailbox: rx,
        metrics: metrics.clone(),
    };

    tokio::spawn(async move {
        actor.run().await;
    });

    NotifierHandle {
        sender: Some(tx),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountNumber, TransactionMode};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tokio::sync::{Mutex, Notify};
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingGateway {
        events: Mutex<Vec<TransferCompleted>>,
    }

    #[async_trait]
    impl NotificationGateway for RecordingGateway {
        async fn notify(&self, event: &TransferCompleted) -> Result<()> {
            self.events.lock().await.push(event.clone());
            Ok(())
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl NotificationGateway for FailingGateway {
        async fn notify(&self, _event: &TransferCompleted) -> Result<()> {
            Err(Error::Internal("smtp down".into()))
        }
    }

    /// Blocks every delivery until released
    struct StalledGateway {
        release: Notify,
    }

    #[async_trait]
    impl NotificationGateway for StalledGateway {
        async fn notify(&self, _event: &TransferCompleted) -> Result<()> {
            self.release.notified().await;
            Ok(())
        }
    }

    fn event(n: u64) -> TransferCompleted {
        TransferCompleted {
            transfer_id: Uuid::now_v7(),
            transaction_id: crate::types::transaction_id(n),
            sender: Some(AccountNumber::new("1000000001")),
            receiver: AccountNumber::new("1000000002"),
            amount: Decimal::new(20000, 2),
            mode: TransactionMode::Upi,
            description: None,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let gateway = Arc::new(RecordingGateway::default());
        let handle = spawn_notifier(gateway.clone(), 16, Metrics::new().unwrap());

        handle.notify(event(1));
        handle.notify(event(2));
        handle.flush().await.unwrap();

        let events = gateway.events.lock().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].transaction_id, "TXN_000001");
        assert_eq!(events[1].transaction_id, "TXN_000002");
    }

    #[tokio::test]
    async fn test_gateway_failure_is_counted() {
        let metrics = Metrics::new().unwrap();
        let handle = spawn_notifier(Arc::new(FailingGateway), 16, metrics.clone());

        handle.notify(event(1));
        handle.flush().await.unwrap();

        assert_eq!(metrics.notification_failures.get(), 1);
    }

    #[tokio::test]
    async fn test_full_mailbox_drops() {
        let metrics = Metrics::new().unwrap();
        let gateway = Arc::new(StalledGateway {
            release: Notify::new(),
        });
        let handle = spawn_notifier(gateway.clone(), 1, metrics.clone());

        // First event is taken by the actor and stalls, second fills the
        // mailbox, the rest are dropped
        handle.notify(event(1));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        for n in 2..6 {
            handle.notify(event(n));
        }

        assert_eq!(metrics.notifications_dropped.get(), 3);
    }

    #[tokio::test]
    async fn test_disabled_handle() {
        let handle = NotifierHandle::disabled(Metrics::new().unwrap());
        handle.notify(event(1));
        handle.flush().await.unwrap();
        handle.shutdown().await.unwrap();
    }
}
