//! Dispatcher: drains the event bus and performs delivery.
//!
//! Publishers return as soon as the event is on the bus. A single consumer
//! delivers events in publish order; delivery errors are logged and
//! discarded.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::Notifier;
use crate::domain::{NotificationEvent, Recipient};

/// Spawns the dispatcher task. It ends when every bus sender is dropped.
pub fn spawn_dispatcher(
    notifier: Arc<Notifier>,
    events: broadcast::Receiver<NotificationEvent>,
) -> JoinHandle<()> {
    tokio::spawn(run_dispatcher(notifier, events))
}

/// Runs the dispatch loop on the current task.
pub async fn run_dispatcher(
    notifier: Arc<Notifier>,
    mut events: broadcast::Receiver<NotificationEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => dispatch(&notifier, event).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(dropped = n, "dispatcher lagged behind event bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::info!("dispatcher stopped");
}

async fn dispatch(notifier: &Notifier, event: NotificationEvent) {
    let command = event.notification.command().to_string();
    match event.recipient {
        Recipient::User(user_id) => {
            if let Err(e) = notifier.notify_one(&user_id, event.notification).await {
                if e.is_delivery_failure() {
                    tracing::warn!(%user_id, %command, error = %e, "recipient unreachable, notification dropped");
                } else {
                    tracing::warn!(%user_id, %command, error = %e, "notification failed");
                }
            }
        }
        Recipient::All => match notifier.notify_all(event.notification).await {
            Ok(report) if !report.failed.is_empty() => {
                tracing::warn!(
                    %command,
                    delivered = report.delivered,
                    failed = report.failed.len(),
                    "broadcast partially delivered"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(%command, error = %e, "broadcast failed"),
        },
    }
}
