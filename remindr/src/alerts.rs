//! Live deadline alerts pushed to open browser pages.
//!
//! Every reminder that goes out is also published here and streamed to
//! subscribers as Server-Sent Events named `deadline_alert`.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;

use crate::reminder::ReminderKind;
use crate::task::Task;

const ALERT_CHANNEL_CAPACITY: usize = 64;

/// Payload of a `deadline_alert` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadlineAlert {
    pub task_id: u32,
    pub title: String,
    pub due: String,
    pub when: String,
}

impl DeadlineAlert {
    pub fn new(task: &Task, kind: ReminderKind) -> Self {
        Self {
            task_id: task.id(),
            title: task.title().to_string(),
            due: task.due_display(),
            when: kind.lead_time().to_string(),
        }
    }
}

/// Fan-out channel of deadline alerts.
///
/// Closing the channel ends every open event stream, which lets the server
/// finish a graceful shutdown while browsers are still subscribed.
#[derive(Clone, Debug)]
pub struct DeadlineAlerts {
    sender: broadcast::Sender<DeadlineAlert>,
    closed: Arc<watch::Sender<bool>>,
}

impl DeadlineAlerts {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        let (closed, _) = watch::channel(false);
        Self {
            sender,
            closed: Arc::new(closed),
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Publishes `alert` to current subscribers and returns how many got it.
    pub fn publish(&self, alert: DeadlineAlert) -> usize {
        // An error only means nobody is listening right now.
        self.sender.send(alert).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeadlineAlert> {
        self.sender.subscribe()
    }
}

impl Default for DeadlineAlerts {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns a subscription into a stream of SSE events. Lagging subscribers
/// skip the alerts they missed; queued alerts are flushed before a close
/// takes effect.
fn alert_events(
    receiver: broadcast::Receiver<DeadlineAlert>,
    mut closed: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    // Also covers subscriptions made after the channel was closed.
    closed.mark_changed();
    futures::stream::unfold((receiver, closed), |(mut receiver, mut closed)| async move {
        loop {
            tokio::select! {
                biased;
                received = receiver.recv() => match received {
                    Ok(alert) => match Event::default().event("deadline_alert").json_data(&alert) {
                        Ok(event) => return Some((Ok(event), (receiver, closed))),
                        Err(err) => tracing::warn!("Failed to encode deadline alert: {}", err),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("Alert subscriber lagged, skipped {} alerts", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
                changed = closed.changed() => {
                    if changed.is_err() || *closed.borrow() {
                        return None;
                    }
                }
            }
        }
    })
}

/// Handler for GET /alerts that streams deadline alerts.
#[tracing::instrument(skip(alerts))]
async fn alerts_handler(
    State(alerts): State<DeadlineAlerts>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = alert_events(alerts.subscribe(), alerts.closed.subscribe());
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// Creates and returns the alerts router.
pub fn create_alerts_router(alerts: DeadlineAlerts) -> Router {
    Router::new()
        .route("/alerts", get(alerts_handler))
        .with_state(alerts)
}
