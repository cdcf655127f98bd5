//! Update notifications to registered listeners.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Sent to every subscriber after a measurement cycle updated the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotice {
    /// Sequence number of the completed cycle, starting at 1.
    pub cycle: u64,
    /// Aggregates written to the cache in this cycle.
    pub sites_updated: usize,
    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers the notice was queued for.
    pub delivered: usize,
    /// Subscriber queue was full; the notice was dropped for that subscriber.
    pub dropped: usize,
    /// Subscriber went away; it has been removed.
    pub closed: usize,
}

/// Client id → bounded notification queue.
///
/// Subscribing and unsubscribing may happen from any thread while a
/// broadcast runs. A broadcast works on a snapshot of weak handles, so a
/// client that unsubscribed before its handle is upgraded is skipped.
/// Sending never blocks: a full queue drops the notice.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    subscribers: DashMap<String, mpsc::Sender<UpdateNotice>>,
    capacity: usize,
}

impl SubscriptionRegistry {
    /// Create a registry whose per-client queues hold `capacity` notices.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register `client_id` and return its notification queue.
    ///
    /// Subscribing again under the same id replaces the earlier queue, whose
    /// receiver then reports the channel as closed.
    pub fn subscribe(&self, client_id: impl Into<String>) -> mpsc::Receiver<UpdateNotice> {
        let client_id = client_id.into();
        let (sender, receiver) = mpsc::channel(self.capacity);
        let replaced = self.subscribers.insert(client_id.clone(), sender).is_some();
        tracing::info!(client_id = %client_id, replaced, "Subscribe");
        receiver
    }

    /// Remove `client_id`. Returns whether it was subscribed.
    pub fn unsubscribe(&self, client_id: &str) -> bool {
        let removed = self.subscribers.remove(client_id).is_some();
        tracing::info!(client_id, removed, "Unsubscribe");
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Push `notice` to every current subscriber without waiting.
    pub fn broadcast(&self, notice: &UpdateNotice) -> BroadcastReport {
        let snapshot: Vec<(String, mpsc::WeakSender<UpdateNotice>)> = self
            .subscribers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().downgrade()))
            .collect();

        let mut report = BroadcastReport::default();
        for (client_id, weak) in snapshot {
            let Some(sender) = weak.upgrade() else {
                continue;
            };
            match sender.try_send(notice.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::warn!(
                        client_id = %client_id,
                        cycle = notice.cycle,
                        "Notification queue full, dropping update"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.closed += 1;
                    self.subscribers
                        .remove_if(&client_id, |_, current| current.same_channel(&sender));
                    tracing::debug!(client_id = %client_id, "Removed closed subscriber");
                }
            }
        }
        report
    }
}
