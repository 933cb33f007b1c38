//! In-process notifier bus.
//!
//! Single topic: "an event was stored". The real-time listener publishes
//! after each successful store; the event processor subscribes and uses the
//! notice to drain incrementally. Delivery is fire-and-forget and lossy
//! under lag - the event log remains the authoritative source, a missed
//! notice only delays processing until the next one (or the fallback tick).

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::primitives::BlockNumber;

/// Queued notices per subscriber before the oldest are dropped.
const BUS_CAPACITY: usize = 1024;

/// Notice that an event row was committed to the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStored {
    /// Chain that owns the event.
    pub chain_id: Uuid,
    /// Id of the stored row.
    pub event_id: Uuid,
    /// Block the event belongs to.
    pub block_number: BlockNumber,
}

/// Broadcast wrapper for the `blockchain.event.stored` topic.
#[derive(Debug, Clone)]
pub struct NotifierBus {
    sender: broadcast::Sender<EventStored>,
}

impl Default for NotifierBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifierBus {
    /// Create a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    /// Publish a notice. Never blocks; a bus with no subscribers is fine.
    pub fn publish(&self, notice: EventStored) {
        let _ = self.sender.send(notice);
    }

    /// Subscribe to stored-event notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EventStored> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
