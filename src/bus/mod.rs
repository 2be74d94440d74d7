//! Broadcast bus for the chat server
//!
//! Fans every published message out to the mailbox of each live session in
//! the registry. Sequence assignment and fan-out share one lock, so all
//! subscribers see the same global order.

mod mailbox;
mod message;

pub use mailbox::{bounded, Delivery, Inbox, Subscription};
pub use message::{Message, MessageDraft, MessageKind};

use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::registry::{SessionId, SessionRegistry};

#[derive(Debug)]
struct Sequencer {
    last_seq: u64,
    last_timestamp: DateTime<Utc>,
}

impl Sequencer {
    fn next(&mut self) -> (u64, DateTime<Utc>) {
        self.last_seq += 1;
        let now = Utc::now();
        if now > self.last_timestamp {
            self.last_timestamp = now;
        }
        (self.last_seq, self.last_timestamp)
    }
}

#[derive(Debug)]
pub struct BroadcastBus {
    registry: Arc<SessionRegistry>,
    queue_capacity: usize,
    sequencer: Mutex<Sequencer>,
}

impl BroadcastBus {
    pub fn new(registry: Arc<SessionRegistry>, queue_capacity: usize) -> Self {
        Self {
            registry,
            queue_capacity,
            sequencer: Mutex::new(Sequencer {
                last_seq: 0,
                last_timestamp: DateTime::<Utc>::MIN_UTC,
            }),
        }
    }

    /// Opens a mailbox for a session that is about to join.
    pub fn subscribe(&self) -> (Subscription, Inbox) {
        bounded(self.queue_capacity)
    }

    /// Closes the session's mailbox, discarding anything undelivered.
    pub async fn unsubscribe(&self, id: &SessionId) -> bool {
        match self.registry.outbox(id).await {
            Some(outbox) => {
                outbox.close();
                true
            }
            None => false,
        }
    }

    pub async fn publish(&self, draft: MessageDraft) -> Arc<Message> {
        let mut sequencer = self.sequencer.lock().await;
        let recipients = self.registry.recipients().await;
        let (seq, timestamp) = sequencer.next();
        let message = Arc::new(draft.seal(seq, timestamp));

        let mut delivered = 0usize;
        for outbox in &recipients {
            match outbox.push(message.clone()) {
                Delivery::Queued => delivered += 1,
                Delivery::DroppedOldest => {
                    delivered += 1;
                    warn!("Mailbox full, dropped oldest message before #{}", seq);
                }
                Delivery::Closed => {}
            }
        }

        debug!("Published {:?} #{} to {} sessions", message.kind, seq, delivered);
        message
    }

    pub async fn last_sequence(&self) -> u64 {
        self.sequencer.lock().await.last_seq
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}
