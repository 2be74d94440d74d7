use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::Notify;

use super::Message;

#[derive(Debug)]
struct MailboxState {
    queue: VecDeque<Arc<Message>>,
    closed: bool,
    dropped: u64,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MailboxState>,
    notify: Notify,
    capacity: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MailboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.queue.clear();
        }
        self.notify.notify_one();
    }
}

/// Outcome of pushing one message into a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// Queued after evicting the oldest undelivered message.
    DroppedOldest,
    Closed,
}

/// Producer end of a session mailbox, held by the registry and fed by the bus.
#[derive(Debug, Clone)]
pub struct Subscription {
    shared: Arc<Shared>,
}

/// Consumer end of a session mailbox. Dropping it closes the mailbox.
#[derive(Debug)]
pub struct Inbox {
    shared: Arc<Shared>,
}

/// Creates a bounded drop-oldest mailbox. A capacity of zero is raised to one.
pub fn bounded(capacity: usize) -> (Subscription, Inbox) {
    let shared = Arc::new(Shared {
        state: Mutex::new(MailboxState {
            queue: VecDeque::with_capacity(capacity.max(1)),
            closed: false,
            dropped: 0,
        }),
        notify: Notify::new(),
        capacity: capacity.max(1),
    });
    (
        Subscription { shared: shared.clone() },
        Inbox { shared },
    )
}

impl Subscription {
    /// Never blocks: a full queue loses its oldest entry instead.
    pub(crate) fn push(&self, message: Arc<Message>) -> Delivery {
        let delivery = {
            let mut state = self.shared.lock();
            if state.closed {
                return Delivery::Closed;
            }
            let delivery = if state.queue.len() >= self.shared.capacity {
                state.queue.pop_front();
                state.dropped += 1;
                Delivery::DroppedOldest
            } else {
                Delivery::Queued
            };
            state.queue.push_back(message);
            delivery
        };
        self.shared.notify.notify_one();
        delivery
    }

    /// Stops delivery and discards everything still queued.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }
}

impl Inbox {
    /// Waits for the next message. Returns `None` once the mailbox is closed.
    pub async fn recv(&mut self) -> Option<Arc<Message>> {
        loop {
            {
                let mut state = self.shared.lock();
                if state.closed {
                    return None;
                }
                if let Some(message) = state.queue.pop_front() {
                    return Some(message);
                }
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<Arc<Message>> {
        let mut state = self.shared.lock();
        if state.closed {
            return None;
        }
        state.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn dropped(&self) -> u64 {
        self.shared.lock().dropped
    }

    pub fn into_stream(self) -> impl Stream<Item = Arc<Message>> {
        futures::stream::unfold(self, |mut inbox| async move {
            let message = inbox.recv().await?;
            Some((message, inbox))
        })
    }
}

impl Drop for Inbox {
    fn drop(&mut self) {
        self.shared.close();
    }
}
