/**
 * Write-behind queue
 * 
 * Every message accepted by `CacheClient::cache_message` lands here, whichever
 * cache backend served the call. A drain worker takes the whole queue in one
 * swap and persists it into the primary store.
 * 
 * The queue is FIFO from the point of view of a single producer. `take_all`
 * swaps the buffer out under the same lock that `push` takes, so a message is
 * either in the drained batch or in the queue afterwards, never both.
 * 
 * A batch taken with `take_batch` stays tracked until it is settled or
 * requeued. Removes and edits that arrive meanwhile are remembered and
 * applied if the batch comes back through `requeue_front`.
 */

use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use crate::shared::CachedMessage;

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<CachedMessage>,
    in_flight: HashSet<String>,
    removed_in_flight: HashSet<String>,
    edited_in_flight: HashMap<String, String>,
}

impl QueueState {
    fn release(&mut self, message_id: &str) {
        self.in_flight.remove(message_id);
        self.removed_in_flight.remove(message_id);
        self.edited_in_flight.remove(message_id);
    }
}

#[derive(Debug, Default)]
pub struct WriteBehindQueue {
    state: Mutex<QueueState>,
}

impl WriteBehindQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the back.
    pub async fn push(&self, message: CachedMessage) {
        self.state.lock().await.messages.push_back(message);
    }

    /// Return the current contents and leave the queue empty.
    pub async fn take_all(&self) -> Vec<CachedMessage> {
        let mut state = self.state.lock().await;
        Vec::from(std::mem::take(&mut state.messages))
    }

    /// Like `take_all`, but the batch is tracked as in flight until it is
    /// passed to `settle` or `requeue_front`.
    pub async fn take_batch(&self) -> Vec<CachedMessage> {
        let mut state = self.state.lock().await;
        let batch = Vec::from(std::mem::take(&mut state.messages));
        state.in_flight.extend(batch.iter().map(|message| message.id.clone()));
        batch
    }

    /// Stop tracking messages that left the queue for good.
    pub async fn settle(&self, messages: &[CachedMessage]) {
        let mut state = self.state.lock().await;
        for message in messages {
            state.release(&message.id);
        }
    }

    /// Put a batch that failed to persist back in front of anything queued
    /// since it was taken, keeping the original order. Messages removed while
    /// in flight stay removed and edits made meanwhile are applied.
    pub async fn requeue_front(&self, batch: Vec<CachedMessage>) {
        let mut state = self.state.lock().await;
        for mut message in batch.into_iter().rev() {
            let removed = state.removed_in_flight.contains(&message.id);
            if let Some(body) = state.edited_in_flight.get(&message.id) {
                message.body = body.clone();
            }
            state.release(&message.id);
            if !removed {
                state.messages.push_front(message);
            }
        }
    }

    /// Drop a message that has not been persisted yet. Returns whether it was
    /// queued or in flight.
    pub async fn remove(&self, message_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.messages.len();
        state.messages.retain(|message| message.id != message_id);
        if state.messages.len() != before {
            return true;
        }

        if state.in_flight.contains(message_id) {
            state.edited_in_flight.remove(message_id);
            state.removed_in_flight.insert(message_id.to_string());
            return true;
        }
        false
    }

    /// Replace the body of a message that has not been persisted yet. Returns
    /// whether it was queued or in flight.
    pub async fn update(&self, message_id: &str, body: &str) -> bool {
        let mut state = self.state.lock().await;
        if let Some(message) = state.messages.iter_mut().find(|message| message.id == message_id) {
            message.body = body.to_string();
            return true;
        }

        if state.in_flight.contains(message_id) && !state.removed_in_flight.contains(message_id) {
            state
                .edited_in_flight
                .insert(message_id.to_string(), body.to_string());
            return true;
        }
        false
    }

    pub async fn clear(&self) {
        self.state.lock().await.messages.clear();
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.messages.is_empty()
    }

    /// Messages taken by `take_batch` and not yet settled or requeued
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }
}
