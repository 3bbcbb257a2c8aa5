/**
 * Write-behind drain
 * 
 * Moves queued chat messages from `CacheClient` into the primary store. One
 * drain cycle takes the whole queue and hands it to the sink as one batch.
 * 
 * # Failure handling
 * 
 * - Store unreachable: the batch goes back to the front of the queue so the
 *   next cycle retries it in order.
 * - Batch rejected: each message is retried on its own so one bad row cannot
 *   hold back the others. A message rejected `MAX_PERSIST_ATTEMPTS` times is
 *   set aside and kept in a bounded list for operators.
 * - Cycle cancelled mid-persist: the batch is requeued from a drop guard.
 * 
 * The spawned loop stops cooperatively through `DrainHandle::stop`, which
 * waits for a cycle in progress to finish.
 */

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::cache::client::CacheClient;
use crate::backend::error::ReplicationError;
use crate::shared::CachedMessage;

/// Durable destination for drained messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Persist a batch. Returns how many messages were written.
    ///
    /// Must be idempotent per message id; a requeued batch may be written twice.
    async fn persist(&self, messages: &[CachedMessage]) -> Result<usize, ReplicationError>;
}

/// Writes drained messages into the `chat_messages` table
#[derive(Debug, Clone)]
pub struct PgMessageSink {
    pool: PgPool,
}

impl PgMessageSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageSink for PgMessageSink {
    async fn persist(&self, messages: &[CachedMessage]) -> Result<usize, ReplicationError> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for message in messages {
            if let Err(e) = message.validate() {
                tracing::warn!("[Drain] Skipping invalid message {:?}: {}", message.id, e);
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO chat_messages (id, room_id, sender_id, body, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (id) DO UPDATE SET
                    body = EXCLUDED.body
                "#,
            )
            .bind(&message.id)
            .bind(&message.room_id)
            .bind(&message.sender_id)
            .bind(&message.body)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;
            written += 1;
        }

        tx.commit().await?;
        Ok(written)
    }
}

/// Rejections after which a message is set aside instead of retried
pub const MAX_PERSIST_ATTEMPTS: u32 = 3;

/// Set-aside messages kept for inspection; older ones are dropped first
const REJECTED_LIMIT: usize = 1_000;

pub struct QueueDrainer {
    cache: Arc<CacheClient>,
    sink: Arc<dyn MessageSink>,
    attempts: Mutex<HashMap<String, u32>>,
    rejected: Mutex<VecDeque<CachedMessage>>,
}

/// Requeues a taken batch unless it was handed back explicitly.
struct InFlightBatch {
    cache: Arc<CacheClient>,
    messages: Option<Vec<CachedMessage>>,
}

impl InFlightBatch {
    fn messages(&self) -> &[CachedMessage] {
        self.messages.as_deref().unwrap_or_default()
    }

    fn release(mut self) -> Vec<CachedMessage> {
        self.messages.take().unwrap_or_default()
    }
}

impl Drop for InFlightBatch {
    fn drop(&mut self) {
        let Some(batch) = self.messages.take() else {
            return;
        };

        tracing::warn!("[Drain] Drain cancelled with {} messages in flight, requeueing", batch.len());
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let cache = Arc::clone(&self.cache);
                runtime.spawn(async move { cache.requeue_messages(batch).await });
            }
            Err(_) => tracing::error!("[Drain] No runtime left to requeue {} messages", batch.len()),
        }
    }
}

/// Outcome of retrying a rejected batch one message at a time
#[derive(Default)]
struct RowOutcome {
    written: usize,
    done: Vec<CachedMessage>,
    retry: Vec<CachedMessage>,
    set_aside: Vec<CachedMessage>,
    last_error: Option<ReplicationError>,
}

impl QueueDrainer {
    pub fn new(cache: Arc<CacheClient>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            cache,
            sink,
            attempts: Mutex::new(HashMap::new()),
            rejected: Mutex::new(VecDeque::new()),
        }
    }

    /// Run one drain cycle and return the number of persisted messages.
    ///
    /// Returns an error only when nothing could be persisted. Messages that
    /// were not persisted are requeued ahead of anything cached meanwhile.
    pub async fn drain_once(&self) -> Result<usize, ReplicationError> {
        let batch = self.cache.take_message_batch().await;
        if batch.is_empty() {
            return Ok(0);
        }
        let in_flight = InFlightBatch {
            cache: Arc::clone(&self.cache),
            messages: Some(batch),
        };

        let result = self.sink.persist(in_flight.messages()).await;
        let batch_error = match result {
            Ok(written) => {
                let batch = in_flight.release();
                self.forget_attempts(&batch).await;
                self.cache.settle_messages(&batch).await;
                tracing::info!("[Drain] Persisted {} of {} queued messages", written, batch.len());
                return Ok(written);
            }
            Err(e) if e.is_unavailable() => {
                let batch = in_flight.release();
                tracing::error!("[Drain] Primary store unavailable, requeueing {} messages: {}", batch.len(), e);
                self.cache.requeue_messages(batch).await;
                return Err(e);
            }
            Err(e) => e,
        };

        let count = in_flight.messages().len();
        tracing::warn!("[Drain] Batch of {} rejected, retrying one by one: {}", count, batch_error);
        let single = (count == 1).then_some(batch_error);
        let outcome = self.persist_each(in_flight.messages(), single).await;
        in_flight.release();

        self.cache.settle_messages(&outcome.done).await;
        self.cache.settle_messages(&outcome.set_aside).await;
        self.set_aside(outcome.set_aside).await;
        if !outcome.retry.is_empty() {
            self.cache.requeue_messages(outcome.retry).await;
        }

        match outcome.last_error {
            Some(e) if outcome.written == 0 => Err(e),
            _ => Ok(outcome.written),
        }
    }

    /// Persist `messages` one at a time. `single` is the error a one-message
    /// batch already produced, so it is not sent twice.
    async fn persist_each(
        &self,
        messages: &[CachedMessage],
        mut single: Option<ReplicationError>,
    ) -> RowOutcome {
        let mut outcome = RowOutcome::default();
        let mut attempts = self.attempts.lock().await;

        for (index, message) in messages.iter().enumerate() {
            let result = match single.take() {
                Some(e) => Err(e),
                None => self.sink.persist(std::slice::from_ref(message)).await,
            };

            match result {
                Ok(written) => {
                    attempts.remove(&message.id);
                    outcome.written += written;
                    outcome.done.push(message.clone());
                }
                Err(e) if e.is_unavailable() => {
                    tracing::error!("[Drain] Primary store became unavailable: {}", e);
                    outcome.retry.extend(messages[index..].iter().cloned());
                    outcome.last_error = Some(e);
                    break;
                }
                Err(e) => {
                    let count = attempts.entry(message.id.clone()).or_insert(0);
                    *count += 1;
                    if *count >= MAX_PERSIST_ATTEMPTS {
                        tracing::error!(
                            "[Drain] Setting aside message {} after {} rejections: {}",
                            message.id,
                            count,
                            e
                        );
                        attempts.remove(&message.id);
                        outcome.set_aside.push(message.clone());
                    } else {
                        tracing::warn!("[Drain] Message {} rejected ({} of {}): {}", message.id, count, MAX_PERSIST_ATTEMPTS, e);
                        outcome.retry.push(message.clone());
                    }
                    outcome.last_error = Some(e);
                }
            }
        }

        // only messages going back to the queue keep a count
        let retained: HashSet<&str> = outcome.retry.iter().map(|m| m.id.as_str()).collect();
        attempts.retain(|id, _| retained.contains(id.as_str()));
        outcome
    }

    async fn forget_attempts(&self, batch: &[CachedMessage]) {
        let mut attempts = self.attempts.lock().await;
        for message in batch {
            attempts.remove(&message.id);
        }
    }

    async fn set_aside(&self, messages: Vec<CachedMessage>) {
        if messages.is_empty() {
            return;
        }
        let mut rejected = self.rejected.lock().await;
        rejected.extend(messages);
        while rejected.len() > REJECTED_LIMIT {
            rejected.pop_front();
        }
    }

    /// Messages the primary store kept rejecting, oldest first
    pub async fn rejected_messages(&self) -> Vec<CachedMessage> {
        self.rejected.lock().await.iter().cloned().collect()
    }

    /// Drain every `every` until the returned handle is stopped or dropped.
    pub fn spawn(drainer: Arc<Self>, every: Duration) -> DrainHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                // failures are logged and requeued inside drain_once
                let _ = drainer.drain_once().await;
            }
            tracing::debug!("[Drain] Drain loop stopped");
        });

        DrainHandle { stop: stop_tx, task }
    }
}

/// Handle to the spawned drain loop
#[derive(Debug)]
pub struct DrainHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl DrainHandle {
    /// Stop the loop after the cycle in progress, if any, and wait for it.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("[Drain] Drain loop ended abnormally: {}", e);
        }
    }
}
