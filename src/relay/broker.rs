//! Event Broker - in-memory fan-out from ingest to subscriber queues
//!
//! Every subscriber owns a pending queue keyed by its connection id. In
//! [`DispatchMode::Broadcast`] each queue receives its own copy of every record
//! ingested after the subscriber connected. In [`DispatchMode::Competitive`]
//! all subscribers pop from one shared FIFO and each record is delivered once.
//!
//! Queues are unbounded unless a high-water mark is configured, in which case
//! the oldest pending records are dropped and counted.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::DerefMut;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio_stream::Stream;
use uuid::Uuid;

use crate::error::RelayError;
use crate::models::{GeoDispatchRecord, RelayStats};

// ============================================================================
// DISPATCH MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Every subscriber sees every record dispatched after it connected
    #[default]
    Broadcast,
    /// Subscribers share one queue; each record goes to exactly one of them
    Competitive,
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchMode::Broadcast => write!(f, "broadcast"),
            DispatchMode::Competitive => write!(f, "competitive"),
        }
    }
}

impl FromStr for DispatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" => Ok(DispatchMode::Broadcast),
            "competitive" => Ok(DispatchMode::Competitive),
            other => Err(format!("unknown dispatch mode: {other}")),
        }
    }
}

// ============================================================================
// PENDING QUEUE
// ============================================================================

#[derive(Debug, Default)]
struct PendingQueue {
    items: Mutex<VecDeque<GeoDispatchRecord>>,
    notify: Notify,
    closed: AtomicBool,
}

impl PendingQueue {
    /// Append in order. Returns how many old records the high-water mark evicted.
    fn push_batch(
        &self,
        records: &[GeoDispatchRecord],
        high_water: Option<usize>,
    ) -> Result<u64, RelayError> {
        let dropped = {
            let mut items = self.items.lock();
            append_all(std::slice::from_mut(&mut items), records.iter().cloned(), high_water)?
        };
        self.notify.notify_waiters();
        Ok(dropped)
    }

    fn try_pop(&self) -> Option<GeoDispatchRecord> {
        self.items.lock().pop_front()
    }

    async fn pop(&self) -> Option<GeoDispatchRecord> {
        loop {
            // Registered before the checks so a push in between still wakes us
            let notified = self.notify.notified();
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(record) = self.try_pop() {
                return Some(record);
            }
            notified.await;
        }
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Append `records` to every queue, or to none of them.
///
/// Room is reserved on all queues before any is extended. Returns how many old
/// records the high-water mark evicted.
fn append_all<T, Q, I>(queues: &mut [Q], records: I, high_water: Option<usize>) -> Result<u64, RelayError>
where
    Q: DerefMut<Target = VecDeque<T>>,
    I: ExactSizeIterator<Item = T> + Clone,
{
    let requested = records.len();
    for items in queues.iter_mut() {
        items
            .try_reserve(requested)
            .map_err(|_| RelayError::ResourceExhausted { requested })?;
    }

    let mut dropped = 0;
    for items in queues.iter_mut() {
        items.extend(records.clone());
        if let Some(limit) = high_water {
            while items.len() > limit {
                items.pop_front();
                dropped += 1;
            }
        }
    }
    Ok(dropped)
}

// ============================================================================
// BROKER
// ============================================================================

#[derive(Debug)]
pub struct Broker {
    mode: DispatchMode,
    high_water: Option<usize>,
    shared: Arc<PendingQueue>,
    subscribers: RwLock<HashMap<Uuid, Arc<PendingQueue>>>,
    ingested: AtomicU64,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Broker {
    pub fn new(mode: DispatchMode, high_water: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            mode,
            high_water,
            shared: Arc::new(PendingQueue::default()),
            subscribers: RwLock::new(HashMap::new()),
            ingested: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Enqueue `records` in order. Never waits on subscribers.
    pub fn ingest(&self, records: &[GeoDispatchRecord]) -> Result<usize, RelayError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RelayError::Closed);
        }
        if records.is_empty() {
            return Ok(0);
        }

        let dropped = match self.mode {
            DispatchMode::Broadcast => {
                let subscribers = self.subscribers.read();
                let mut queues: Vec<_> = subscribers.values().map(|q| q.items.lock()).collect();
                let dropped = append_all(&mut queues, records.iter().cloned(), self.high_water)?;
                drop(queues);
                for queue in subscribers.values() {
                    queue.notify.notify_waiters();
                }
                dropped
            }
            DispatchMode::Competitive => self.shared.push_batch(records, self.high_water)?,
        };

        self.ingested.fetch_add(records.len() as u64, Ordering::Relaxed);
        if dropped > 0 {
            self.dropped.fetch_add(dropped, Ordering::Relaxed);
            tracing::warn!(dropped, "Relay queue over high-water mark, dropped oldest records");
        }
        Ok(records.len())
    }

    /// Open a new consumption point
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = Uuid::new_v4();
        let queue = match self.mode {
            DispatchMode::Broadcast => Arc::new(PendingQueue::default()),
            DispatchMode::Competitive => Arc::clone(&self.shared),
        };
        self.subscribers.write().insert(id, Arc::clone(&queue));
        if self.closed.load(Ordering::Acquire) {
            queue.close();
        }

        tracing::info!(subscriber = %id, mode = %self.mode, "Subscriber connected");
        Subscription {
            id,
            queue,
            broker: Arc::downgrade(self),
        }
    }

    /// Stop accepting records and end every subscription after its current record
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shared.close();
        for queue in self.subscribers.read().values() {
            queue.close();
        }
        tracing::info!("Relay broker closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Records waiting across all queues
    pub fn pending(&self) -> usize {
        match self.mode {
            DispatchMode::Broadcast => self.subscribers.read().values().map(|q| q.len()).sum(),
            DispatchMode::Competitive => self.shared.len(),
        }
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            mode: self.mode.to_string(),
            subscribers: self.subscriber_count(),
            pending: self.pending(),
            ingested: self.ingested.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn unsubscribe(&self, id: &Uuid) {
        if self.subscribers.write().remove(id).is_some() {
            tracing::info!(subscriber = %id, "Subscriber disconnected");
        }
    }
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

/// One subscriber's view of the broker. Dropping it discards its queue.
#[derive(Debug)]
pub struct Subscription {
    id: Uuid,
    queue: Arc<PendingQueue>,
    broker: Weak<Broker>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next record, waiting if none is pending. `None` once the broker closes.
    pub async fn recv(&mut self) -> Option<GeoDispatchRecord> {
        self.queue.pop().await
    }

    /// Next record if one is already pending
    pub fn try_recv(&mut self) -> Option<GeoDispatchRecord> {
        if self.queue.closed.load(Ordering::Acquire) {
            return None;
        }
        self.queue.try_pop()
    }

    pub fn into_stream(mut self) -> impl Stream<Item = GeoDispatchRecord> + Send + 'static {
        async_stream::stream! {
            while let Some(record) = self.recv().await {
                yield record;
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broker) = self.broker.upgrade() {
            broker.unsubscribe(&self.id);
        }
    }
}
