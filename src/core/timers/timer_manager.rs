// Scheduled events. Timers due soon live only in memory and get negative
// IDs. Everything else goes through the store so it survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

/// Timers expiring sooner than this are never persisted.
pub const SHORT_TIMER_THRESHOLD: Duration = Duration::seconds(60);

/// Upper bound on a single sleep of the dispatch loop.
const MAX_SLEEP: std::time::Duration = std::time::Duration::from_secs(86_400);

// ============================================================================
// DOMAIN MODELS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Timer {
    pub id: i64,
    pub event: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: Value,
}

impl Timer {
    pub fn is_short(&self) -> bool {
        self.id < 0
    }

    /// Read an integer field out of the metadata object.
    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum TimerError {
    #[error("Storage error: {0}")]
    StorageError(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait TimerStore: Send + Sync {
    /// Persist a new timer, returning its (positive) ID.
    async fn insert(
        &self,
        event: &str,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        metadata: &Value,
    ) -> Result<i64, TimerError>;

    async fn get(&self, id: i64) -> Result<Option<Timer>, TimerError>;

    /// The timer that expires first, if any.
    async fn earliest(&self) -> Result<Option<Timer>, TimerError>;

    async fn delete(&self, id: i64) -> Result<bool, TimerError>;

    async fn update_metadata(&self, id: i64, metadata: &Value) -> Result<bool, TimerError>;

    /// All timers for an event, ordered by expiry.
    async fn list_for_event(&self, event: &str) -> Result<Vec<Timer>, TimerError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct TimerManager<S: TimerStore> {
    store: S,
    short_timers: DashMap<i64, Timer>,
    next_short_id: AtomicI64,
    wake: Notify,
    sender: mpsc::UnboundedSender<Timer>,
}

impl<S: TimerStore> TimerManager<S> {
    /// Create the manager along with the receiving end of expired timers.
    pub fn new(store: S) -> (Self, mpsc::UnboundedReceiver<Timer>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            store,
            short_timers: DashMap::new(),
            next_short_id: AtomicI64::new(-1),
            wake: Notify::new(),
            sender,
        };
        (manager, receiver)
    }

    pub async fn create(
        &self,
        expires_at: DateTime<Utc>,
        event: &str,
        metadata: Value,
    ) -> Result<Timer, TimerError> {
        let created_at = Utc::now();

        let timer = if expires_at - created_at < SHORT_TIMER_THRESHOLD {
            let id = self.next_short_id.fetch_sub(1, Ordering::Relaxed);
            let timer = Timer {
                id,
                event: event.to_string(),
                created_at,
                expires_at,
                metadata,
            };
            self.short_timers.insert(id, timer.clone());
            timer
        } else {
            let id = self
                .store
                .insert(event, created_at, expires_at, &metadata)
                .await?;
            Timer {
                id,
                event: event.to_string(),
                created_at,
                expires_at,
                metadata,
            }
        };

        tracing::debug!(id = timer.id, event, expires_at = %timer.expires_at, "Created timer");
        self.wake.notify_one();
        Ok(timer)
    }

    pub async fn get(&self, id: i64) -> Result<Option<Timer>, TimerError> {
        if id < 0 {
            return Ok(self.short_timers.get(&id).map(|t| t.clone()));
        }
        self.store.get(id).await
    }

    /// Remove a timer. `dispatch` sends it to the receiver as if it had
    /// expired. `cascade` makes the dispatch loop re-plan its next wake-up.
    pub async fn end_timer(&self, timer: &Timer, dispatch: bool, cascade: bool) -> Result<bool, TimerError> {
        let removed = if timer.is_short() {
            self.short_timers.remove(&timer.id).is_some()
        } else {
            self.store.delete(timer.id).await?
        };

        if removed && dispatch {
            if self.sender.send(timer.clone()).is_err() {
                tracing::warn!(id = timer.id, event = %timer.event, "Timer receiver dropped; event lost");
            }
        }

        if cascade {
            self.wake.notify_one();
        }
        Ok(removed)
    }

    /// Make the dispatch loop re-plan its next wake-up.
    pub fn reschedule(&self) {
        self.wake.notify_one();
    }

    pub async fn update_metadata(&self, timer: &Timer, metadata: Value) -> Result<bool, TimerError> {
        if timer.is_short() {
            return Ok(match self.short_timers.get_mut(&timer.id) {
                Some(mut entry) => {
                    entry.metadata = metadata;
                    true
                }
                None => false,
            });
        }
        self.store.update_metadata(timer.id, &metadata).await
    }

    /// Every pending timer for an event, in-memory ones first, each group
    /// ordered by expiry.
    pub async fn list_for_event(&self, event: &str) -> Result<Vec<Timer>, TimerError> {
        let mut timers: Vec<Timer> = self
            .short_timers
            .iter()
            .filter(|t| t.event == event)
            .map(|t| t.clone())
            .collect();
        timers.sort_by_key(|t| t.expires_at);

        timers.extend(self.store.list_for_event(event).await?);
        Ok(timers)
    }

    async fn next_timer(&self) -> Result<Option<Timer>, TimerError> {
        let short = self
            .short_timers
            .iter()
            .min_by_key(|t| t.expires_at)
            .map(|t| t.clone());
        let stored = self.store.earliest().await?;

        Ok(match (short, stored) {
            (Some(a), Some(b)) => Some(if a.expires_at <= b.expires_at { a } else { b }),
            (a, b) => a.or(b),
        })
    }

    /// Dispatch loop. Runs until the receiver is dropped.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Timer dispatch loop started");

        loop {
            if self.sender.is_closed() {
                break;
            }

            let next = match self.next_timer().await {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("Failed to look up the next timer: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            let Some(timer) = next else {
                self.wake.notified().await;
                continue;
            };

            let wait = (timer.expires_at - Utc::now())
                .to_std()
                .unwrap_or_default()
                .min(MAX_SLEEP);

            if !wait.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.wake.notified() => continue,
                }
            }

            if timer.expires_at <= Utc::now() {
                if let Err(e) = self.end_timer(&timer, true, false).await {
                    tracing::error!(id = timer.id, "Failed to dispatch timer: {}", e);
                }
            }
        }

        tracing::info!("Timer dispatch loop stopped");
    }
}
