//! In-process counters exposed as response headers on `/api/users*`.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct UserMetricsSnapshot {
    pub list_hits: u64,
    pub last_list_at: Option<DateTime<Utc>>,
    pub last_mutation_at: Option<DateTime<Utc>>,
    pub user_count: Option<i64>,
}

#[derive(Default)]
struct UserMetricsInner {
    list_hits: AtomicU64,
    last_list_at: Mutex<Option<DateTime<Utc>>>,
    last_mutation_at: Mutex<Option<DateTime<Utc>>>,
    user_count: Mutex<Option<i64>>,
}

/// Shared counters over the user-management surface. Mutex poisoning is
/// treated as unreachable; no panic can occur while a lock is held.
#[derive(Clone, Default)]
pub struct UserMetrics {
    inner: Arc<UserMetricsInner>,
}

impl UserMetrics {
    pub fn record_list(&self) {
        self.inner.list_hits.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut slot) = self.inner.last_list_at.lock() {
            *slot = Some(Utc::now());
        }
    }

    pub fn record_mutation(&self, user_count: i64) {
        if let Ok(mut slot) = self.inner.last_mutation_at.lock() {
            *slot = Some(Utc::now());
        }
        if let Ok(mut slot) = self.inner.user_count.lock() {
            *slot = Some(user_count);
        }
    }

    pub fn snapshot(&self) -> UserMetricsSnapshot {
        UserMetricsSnapshot {
            list_hits: self.inner.list_hits.load(Ordering::Relaxed),
            last_list_at: self.inner.last_list_at.lock().ok().and_then(|slot| *slot),
            last_mutation_at: self
                .inner
                .last_mutation_at
                .lock()
                .ok()
                .and_then(|slot| *slot),
            user_count: self.inner.user_count.lock().ok().and_then(|slot| *slot),
        }
    }
}
