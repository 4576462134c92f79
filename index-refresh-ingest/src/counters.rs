//! Run-wide document counters shared by the producer and the workers.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct IngestCounters {
    records_read: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    created: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub records_read: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub created: u64,
}

impl IngestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read(&self, n: u64) {
        self.records_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_succeeded(&self, n: u64, created: u64) {
        self.succeeded.fetch_add(n, Ordering::Relaxed);
        self.created.fetch_add(created, Ordering::Relaxed);
    }

    pub fn add_failed(&self, n: u64) {
        self.failed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            records_read: self.records_read.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
        }
    }
}
