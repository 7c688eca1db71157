//! Node metrics
//!
//! Plain atomic counters, read through [`NodeMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NodeMetrics {
    pub messages_forwarded: AtomicU64,
    pub control_messages: AtomicU64,
    pub pongs_sent: AtomicU64,
    pub dispatch_failures: AtomicU64,
    pub workers_started: AtomicU64,
    pub worker_restarts: AtomicU64,
    pub group_restarts: AtomicU64,
}

/// Point-in-time copy of [`NodeMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_forwarded: u64,
    pub control_messages: u64,
    pub pongs_sent: u64,
    pub dispatch_failures: u64,
    pub workers_started: u64,
    pub worker_restarts: u64,
    pub group_restarts: u64,
}

impl NodeMetrics {
    pub fn record_forwarded(&self) {
        self.messages_forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control_message(&self) {
        self.control_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.pongs_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatch_failure(&self) {
        self.dispatch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_started(&self) {
        self.workers_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_restart(&self) {
        self.worker_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group_restart(&self) {
        self.group_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_forwarded: self.messages_forwarded.load(Ordering::Relaxed),
            control_messages: self.control_messages.load(Ordering::Relaxed),
            pongs_sent: self.pongs_sent.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
            workers_started: self.workers_started.load(Ordering::Relaxed),
            worker_restarts: self.worker_restarts.load(Ordering::Relaxed),
            group_restarts: self.group_restarts.load(Ordering::Relaxed),
        }
    }
}
