//! Counters for the prediction pipeline

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters shared by every request task.
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    predictions_served: AtomicU64,
    client_rejections: AtomicU64,
    server_failures: AtomicU64,
    record_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineMetricsSnapshot {
    pub predictions_served: u64,
    pub client_rejections: u64,
    pub server_failures: u64,
    pub record_failures: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_served(&self, persisted: bool) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        if !persisted {
            self.record_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_rejection(&self, client_error: bool) {
        if client_error {
            self.client_rejections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.server_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> PipelineMetricsSnapshot {
        PipelineMetricsSnapshot {
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            client_rejections: self.client_rejections.load(Ordering::Relaxed),
            server_failures: self.server_failures.load(Ordering::Relaxed),
            record_failures: self.record_failures.load(Ordering::Relaxed),
        }
    }
}
