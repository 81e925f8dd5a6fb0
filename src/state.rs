use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metrics::engine::MetricsEngine;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub engine: MetricsEngine,
    pub started_at: DateTime<Utc>,
    calculations: AtomicU64,
}

impl AppState {
    pub fn new(engine: MetricsEngine) -> Self {
        Self {
            engine,
            started_at: Utc::now(),
            calculations: AtomicU64::new(0),
        }
    }

    pub fn record_calculation(&self) -> u64 {
        self.calculations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn calculations(&self) -> u64 {
        self.calculations.load(Ordering::Relaxed)
    }
}
