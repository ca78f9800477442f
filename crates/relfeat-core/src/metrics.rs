//! Engine metrics recorded through the `metrics` facade.
//!
//! Nothing is exported unless a recorder is installed (see `relfeat-shared`).

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::error::Warning;

pub struct EngineMetrics;

impl EngineMetrics {
    /// A feature was rebuilt from its row.
    pub fn feature_built(feature_type: &str) {
        counter!("relfeat_features_built_total", "feature_type" => feature_type.to_string())
            .increment(1);
    }

    /// The identity cache answered instead of the reconstructor.
    pub fn cache_hit(feature_type: &str) {
        counter!("relfeat_feature_cache_hits_total", "feature_type" => feature_type.to_string())
            .increment(1);
    }

    /// A feature was abandoned because of an error.
    pub fn feature_failed(feature_type: &str, error_type: &str) {
        counter!("relfeat_features_failed_total",
                "feature_type" => feature_type.to_string(),
                "error_type" => error_type.to_string())
            .increment(1);
    }

    /// One join-driven follow-up SELECT.
    pub fn join_fetch(table: &str, duration: Duration) {
        counter!("relfeat_join_fetches_total", "table" => table.to_string()).increment(1);
        histogram!("relfeat_join_fetch_duration_seconds", "table" => table.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn warning(kind: Warning) {
        counter!("relfeat_warnings_total", "kind" => kind.as_str()).increment(1);
    }
}

/// Measures the time until [`FetchTimer::finish`] is called.
pub struct FetchTimer {
    start: Instant,
    table: String,
}

impl FetchTimer {
    pub fn start(table: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            table: table.into(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        EngineMetrics::join_fetch(&self.table, elapsed);
        elapsed
    }
}
