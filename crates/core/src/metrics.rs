//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Indexer searches (per indexer, per result)
//! - Download grabs (per backend, per result)
//! - Reconciliation loop cycles
//! - Imports and SSRF rejections

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

/// Indexer searches by indexer name and result ("ok", "error").
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arcadia_searches_total", "Total indexer searches"),
        &["indexer", "result"],
    )
    .unwrap()
});

/// Search duration in seconds, per indexer.
pub static SEARCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("arcadia_search_duration_seconds", "Indexer search duration")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["indexer"],
    )
    .unwrap()
});

/// Add-download attempts by backend kind and result ("ok", "error", "unsafe").
pub static GRABS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arcadia_grabs_total", "Total add-download attempts"),
        &["backend", "result"],
    )
    .unwrap()
});

/// Destinations rejected by the safe-network layer.
pub static SSRF_REJECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::with_opts(Opts::new(
        "arcadia_ssrf_rejections_total",
        "Outbound destinations blocked by address validation",
    ))
    .unwrap()
});

/// Reconciliation loop cycles by loop name and result ("ok", "error", "skipped").
pub static RECONCILE_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arcadia_reconcile_cycles_total", "Reconciliation loop cycles"),
        &["loop", "result"],
    )
    .unwrap()
});

/// Import attempts by result ("imported", "manual_review", "error").
pub static IMPORTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arcadia_imports_total", "Import pipeline outcomes"),
        &["result"],
    )
    .unwrap()
});

/// Register all core metrics with the given registry.
pub fn register_core_metrics(registry: &Registry) -> Result<(), prometheus::Error> {
    registry.register(Box::new(SEARCHES_TOTAL.clone()))?;
    registry.register(Box::new(SEARCH_DURATION.clone()))?;
    registry.register(Box::new(GRABS_TOTAL.clone()))?;
    registry.register(Box::new(SSRF_REJECTIONS.clone()))?;
    registry.register(Box::new(RECONCILE_CYCLES.clone()))?;
    registry.register(Box::new(IMPORTS_TOTAL.clone()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_core_metrics() {
        let registry = Registry::new();
        register_core_metrics(&registry).unwrap();

        SEARCHES_TOTAL.with_label_values(&["test", "ok"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "arcadia_searches_total"));
    }
}
