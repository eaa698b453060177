//! Metrics collection for observability

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_with_registry, Counter, CounterVec, Encoder, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::context::{EventListener, WindowEvent};

/// Global metrics registry
pub static METRICS: Lazy<Arc<Metrics>> =
    Lazy::new(|| Arc::new(Metrics::new().expect("Failed to initialize metrics")));

/// Metrics collector
pub struct Metrics {
    registry: Registry,

    pub windows_created: Counter,
    pub windows_deleted: Counter,
    pub items_added: CounterVec,
    pub items_removed: Counter,
    pub items_evicted: CounterVec,
    pub tokens_saved: Counter,
    pub over_budget: Counter,
    pub window_utilization: Histogram,
}

impl Metrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let windows_created = register_counter_with_registry!(
            Opts::new("context_windows_created_total", "Total context windows created"),
            registry
        )?;

        let windows_deleted = register_counter_with_registry!(
            Opts::new("context_windows_deleted_total", "Total context windows deleted"),
            registry
        )?;

        let items_added = register_counter_vec_with_registry!(
            Opts::new("context_items_added_total", "Total items added to windows"),
            &["type"],
            registry
        )?;

        let items_removed = register_counter_with_registry!(
            Opts::new(
                "context_items_removed_total",
                "Total items removed explicitly or by deduplication"
            ),
            registry
        )?;

        let items_evicted = register_counter_vec_with_registry!(
            Opts::new("context_items_evicted_total", "Total items evicted"),
            &["reason"],
            registry
        )?;

        let tokens_saved = register_counter_with_registry!(
            Opts::new("context_tokens_saved_total", "Tokens saved by optimization"),
            registry
        )?;

        let over_budget = register_counter_with_registry!(
            Opts::new(
                "context_over_budget_total",
                "Insertions that left a window over budget"
            ),
            registry
        )?;

        let window_utilization = register_histogram_with_registry!(
            "context_window_utilization",
            "Fraction of the token budget in use after an insertion",
            vec![0.1, 0.25, 0.5, 0.75, 0.9, 1.0, 1.5],
            registry
        )?;

        Ok(Self {
            registry,
            windows_created,
            windows_deleted,
            items_added,
            items_removed,
            items_evicted,
            tokens_saved,
            over_budget,
            window_utilization,
        })
    }

    /// Get the metrics registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Update counters for one window event
    pub fn record(&self, event: &WindowEvent) {
        match event {
            WindowEvent::WindowCreated { .. } | WindowEvent::WindowImported { .. } => {
                self.windows_created.inc()
            }
            WindowEvent::WindowDeleted { .. } => self.windows_deleted.inc(),
            WindowEvent::ItemAdded {
                item_type,
                used_tokens,
                max_tokens,
                ..
            } => {
                self.items_added.with_label_values(&[item_type.as_str()]).inc();
                if *max_tokens > 0 {
                    self.window_utilization
                        .observe(*used_tokens as f64 / *max_tokens as f64);
                }
            }
            WindowEvent::ItemRemoved { .. } => self.items_removed.inc(),
            WindowEvent::ItemEvicted { reason, .. } => {
                self.items_evicted.with_label_values(&[reason.as_str()]).inc()
            }
            WindowEvent::WindowOptimized { tokens_saved, .. } => {
                self.tokens_saved.inc_by(*tokens_saved as f64)
            }
            WindowEvent::OverBudget { .. } => self.over_budget.inc(),
            WindowEvent::WindowActivated { .. } | WindowEvent::WindowCleared { .. } => {}
        }
    }

    /// Export metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }

        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Feeds window events into a [`Metrics`] collector
pub struct MetricsListener {
    metrics: Arc<Metrics>,
}

impl MetricsListener {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    /// Listener bound to the global [`METRICS`]
    pub fn global() -> Self {
        Self::new(METRICS.clone())
    }
}

impl EventListener for MetricsListener {
    fn on_event(&self, event: &WindowEvent) {
        self.metrics.record(event);
    }
}
