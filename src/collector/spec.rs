//! Collector specifications.
//!
//! A `CollectorSpec` pairs one query with the gauges it feeds and a mapping
//! function that turns the result rows into gauge updates. Specs are plain
//! `const` data; the orchestrator evaluates every spec the same way.

use tracing::{debug, error};

use super::Row;
use crate::registry::{Gauge, MetricDescriptor};

/// A gauge owned by a collector, addressed by a collector-local key.
#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub key: &'static str,
    pub descriptor: MetricDescriptor,
}

impl MetricDef {
    pub const fn new(key: &'static str, descriptor: MetricDescriptor) -> Self {
        Self { key, descriptor }
    }
}

/// Turns result rows into gauge updates.
///
/// Must not panic on well-formed rows and must treat an empty row set as
/// "nothing to publish".
pub type MapFn = fn(rows: &[Row], metrics: &Metrics);

/// Query plus mapping for one group of related metrics.
#[derive(Debug, Clone, Copy)]
pub struct CollectorSpec {
    /// Stable identifier used in logs and diagnostics.
    pub id: &'static str,
    pub metrics: &'static [MetricDef],
    pub query: &'static str,
    /// Number of columns in the query's projection.
    pub columns: usize,
    pub mapping: MapFn,
}

/// Gauge handles scoped to a single collector.
///
/// A mapping function can only reach the gauges its own spec declared.
pub struct Metrics {
    collector: &'static str,
    gauges: Vec<(&'static str, Gauge)>,
}

impl Metrics {
    pub(crate) fn new(collector: &'static str, gauges: Vec<(&'static str, Gauge)>) -> Self {
        Self { collector, gauges }
    }

    pub fn collector(&self) -> &'static str {
        self.collector
    }

    pub fn gauge(&self, key: &str) -> Option<&Gauge> {
        let gauge = self.gauges.iter().find(|(k, _)| *k == key).map(|(_, g)| g);
        if gauge.is_none() {
            debug_assert!(false, "collector {} has no metric {}", self.collector, key);
            error!(collector = self.collector, key, "unknown metric key");
        }
        gauge
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.gauges.iter().map(|(k, _)| *k)
    }

    /// Publishes `value` to the scalar gauge `key` if it is numeric.
    ///
    /// Returns whether the gauge was updated.
    pub fn set(&self, key: &str, value: Option<f64>) -> bool {
        let Some(value) = value else {
            debug!(collector = self.collector, key, "skipping non-numeric value");
            return false;
        };
        let Some(gauge) = self.gauge(key) else {
            return false;
        };
        debug!(collector = self.collector, metric = gauge.descriptor().name, value, "fetched");
        gauge.set(value);
        true
    }

    /// Publishes `value` under `labels` if it is numeric.
    pub fn set_labeled(&self, key: &str, labels: &[&str], value: Option<f64>) -> bool {
        let Some(value) = value else {
            debug!(collector = self.collector, key, ?labels, "skipping non-numeric value");
            return false;
        };
        let Some(gauge) = self.gauge(key) else {
            return false;
        };
        debug!(
            collector = self.collector,
            metric = gauge.descriptor().name,
            ?labels,
            value,
            "fetched"
        );
        gauge.set_labeled(labels, value);
        true
    }
}
