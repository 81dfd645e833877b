//! Metric registry adapter.
//!
//! Wraps a `prometheus::Registry` so that every gauge is declared through a
//! `MetricDescriptor`, registered exactly once, and written through a `Gauge`
//! handle that checks label arity before touching the underlying vector.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use tracing::error;

/// Static description of a gauge metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDescriptor {
    /// Exposition name; unique across the whole registry.
    pub name: &'static str,
    pub help: &'static str,
    /// Ordered label names; empty for a scalar gauge.
    pub labels: &'static [&'static str],
}

impl MetricDescriptor {
    pub const fn scalar(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            labels: &[],
        }
    }

    pub const fn labeled(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self { name, help, labels }
    }
}

/// Error type for registry operations.
#[derive(Debug)]
pub enum RegistryError {
    /// A metric with this name is already registered.
    AlreadyRegistered(String),
    /// The descriptor was rejected (bad name, bad label name, ...).
    Invalid { name: String, reason: String },
    /// Rendering the exposition text failed.
    Encode(String),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::AlreadyRegistered(name) => {
                write!(f, "metric {} is already registered", name)
            }
            RegistryError::Invalid { name, reason } => {
                write!(f, "invalid metric {}: {}", name, reason)
            }
            RegistryError::Encode(msg) => write!(f, "failed to encode metrics: {}", msg),
        }
    }
}

impl std::error::Error for RegistryError {}

#[derive(Clone)]
enum GaugeInner {
    Scalar(prometheus::Gauge),
    Labeled(GaugeVec),
}

/// Settable handle to one registered gauge.
///
/// Cloning is cheap; clones write to the same time series.
#[derive(Clone)]
pub struct Gauge {
    descriptor: MetricDescriptor,
    inner: GaugeInner,
}

impl Gauge {
    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Sets a gauge declared without labels.
    pub fn set(&self, value: f64) {
        match &self.inner {
            GaugeInner::Scalar(g) => g.set(value),
            GaugeInner::Labeled(_) => {
                debug_assert!(false, "{} requires labels", self.descriptor.name);
                error!(metric = self.descriptor.name, "set without labels on a labeled gauge");
            }
        }
    }

    /// Sets the series identified by `labels`, given in declaration order.
    ///
    /// Repeated calls with the same label tuple overwrite the previous value.
    pub fn set_labeled(&self, labels: &[&str], value: f64) {
        match &self.inner {
            GaugeInner::Labeled(vec) if labels.len() == self.descriptor.labels.len() => {
                match vec.get_metric_with_label_values(labels) {
                    Ok(g) => g.set(value),
                    Err(e) => {
                        error!(metric = self.descriptor.name, error = %e, "rejected label values")
                    }
                }
            }
            _ => {
                debug_assert!(
                    false,
                    "{} expects labels {:?}, got {:?}",
                    self.descriptor.name, self.descriptor.labels, labels
                );
                error!(
                    metric = self.descriptor.name,
                    expected = self.descriptor.labels.len(),
                    got = labels.len(),
                    "label arity mismatch"
                );
            }
        }
    }
}

/// Registry of all exporter gauges.
#[derive(Clone, Default)]
pub struct MetricRegistry {
    inner: Registry,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a gauge and returns its handle.
    ///
    /// Registering the same name twice fails; callers treat that as fatal.
    pub fn register(&self, descriptor: &MetricDescriptor) -> Result<Gauge, RegistryError> {
        let invalid = |e: prometheus::Error| RegistryError::Invalid {
            name: descriptor.name.to_string(),
            reason: e.to_string(),
        };
        let opts = Opts::new(descriptor.name, descriptor.help);

        let inner = if descriptor.labels.is_empty() {
            GaugeInner::Scalar(prometheus::Gauge::with_opts(opts).map_err(invalid)?)
        } else {
            GaugeInner::Labeled(GaugeVec::new(opts, descriptor.labels).map_err(invalid)?)
        };

        let collector: Box<dyn prometheus::core::Collector> = match &inner {
            GaugeInner::Scalar(g) => Box::new(g.clone()),
            GaugeInner::Labeled(v) => Box::new(v.clone()),
        };

        match self.inner.register(collector) {
            Ok(()) => Ok(Gauge {
                descriptor: *descriptor,
                inner,
            }),
            Err(prometheus::Error::AlreadyReg) => {
                Err(RegistryError::AlreadyRegistered(descriptor.name.to_string()))
            }
            // Same name with different help or labels is reported as a
            // descriptor conflict rather than AlreadyReg.
            Err(e) if e.to_string().contains("same fully-qualified name") => {
                Err(RegistryError::AlreadyRegistered(descriptor.name.to_string()))
            }
            Err(e) => Err(invalid(e)),
        }
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    /// Renders all metrics in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, RegistryError> {
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder
            .encode(&self.gather(), &mut buf)
            .map_err(|e| RegistryError::Encode(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| RegistryError::Encode(e.to_string()))
    }

    /// Current value of the series with exactly these labels, if it exists.
    pub fn value(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let family = self.gather().into_iter().find(|f| f.get_name() == name)?;
        family
            .get_metric()
            .iter()
            .find(|m| {
                let pairs = m.get_label();
                pairs.len() == labels.len()
                    && labels.iter().all(|(k, v)| {
                        pairs
                            .iter()
                            .any(|p| p.get_name() == *k && p.get_value() == *v)
                    })
            })
            .map(|m| m.get_gauge().get_value())
    }

    /// Number of exported series for `name`.
    pub fn series_count(&self, name: &str) -> usize {
        self.gather()
            .iter()
            .find(|f| f.get_name() == name)
            .map(|f| f.get_metric().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UP: MetricDescriptor = MetricDescriptor::scalar("test_up", "UP Status");
    const STATE: MetricDescriptor =
        MetricDescriptor::labeled("test_state", "State per database", &["database"]);

    #[test]
    fn scalar_gauge_round_trips_through_gather() {
        let registry = MetricRegistry::new();
        let up = registry.register(&UP).unwrap();
        up.set(1.0);
        assert_eq!(registry.value("test_up", &[]), Some(1.0));
    }

    #[test]
    fn labeled_set_overwrites_same_tuple() {
        let registry = MetricRegistry::new();
        let state = registry.register(&STATE).unwrap();
        state.set_labeled(&["dbA"], 1.0);
        state.set_labeled(&["dbA"], 3.0);
        state.set_labeled(&["dbB"], 0.0);
        assert_eq!(registry.value("test_state", &[("database", "dbA")]), Some(3.0));
        assert_eq!(registry.series_count("test_state"), 2);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = MetricRegistry::new();
        registry.register(&UP).unwrap();
        let err = registry.register(&UP).err().unwrap();
        assert!(matches!(err, RegistryError::AlreadyRegistered(ref n) if n == "test_up"));
    }

    #[test]
    fn duplicate_name_with_different_shape_is_rejected() {
        let registry = MetricRegistry::new();
        registry.register(&UP).unwrap();
        let other = MetricDescriptor::labeled("test_up", "other help", &["x"]);
        assert!(matches!(
            registry.register(&other),
            Err(RegistryError::AlreadyRegistered(_))
        ));
    }

    #[test]
    fn invalid_name_is_rejected() {
        let registry = MetricRegistry::new();
        let bad = MetricDescriptor::scalar("bad-name", "help");
        assert!(matches!(
            registry.register(&bad),
            Err(RegistryError::Invalid { .. })
        ));
    }

    #[test]
    fn encodes_text_exposition() {
        let registry = MetricRegistry::new();
        registry.register(&STATE).unwrap().set_labeled(&["master"], 0.0);
        let text = registry.encode_text().unwrap();
        assert!(text.contains("# HELP test_state State per database"));
        assert!(text.contains("# TYPE test_state gauge"));
        assert!(text.contains("test_state{database=\"master\"} 0"));
    }
}
