//! Collection orchestrator.
//!
//! Runs every registered `CollectorSpec` once per scrape, in registration
//! order:
//!
//! ```text
//!   IDLE ──scrape──► COLLECTING ──last collector──► IDLE
//!                        │
//!          for each spec │  execute(query) ──err/timeout──► log, keep stale values
//!                        │        │
//!                        │        ▼
//!                        │  check arity ──mismatch──► log, skip mapping
//!                        │        │
//!                        │        ▼
//!                        └─ mapping(rows, own metrics)
//! ```
//!
//! One collector failing never aborts the pass. Each query is bounded by the
//! query timeout, and the whole pass by the scrape deadline; collectors that
//! would start after the deadline are skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CollectorSpec, Metrics};
use crate::executor::{QueryError, QueryExecutor};
use crate::registry::{Gauge, MetricDescriptor, MetricRegistry, RegistryError};

const COLLECTOR_SUCCESS: MetricDescriptor = MetricDescriptor::labeled(
    "mssql_exporter_collector_success",
    "Whether the collector's last query succeeded (1) or not (0)",
    &["collector"],
);

const COLLECTOR_DURATION: MetricDescriptor = MetricDescriptor::labeled(
    "mssql_exporter_collector_duration_seconds",
    "Time spent by the collector during the last scrape",
    &["collector"],
);

/// Timing limits for one scrape.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    /// Upper bound for a single collector query.
    pub query_timeout: Duration,
    /// Upper bound for the whole pass.
    pub scrape_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(10),
            scrape_timeout: Duration::from_secs(30),
        }
    }
}

/// What happened to one collector during a scrape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectorOutcome {
    /// Query succeeded and the mapping ran.
    Ok { rows: usize },
    QueryFailed { error: String },
    TimedOut,
    /// Rows did not match the declared projection; nothing was mapped.
    ArityMismatch { expected: usize, found: usize },
    /// Not started because the scrape deadline had passed.
    Skipped,
    /// Not started because another pass was already running.
    Busy,
}

impl CollectorOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, CollectorOutcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectorReport {
    pub id: &'static str,
    #[serde(flatten)]
    pub outcome: CollectorOutcome,
    pub duration_secs: f64,
}

/// Diagnostics for one scrape.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub collectors: Vec<CollectorReport>,
}

impl ScrapeReport {
    pub fn succeeded(&self) -> usize {
        self.collectors.iter().filter(|c| c.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.collectors.len() - self.succeeded()
    }

    pub fn outcome(&self, id: &str) -> Option<&CollectorOutcome> {
        self.collectors
            .iter()
            .find(|c| c.id == id)
            .map(|c| &c.outcome)
    }
}

struct RegisteredCollector {
    spec: CollectorSpec,
    metrics: Metrics,
}

/// Runs the collector set against a query executor.
pub struct Orchestrator {
    collectors: Vec<RegisteredCollector>,
    config: OrchestratorConfig,
    success: Gauge,
    duration: Gauge,
    collecting: AtomicBool,
}

/// Resets the COLLECTING flag even if the pass is cancelled midway.
struct CollectingGuard<'a>(&'a AtomicBool);

impl Drop for CollectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Orchestrator {
    /// Registers every metric of `specs` (plus the exporter's own collector
    /// gauges) and builds the orchestrator.
    ///
    /// Fails on the first duplicate or invalid metric; the exporter must not
    /// start with a broken collector set.
    pub fn register(
        registry: &MetricRegistry,
        specs: &[CollectorSpec],
    ) -> Result<Self, RegistryError> {
        let success = registry.register(&COLLECTOR_SUCCESS)?;
        let duration = registry.register(&COLLECTOR_DURATION)?;

        let mut collectors = Vec::with_capacity(specs.len());
        for spec in specs {
            let mut gauges = Vec::with_capacity(spec.metrics.len());
            for def in spec.metrics {
                gauges.push((def.key, registry.register(&def.descriptor)?));
            }
            collectors.push(RegisteredCollector {
                spec: *spec,
                metrics: Metrics::new(spec.id, gauges),
            });
        }

        debug!(collectors = collectors.len(), "collector set registered");
        Ok(Self {
            collectors,
            config: OrchestratorConfig::default(),
            success,
            duration,
            collecting: AtomicBool::new(false),
        })
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether a pass is currently running.
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    /// Runs one full pass and returns its diagnostics.
    ///
    /// Never fails as a whole: every problem is recorded per collector.
    /// A call that overlaps a running pass queries nothing and reports every
    /// collector as `Busy`.
    pub async fn collect<E: QueryExecutor>(&self, executor: &mut E) -> ScrapeReport {
        let started_at = Utc::now();
        let start = Instant::now();

        if self
            .collecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("scrape requested while another pass is running");
            return ScrapeReport {
                started_at,
                duration_secs: 0.0,
                collectors: self
                    .collectors
                    .iter()
                    .map(|c| CollectorReport {
                        id: c.spec.id,
                        outcome: CollectorOutcome::Busy,
                        duration_secs: 0.0,
                    })
                    .collect(),
            };
        }
        let _guard = CollectingGuard(&self.collecting);

        let deadline = start + self.config.scrape_timeout;
        let mut reports = Vec::with_capacity(self.collectors.len());

        for collector in &self.collectors {
            let id = collector.spec.id;
            let collector_start = Instant::now();

            let outcome = if collector_start >= deadline {
                CollectorOutcome::Skipped
            } else {
                let budget = self.config.query_timeout.min(deadline - collector_start);
                self.run_collector(collector, executor, budget).await
            };

            let elapsed = collector_start.elapsed();
            match &outcome {
                CollectorOutcome::Ok { rows } => {
                    debug!(collector = id, rows, elapsed_ms = elapsed.as_millis() as u64, "collected");
                }
                CollectorOutcome::Skipped => {
                    debug!(collector = id, "skipped, scrape deadline exceeded");
                }
                CollectorOutcome::Busy => {}
                CollectorOutcome::QueryFailed { error } => {
                    warn!(collector = id, error = %error, "collector query failed");
                }
                CollectorOutcome::TimedOut => {
                    warn!(collector = id, "collector query timed out");
                }
                CollectorOutcome::ArityMismatch { expected, found } => {
                    warn!(collector = id, expected, found, "unexpected column count");
                }
            }

            self.success
                .set_labeled(&[id], if outcome.is_ok() { 1.0 } else { 0.0 });
            self.duration.set_labeled(&[id], elapsed.as_secs_f64());

            reports.push(CollectorReport {
                id,
                outcome,
                duration_secs: elapsed.as_secs_f64(),
            });
        }

        let report = ScrapeReport {
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            collectors: reports,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = (report.duration_secs * 1000.0) as u64,
            "scrape finished"
        );
        report
    }

    async fn run_collector<E: QueryExecutor>(
        &self,
        collector: &RegisteredCollector,
        executor: &mut E,
        budget: Duration,
    ) -> CollectorOutcome {
        let spec = &collector.spec;

        let rows = match tokio::time::timeout(budget, executor.execute(spec.query)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(QueryError::Timeout(_))) | Err(_) => {
                // The connection may still be mid-response.
                executor.reset();
                return CollectorOutcome::TimedOut;
            }
            Ok(Err(e)) => {
                return CollectorOutcome::QueryFailed {
                    error: e.to_string(),
                };
            }
        };

        if let Some(row) = rows.iter().find(|r| r.len() != spec.columns) {
            return CollectorOutcome::ArityMismatch {
                expected: spec.columns,
                found: row.len(),
            };
        }

        (spec.mapping)(&rows, &collector.metrics);
        CollectorOutcome::Ok { rows: rows.len() }
    }
}
