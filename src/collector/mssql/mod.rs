//! SQL Server collector set.
//!
//! Each submodule groups the collectors that read one family of dynamic
//! management views:
//! - `instance` - liveness, product version, server clock
//! - `connections` - `sys.sysprocesses` / `sys.dm_exec_sessions`
//! - `counters` - `sys.dm_os_performance_counters`
//! - `databases` - `sys.databases`, `sys.master_files`, virtual file stats
//! - `memory` - `sys.dm_os_process_memory`, `sys.dm_os_sys_memory`
//! - `replication` - availability group replica states
//!
//! Column order in every query is part of the collector contract: mappings read
//! cells by position.

mod connections;
mod counters;
mod databases;
mod instance;
mod memory;
mod replication;

use super::{CollectorSpec, Metrics, Row};

pub use connections::{MSSQL_CLIENT_CONNECTIONS, MSSQL_CONNECTIONS};
pub use counters::{
    MSSQL_BATCH_REQUESTS, MSSQL_BUFFER_CACHE_HIT_RATIO, MSSQL_BUFFER_MANAGER, MSSQL_DEADLOCKS,
    MSSQL_FULL_SCANS, MSSQL_KILL_CONNECTION_ERRORS, MSSQL_LOG_GROWTHS,
    MSSQL_PLAN_CACHE_HIT_RATIO, MSSQL_SQL_COMPILATIONS, MSSQL_TRANSACTIONS, MSSQL_USER_ERRORS,
};
pub use databases::{MSSQL_DATABASE_FILESIZE, MSSQL_DATABASE_STATE, MSSQL_IO_STALL};
pub use instance::{MSSQL_INSTANCE_LOCAL_TIME, MSSQL_PRODUCT_VERSION, MSSQL_UP};
pub use memory::{MSSQL_OS_PROCESS_MEMORY, MSSQL_OS_SYS_MEMORY};
pub use replication::MSSQL_AG_SYNC_LAG;

/// Every collector, in scrape order.
pub const COLLECTORS: &[CollectorSpec] = &[
    MSSQL_UP,
    MSSQL_PRODUCT_VERSION,
    MSSQL_INSTANCE_LOCAL_TIME,
    MSSQL_CONNECTIONS,
    MSSQL_CLIENT_CONNECTIONS,
    MSSQL_DEADLOCKS,
    MSSQL_USER_ERRORS,
    MSSQL_KILL_CONNECTION_ERRORS,
    MSSQL_DATABASE_STATE,
    MSSQL_LOG_GROWTHS,
    MSSQL_DATABASE_FILESIZE,
    MSSQL_BUFFER_MANAGER,
    MSSQL_IO_STALL,
    MSSQL_BATCH_REQUESTS,
    MSSQL_TRANSACTIONS,
    MSSQL_OS_PROCESS_MEMORY,
    MSSQL_OS_SYS_MEMORY,
    MSSQL_BUFFER_CACHE_HIT_RATIO,
    MSSQL_FULL_SCANS,
    MSSQL_PLAN_CACHE_HIT_RATIO,
    MSSQL_SQL_COMPILATIONS,
    MSSQL_AG_SYNC_LAG,
];

/// Publishes the columns of the first row, column `i` to gauge `keys[i]`.
///
/// Covers both single-value collectors and pivoted counter rows.
fn map_first_row(rows: &[Row], metrics: &Metrics, keys: &[&str]) {
    let Some(row) = rows.first() else {
        return;
    };
    for (i, key) in keys.iter().enumerate() {
        metrics.set(key, row.number(i));
    }
}

/// One labeled update per row.
///
/// The first `label_columns` columns are the label values, in declaration
/// order; the column right after them is the value.
fn map_per_row(rows: &[Row], metrics: &Metrics, key: &str, label_columns: usize) {
    for row in rows {
        let labels: Vec<String> = (0..label_columns).map(|i| row.label(i)).collect();
        let labels: Vec<&str> = labels.iter().map(String::as_str).collect();
        metrics.set_labeled(key, &labels, row.number(label_columns));
    }
}

/// `numerator / denominator * 100` from the first row's two columns.
///
/// Nothing is published when either side is non-numeric or the denominator
/// is zero.
fn map_ratio(rows: &[Row], metrics: &Metrics, key: &str) {
    let Some(row) = rows.first() else {
        return;
    };
    let ratio = match (row.number(0), row.number(1)) {
        (Some(hit), Some(base)) if base != 0.0 => Some(hit / base * 100.0),
        _ => None,
    };
    metrics.set(key, ratio);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::registry::MetricRegistry;

    /// Registers `spec` into a fresh registry and runs its mapping once.
    pub(crate) fn apply(spec: &CollectorSpec, rows: &[Row]) -> MetricRegistry {
        let registry = MetricRegistry::new();
        apply_to(&registry, spec, rows);
        registry
    }

    /// Like `apply`, on a caller-owned registry. Returns the handles so the
    /// mapping can be run again.
    pub(crate) fn apply_to(
        registry: &MetricRegistry,
        spec: &CollectorSpec,
        rows: &[Row],
    ) -> Metrics {
        let gauges = spec
            .metrics
            .iter()
            .map(|m| (m.key, registry.register(&m.descriptor).unwrap()))
            .collect();
        let metrics = Metrics::new(spec.id, gauges);
        (spec.mapping)(rows, &metrics);
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MetricRegistry;
    use std::collections::HashSet;

    #[test]
    fn collector_ids_and_metric_names_are_unique() {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for spec in COLLECTORS {
            assert!(ids.insert(spec.id), "duplicate collector {}", spec.id);
            for m in spec.metrics {
                assert!(names.insert(m.descriptor.name), "duplicate metric {}", m.descriptor.name);
            }
        }
        assert_eq!(COLLECTORS.len(), 22);
    }

    #[test]
    fn whole_set_registers_into_one_registry() {
        let registry = MetricRegistry::new();
        for spec in COLLECTORS {
            for m in spec.metrics {
                registry.register(&m.descriptor).unwrap();
            }
        }
    }

    #[test]
    fn every_mapping_ignores_empty_result_sets() {
        for spec in COLLECTORS {
            let registry = testing::apply(spec, &[]);
            for m in spec.metrics.iter().filter(|m| !m.descriptor.labels.is_empty()) {
                assert_eq!(registry.series_count(m.descriptor.name), 0, "{}", spec.id);
            }
            for m in spec.metrics.iter().filter(|m| m.descriptor.labels.is_empty()) {
                // Scalar gauges start at zero and stay there.
                assert_eq!(registry.value(m.descriptor.name, &[]), Some(0.0), "{}", spec.id);
            }
        }
    }

    #[test]
    fn every_mapping_tolerates_non_numeric_rows() {
        for spec in COLLECTORS {
            let row = Row::new(vec!["garbage".into(); spec.columns]);
            let registry = testing::apply(spec, &[row]);
            for m in spec.metrics.iter().filter(|m| m.descriptor.labels.is_empty()) {
                assert_eq!(registry.value(m.descriptor.name, &[]), Some(0.0), "{}", spec.id);
            }
            for m in spec.metrics.iter().filter(|m| !m.descriptor.labels.is_empty()) {
                assert_eq!(registry.series_count(m.descriptor.name), 0, "{}", spec.id);
            }
        }
    }

    #[test]
    fn every_mapping_publishes_every_metric_from_a_numeric_row() {
        for spec in COLLECTORS {
            // "15.0" is a number, a label and a product version at once.
            let row = Row::new(vec!["15.0".into(); spec.columns]);
            let registry = testing::apply(spec, &[row]);
            for m in spec.metrics {
                let name = m.descriptor.name;
                if m.descriptor.labels.is_empty() {
                    let value = registry.value(name, &[]);
                    assert!(matches!(value, Some(v) if v != 0.0), "{} {}: {:?}", spec.id, name, value);
                } else {
                    assert!(registry.series_count(name) > 0, "{} {}", spec.id, name);
                }
            }
        }
    }

    #[test]
    fn ratio_requires_non_zero_denominator() {
        let registry = testing::apply(&MSSQL_BUFFER_CACHE_HIT_RATIO, &[crate::row![500, 0]]);
        assert_eq!(registry.value("mssql_buffer_cache_hit_ratio", &[]), Some(0.0));

        let registry = testing::apply(&MSSQL_BUFFER_CACHE_HIT_RATIO, &[crate::row![500, 1000]]);
        assert_eq!(registry.value("mssql_buffer_cache_hit_ratio", &[]), Some(50.0));
    }
}
