//! Collectors over `sys.dm_os_performance_counters`.
//!
//! The `/sec` counters are cumulative raw values since the last restart; they
//! are exported as-is and turned into rates by the consumer.

use super::{map_first_row, map_per_row, map_ratio};
use crate::collector::{CollectorSpec, MetricDef};
use crate::registry::MetricDescriptor;

pub const MSSQL_DEADLOCKS: CollectorSpec = CollectorSpec {
    id: "mssql_deadlocks",
    metrics: &[MetricDef::new(
        "deadlocks",
        MetricDescriptor::scalar(
            "mssql_deadlocks",
            "Number of lock requests per second that resulted in a deadlock since last restart",
        ),
    )],
    query: r#"SELECT cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Number of Deadlocks/sec' AND instance_name = '_Total'"#,
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["deadlocks"]),
};

pub const MSSQL_USER_ERRORS: CollectorSpec = CollectorSpec {
    id: "mssql_user_errors",
    metrics: &[MetricDef::new(
        "user_errors",
        MetricDescriptor::scalar(
            "mssql_user_errors",
            "Number of user errors/sec since last restart",
        ),
    )],
    query: r#"SELECT cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Errors/sec' AND instance_name = 'User Errors'"#,
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["user_errors"]),
};

pub const MSSQL_KILL_CONNECTION_ERRORS: CollectorSpec = CollectorSpec {
    id: "mssql_kill_connection_errors",
    metrics: &[MetricDef::new(
        "kill_connection_errors",
        MetricDescriptor::scalar(
            "mssql_kill_connection_errors",
            "Number of kill connection errors/sec since last restart",
        ),
    )],
    query: r#"SELECT cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Errors/sec' AND instance_name = 'Kill Connection Errors'"#,
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["kill_connection_errors"]),
};

pub const MSSQL_LOG_GROWTHS: CollectorSpec = CollectorSpec {
    id: "mssql_log_growths",
    metrics: &[MetricDef::new(
        "log_growths",
        MetricDescriptor::labeled(
            "mssql_log_growths",
            "Total number of times the transaction log for the database has been expanded last restart",
            &["database"],
        ),
    )],
    query: r#"SELECT rtrim(instance_name), cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Log Growths' and instance_name <> '_Total'"#,
    columns: 2,
    mapping: |rows, metrics| map_per_row(rows, metrics, "log_growths", 1),
};

/// Pivot column order; gauge `BUFFER_MANAGER_KEYS[i]` reads column `i`.
const BUFFER_MANAGER_KEYS: &[&str] = &[
    "page_read",
    "page_write",
    "page_life_expectancy",
    "lazy_write",
    "page_checkpoint",
];

pub const MSSQL_BUFFER_MANAGER: CollectorSpec = CollectorSpec {
    id: "mssql_buffer_manager",
    metrics: &[
        MetricDef::new(
            "page_read",
            MetricDescriptor::scalar("mssql_page_read_total", "Page reads/sec"),
        ),
        MetricDef::new(
            "page_write",
            MetricDescriptor::scalar("mssql_page_write_total", "Page writes/sec"),
        ),
        MetricDef::new(
            "page_life_expectancy",
            MetricDescriptor::scalar(
                "mssql_page_life_expectancy",
                "Indicates the minimum number of seconds a page will stay in the buffer pool on this node without references. The traditional advice from Microsoft used to be that the PLE should remain above 300 seconds",
            ),
        ),
        MetricDef::new(
            "lazy_write",
            MetricDescriptor::scalar("mssql_lazy_write_total", "Lazy writes/sec"),
        ),
        MetricDef::new(
            "page_checkpoint",
            MetricDescriptor::scalar("mssql_page_checkpoint_total", "Checkpoint pages/sec"),
        ),
    ],
    query: r#"SELECT * FROM
        (
            SELECT rtrim(counter_name) as counter_name, cntr_value
            FROM sys.dm_os_performance_counters
            WHERE counter_name in ('Page reads/sec', 'Page writes/sec', 'Page life expectancy', 'Lazy writes/sec', 'Checkpoint pages/sec')
            AND object_name = 'SQLServer:Buffer Manager'
        ) d
        PIVOT
        (
        MAX(cntr_value)
        FOR counter_name IN ([Page reads/sec], [Page writes/sec], [Page life expectancy], [Lazy writes/sec], [Checkpoint pages/sec])
        ) piv"#,
    columns: 5,
    mapping: |rows, metrics| map_first_row(rows, metrics, BUFFER_MANAGER_KEYS),
};

pub const MSSQL_BATCH_REQUESTS: CollectorSpec = CollectorSpec {
    id: "mssql_batch_requests",
    metrics: &[MetricDef::new(
        "batch_requests",
        MetricDescriptor::scalar(
            "mssql_batch_requests",
            "Number of Transact-SQL command batches received per second. This statistic is affected by all constraints (such as I/O, number of users, cachesize, complexity of requests, and so on). High batch requests mean good throughput",
        ),
    )],
    query: r#"SELECT TOP 1 cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Batch Requests/sec'"#,
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["batch_requests"]),
};

pub const MSSQL_TRANSACTIONS: CollectorSpec = CollectorSpec {
    id: "mssql_transactions",
    metrics: &[MetricDef::new(
        "transactions",
        MetricDescriptor::labeled(
            "mssql_transactions",
            "Number of transactions started for the database per second. Transactions/sec does not count XTP-only transactions (transactions started by a natively compiled stored procedure.)",
            &["database"],
        ),
    )],
    query: r#"SELECT rtrim(instance_name), cntr_value
FROM sys.dm_os_performance_counters
WHERE counter_name = 'Transactions/sec' AND instance_name <> '_Total'"#,
    columns: 2,
    mapping: |rows, metrics| map_per_row(rows, metrics, "transactions", 1),
};

pub const MSSQL_BUFFER_CACHE_HIT_RATIO: CollectorSpec = CollectorSpec {
    id: "mssql_buffer_cache_hit_ratio",
    metrics: &[MetricDef::new(
        "cache_hit_ratio",
        MetricDescriptor::scalar(
            "mssql_buffer_cache_hit_ratio",
            "Buffer cache hit ratio percentage",
        ),
    )],
    query: r#"SELECT
    a.cntr_value AS hit_ratio,
    b.cntr_value AS hit_ratio_base
  FROM sys.dm_os_performance_counters a
  JOIN sys.dm_os_performance_counters b
    ON a.object_name = b.object_name
  WHERE a.counter_name = 'Buffer cache hit ratio'
    AND b.counter_name = 'Buffer cache hit ratio base'"#,
    columns: 2,
    mapping: |rows, metrics| map_ratio(rows, metrics, "cache_hit_ratio"),
};

pub const MSSQL_FULL_SCANS: CollectorSpec = CollectorSpec {
    id: "mssql_full_scans",
    metrics: &[MetricDef::new(
        "full_scans",
        MetricDescriptor::scalar("mssql_full_scans", "Full table scans per second"),
    )],
    query: r#"SELECT cntr_value
  FROM sys.dm_os_performance_counters
  WHERE counter_name = 'Full Scans/sec'
    AND object_name = 'SQLServer:Access Methods'"#,
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["full_scans"]),
};

pub const MSSQL_PLAN_CACHE_HIT_RATIO: CollectorSpec = CollectorSpec {
    id: "mssql_plan_cache_hit_ratio",
    metrics: &[MetricDef::new(
        "plan_cache_hit_ratio",
        MetricDescriptor::scalar(
            "mssql_plan_cache_hit_ratio",
            "Plan Cache hit ratio percentage",
        ),
    )],
    query: r#"SELECT
    a.cntr_value AS hit_ratio,
    b.cntr_value AS hit_ratio_base
  FROM sys.dm_os_performance_counters a
  JOIN sys.dm_os_performance_counters b
    ON a.object_name = b.object_name
    AND a.instance_name = b.instance_name
  WHERE a.counter_name = 'Cache Hit Ratio'
    AND b.counter_name = 'Cache Hit Ratio Base'
    AND a.object_name = 'SQLServer:Plan Cache'
    AND a.instance_name = '_Total'"#,
    columns: 2,
    mapping: |rows, metrics| map_ratio(rows, metrics, "plan_cache_hit_ratio"),
};

const SQL_STATISTICS_KEYS: &[&str] = &[
    "compilations",
    "recompilations",
    "forced_parameterizations",
    "auto_param_attempts",
    "failed_auto_params",
    "safe_auto_params",
    "unsafe_auto_params",
];

pub const MSSQL_SQL_COMPILATIONS: CollectorSpec = CollectorSpec {
    id: "mssql_sql_compilations",
    metrics: &[
        MetricDef::new(
            "compilations",
            MetricDescriptor::scalar(
                "mssql_sql_compilations",
                "Number of SQL compilations per second",
            ),
        ),
        MetricDef::new(
            "recompilations",
            MetricDescriptor::scalar(
                "mssql_sql_recompilations",
                "Number of SQL recompilations per second",
            ),
        ),
        MetricDef::new(
            "forced_parameterizations",
            MetricDescriptor::scalar(
                "mssql_forced_parameterizations",
                "Number of forced parameterizations per second",
            ),
        ),
        MetricDef::new(
            "auto_param_attempts",
            MetricDescriptor::scalar(
                "mssql_auto_param_attempts",
                "Number of auto-parameterization attempts per second",
            ),
        ),
        MetricDef::new(
            "failed_auto_params",
            MetricDescriptor::scalar(
                "mssql_failed_auto_params",
                "Number of failed auto-parameterizations per second",
            ),
        ),
        MetricDef::new(
            "safe_auto_params",
            MetricDescriptor::scalar(
                "mssql_safe_auto_params",
                "Number of safe auto-parameterizations per second",
            ),
        ),
        MetricDef::new(
            "unsafe_auto_params",
            MetricDescriptor::scalar(
                "mssql_unsafe_auto_params",
                "Number of unsafe auto-parameterizations per second",
            ),
        ),
    ],
    query: r#"SELECT
    SUM(CASE WHEN counter_name = 'SQL Compilations/sec' THEN cntr_value ELSE 0 END) AS compilations,
    SUM(CASE WHEN counter_name = 'SQL Re-Compilations/sec' THEN cntr_value ELSE 0 END) AS recompilations,
    SUM(CASE WHEN counter_name = 'Forced Parameterizations/sec' THEN cntr_value ELSE 0 END) AS forced_params,
    SUM(CASE WHEN counter_name = 'Auto-Param Attempts/sec' THEN cntr_value ELSE 0 END) AS auto_param_attempts,
    SUM(CASE WHEN counter_name = 'Failed Auto-Params/sec' THEN cntr_value ELSE 0 END) AS failed_auto_params,
    SUM(CASE WHEN counter_name = 'Safe Auto-Params/sec' THEN cntr_value ELSE 0 END) AS safe_auto_params,
    SUM(CASE WHEN counter_name = 'Unsafe Auto-Params/sec' THEN cntr_value ELSE 0 END) AS unsafe_auto_params
  FROM sys.dm_os_performance_counters
  WHERE object_name = 'SQLServer:SQL Statistics'
    AND counter_name IN (
      'SQL Compilations/sec',
      'SQL Re-Compilations/sec',
      'Forced Parameterizations/sec',
      'Auto-Param Attempts/sec',
      'Failed Auto-Params/sec',
      'Safe Auto-Params/sec',
      'Unsafe Auto-Params/sec'
    )"#,
    columns: 7,
    mapping: |rows, metrics| map_first_row(rows, metrics, SQL_STATISTICS_KEYS),
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mssql::testing::apply;
    use crate::row;

    #[test]
    fn buffer_manager_pivot_publishes_each_column() {
        let registry = apply(&MSSQL_BUFFER_MANAGER, &[row![100, 200, 3600, 4, 50]]);
        assert_eq!(registry.value("mssql_page_read_total", &[]), Some(100.0));
        assert_eq!(registry.value("mssql_page_write_total", &[]), Some(200.0));
        assert_eq!(registry.value("mssql_page_life_expectancy", &[]), Some(3600.0));
        assert_eq!(registry.value("mssql_lazy_write_total", &[]), Some(4.0));
        assert_eq!(registry.value("mssql_page_checkpoint_total", &[]), Some(50.0));
    }

    #[test]
    fn one_bad_pivot_column_does_not_block_the_others() {
        let registry = apply(&MSSQL_BUFFER_MANAGER, &[row![100, None::<i64>, 3600, "x", 50]]);
        assert_eq!(registry.value("mssql_page_read_total", &[]), Some(100.0));
        assert_eq!(registry.value("mssql_page_write_total", &[]), Some(0.0));
        assert_eq!(registry.value("mssql_page_life_expectancy", &[]), Some(3600.0));
        assert_eq!(registry.value("mssql_lazy_write_total", &[]), Some(0.0));
        assert_eq!(registry.value("mssql_page_checkpoint_total", &[]), Some(50.0));
    }

    #[test]
    fn plan_cache_ratio_is_a_percentage() {
        let registry = apply(&MSSQL_PLAN_CACHE_HIT_RATIO, &[row![750, 1000]]);
        assert_eq!(registry.value("mssql_plan_cache_hit_ratio", &[]), Some(75.0));

        let registry = apply(&MSSQL_PLAN_CACHE_HIT_RATIO, &[row![750, "n/a"]]);
        assert_eq!(registry.value("mssql_plan_cache_hit_ratio", &[]), Some(0.0));
    }

    #[test]
    fn kill_connection_errors_are_guarded() {
        let registry = apply(&MSSQL_KILL_CONNECTION_ERRORS, &[row![2]]);
        assert_eq!(registry.value("mssql_kill_connection_errors", &[]), Some(2.0));

        let registry = apply(&MSSQL_KILL_CONNECTION_ERRORS, &[row!["n/a"]]);
        assert_eq!(registry.value("mssql_kill_connection_errors", &[]), Some(0.0));
    }

    #[test]
    fn sql_statistics_map_all_seven_columns() {
        let registry = apply(&MSSQL_SQL_COMPILATIONS, &[row![1, 2, 3, 4, 5, 6, 7]]);
        let names = [
            "mssql_sql_compilations",
            "mssql_sql_recompilations",
            "mssql_forced_parameterizations",
            "mssql_auto_param_attempts",
            "mssql_failed_auto_params",
            "mssql_safe_auto_params",
            "mssql_unsafe_auto_params",
        ];
        for (i, name) in names.iter().enumerate() {
            assert_eq!(registry.value(name, &[]), Some((i + 1) as f64), "{}", name);
        }
    }

    #[test]
    fn per_database_counters_fan_out() {
        let registry = apply(
            &MSSQL_TRANSACTIONS,
            &[row!["app", 1200], row!["tempdb", 30], row!["broken", "x"]],
        );
        assert_eq!(registry.value("mssql_transactions", &[("database", "app")]), Some(1200.0));
        assert_eq!(registry.value("mssql_transactions", &[("database", "tempdb")]), Some(30.0));
        assert_eq!(registry.series_count("mssql_transactions"), 2);

        let registry = apply(&MSSQL_LOG_GROWTHS, &[row!["app", 4]]);
        assert_eq!(registry.value("mssql_log_growths", &[("database", "app")]), Some(4.0));
    }

    #[test]
    fn pivot_keys_match_declared_metrics() {
        let declared: Vec<_> = MSSQL_BUFFER_MANAGER.metrics.iter().map(|m| m.key).collect();
        assert_eq!(declared, BUFFER_MANAGER_KEYS);
        let declared: Vec<_> = MSSQL_SQL_COMPILATIONS.metrics.iter().map(|m| m.key).collect();
        assert_eq!(declared, SQL_STATISTICS_KEYS);
    }
}
