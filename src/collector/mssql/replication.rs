//! Availability group synchronization lag.

use super::map_per_row;
use crate::collector::{CollectorSpec, MetricDef};
use crate::registry::MetricDescriptor;

pub const MSSQL_AG_SYNC_LAG: CollectorSpec = CollectorSpec {
    id: "mssql_ag_sync_lag",
    metrics: &[MetricDef::new(
        "ag_sync_lag_secs",
        MetricDescriptor::labeled(
            "mssql_ag_sync_lag_secs",
            "Synchronization lag in seconds between primary and secondary replicas in Availability Group",
            &["database", "replica", "sync_state"],
        ),
    )],
    // Only remote replicas; an instance outside any AG returns no rows.
    query: r#"SELECT
    db_name(database_id) as database_name,
    replica_server_name,
    synchronization_state_desc,
    secondary_lag_seconds
  FROM sys.dm_hadr_database_replica_states drs
  JOIN sys.availability_replicas ar ON drs.replica_id = ar.replica_id
  WHERE is_local = 0"#,
    columns: 4,
    mapping: |rows, metrics| map_per_row(rows, metrics, "ag_sync_lag_secs", 3),
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mssql::testing::apply;
    use crate::row;

    #[test]
    fn lag_is_labeled_by_database_replica_and_state() {
        let registry = apply(
            &MSSQL_AG_SYNC_LAG,
            &[
                row!["sales", "SQL-B", "SYNCHRONIZING", 4],
                row!["hr", "SQL-B", "NOT SYNCHRONIZING", None::<i64>],
            ],
        );
        assert_eq!(
            registry.value(
                "mssql_ag_sync_lag_secs",
                &[("database", "sales"), ("replica", "SQL-B"), ("sync_state", "SYNCHRONIZING")],
            ),
            Some(4.0)
        );
        assert_eq!(registry.series_count("mssql_ag_sync_lag_secs"), 1);
    }
}
