//! Connection counts per database and per client host.

use super::map_per_row;
use crate::collector::{CollectorSpec, MetricDef, Metrics, Row};
use crate::registry::MetricDescriptor;

pub const MSSQL_CONNECTIONS: CollectorSpec = CollectorSpec {
    id: "mssql_connections",
    metrics: &[MetricDef::new(
        "connections",
        MetricDescriptor::labeled(
            "mssql_connections",
            "Number of active connections",
            &["database", "state"],
        ),
    )],
    query: r#"SELECT DB_NAME(sP.dbid)
        , COUNT(sP.spid)
FROM sys.sysprocesses sP
GROUP BY DB_NAME(sP.dbid)"#,
    columns: 2,
    mapping: map_connections,
};

pub const MSSQL_CLIENT_CONNECTIONS: CollectorSpec = CollectorSpec {
    id: "mssql_client_connections",
    metrics: &[MetricDef::new(
        "client_connections",
        MetricDescriptor::labeled(
            "mssql_client_connections",
            "Number of active client connections",
            &["client", "database"],
        ),
    )],
    query: r#"SELECT host_name, DB_NAME(dbid) dbname, COUNT(*) session_count
FROM sys.dm_exec_sessions a
LEFT JOIN sysprocesses b on a.session_id=b.spid
WHERE is_user_process=1
GROUP BY host_name, dbid"#,
    columns: 3,
    mapping: |rows, metrics| map_per_row(rows, metrics, "client_connections", 2),
};

/// The `state` label is always `current`.
fn map_connections(rows: &[Row], metrics: &Metrics) {
    for row in rows {
        let database = row.label(0);
        metrics.set_labeled("connections", &[database.as_str(), "current"], row.number(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mssql::testing::apply;
    use crate::row;

    #[test]
    fn connections_are_labeled_current() {
        let registry = apply(&MSSQL_CONNECTIONS, &[row!["master", 12], row!["app", 3]]);
        assert_eq!(
            registry.value("mssql_connections", &[("database", "master"), ("state", "current")]),
            Some(12.0)
        );
        assert_eq!(
            registry.value("mssql_connections", &[("database", "app"), ("state", "current")]),
            Some(3.0)
        );
    }

    #[test]
    fn null_database_is_labeled_null() {
        let registry = apply(&MSSQL_CONNECTIONS, &[row![None::<&str>, 4], row!["master", 3]]);
        let text = registry.encode_text().unwrap();
        assert!(text.contains(r#"mssql_connections{database="null",state="current"} 4"#));
        assert!(text.contains(r#"mssql_connections{database="master",state="current"} 3"#));
    }

    #[test]
    fn client_connections_use_host_and_database() {
        let registry = apply(
            &MSSQL_CLIENT_CONNECTIONS,
            &[row!["web-01", "app", 7], row!["web-02", "app", "n/a"]],
        );
        assert_eq!(
            registry.value("mssql_client_connections", &[("client", "web-01"), ("database", "app")]),
            Some(7.0)
        );
        assert_eq!(registry.series_count("mssql_client_connections"), 1);
    }

    #[test]
    fn null_client_host_is_labeled_null() {
        let registry = apply(&MSSQL_CLIENT_CONNECTIONS, &[row![None::<&str>, "app", 2]]);
        assert_eq!(
            registry.value("mssql_client_connections", &[("client", "null"), ("database", "app")]),
            Some(2.0)
        );
    }
}
