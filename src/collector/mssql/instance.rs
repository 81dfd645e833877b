//! Instance-level collectors: liveness, version, clock.

use super::map_first_row;
use crate::collector::version::ProductVersion;
use crate::collector::{CollectorSpec, MetricDef, Metrics, Row};
use crate::registry::MetricDescriptor;

pub const MSSQL_UP: CollectorSpec = CollectorSpec {
    id: "mssql_up",
    metrics: &[MetricDef::new(
        "up",
        MetricDescriptor::scalar("mssql_up", "UP Status"),
    )],
    query: "SELECT 1",
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["up"]),
};

pub const MSSQL_PRODUCT_VERSION: CollectorSpec = CollectorSpec {
    id: "mssql_product_version",
    metrics: &[MetricDef::new(
        "version",
        MetricDescriptor::scalar("mssql_product_version", "Instance version (Major.Minor)"),
    )],
    // sql_variant is not a usable wire type; convert on the server.
    query: "SELECT CONVERT(VARCHAR(128), SERVERPROPERTY('ProductVersion')) AS ProductVersion",
    columns: 1,
    mapping: map_product_version,
};

pub const MSSQL_INSTANCE_LOCAL_TIME: CollectorSpec = CollectorSpec {
    id: "mssql_instance_local_time",
    metrics: &[MetricDef::new(
        "local_time",
        MetricDescriptor::scalar(
            "mssql_instance_local_time",
            "Number of seconds since epoch on local instance",
        ),
    )],
    query: "SELECT DATEDIFF(second, '19700101', GETUTCDATE())",
    columns: 1,
    mapping: |rows, metrics| map_first_row(rows, metrics, &["local_time"]),
};

fn map_product_version(rows: &[Row], metrics: &Metrics) {
    let Some(row) = rows.first() else {
        return;
    };
    let version = ProductVersion::parse(&row.label(0)).map(|v| v.gauge_value());
    metrics.set("version", version.filter(|v| !v.is_nan()));
}
