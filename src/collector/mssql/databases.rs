//! Per-database state, file sizes and I/O stalls.

use super::map_per_row;
use crate::collector::{CollectorSpec, MetricDef, Metrics, Row};
use crate::registry::MetricDescriptor;

pub const MSSQL_DATABASE_STATE: CollectorSpec = CollectorSpec {
    id: "mssql_database_state",
    metrics: &[MetricDef::new(
        "database_state",
        MetricDescriptor::labeled(
            "mssql_database_state",
            "Databases states: 0=ONLINE 1=RESTORING 2=RECOVERING 3=RECOVERY_PENDING 4=SUSPECT 5=EMERGENCY 6=OFFLINE 7=COPYING 10=OFFLINE_SECONDARY",
            &["database"],
        ),
    )],
    query: "SELECT name,state FROM master.sys.databases",
    columns: 2,
    mapping: |rows, metrics| map_per_row(rows, metrics, "database_state", 1),
};

pub const MSSQL_DATABASE_FILESIZE: CollectorSpec = CollectorSpec {
    id: "mssql_database_filesize",
    metrics: &[MetricDef::new(
        "filesize",
        MetricDescriptor::labeled(
            "mssql_database_filesize",
            "Physical sizes of files used by database in KB, their names and types (0=rows, 1=log, 2=filestream,3=n/a 4=fulltext(before v2008 of MSSQL))",
            &["database", "logicalname", "type", "filename"],
        ),
    )],
    query: "SELECT DB_NAME(database_id) AS database_name, name AS logical_name, type, physical_name, (size * CAST(8 AS BIGINT)) size_kb FROM sys.master_files",
    columns: 5,
    mapping: |rows, metrics| map_per_row(rows, metrics, "filesize", 4),
};

pub const MSSQL_IO_STALL: CollectorSpec = CollectorSpec {
    id: "mssql_io_stall",
    metrics: &[
        MetricDef::new(
            "io_stall",
            MetricDescriptor::labeled(
                "mssql_io_stall",
                "Wait time (ms) of stall since last restart",
                &["database", "type"],
            ),
        ),
        MetricDef::new(
            "io_stall_total",
            MetricDescriptor::labeled(
                "mssql_io_stall_total",
                "Wait time (ms) of stall since last restart",
                &["database"],
            ),
        ),
    ],
    query: r#"SELECT
cast(DB_Name(a.database_id) as varchar) as name,
    max(io_stall_read_ms),
    max(io_stall_write_ms),
    max(io_stall),
    max(io_stall_queued_read_ms),
    max(io_stall_queued_write_ms)
FROM
sys.dm_io_virtual_file_stats(null, null) a
INNER JOIN sys.master_files b ON a.database_id = b.database_id and a.file_id = b.file_id
GROUP BY a.database_id"#,
    columns: 6,
    mapping: map_io_stall,
};

/// Column index of each stall kind in the I/O stall projection.
const IO_STALL_KINDS: &[(&str, usize)] = &[
    ("read", 1),
    ("write", 2),
    ("queued_read", 4),
    ("queued_write", 5),
];

fn map_io_stall(rows: &[Row], metrics: &Metrics) {
    for row in rows {
        let database = row.label(0);
        metrics.set_labeled("io_stall_total", &[database.as_str()], row.number(3));
        for &(kind, column) in IO_STALL_KINDS {
            metrics.set_labeled("io_stall", &[database.as_str(), kind], row.number(column));
        }
    }
}
