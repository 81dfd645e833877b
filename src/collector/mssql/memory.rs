//! Process and operating system memory.

use super::map_first_row;
use crate::collector::{CollectorSpec, MetricDef};
use crate::registry::MetricDescriptor;

const PROCESS_MEMORY_KEYS: &[&str] = &["page_fault_count", "memory_utilization_percentage"];

pub const MSSQL_OS_PROCESS_MEMORY: CollectorSpec = CollectorSpec {
    id: "mssql_os_process_memory",
    metrics: &[
        MetricDef::new(
            "page_fault_count",
            MetricDescriptor::scalar(
                "mssql_page_fault_count",
                "Number of page faults since last restart",
            ),
        ),
        MetricDef::new(
            "memory_utilization_percentage",
            MetricDescriptor::scalar(
                "mssql_memory_utilization_percentage",
                "Percentage of memory utilization",
            ),
        ),
    ],
    query: r#"SELECT page_fault_count, memory_utilization_percentage
FROM sys.dm_os_process_memory"#,
    columns: 2,
    mapping: |rows, metrics| map_first_row(rows, metrics, PROCESS_MEMORY_KEYS),
};

const SYS_MEMORY_KEYS: &[&str] = &[
    "total_physical_memory_kb",
    "available_physical_memory_kb",
    "total_page_file_kb",
    "available_page_file_kb",
];

pub const MSSQL_OS_SYS_MEMORY: CollectorSpec = CollectorSpec {
    id: "mssql_os_sys_memory",
    metrics: &[
        MetricDef::new(
            "total_physical_memory_kb",
            MetricDescriptor::scalar(
                "mssql_total_physical_memory_kb",
                "Total physical memory in KB",
            ),
        ),
        MetricDef::new(
            "available_physical_memory_kb",
            MetricDescriptor::scalar(
                "mssql_available_physical_memory_kb",
                "Available physical memory in KB",
            ),
        ),
        MetricDef::new(
            "total_page_file_kb",
            MetricDescriptor::scalar("mssql_total_page_file_kb", "Total page file in KB"),
        ),
        MetricDef::new(
            "available_page_file_kb",
            MetricDescriptor::scalar("mssql_available_page_file_kb", "Available page file in KB"),
        ),
    ],
    query: r#"SELECT total_physical_memory_kb, available_physical_memory_kb, total_page_file_kb, available_page_file_kb
FROM sys.dm_os_sys_memory"#,
    columns: 4,
    mapping: |rows, metrics| map_first_row(rows, metrics, SYS_MEMORY_KEYS),
};
