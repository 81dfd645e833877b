//! SQL Server metric collection.
//!
//! - `row` / `version` - result cells and value coercion
//! - `spec` - the collector contract (query + gauges + mapping)
//! - `mssql` - the SQL Server collector set
//! - `orchestrator` - runs the set once per scrape

pub mod mssql;
mod orchestrator;
mod row;
mod spec;
pub mod version;

pub use orchestrator::{
    CollectorOutcome, CollectorReport, Orchestrator, OrchestratorConfig, ScrapeReport,
};
pub use row::{Cell, Row};
pub use spec::{CollectorSpec, MapFn, MetricDef, Metrics};
pub use version::ProductVersion;
