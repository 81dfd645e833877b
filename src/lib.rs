//! mssql-exporter - Prometheus exporter for Microsoft SQL Server.
//!
//! Periodically-scraped gauges built from SQL Server dynamic management
//! views. The library holds everything but argument parsing:
//! - `collector` - the collector set and the scrape orchestrator
//! - `executor` - query execution (SQL Server over TDS, or scripted)
//! - `registry` - gauge registration and text exposition
//! - `server` - HTTP endpoints

pub mod collector;
pub mod executor;
pub mod registry;
pub mod server;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
