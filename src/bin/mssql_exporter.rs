//! mssql_exporter - Prometheus exporter for Microsoft SQL Server.
//!
//! Serves `/metrics` on the configured port; every request runs the full
//! collector set against the monitored instance.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::net::{IpAddr, SocketAddr};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use mssql_exporter::collector::mssql::COLLECTORS;
use mssql_exporter::collector::{Orchestrator, OrchestratorConfig};
use mssql_exporter::executor::{MssqlConfig, MssqlExecutor};
use mssql_exporter::registry::MetricRegistry;
use mssql_exporter::server::{self, AppState};

/// Prometheus exporter for Microsoft SQL Server.
#[derive(Parser)]
#[command(name = "mssql_exporter", about = "Prometheus exporter for Microsoft SQL Server", version = mssql_exporter::VERSION)]
struct Args {
    /// SQL Server host name or address.
    #[arg(long, default_value = "localhost", env = "SERVER")]
    server: String,

    /// SQL Server port.
    #[arg(long, default_value = "1433", env = "PORT")]
    port: u16,

    /// Login for SQL Server authentication.
    #[arg(long, env = "USERNAME")]
    username: String,

    /// Password for SQL Server authentication.
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: String,

    /// Encrypt the connection. Disable with --encrypt=false.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "ENCRYPT")]
    encrypt: bool,

    /// Accept the server certificate without validation.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "TRUST_SERVER_CERTIFICATE")]
    trust_server_certificate: bool,

    /// Port to serve metrics on.
    #[arg(long, default_value = "4000", env = "EXPOSE")]
    expose: u16,

    /// Address to serve metrics on.
    #[arg(long, default_value = "0.0.0.0", env = "LISTEN_HOST")]
    listen_host: IpAddr,

    /// Per-query timeout in seconds.
    #[arg(long, default_value = "10", env = "QUERY_TIMEOUT")]
    query_timeout: u64,

    /// Whole-scrape timeout in seconds.
    #[arg(long, default_value = "30", env = "SCRAPE_TIMEOUT")]
    scrape_timeout: u64,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    match format!("mssql_exporter={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("invalid log directive: {}", e),
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build tokio runtime");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(async_main(args)) {
        error!(error = %e, "exporter stopped");
        process::exit(1);
    }
}

async fn async_main(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    info!(version = mssql_exporter::VERSION, "starting mssql_exporter");

    let registry = MetricRegistry::new();
    let orchestrator = Orchestrator::register(&registry, COLLECTORS)?.with_config(OrchestratorConfig {
        query_timeout: Duration::from_secs(args.query_timeout),
        scrape_timeout: Duration::from_secs(args.scrape_timeout),
    });
    info!(
        collectors = COLLECTORS.len(),
        query_timeout_s = args.query_timeout,
        scrape_timeout_s = args.scrape_timeout,
        "collectors registered"
    );

    let mut executor = MssqlExecutor::new(MssqlConfig {
        host: args.server,
        port: args.port,
        username: args.username,
        password: args.password,
        encrypt: args.encrypt,
        trust_server_certificate: args.trust_server_certificate,
        ..MssqlConfig::default()
    });

    // The first scrape retries the connection, so a down server is not fatal here.
    if let Err(e) = executor.try_connect().await {
        warn!(error = %e, "SQL Server is not reachable yet");
    }

    let state = Arc::new(AppState::new(registry, orchestrator, executor));
    let addr = SocketAddr::new(args.listen_host, args.expose);
    server::serve(addr, state).await?;
    Ok(())
}
