//! SQL Server executor over TDS.
//!
//! Holds a single connection that is established lazily on the first query.
//! Transport and protocol failures drop the connection so that the next
//! `execute` reconnects; server-side errors (bad syntax, missing view) leave
//! it in place.

use std::time::Duration;

use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, numeric::Numeric};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

use super::{QueryError, QueryExecutor};
use crate::collector::{Cell, Row};

const APPLICATION_NAME: &str = "mssql-exporter";

/// Connection settings for the monitored instance.
#[derive(Debug, Clone)]
pub struct MssqlConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Encrypt the whole session, not only the login packet.
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub connect_timeout: Duration,
}

impl Default for MssqlConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1433,
            username: String::new(),
            password: String::new(),
            encrypt: true,
            trust_server_certificate: true,
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl MssqlConfig {
    fn to_tiberius(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.application_name(APPLICATION_NAME);
        config.authentication(AuthMethod::sql_server(&self.username, &self.password));
        config.encryption(if self.encrypt {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        if self.trust_server_certificate {
            config.trust_cert();
        }
        config
    }

    /// `host:port`, for log lines.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Executor backed by a live SQL Server connection.
pub struct MssqlExecutor {
    config: MssqlConfig,
    client: Option<Client<Compat<TcpStream>>>,
}

impl MssqlExecutor {
    pub fn new(config: MssqlConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Attempts to connect without running a query.
    ///
    /// Useful as a startup check; failure is not fatal for the exporter.
    pub async fn try_connect(&mut self) -> Result<(), QueryError> {
        self.ensure_connected().await.map(|_| ())
    }

    async fn ensure_connected(&mut self) -> Result<&mut Client<Compat<TcpStream>>, QueryError> {
        if self.client.is_none() {
            match tokio::time::timeout(self.config.connect_timeout, self.connect()).await {
                Ok(Ok(client)) => {
                    info!(server = %self.config.address(), "connected to SQL Server");
                    self.client = Some(client);
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(QueryError::Connection(format!(
                        "connect to {} timed out after {:?}",
                        self.config.address(),
                        self.config.connect_timeout
                    )));
                }
            }
        }

        self.client
            .as_mut()
            .ok_or_else(|| QueryError::Connection("not connected".to_string()))
    }

    async fn connect(&self) -> Result<Client<Compat<TcpStream>>, QueryError> {
        let config = self.config.to_tiberius();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| QueryError::Connection(format!("{}: {}", self.config.address(), e)))?;
        tcp.set_nodelay(true)
            .map_err(|e| QueryError::Connection(e.to_string()))?;

        Client::connect(config, tcp.compat_write())
            .await
            .map_err(|e| QueryError::Connection(format_tiberius_error(&e)))
    }
}

impl QueryExecutor for MssqlExecutor {
    async fn execute(&mut self, query: &str) -> Result<Vec<Row>, QueryError> {
        let client = self.ensure_connected().await?;

        let result = match client.simple_query(query).await {
            Ok(stream) => stream.into_first_result().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => Ok(rows.into_iter().map(convert_row).collect()),
            Err(e) => {
                let msg = format_tiberius_error(&e);
                if !matches!(e, tiberius::error::Error::Server(_)) {
                    warn!(error = %msg, "dropping SQL Server connection");
                    self.client = None;
                }
                Err(QueryError::Query(msg))
            }
        }
    }

    fn reset(&mut self) {
        if self.client.take().is_some() {
            debug!("SQL Server connection reset");
        }
    }
}

fn convert_row(row: tiberius::Row) -> Row {
    Row::new(row.into_iter().map(convert_cell).collect())
}

/// Maps a TDS column value onto a `Cell`.
///
/// Temporal, binary and XML values have no use as metric values or labels
/// and become NULL.
fn convert_cell(data: ColumnData<'static>) -> Cell {
    match data {
        ColumnData::U8(v) => v.map(i64::from).into(),
        ColumnData::I16(v) => v.map(i64::from).into(),
        ColumnData::I32(v) => v.map(i64::from).into(),
        ColumnData::I64(v) => v.into(),
        ColumnData::F32(v) => v.map(f64::from).into(),
        ColumnData::F64(v) => v.into(),
        ColumnData::Bit(v) => v.map(i64::from).into(),
        ColumnData::Numeric(v) => v.map(numeric_to_f64).into(),
        ColumnData::String(v) => v.map(|s| s.into_owned()).into(),
        ColumnData::Guid(v) => v.map(|g| g.to_string()).into(),
        _ => Cell::Null,
    }
}

fn numeric_to_f64(n: Numeric) -> f64 {
    n.value() as f64 / 10f64.powi(i32::from(n.scale()))
}

/// Formats a tiberius error for logs and diagnostics.
fn format_tiberius_error(e: &tiberius::error::Error) -> String {
    match e {
        tiberius::error::Error::Server(token) => {
            format!("{} (code {})", token.message(), token.code())
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn integer_columns_become_int_cells() {
        assert_eq!(convert_cell(ColumnData::U8(Some(7))), Cell::Int(7));
        assert_eq!(convert_cell(ColumnData::I16(Some(-2))), Cell::Int(-2));
        assert_eq!(convert_cell(ColumnData::I64(Some(1 << 40))), Cell::Int(1 << 40));
        assert_eq!(convert_cell(ColumnData::Bit(Some(true))), Cell::Int(1));
    }

    #[test]
    fn null_columns_become_null_cells() {
        assert_eq!(convert_cell(ColumnData::I32(None)), Cell::Null);
        assert_eq!(convert_cell(ColumnData::String(None)), Cell::Null);
    }

    #[test]
    fn decimal_columns_honor_scale() {
        let n = Numeric::new_with_scale(12345, 2);
        assert_eq!(convert_cell(ColumnData::Numeric(Some(n))), Cell::Float(123.45));
    }

    #[test]
    fn string_columns_are_owned_text() {
        let cell = convert_cell(ColumnData::String(Some(Cow::Borrowed("master"))));
        assert_eq!(cell, Cell::Text("master".to_string()));
    }

    #[test]
    fn default_config_targets_local_instance() {
        let config = MssqlConfig::default();
        assert_eq!(config.address(), "localhost:1433");
        assert!(config.encrypt);
    }
}
