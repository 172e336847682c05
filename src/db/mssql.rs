//! SQL Server database client implementation.
//!
//! Provides the `MssqlClient` struct that implements the `DatabaseClient` trait
//! for Microsoft SQL Server using tiberius.

use crate::config::{AuthMode, ConnectionConfig};
use crate::db::{ColumnInfo, DatabaseClient, ResultSet, Row, Value};
use crate::error::{Result, SqlDocxError};
use crate::query::{statement_kind, StatementKind};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel, QueryItem};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, warn};

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Column alias used to read back `@@ROWCOUNT` after a modification.
const ROWCOUNT_ALIAS: &str = "__sqldocx_rowcount";

type TdsClient = Client<Compat<TcpStream>>;

/// SQL Server database client.
pub struct MssqlClient {
    client: Mutex<TdsClient>,
    closed: AtomicBool,
}

impl MssqlClient {
    /// Connects to SQL Server, retrying transient failures up to `retries` extra times.
    pub async fn connect(config: &ConnectionConfig, retries: u32) -> Result<Self> {
        let tds_config = build_tds_config(config)?;

        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let attempts = retries + 1;
        let mut attempt = 1;

        loop {
            debug!("Connection attempt {} of {}", attempt, attempts);

            match connect_once(&tds_config).await {
                Ok(client) => {
                    debug!("Successfully connected to {}", config.display_string());
                    return Ok(Self {
                        client: Mutex::new(client),
                        closed: AtomicBool::new(false),
                    });
                }
                Err(e) => {
                    if attempt < attempts && is_transient_error(&e) {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        attempt += 1;
                        continue;
                    }
                    return Err(map_connection_error(e, config));
                }
            }
        }
    }

    fn ensure_not_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SqlDocxError::connection("Connection is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseClient for MssqlClient {
    async fn execute_query(&self, sql: &str) -> Result<ResultSet> {
        self.ensure_not_closed()?;
        let start = Instant::now();

        let mut client = self.client.lock().await;

        let result = match statement_kind(sql) {
            StatementKind::Modification => run_modification(&mut client, sql).await,
            StatementKind::RowReturning | StatementKind::Command => {
                run_query(&mut client, sql).await
            }
        };

        match result {
            Ok(result_set) => {
                let execution_time = start.elapsed();
                debug!(
                    row_count = result_set.row_count(),
                    rows_affected = result_set.rows_affected,
                    duration_ms = execution_time.as_millis() as u64,
                    "statement completed"
                );
                Ok(result_set.with_execution_time(execution_time))
            }
            Err(e) => {
                let error = map_execution_error(e);
                if !error.is_statement_error() {
                    self.closed.store(true, Ordering::SeqCst);
                }
                Err(error)
            }
        }
    }

    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        debug!("SQL Server connection closed");
        Ok(())
    }
}

/// Builds the tiberius configuration from a connection descriptor.
fn build_tds_config(config: &ConnectionConfig) -> Result<Config> {
    let mut tds = Config::new();
    tds.host(config.host_or_default());
    tds.port(config.port);

    if let Some(database) = &config.database {
        tds.database(database);
    }

    if config.trust_cert {
        tds.trust_cert();
    }

    tds.encryption(if config.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });

    match config.auth {
        AuthMode::Sql => {
            let user = config.user.as_deref().ok_or_else(|| {
                SqlDocxError::config("SQL Server login requires a user name")
            })?;
            let password = config.password.as_deref().unwrap_or("");
            tds.authentication(AuthMethod::sql_server(user, password));
        }
        AuthMode::Integrated => {
            #[cfg(windows)]
            {
                tds.authentication(AuthMethod::Integrated);
            }
            #[cfg(not(windows))]
            {
                return Err(SqlDocxError::config(
                    "Integrated authentication is only supported on Windows",
                ));
            }
        }
    }

    Ok(tds)
}

async fn connect_once(config: &Config) -> tiberius::Result<TdsClient> {
    let tcp = TcpStream::connect(config.get_addr()).await?;
    tcp.set_nodelay(true)?;
    Client::connect(config.clone(), tcp.compat_write()).await
}

/// Runs a statement as a batch and returns its first result set.
async fn run_query(client: &mut TdsClient, sql: &str) -> tiberius::Result<ResultSet> {
    let mut results = collect_results(client, sql).await?;
    if results.is_empty() {
        return Ok(ResultSet::new());
    }

    let mut first = results.swap_remove(0);
    first.rows_affected = first.rows.len() as u64;
    Ok(first)
}

/// Runs a row-changing statement and reads back `@@ROWCOUNT` in the same batch.
async fn run_modification(client: &mut TdsClient, sql: &str) -> tiberius::Result<ResultSet> {
    let batch = format!("{sql}\n;SELECT @@ROWCOUNT AS {ROWCOUNT_ALIAS}");
    let results = collect_results(client, &batch).await?;

    let count = results
        .last()
        .filter(|rs| {
            rs.columns
                .first()
                .is_some_and(|column| column.name == ROWCOUNT_ALIAS)
        })
        .and_then(|rs| rs.rows.first())
        .and_then(|row| match row.first() {
            Some(Value::Int(count)) => u64::try_from(*count).ok(),
            _ => None,
        })
        .unwrap_or(0);

    Ok(ResultSet::affected(count))
}

/// Drains a query stream into result sets, one per metadata token.
async fn collect_results(client: &mut TdsClient, batch: &str) -> tiberius::Result<Vec<ResultSet>> {
    let mut stream = client.simple_query(batch).await?;
    let mut results: Vec<ResultSet> = Vec::new();

    while let Some(item) = stream.try_next().await? {
        match item {
            QueryItem::Metadata(meta) => {
                let columns = meta
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), format!("{:?}", col.column_type())))
                    .collect();
                results.push(ResultSet::with_data(columns, Vec::new()));
            }
            QueryItem::Row(row) => {
                if let Some(current) = results.last_mut() {
                    current.rows.push(convert_row(row));
                }
            }
        }
    }

    Ok(results)
}

/// Converts a tiberius row to our Row type.
fn convert_row(row: tiberius::Row) -> Row {
    row.into_iter().map(convert_value).collect()
}

/// Converts a single column value to our Value type.
fn convert_value(data: ColumnData<'static>) -> Value {
    match data {
        ColumnData::Bit(v) => v.map(Value::Bool).into(),
        ColumnData::U8(v) => v.map(|v| Value::Int(v as i64)).into(),
        ColumnData::I16(v) => v.map(|v| Value::Int(v as i64)).into(),
        ColumnData::I32(v) => v.map(|v| Value::Int(v as i64)).into(),
        ColumnData::I64(v) => v.map(Value::Int).into(),
        ColumnData::F32(v) => v.map(|v| Value::Float(v as f64)).into(),
        ColumnData::F64(v) => v.map(Value::Float).into(),
        ColumnData::String(v) => v.map(|s| Value::String(s.into_owned())).into(),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())).into(),
        ColumnData::Binary(v) => v.map(|b| Value::Bytes(b.into_owned())).into(),
        ColumnData::Numeric(v) => v.map(|n| Value::Decimal(n.to_string())).into(),
        ColumnData::Xml(v) => v
            .map(|x| Value::String(x.into_owned().into_string()))
            .into(),
        ColumnData::DateTime(v) => v
            .and_then(|dt| {
                let date = days_after(legacy_epoch()?, dt.days() as i64)?;
                let nanos = dt.seconds_fragments() as u64 * 1_000_000_000 / 300;
                Some(Value::DateTime(date.and_time(time_from_nanos(nanos)?)))
            })
            .into(),
        ColumnData::SmallDateTime(v) => v
            .and_then(|dt| {
                let date = days_after(legacy_epoch()?, dt.days() as i64)?;
                let nanos = dt.seconds_fragments() as u64 * 60 * 1_000_000_000;
                Some(Value::DateTime(date.and_time(time_from_nanos(nanos)?)))
            })
            .into(),
        ColumnData::Date(v) => v
            .and_then(|d| Some(Value::Date(days_after(modern_epoch()?, d.days() as i64)?)))
            .into(),
        ColumnData::Time(v) => v
            .and_then(|t| Some(Value::Time(time_from_increments(t.increments(), t.scale())?)))
            .into(),
        ColumnData::DateTime2(v) => v
            .and_then(|dt| {
                let date = days_after(modern_epoch()?, dt.date().days() as i64)?;
                let time = time_from_increments(dt.time().increments(), dt.time().scale())?;
                Some(Value::DateTime(NaiveDateTime::new(date, time)))
            })
            .into(),
        ColumnData::DateTimeOffset(v) => v
            .and_then(|dto| {
                let dt = dto.datetime2();
                let date = days_after(modern_epoch()?, dt.date().days() as i64)?;
                let time = time_from_increments(dt.time().increments(), dt.time().scale())?;
                Some(Value::DateTimeUtc(NaiveDateTime::new(date, time).and_utc()))
            })
            .into(),
    }
}

/// Epoch of the `datetime` and `smalldatetime` types.
fn legacy_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1900, 1, 1)
}

/// Epoch of the `date`, `datetime2` and `datetimeoffset` types.
fn modern_epoch() -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(1, 1, 1)
}

fn days_after(epoch: NaiveDate, days: i64) -> Option<NaiveDate> {
    epoch.checked_add_signed(chrono::Duration::try_days(days)?)
}

/// Time-of-day from increments of 10^-scale seconds.
fn time_from_increments(increments: u64, scale: u8) -> Option<NaiveTime> {
    let nanos_per_increment = 10u64.checked_pow(9u32.checked_sub(scale as u32)?)?;
    time_from_nanos(increments.checked_mul(nanos_per_increment)?)
}

fn time_from_nanos(nanos: u64) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(
        u32::try_from(nanos / 1_000_000_000).ok()?,
        (nanos % 1_000_000_000) as u32,
    )
}

/// Separates statement-level failures from infrastructure faults.
fn map_execution_error(error: tiberius::error::Error) -> SqlDocxError {
    match error {
        tiberius::error::Error::Server(token) => SqlDocxError::query(token.message()),
        tiberius::error::Error::Conversion(message) => SqlDocxError::query(message.to_string()),
        other => SqlDocxError::connection(other.to_string()),
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &tiberius::error::Error) -> bool {
    if matches!(error, tiberius::error::Error::Server(_)) {
        // Login failures and unknown databases come back as server tokens
        return false;
    }

    let error_str = error.to_string().to_lowercase();

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps tiberius connection errors to user-friendly messages.
fn map_connection_error(error: tiberius::error::Error, config: &ConnectionConfig) -> SqlDocxError {
    let host = config.host_or_default();
    let port = config.port;
    let user = config.user.as_deref().unwrap_or("unknown");

    if let tiberius::error::Error::Server(token) = &error {
        // 18456: login failed, 4060: cannot open database
        return match token.code() {
            18456 => SqlDocxError::connection(format!(
                "Authentication failed for user '{user}'. Check your credentials."
            )),
            4060 => SqlDocxError::connection(format!(
                "Database '{}' is not available: {}",
                config.database.as_deref().unwrap_or("default"),
                token.message()
            )),
            _ => SqlDocxError::connection(token.message()),
        };
    }

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        SqlDocxError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("tls") || error_str.contains("certificate") {
        SqlDocxError::connection(format!(
            "TLS handshake with {host}:{port} failed. Set trust_cert = true for self-signed servers. ({error})"
        ))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        SqlDocxError::connection(format!(
            "Connection to {host}:{port} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        SqlDocxError::connection(error.to_string())
    }
}
