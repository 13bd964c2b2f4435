//! PostgreSQL driver built on sqlx.
//!
//! sqlx exposes futures rather than libpq's poll/socket pair, so [`PgHandle`]
//! keeps the pending operation as a boxed future and advances it by hand in
//! [`Connection::poll`]. The future's waker feeds a [`Notify`] that
//! [`Connection::wait_ready`] sleeps on; the waker fires when the socket the
//! future is blocked on becomes ready.

use super::{Connection, Cursor, Driver, DriverError, Interest, PollState, RawColumn, Value};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::task::{waker, ArcWake};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney};
use sqlx::postgres::{
    PgColumn, PgConnectOptions, PgConnection, PgDatabaseError, PgRow, PgValueFormat, PgValueRef,
};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::Uuid;
use sqlx::{
    Column as _, Connection as _, Either, Executor as _, Row as _, Statement as _, TypeInfo,
    ValueRef as _,
};
use std::future::Future;
use std::io;
use std::str::FromStr;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// SQLSTATE for syntax errors, which covers multi-statement prepares.
const SYNTAX_ERROR: &str = "42601";

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Wakes the task sleeping in [`PgHandle::wait_ready`].
#[derive(Debug, Default)]
struct ReadinessSignal {
    notify: Notify,
}

impl ArcWake for ReadinessSignal {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        // Stores a permit if nobody is waiting yet.
        arc_self.notify.notify_one();
    }
}

/// Rows and column descriptions of a finished statement.
struct Fetched {
    description: Vec<RawColumn>,
    rows: Vec<Vec<Value>>,
}

enum Pending {
    Idle,
    Connect(BoxFuture<'static, Result<(PgConnection, i32), sqlx::Error>>),
    Statement(BoxFuture<'static, (PgConnection, Result<Fetched, sqlx::Error>)>),
}

/// Opens [`PgHandle`]s from a `postgres://` connection string.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgDriver;

impl Driver for PgDriver {
    type Conn = PgHandle;

    fn connect(&self, connection_string: &str) -> Result<PgHandle, DriverError> {
        let options = PgConnectOptions::from_str(connection_string).map_err(map_sqlx_error)?;
        Ok(PgHandle::new(options))
    }
}

/// One non-blocking PostgreSQL session.
pub struct PgHandle {
    options: PgConnectOptions,
    conn: Option<PgConnection>,
    backend_pid: Option<i32>,
    pending: Pending,
    fetched: Option<Fetched>,
    signal: Arc<ReadinessSignal>,
    closed: bool,
}

impl PgHandle {
    /// Creates a handle whose first poll starts connecting.
    fn new(options: PgConnectOptions) -> Self {
        let connect_options = options.clone();
        let connect = Box::pin(async move {
            let mut conn = PgConnection::connect_with(&connect_options).await?;
            let pid: i32 = sqlx::query_scalar("SELECT pg_backend_pid()")
                .fetch_one(&mut conn)
                .await?;
            Ok::<_, sqlx::Error>((conn, pid))
        });

        Self {
            options,
            conn: None,
            backend_pid: None,
            pending: Pending::Connect(connect),
            fetched: None,
            signal: Arc::new(ReadinessSignal::default()),
            closed: false,
        }
    }

    /// Server process id of this session, once connected.
    pub fn backend_pid(&self) -> Option<i32> {
        self.backend_pid
    }
}

#[async_trait]
impl Connection for PgHandle {
    fn poll(&mut self) -> Result<PollState, DriverError> {
        let waker = waker(self.signal.clone());
        let mut cx = Context::from_waker(&waker);

        match &mut self.pending {
            Pending::Idle => Ok(PollState::Ok),
            Pending::Connect(future) => match future.as_mut().poll(&mut cx) {
                Poll::Pending => Ok(PollState::Read),
                Poll::Ready(result) => {
                    self.pending = Pending::Idle;
                    let (conn, pid) = result.map_err(map_sqlx_error)?;
                    debug!(pid, "Session established");
                    self.conn = Some(conn);
                    self.backend_pid = Some(pid);
                    Ok(PollState::Ok)
                }
            },
            Pending::Statement(future) => match future.as_mut().poll(&mut cx) {
                Poll::Pending => Ok(PollState::Read),
                Poll::Ready((conn, result)) => {
                    self.pending = Pending::Idle;
                    self.conn = Some(conn);
                    self.fetched = Some(result.map_err(map_sqlx_error)?);
                    Ok(PollState::Ok)
                }
            },
        }
    }

    /// The sqlx future registers interest in both directions itself, so any
    /// wake-up means the pending operation can make progress.
    async fn wait_ready(&mut self, interest: Interest) -> io::Result<()> {
        trace!(?interest, "Waiting for wake-up");
        self.signal.notify.notified().await;
        Ok(())
    }

    fn submit(&mut self, sql: &str) -> Result<(), DriverError> {
        let mut conn = self.conn.take().ok_or_else(|| {
            DriverError::other("statement submitted before the session was ready")
        })?;
        let sql = sql.to_string();

        self.fetched = None;
        self.pending = Pending::Statement(Box::pin(async move {
            let result = run_statement(&mut conn, &sql).await;
            (conn, result)
        }));
        Ok(())
    }

    fn cursor(&mut self) -> Result<Cursor, DriverError> {
        let fetched = self
            .fetched
            .take()
            .ok_or_else(|| DriverError::other("no finished statement to read"))?;
        Ok(Cursor::new(fetched.description, fetched.rows))
    }

    /// PostgreSQL cancels through a second session; this opens one briefly
    /// and asks the server to cancel the statement running on ours.
    async fn cancel(&mut self) -> Result<(), DriverError> {
        let Some(pid) = self.backend_pid else {
            return Ok(());
        };

        let mut side = PgConnection::connect_with(&self.options)
            .await
            .map_err(map_sqlx_error)?;
        let cancelled: bool = sqlx::query_scalar("SELECT pg_cancel_backend($1)")
            .bind(pid)
            .fetch_one(&mut side)
            .await
            .map_err(map_sqlx_error)?;
        if let Err(e) = side.close().await {
            debug!(error = %e, "Error closing cancel session");
        }

        debug!(pid, cancelled, "Cancel request sent");
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        // Dropping an in-flight future drops the session it owns.
        self.pending = Pending::Idle;
        self.fetched = None;

        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Error closing session");
            }
        }
    }
}

/// Runs one statement and reads its full result.
///
/// Text holding several statements cannot be prepared; it is sent through
/// the simple query protocol instead.
async fn run_statement(conn: &mut PgConnection, sql: &str) -> Result<Fetched, sqlx::Error> {
    let statement = match (&mut *conn).prepare(sql).await {
        Ok(statement) => statement,
        Err(e) if is_multi_statement_error(&e) => {
            debug!("Running multi-statement text with the simple query protocol");
            return run_script(conn, sql).await;
        }
        Err(e) => return Err(e),
    };

    let description = describe(statement.columns());
    let rows = statement.query().fetch_all(&mut *conn).await?;
    let rows = rows.iter().map(convert_row).collect::<Result<Vec<_>, _>>()?;

    Ok(Fetched { description, rows })
}

/// Runs every statement in `sql` and keeps the result of the last one.
///
/// The simple protocol sends no description for a statement without rows,
/// so an empty final result set comes back without columns.
async fn run_script(conn: &mut PgConnection, sql: &str) -> Result<Fetched, sqlx::Error> {
    let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
    let mut current = Vec::new();
    let mut last = Vec::new();

    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(_) => last = std::mem::take(&mut current),
            Either::Right(row) => current.push(row),
        }
    }

    let description = last
        .first()
        .map(|row| describe(row.columns()))
        .unwrap_or_default();
    let rows = last.iter().map(convert_row).collect::<Result<Vec<_>, _>>()?;

    Ok(Fetched { description, rows })
}

fn is_multi_statement_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            db_error.code().as_deref() == Some(SYNTAX_ERROR)
                && db_error.message().contains("multiple commands")
        }
        _ => false,
    }
}

fn describe(columns: &[PgColumn]) -> Vec<RawColumn> {
    columns
        .iter()
        .map(|col| {
            let type_id = col.type_info().oid().map(|oid| oid.0).unwrap_or(0);
            RawColumn::new(col.name(), type_id)
        })
        .collect()
}

/// Converts a sqlx PgRow to native values.
fn convert_row(row: &PgRow) -> Result<Vec<Value>, sqlx::Error> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Converts a single column value from a PgRow.
///
/// Values sent in text format (the simple query protocol) keep their server
/// rendering when there is no typed decoding for them. A binary value of a
/// type without a mapping is a decode error.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let text_format = matches!(raw.format(), PgValueFormat::Text);

    let value = match type_name {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(index)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(index)?.into()),
        "INT8" => Value::Int(row.try_get(index)?),
        "OID" => Value::Int(row.try_get::<Oid, _>(index)?.0.into()),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "FLOAT8" => Value::Float(row.try_get(index)?),
        "NUMERIC" => match row.try_get::<Decimal, _>(index) {
            Ok(decimal) => Value::Decimal(decimal),
            // NaN, infinities and values beyond 28 digits do not fit a Decimal
            Err(_) => Value::String(numeric_text(&raw)?),
        },
        "MONEY" if !text_format => {
            Value::Decimal(row.try_get::<PgMoney, _>(index)?.to_decimal(2))
        }
        "DATE" => Value::Date(row.try_get(index)?),
        "TIMESTAMP" => Value::DateTime(row.try_get(index)?),
        "TIMESTAMPTZ" => Value::DateTimeTz(row.try_get(index)?),
        "TIME" => Value::Time(row.try_get(index)?),
        "INTERVAL" if !text_format => {
            Value::String(format_interval(&row.try_get::<PgInterval, _>(index)?))
        }
        "JSON" | "JSONB" => Value::Json(row.try_get(index)?),
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        "UUID" => Value::String(row.try_get::<Uuid, _>(index)?.to_string()),
        "INET" | "CIDR" => Value::String(format_network(
            row.try_get::<IpNetwork, _>(index)?,
            type_name == "CIDR",
        )),
        "\"CHAR\"" => Value::String(char::from(row.try_get::<i8, _>(index)? as u8).to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::String(row.try_get(index)?),
        "BOOL[]" => json_array(row.try_get::<Vec<Option<bool>>, _>(index)?, |v| json!(v)),
        "INT2[]" => json_array(row.try_get::<Vec<Option<i16>>, _>(index)?, |v| json!(v)),
        "INT4[]" => json_array(row.try_get::<Vec<Option<i32>>, _>(index)?, |v| json!(v)),
        "INT8[]" => json_array(row.try_get::<Vec<Option<i64>>, _>(index)?, |v| json!(v)),
        "FLOAT4[]" => json_array(row.try_get::<Vec<Option<f32>>, _>(index)?, |v| {
            float_json(v.into())
        }),
        "FLOAT8[]" => json_array(row.try_get::<Vec<Option<f64>>, _>(index)?, float_json),
        "UUID[]" => json_array(row.try_get::<Vec<Option<Uuid>>, _>(index)?, |v| {
            json!(v.to_string())
        }),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => json_array(
            row.try_get::<Vec<Option<String>>, _>(index)?,
            serde_json::Value::String,
        ),
        _ if text_format => Value::String(raw.as_str().map_err(sqlx::Error::Decode)?.to_string()),
        _ => {
            return Err(sqlx::Error::Decode(
                format!("unsupported column type {type_name}").into(),
            ))
        }
    };

    Ok(value)
}

fn json_array<T>(items: Vec<Option<T>>, to_json: impl Fn(T) -> serde_json::Value) -> Value {
    Value::Json(
        items
            .into_iter()
            .map(|item| item.map_or(serde_json::Value::Null, &to_json))
            .collect(),
    )
}

fn float_json(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or_else(|| json!(value.to_string()))
}

/// Renders a NUMERIC that does not fit a Decimal, without losing digits.
fn numeric_text(raw: &PgValueRef<'_>) -> Result<String, sqlx::Error> {
    if matches!(raw.format(), PgValueFormat::Text) {
        return raw.as_str().map(String::from).map_err(sqlx::Error::Decode);
    }
    let bytes = raw.as_bytes().map_err(sqlx::Error::Decode)?;
    decode_numeric(bytes).ok_or_else(|| sqlx::Error::Decode("malformed NUMERIC value".into()))
}

/// Decodes the binary NUMERIC layout: digit count, weight, sign and display
/// scale, followed by base-10000 digits.
fn decode_numeric(bytes: &[u8]) -> Option<String> {
    let word = |at: usize| -> Option<u16> {
        let pair = bytes.get(at..at + 2)?;
        Some(u16::from_be_bytes([pair[0], pair[1]]))
    };

    let ndigits = usize::from(word(0)?);
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);

    match sign {
        NUMERIC_NAN => return Some("NaN".to_string()),
        NUMERIC_PINF => return Some("Infinity".to_string()),
        NUMERIC_NINF => return Some("-Infinity".to_string()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<_>>>()?;
    let digit = |group: i32| -> u16 {
        usize::try_from(group)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight < 0 {
        out.push('0');
    } else {
        out.push_str(&digit(0).to_string());
        for group in 1..=weight {
            out.push_str(&format!("{:04}", digit(group)));
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        let mut group = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(group)));
            group += 1;
        }
        fraction.truncate(dscale);
        out.push('.');
        out.push_str(&fraction);
    }

    Some(out)
}

/// Renders an interval the way the server does in its default output style.
fn format_interval(interval: &PgInterval) -> String {
    let mut out = String::new();
    let mut negative_before = false;

    let fields = [
        (i64::from(interval.months / 12), "year"),
        (i64::from(interval.months % 12), "mon"),
        (i64::from(interval.days), "day"),
    ];
    for (value, unit) in fields {
        if value == 0 {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        let sign = if negative_before && value > 0 { "+" } else { "" };
        let plural = if value == 1 { "" } else { "s" };
        out.push_str(&format!("{sign}{value} {unit}{plural}"));
        negative_before |= value < 0;
    }

    let micros = interval.microseconds;
    if out.is_empty() || micros != 0 {
        let sign = if micros < 0 {
            "-"
        } else if negative_before {
            "+"
        } else {
            ""
        };
        let abs = micros.unsigned_abs();
        let hours = abs / 3_600_000_000;
        let minutes = abs / 60_000_000 % 60;
        let seconds = abs / 1_000_000 % 60;
        let fraction = abs % 1_000_000;

        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"));
        if fraction != 0 {
            out.push('.');
            out.push_str(format!("{fraction:06}").trim_end_matches('0'));
        }
    }

    out
}

/// Renders an address the way the server does: `inet` drops a host-length
/// prefix, `cidr` always shows it.
fn format_network(network: IpNetwork, cidr: bool) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if !cidr && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

/// Sorts sqlx errors into driver error kinds.
fn map_sqlx_error(error: sqlx::Error) -> DriverError {
    match error {
        sqlx::Error::Database(db_error) => {
            DriverError::Database(format_database_error(db_error.as_ref()))
        }
        sqlx::Error::Io(e) => DriverError::Io(e),
        sqlx::Error::Tls(e) => DriverError::Io(io::Error::new(io::ErrorKind::Other, e)),
        sqlx::Error::Protocol(msg) => DriverError::Protocol(msg),
        other => DriverError::other(other),
    }
}

/// Formats a database error with detail and hint, if the server sent them.
fn format_database_error(db_error: &(dyn sqlx::error::DatabaseError + 'static)) -> String {
    let mut result = String::from(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\nDETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\nHINT: ");
            result.push_str(hint);
        }
    }

    result
}
