//! Query result types.
//!
//! Defines the portable result set handed back to callers and the native
//! values drivers produce before encoding.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Message returned when the transport fails while a query is in flight.
pub const QUERY_INTERRUPTED: &str = "Query interrupted. Please retry.";

/// Message returned when the caller cancels a running query.
pub const QUERY_CANCELLED: &str = "Query cancelled by user.";

/// Portable column type exposed to callers.
///
/// `Unknown` is serialized as `null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortableType {
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    String,
    #[default]
    Unknown,
}

impl PortableType {
    /// Returns the wire name, or `None` for `Unknown`.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Integer => Some("integer"),
            Self::Float => Some("float"),
            Self::Boolean => Some("boolean"),
            Self::Date => Some("date"),
            Self::Datetime => Some("datetime"),
            Self::String => Some("string"),
            Self::Unknown => None,
        }
    }

    /// Parses a wire name. Unrecognized names yield `Unknown`.
    pub fn parse(s: &str) -> Self {
        match s {
            "integer" => Self::Integer,
            "float" => Self::Float,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::Datetime,
            "string" => Self::String,
            _ => Self::Unknown,
        }
    }
}

impl Serialize for PortableType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.as_str() {
            Some(name) => serializer.serialize_str(name),
            None => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for PortableType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = Option::<String>::deserialize(deserializer)?;
        Ok(name.as_deref().map(Self::parse).unwrap_or_default())
    }
}

/// A column as reported by the driver, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    /// Column name as returned by the server. May repeat within a result.
    pub name: String,

    /// Native type identifier (a PostgreSQL type OID).
    pub type_id: u32,
}

impl RawColumn {
    pub fn new(name: impl Into<String>, type_id: u32) -> Self {
        Self {
            name: name.into(),
            type_id,
        }
    }
}

/// Metadata about a column in a result payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unique within the result set.
    pub name: String,

    /// Name shown to users.
    pub friendly_name: String,

    /// Portable column type.
    #[serde(rename = "type", default)]
    pub column_type: PortableType,
}

/// One result row, keyed by the deduplicated column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// The result payload of a successful execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column metadata, in result order.
    pub columns: Vec<ColumnDescriptor>,

    /// Rows of data, in result order.
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Creates a query result with the given columns and rows.
    pub fn with_data(columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Returns true if the result set is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Serializes the payload to its JSON text form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a payload previously produced by [`QueryResult::to_json`].
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// The result of one query execution: exactly one of a serialized payload or
/// an error description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Serialized [`QueryResult`].
    Success(String),

    /// Human-readable error description.
    Failure(String),
}

impl Outcome {
    pub fn interrupted() -> Self {
        Self::Failure(QUERY_INTERRUPTED.to_string())
    }

    pub fn cancelled() -> Self {
        Self::Failure(QUERY_CANCELLED.to_string())
    }

    /// Returns the serialized payload, if the query succeeded.
    pub fn payload(&self) -> Option<&str> {
        match self {
            Self::Success(json) => Some(json),
            Self::Failure(_) => None,
        }
    }

    /// Returns the error description, if the query failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(msg) => Some(msg),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Splits into the `(payload, error)` pair hosts expect.
    pub fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            Self::Success(json) => (Some(json), None),
            Self::Failure(msg) => (None, Some(msg)),
        }
    }
}

/// Represents a single value read from the database, before encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// NULL value.
    #[default]
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (up to i64).
    Int(i64),

    /// Floating point number.
    Float(f64),

    /// Text/string value.
    String(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Calendar date.
    Date(NaiveDate),

    /// Timestamp without time zone.
    DateTime(NaiveDateTime),

    /// Timestamp with time zone, normalized to UTC.
    DateTimeTz(DateTime<Utc>),

    /// Time of day.
    Time(NaiveTime),

    /// Arbitrary precision numeric.
    Decimal(Decimal),

    /// JSON or JSONB document.
    Json(serde_json::Value),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => Value::Null,
        }
    }
}
