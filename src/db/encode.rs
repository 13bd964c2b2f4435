//! Encoding of native values into JSON.
//!
//! Hosts that need a different rendering for dates, decimals or binary data
//! plug in their own [`ValueEncoder`].

use super::{Row, Value};
use base64::Engine;
use serde_json::json;

/// Converts native values into JSON values for the result payload.
pub trait ValueEncoder: Send + Sync {
    fn encode(&self, value: &Value) -> serde_json::Value;
}

/// Default encoding: ISO 8601 for dates and times, decimals as strings,
/// bytes as standard base64.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEncoder;

impl ValueEncoder for DefaultEncoder {
    fn encode(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            // NaN and infinities have no JSON number form
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| json!(f.to_string())),
            Value::String(s) => json!(s),
            Value::Bytes(bytes) => json!(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Value::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => json!(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::DateTimeTz(dt) => json!(dt.to_rfc3339()),
            Value::Time(t) => json!(t.format("%H:%M:%S%.f").to_string()),
            Value::Decimal(d) => json!(d.to_string()),
            Value::Json(j) => j.clone(),
        }
    }
}

/// Zips column names with one row of native values.
pub fn encode_row(names: &[String], values: &[Value], encoder: &dyn ValueEncoder) -> Row {
    names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.clone(), encoder.encode(value)))
        .collect()
}
