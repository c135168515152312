use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GelfError {
    #[error("invalid GELF payload: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("GELF payload is not a JSON object")]
    NotAnObject,
}

/// A parsed GELF envelope.
///
/// Standard fields are typed; every top-level key starting with `_` is kept
/// as an extra with the underscore already stripped. Unknown keys without an
/// underscore are ignored.
#[derive(Debug, Clone)]
pub struct GelfMessage {
    pub version: Option<String>,
    pub host: Option<String>,
    pub short_message: String,
    pub full_message: Option<String>,
    /// Fractional unix seconds.
    pub timestamp: Option<f64>,
    /// Syslog severity, 0-7.
    pub level: Option<i64>,
    pub facility: Option<String>,
    pub extra: Map<String, Value>,
}

/// Decode a single GELF JSON payload.
pub fn parse(data: &[u8]) -> Result<GelfMessage, GelfError> {
    let value: Value = serde_json::from_slice(data)?;
    let Value::Object(map) = value else {
        return Err(GelfError::NotAnObject);
    };

    let mut extra = Map::new();
    for (key, value) in &map {
        if let Some(stripped) = key.strip_prefix('_') {
            if !stripped.is_empty() {
                extra.insert(stripped.to_string(), value.clone());
            }
        }
    }

    Ok(GelfMessage {
        version: string_field(&map, "version"),
        host: string_field(&map, "host"),
        short_message: string_field(&map, "short_message").unwrap_or_default(),
        full_message: string_field(&map, "full_message"),
        timestamp: map.get("timestamp").and_then(Value::as_f64),
        level: map.get("level").and_then(number_as_i64),
        facility: string_field(&map, "facility"),
        extra,
    })
}

impl GelfMessage {
    /// The event time carried by the envelope, or `now` when the timestamp
    /// is absent or zero.
    pub fn event_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let Some(seconds) = self.timestamp.filter(|&t| t > 0.0) else {
            return now;
        };
        let whole = seconds.trunc() as i64;
        let nanos = (seconds.fract() * 1e9) as u32;
        DateTime::from_timestamp(whole, nanos).unwrap_or(now)
    }

    /// Flatten the envelope into a single-line JSON object suitable for text
    /// admission. Extras go in first and the built-in keys (message, level,
    /// timestamp, host, full_message, facility) last, so an extra whose
    /// stripped name collides with a built-in never shadows it.
    pub fn flatten(&self, level: &str, now: DateTime<Utc>) -> Result<String, serde_json::Error> {
        let mut map = self.extra.clone();

        map.insert(
            "message".to_string(),
            Value::String(self.short_message.clone()),
        );
        map.insert("level".to_string(), Value::String(level.to_string()));
        map.insert(
            "timestamp".to_string(),
            Value::String(
                self.event_time(now)
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
        );

        if let Some(host) = self.host.as_deref().filter(|h| !h.is_empty()) {
            map.insert("host".to_string(), Value::String(host.to_string()));
        }
        if let Some(full) = self.full_message.as_deref().filter(|m| !m.is_empty()) {
            map.insert("full_message".to_string(), Value::String(full.to_string()));
        }
        if let Some(facility) = self.facility.as_deref().filter(|f| !f.is_empty()) {
            map.insert("facility".to_string(), Value::String(facility.to_string()));
        }

        serde_json::to_string(&Value::Object(map))
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}

fn number_as_i64(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
}
