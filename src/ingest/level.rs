use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Severity extraction from a raw log line.
///
/// Two structured probes are tried in order: a top-level JSON field (when the
/// line is a JSON object) and a logrus-style `level=<word>` token. There is
/// no substring matching on the lowercased line; a line that matches neither
/// probe has no level.
pub fn extract_level(line: &str, level_fields: &[String]) -> Option<String> {
    if line.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
            for field in level_fields {
                match map.get(field.as_str()) {
                    Some(Value::String(s)) => return Some(normalize_level(s)),
                    Some(Value::Number(n)) => {
                        if let Some(level) = numeric_level(n.as_i64()) {
                            return Some(level.to_string());
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    level_token(line)
}

/// Map a syslog severity (GELF `level` field, 0-7) to a normalized token.
/// Out-of-range and absent values fall back to info.
pub fn syslog_level(level: Option<i64>) -> &'static str {
    match level {
        Some(0..=3) => "error",
        Some(4) => "warn",
        Some(5) | Some(6) => "info",
        Some(7) => "debug",
        _ => "info",
    }
}

/// Normalize severity spellings. Unknown spellings pass through lowercased,
/// so a source that explicitly says `level=notice` keeps `notice`.
fn normalize_level(raw: &str) -> String {
    let level = raw.to_lowercase();
    match level.as_str() {
        "warning" => "warn".to_string(),
        "err" => "error".to_string(),
        "trace" => "debug".to_string(),
        "fatal" | "critical" | "panic" => "error".to_string(),
        _ => level,
    }
}

/// OpenTelemetry-style numeric severity ranges.
fn numeric_level(value: Option<i64>) -> Option<&'static str> {
    match value? {
        1..=4 => Some("debug"),
        5..=8 => Some("info"),
        9..=12 => Some("warn"),
        n if n >= 13 => Some("error"),
        _ => None,
    }
}

/// Probe for a `level=<word>` token (logrus text format). Only the known
/// severity spellings are accepted here; an arbitrary word next to `level=`
/// is too weak a signal to trust.
fn level_token(line: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"level=(\w+)").unwrap());

    let captures = pattern.captures(line)?;
    let level = normalize_level(&captures[1]);
    match level.as_str() {
        "error" | "warn" | "info" | "debug" => Some(level),
        _ => None,
    }
}
