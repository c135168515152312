use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Naive formats tried against JSON field values and line prefixes, with the
/// rendered width of each (chrono format strings are shorter than the text
/// they match). RFC3339 with or without fractional seconds is tried
/// separately since chrono parses both through `parse_from_rfc3339`.
const NAIVE_FORMATS: &[(&str, usize)] = &[("%Y-%m-%dT%H:%M:%S", 19), ("%Y-%m-%d %H:%M:%S", 19)];

/// Apache error-log style timestamp inside brackets: Mon Jan 02 15:04:05 2006.
const BRACKET_FORMAT: &str = "%a %b %d %H:%M:%S %Y";

/// Common-log style timestamp with offset: 02/Jan/2006:15:04:05 -0700.
const CLF_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

/// Extract an event timestamp from a log line, falling back to `now`.
///
/// Probe order: configured JSON fields, then a bracketed Apache timestamp,
/// then a handful of well-known formats against the line prefix. A parse
/// only counts if the year is strictly between 2000 and 2100; nothing here
/// ever fails, unparseable lines are stamped with `now`.
pub fn extract_timestamp(
    line: &str,
    timestamp_fields: &[String],
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if line.starts_with('{') {
        if let Some(ts) = from_json_fields(line, timestamp_fields) {
            return ts;
        }
    }

    if let Some(ts) = from_bracket_block(line) {
        return ts;
    }

    if let Some(ts) = from_line_prefix(line) {
        return ts;
    }

    now
}

fn from_json_fields(line: &str, timestamp_fields: &[String]) -> Option<DateTime<Utc>> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) else {
        return None;
    };

    for field in timestamp_fields {
        let Some(Value::String(raw)) = map.get(field.as_str()) else {
            continue;
        };
        if let Some(ts) = parse_value(raw) {
            return Some(ts);
        }
    }

    None
}

fn from_bracket_block(line: &str) -> Option<DateTime<Utc>> {
    let start = line.find('[')?;
    let end = line.find(']')?;
    if end <= start {
        return None;
    }

    let inner = &line[start + 1..end];
    NaiveDateTime::parse_from_str(inner, BRACKET_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
        .filter(|ts| plausible_year(*ts))
}

fn from_line_prefix(line: &str) -> Option<DateTime<Utc>> {
    // RFC3339 first: the timestamp is not fixed-width, so probe the first
    // whitespace-delimited token rather than a byte-length prefix.
    let token = line.split_whitespace().next().unwrap_or("");
    if let Ok(ts) = DateTime::parse_from_rfc3339(token) {
        let ts = ts.with_timezone(&Utc);
        if plausible_year(ts) {
            return Some(ts);
        }
    }

    for (format, width) in NAIVE_FORMATS {
        if let Some(ts) = parse_fixed_prefix(line, *width, |s| {
            NaiveDateTime::parse_from_str(s, format)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }) {
            return Some(ts);
        }
    }

    // 02/Jan/2006:15:04:05 -0700 is 26 bytes.
    parse_fixed_prefix(line, 26, |s| {
        DateTime::parse_from_str(s, CLF_FORMAT)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    })
}

fn parse_fixed_prefix(
    line: &str,
    width: usize,
    parse: impl Fn(&str) -> Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    if line.len() < width || !line.is_char_boundary(width) {
        return None;
    }
    parse(&line[..width]).filter(|ts| plausible_year(*ts))
}

fn parse_value(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        let ts = ts.with_timezone(&Utc);
        if plausible_year(ts) {
            return Some(ts);
        }
    }

    for (format, _) in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            let ts = Utc.from_utc_datetime(&naive);
            if plausible_year(ts) {
                return Some(ts);
            }
        }
    }

    None
}

fn plausible_year(ts: DateTime<Utc>) -> bool {
    use chrono::Datelike;
    let year = ts.year();
    year > 2000 && year < 2100
}
