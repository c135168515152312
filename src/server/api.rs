use std::io::Read;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use flate2::read::{GzDecoder, ZlibDecoder};
use serde::Serialize;
use tracing::{error, warn};

use crate::gelf::message;
use crate::ingest::{IngestStats, Ingestor};

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub lines_processed: usize,
    pub total_lines: i64,
    pub partitions: usize,
    pub unique_lines: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_skipped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_cache_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub status: &'static str,
    pub total_lines: i64,
    pub unique_lines: i64,
    pub partitions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_skipped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_cache_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_lines: i64,
    pub unique_lines: i64,
    pub partitions: usize,
    pub dedup_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates_skipped: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_cache_size: Option<usize>,
}

/// GET /health
pub async fn health() -> &'static str {
    "OK"
}

/// POST /ingest — newline-delimited log lines, one record per non-empty line.
pub async fn ingest(
    State(ingestor): State<Arc<Ingestor>>,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let text = String::from_utf8_lossy(&body);
    let mut lines_processed = 0;

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        if let Err(e) = ingestor.process_line(line).await {
            error!(error = %e, "error processing line");
            return Err(ApiError::Internal("error processing logs".to_string()));
        }
        lines_processed += 1;
    }

    Ok(Json(ingest_response(lines_processed, ingestor.stats())))
}

/// POST /gelf — newline-delimited GELF JSON objects, optionally compressed
/// with gzip or deflate. Malformed messages are dropped with a warning.
pub async fn ingest_gelf(
    State(ingestor): State<Arc<Ingestor>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>, ApiError> {
    let body = decode_body(&headers, &body)?;
    let text = String::from_utf8_lossy(&body);
    let mut lines_processed = 0;

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let msg = match message::parse(line.as_bytes()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "dropping malformed GELF message");
                continue;
            }
        };
        if let Err(e) = ingestor.process_gelf(msg).await {
            error!(error = %e, "error processing GELF message");
            return Err(ApiError::Internal("error processing logs".to_string()));
        }
        lines_processed += 1;
    }

    Ok(Json(ingest_response(lines_processed, ingestor.stats())))
}

/// POST /flush — write out the current batch.
pub async fn flush(
    State(ingestor): State<Arc<Ingestor>>,
) -> Result<Json<FlushResponse>, ApiError> {
    if let Err(e) = ingestor.flush().await {
        error!(error = %e, "error flushing");
        return Err(ApiError::Internal("error flushing".to_string()));
    }

    let stats = ingestor.stats();
    Ok(Json(FlushResponse {
        status: "flushed",
        total_lines: stats.total_lines,
        unique_lines: stats.unique_lines,
        partitions: stats.partitions,
        duplicates_skipped: stats.dedup_enabled.then_some(stats.duplicates_skipped),
        dedup_cache_size: stats.dedup_enabled.then_some(stats.dedup_cache_size),
    }))
}

/// GET /stats — current counters, no mutation.
pub async fn stats(State(ingestor): State<Arc<Ingestor>>) -> Json<StatsResponse> {
    let stats = ingestor.stats();
    Json(StatsResponse {
        total_lines: stats.total_lines,
        unique_lines: stats.unique_lines,
        partitions: stats.partitions,
        dedup_enabled: stats.dedup_enabled,
        duplicates_skipped: stats.dedup_enabled.then_some(stats.duplicates_skipped),
        dedup_cache_size: stats.dedup_enabled.then_some(stats.dedup_cache_size),
    })
}

fn ingest_response(lines_processed: usize, stats: IngestStats) -> IngestResponse {
    IngestResponse {
        status: "ok",
        lines_processed,
        total_lines: stats.total_lines,
        partitions: stats.partitions,
        unique_lines: stats.unique_lines,
        duplicates_skipped: stats.dedup_enabled.then_some(stats.duplicates_skipped),
        dedup_cache_size: stats.dedup_enabled.then_some(stats.dedup_cache_size),
    }
}

/// Inflate the request body according to Content-Encoding. Identity bodies
/// pass through without copying.
fn decode_body(headers: &HeaderMap, body: &Bytes) -> Result<Vec<u8>, ApiError> {
    let encoding = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    match encoding {
        "gzip" => {
            let mut decoded = Vec::new();
            GzDecoder::new(body.as_ref())
                .read_to_end(&mut decoded)
                .map_err(|_| ApiError::BadRequest("error decompressing gzip".to_string()))?;
            Ok(decoded)
        }
        "deflate" => {
            let mut decoded = Vec::new();
            ZlibDecoder::new(body.as_ref())
                .read_to_end(&mut decoded)
                .map_err(|_| ApiError::BadRequest("error decompressing deflate".to_string()))?;
            Ok(decoded)
        }
        _ => Ok(body.to_vec()),
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use flate2::Compression as FlateCompression;
    use std::io::Write;

    fn headers_with_encoding(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_decode_identity_body() {
        let body = Bytes::from_static(b"hello");
        let decoded = decode_body(&HeaderMap::new(), &body).unwrap();
        assert_eq!(decoded, b"hello");
    }

    #[test]
    fn test_decode_gzip_body() {
        let mut encoder = GzEncoder::new(Vec::new(), FlateCompression::default());
        encoder.write_all(b"compressed payload").unwrap();
        let body = Bytes::from(encoder.finish().unwrap());

        let decoded = decode_body(&headers_with_encoding("gzip"), &body).unwrap();
        assert_eq!(decoded, b"compressed payload");
    }

    #[test]
    fn test_decode_deflate_body() {
        let mut encoder = ZlibEncoder::new(Vec::new(), FlateCompression::default());
        encoder.write_all(b"zlib payload").unwrap();
        let body = Bytes::from(encoder.finish().unwrap());

        let decoded = decode_body(&headers_with_encoding("deflate"), &body).unwrap();
        assert_eq!(decoded, b"zlib payload");
    }

    #[test]
    fn test_decode_corrupt_gzip_is_bad_request() {
        let body = Bytes::from_static(b"definitely not gzip");
        let result = decode_body(&headers_with_encoding("gzip"), &body);
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }
}
