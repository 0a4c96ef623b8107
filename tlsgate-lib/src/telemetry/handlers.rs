use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use prometheus::{Encoder, TextEncoder};
use serde_json::json;

use crate::error::{GateError, Result};
use crate::server::ServerInfo;
use crate::stats::Stats;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

fn full_body(bytes: Vec<u8>) -> RespBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed()
}

fn json_response(status: StatusCode, body: &serde_json::Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| GateError::Telemetry(format!("Failed to serialize response: {e}")))?;

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full_body(body_bytes))
        .map_err(|e| GateError::Telemetry(format!("Failed to build response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Server description plus every stats counter
pub fn stats_response(server: &ServerInfo, stats: &Stats) -> Result<Response<RespBody>> {
    let counters: serde_json::Map<String, serde_json::Value> = stats
        .snapshot()
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();

    json_response(StatusCode::OK, &json!({"server": server, "counters": counters}))
}

pub fn metrics_response(registry: &prometheus::Registry) -> Result<Response<RespBody>> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| GateError::Telemetry(format!("Failed to encode metrics: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(full_body(buffer))
        .map_err(|e| GateError::Telemetry(format!("Failed to build response: {e}")))
}

pub fn status_response(status: StatusCode, text: &'static str) -> Response<RespBody> {
    let mut resp = Response::new(full_body(text.as_bytes().to_vec()));
    *resp.status_mut() = status;
    resp
}
