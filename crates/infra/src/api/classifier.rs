//! Maps raw responses and transport failures onto [`ErrorKind`].
//!
//! A JSON body carrying an `error` object (or an `errorCode` field) is a
//! failure no matter what the status line says; the code embedded in the
//! body wins over the status line when both are present.

use serde_json::{Map, Value};

use super::errors::{ApiError, ErrorKind, RemoteFailure};
use crate::http::{RawResponse, TransportError};

/// Longest body excerpt kept as a failure message when the body is not JSON
const MAX_MESSAGE_LEN: usize = 512;

/// Table lookup from HTTP status (or embedded error code) to kind
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::BadRequest,
        401 => ErrorKind::Unauthorized,
        402 => ErrorKind::PaymentRequired,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        405 => ErrorKind::MethodNotAllowed,
        409 => ErrorKind::Conflict,
        410 => ErrorKind::Gone,
        412 => ErrorKind::PreconditionFailed,
        413 => ErrorKind::PayloadTooLarge,
        416 => ErrorKind::RangeNotSatisfiable,
        417 => ErrorKind::ExpectationFailed,
        422 => ErrorKind::UnprocessableEntity,
        428 => ErrorKind::PreconditionRequired,
        429 => ErrorKind::RateLimited,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Unknown,
    }
}

/// Kind of the failure carried by a response, or `None` for a success
pub fn classify_response(status: u16, body: &str) -> Option<ErrorKind> {
    inspect(status, body).map(|(kind, _)| kind)
}

/// Typed error for a failed response, or `None` for a success
pub fn error_for_response(response: &RawResponse) -> Option<ApiError> {
    inspect(response.status, &response.body).map(|(kind, failure)| ApiError::remote(kind, failure))
}

pub fn classify_transport(err: &TransportError) -> ErrorKind {
    match err {
        TransportError::Timeout(_) | TransportError::Connect(_) | TransportError::Request(_) => {
            ErrorKind::ConnectionFailure
        }
        TransportError::Build(_) => ErrorKind::Unknown,
    }
}

pub fn error_for_transport(err: &TransportError) -> ApiError {
    ApiError::remote(
        classify_transport(err),
        RemoteFailure { message: err.to_string(), ..RemoteFailure::default() },
    )
}

fn inspect(status: u16, body: &str) -> Option<(ErrorKind, RemoteFailure)> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let present = |key: &str| map.get(key).is_some_and(|v| !v.is_null());
        if present("error") || present("errorCode") {
            return Some(from_error_body(status, &map));
        }
    }

    if (200..300).contains(&status) {
        return None;
    }

    let failure = RemoteFailure {
        status: Some(status),
        code: None,
        message: excerpt(body),
        reason: None,
    };
    Some((kind_for_status(status), failure))
}

fn from_error_body(status: u16, map: &Map<String, Value>) -> (ErrorKind, RemoteFailure) {
    let error = map.get("error");
    let code = error
        .and_then(|e| e.get("code").or_else(|| e.get("errorCode")))
        .or_else(|| map.get("errorCode"))
        .and_then(as_code);

    let message = error
        .and_then(|e| e.get("message"))
        .or_else(|| map.get("error_description"))
        .or_else(|| map.get("message"))
        .or_else(|| error.filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let reason = error
        .and_then(|e| e.get("errors"))
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("reason"))
        .or_else(|| error.and_then(|e| e.get("status")))
        .or_else(|| error.filter(|e| e.is_string()))
        .and_then(Value::as_str)
        .map(str::to_string);

    let failure = RemoteFailure { status: Some(status), code, message, reason };
    (kind_for_status(code.unwrap_or(status)), failure)
}

fn as_code(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_MESSAGE_LEN) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}
