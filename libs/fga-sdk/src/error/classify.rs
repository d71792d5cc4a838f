use std::collections::BTreeMap;

use http::{HeaderMap, StatusCode};
use serde_json::Value;

use super::validation;
use super::{ApiError, ErrorKind, FgaError};
use crate::request::ApiRequest;

/// Response header carrying the server-side request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Classify one response. `None` for 2xx.
///
/// The kind depends on the status alone; the body is parsed best-effort for
/// `code` and `message` (falling back to an OAuth-style `error` field) and
/// never causes a failure of its own.
#[must_use]
pub fn classify(
    request: &ApiRequest,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    previous: Option<FgaError>,
) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }
    Some(classify_failure(request, status, headers, body, previous))
}

/// [`classify`] for a status already known to be non-2xx.
pub(crate) fn classify_failure(
    request: &ApiRequest,
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
    previous: Option<FgaError>,
) -> ApiError {
    let (api_error_code, api_error_message) = parse_error_body(body);

    let mut metadata = BTreeMap::new();
    let mut kind = ErrorKind::from_status(status);
    if let (ErrorKind::Validation(details), Some(message)) = (&mut kind, &api_error_message) {
        *details = validation::extract(message);
        if let Some(field) = &details.invalid_field {
            metadata.insert("invalid_field".to_owned(), field.clone());
        }
        if let Some(value) = &details.invalid_value {
            metadata.insert("invalid_value".to_owned(), value.clone());
        }
    }

    ApiError {
        kind,
        status,
        operation: request.operation().to_owned(),
        method: request.method().clone(),
        request_url: request.url().to_string(),
        request_id: header(headers, REQUEST_ID_HEADER),
        api_error_code,
        api_error_message,
        retry_after_raw: header(headers, http::header::RETRY_AFTER.as_str()),
        client_id: None,
        audience: None,
        headers: headers.clone(),
        body: String::from_utf8_lossy(body).into_owned(),
        metadata,
        previous: previous.map(Box::new),
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)?
        .to_str()
        .ok()
        .map(str::to_owned)
}

fn parse_error_body(body: &[u8]) -> (Option<String>, Option<String>) {
    let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(body) else {
        return (None, None);
    };

    let text = |key: &str| match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };

    let code = text("code");
    let message = text("message").or_else(|| text("error"));
    (code, message)
}
