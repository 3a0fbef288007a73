//! Response decoding and logical status normalization.
//!
//! Some backend endpoints report failures as HTTP 200 with a `statusCode`
//! field in the body (`{"statusCode":"409","message":"..."}`). Everything above
//! this module sees the *effective* status, so a 200 carrying `statusCode: 401`
//! is treated exactly like a real 401.

use crate::error::{ClientError, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// A decoded backend response.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// Effective status code after normalization
    pub status: u16,
    /// Parsed JSON body; `Null` for an empty body, a string for non-JSON text
    pub data: Value,
}

impl ApiResponse {
    /// Build from a raw HTTP status and body bytes.
    #[must_use]
    pub fn from_parts(http_status: u16, body: &[u8]) -> Self {
        let data = decode_body(body);
        let status = normalize_status(http_status, &data);
        Self { status, data }
    }

    /// Effective status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx effective status into [`ClientError::Api`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ClientError::Api {
                status: self.status,
                message: self.message().unwrap_or_else(|| reason_phrase(self.status)),
            })
        }
    }

    /// Backend-supplied `message`, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match &self.data {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.trim().is_empty())
                .map(str::to_string),
            Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
            _ => None,
        }
    }

    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(self) -> Result<T> {
        Ok(serde_json::from_value(self.data)?)
    }
}

/// Effective status for a response.
///
/// Only HTTP 200 is reinterpreted, and only when the body's `statusCode`
/// (string or number) is a valid status other than 200.
#[must_use]
pub fn normalize_status(http_status: u16, body: &Value) -> u16 {
    if http_status != 200 {
        return http_status;
    }

    let logical = match body.get("statusCode") {
        Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        _ => None,
    };

    match logical {
        Some(code) if code != 200 && (100..=599).contains(&code) => {
            tracing::debug!(logical_status = code, "Normalized HTTP 200 to logical status");
            code
        }
        _ => http_status,
    }
}

fn decode_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown status")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_status_code_overrides_200() {
        let body = json!({"statusCode": "409", "message": "Customer already exists"});
        assert_eq!(normalize_status(200, &body), 409);
    }

    #[test]
    fn test_numeric_status_code_overrides_200() {
        assert_eq!(normalize_status(200, &json!({"statusCode": 401})), 401);
    }

    #[test]
    fn test_status_code_200_is_unchanged() {
        assert_eq!(normalize_status(200, &json!({"statusCode": "200"})), 200);
    }

    #[test]
    fn test_non_200_http_status_wins() {
        assert_eq!(normalize_status(500, &json!({"statusCode": "409"})), 500);
        assert_eq!(normalize_status(201, &json!({"statusCode": "409"})), 201);
    }

    #[test]
    fn test_garbage_status_code_is_ignored() {
        assert_eq!(normalize_status(200, &json!({"statusCode": "oops"})), 200);
        assert_eq!(normalize_status(200, &json!({"statusCode": 99999})), 200);
        assert_eq!(normalize_status(200, &json!({"statusCode": 42})), 200);
        assert_eq!(normalize_status(200, &json!([1, 2, 3])), 200);
    }

    #[test]
    fn test_from_parts_decodes_bodies() {
        let response = ApiResponse::from_parts(200, b"");
        assert_eq!(response.data, Value::Null);

        let response = ApiResponse::from_parts(502, b"Bad Gateway");
        assert_eq!(response.data, Value::String("Bad Gateway".to_string()));
        assert_eq!(response.message().as_deref(), Some("Bad Gateway"));

        let response = ApiResponse::from_parts(200, br#"{"statusCode":"409"}"#);
        assert_eq!(response.status, 409);
    }

    #[test]
    fn test_error_for_status() {
        let err = ApiResponse::from_parts(200, br#"{"statusCode":"409","message":"Duplicate phone"}"#)
            .error_for_status()
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Api { status: 409, ref message } if message == "Duplicate phone"
        ));

        let err = ApiResponse::from_parts(404, b"").error_for_status().unwrap_err();
        assert!(matches!(
            err,
            ClientError::Api { status: 404, ref message } if message == "Not Found"
        ));

        assert!(ApiResponse::from_parts(204, b"").error_for_status().is_ok());
    }

    #[test]
    fn test_json_decoding() {
        #[derive(serde::Deserialize)]
        struct Product {
            #[serde(rename = "productId")]
            product_id: String,
        }

        let product: Product = ApiResponse::from_parts(200, br#"{"productId":"P1"}"#)
            .json()
            .unwrap();
        assert_eq!(product.product_id, "P1");
    }
}
