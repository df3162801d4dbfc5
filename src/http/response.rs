use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::crypto::PayloadCipher;
use crate::error::Error;

use super::request::ResponseType;

/// Header carrying the RSA-wrapped AES key of an encrypted body.
pub const ENCRYPT_KEY_HEADER: &str = "encrypt-key";

/// Application code meaning "not authenticated".
pub const UNAUTHENTICATED: i64 = 401;

const DEFAULT_ERROR_MESSAGE: &str = "Unknown system error, please contact the administrator";

/// Whatever the transport received, any status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn json(status: StatusCode, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// A backend response decoded once at the pipeline boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Success { data: Value },
    Error { code: i64, message: String },
    RawBinary(Bytes),
}

/// Context the decoder needs beyond the raw response.
pub(crate) struct DecodeContext<'a> {
    pub is_auth_endpoint: bool,
    pub response_type: ResponseType,
    /// Present only when global encryption is on.
    pub cipher: Option<&'a PayloadCipher>,
}

/// Static message table keyed by application code.
#[must_use]
pub fn code_message(code: i64) -> Option<&'static str> {
    match code {
        401 => Some("Authentication failed, unable to access system resources"),
        403 => Some("The current operation is not permitted"),
        404 => Some("The requested resource does not exist"),
        _ => None,
    }
}

/// Parses a body as JSON. Empty bodies are `null`; anything that is not
/// JSON is kept as a JSON string.
#[must_use]
pub fn parse_body(body: &[u8]) -> Value {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}

pub(crate) fn decode(response: RawResponse, ctx: &DecodeContext<'_>) -> Result<ApiResponse, Error> {
    let success = response.status.is_success();

    if ctx.is_auth_endpoint && success {
        return Ok(ApiResponse::Success {
            data: parse_body(&response.body),
        });
    }

    let mut decrypted = None;
    if let Some(cipher) = ctx.cipher
        && let Some(key) = response.header(ENCRYPT_KEY_HEADER)
    {
        let text = String::from_utf8_lossy(&response.body);
        let plaintext = cipher.open(key, &text).inspect_err(|e| {
            tracing::error!(error = %e, "Failed to decrypt response body");
        })?;
        decrypted = Some(serde_json::from_slice::<Value>(&plaintext)?);
    }

    if ctx.response_type.is_binary() && decrypted.is_none() {
        return Ok(ApiResponse::RawBinary(response.body));
    }

    let body = decrypted.unwrap_or_else(|| parse_body(&response.body));

    if success {
        if body.get("status").and_then(Value::as_str) == Some("success")
            && let Some(data) = body.get("data")
        {
            return Ok(ApiResponse::Success { data: data.clone() });
        }
        match embedded_code(&body) {
            Some(code) if !(200..300).contains(&code) => Ok(error_response(code, &body)),
            _ => Ok(ApiResponse::Success { data: body }),
        }
    } else {
        let code = embedded_code(&body).unwrap_or_else(|| i64::from(response.status.as_u16()));
        Ok(error_response(code, &body))
    }
}

/// Application code carried in the body. Only non-zero JSON numbers count;
/// string `code` fields are resource data.
fn embedded_code(body: &Value) -> Option<i64> {
    body.get("code")?.as_i64().filter(|code| *code != 0)
}

fn error_response(code: i64, body: &Value) -> ApiResponse {
    let message = code_message(code)
        .map(str::to_owned)
        .or_else(|| non_empty_str(body.get("msg")))
        .or_else(|| non_empty_str(body.get("message")))
        .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_owned());
    ApiResponse::Error { code, message }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Best-effort message for a failed transport, read from a partial body.
///
/// Priority: `message`, `detail`, `email`, `username`, `student_id`, a raw
/// string body, `non_field_errors`.
#[must_use]
pub fn transport_message(body: Option<&Value>) -> Option<String> {
    let body = body?;
    if let Value::String(s) = body {
        return Some(s.clone()).filter(|s| !s.is_empty());
    }
    if let Some(message) = non_empty_str(body.get("message")) {
        return Some(message);
    }
    if let Some(detail) = body.get("detail").and_then(first_text) {
        return Some(detail);
    }
    for (field, label) in [
        ("email", "Email"),
        ("username", "Username"),
        ("student_id", "Student ID"),
    ] {
        if let Some(text) = body.get(field).and_then(first_text) {
            return Some(format!("{label}: {text}"));
        }
    }
    body.get("non_field_errors").and_then(first_text)
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.first().and_then(first_text),
        Value::Null | Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::HeaderValue;
    use serde_json::json;

    use super::*;
    use crate::crypto::{PayloadCipher, encrypt_with_aes, generate_aes_key};

    fn plain<'a>() -> DecodeContext<'a> {
        DecodeContext {
            is_auth_endpoint: false,
            response_type: ResponseType::Json,
            cipher: None,
        }
    }

    #[test]
    fn success_envelope_is_unwrapped() {
        let raw = RawResponse::json(
            StatusCode::OK,
            &json!({"status": "success", "code": 200, "data": {"foo": 1}}),
        );
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Success {
                data: json!({"foo": 1})
            }
        );
    }

    #[test]
    fn bare_body_passes_through() {
        let raw = RawResponse::json(StatusCode::OK, &json!({"foo": 1}));
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Success {
                data: json!({"foo": 1})
            }
        );
        let raw = RawResponse::new(StatusCode::NO_CONTENT, "");
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Success { data: Value::Null }
        );
    }

    #[test]
    fn embedded_error_code_in_2xx() {
        let raw = RawResponse::json(StatusCode::OK, &json!({"code": 500, "msg": "db down"}));
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Error {
                code: 500,
                message: "db down".into()
            }
        );
    }

    #[test]
    fn string_code_field_is_resource_data() {
        let module = json!({"id": 3, "code": "314", "name": "Software Dev"});
        let raw = RawResponse::json(StatusCode::OK, &module);
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Success { data: module }
        );
    }

    #[test]
    fn zero_code_falls_back_to_status() {
        let body = json!({"code": 0, "data": [1]});
        let raw = RawResponse::json(StatusCode::OK, &body);
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Success { data: body }
        );

        let raw = RawResponse::json(StatusCode::BAD_REQUEST, &json!({"code": 0, "message": "x"}));
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Error {
                code: 400,
                message: "x".into()
            }
        );
    }

    #[test]
    fn error_message_prefers_table_then_body() {
        let raw = RawResponse::json(StatusCode::FORBIDDEN, &json!({"message": "nope"}));
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Error {
                code: 403,
                message: "The current operation is not permitted".into()
            }
        );

        let raw = RawResponse::json(StatusCode::BAD_REQUEST, &json!({"message": "bad dates"}));
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Error {
                code: 400,
                message: "bad dates".into()
            }
        );

        let raw = RawResponse::new(StatusCode::BAD_GATEWAY, "");
        assert_eq!(
            decode(raw, &plain()).unwrap(),
            ApiResponse::Error {
                code: 502,
                message: DEFAULT_ERROR_MESSAGE.into()
            }
        );
    }

    #[test]
    fn auth_endpoint_bypasses_unwrapping() {
        let body = json!({"status": "success", "data": {"x": 1}, "token": "t"});
        let ctx = DecodeContext {
            is_auth_endpoint: true,
            ..plain()
        };
        assert_eq!(
            decode(RawResponse::json(StatusCode::OK, &body), &ctx).unwrap(),
            ApiResponse::Success { data: body }
        );
    }

    #[test]
    fn binary_is_raw() {
        let ctx = DecodeContext {
            response_type: ResponseType::Blob,
            ..plain()
        };
        let raw = RawResponse::new(StatusCode::OK, vec![0xff, 0x00, 0x10]);
        assert_eq!(
            decode(raw, &ctx).unwrap(),
            ApiResponse::RawBinary(Bytes::from_static(&[0xff, 0x00, 0x10]))
        );
    }

    #[test]
    fn encrypted_body_is_decrypted_before_unwrapping() {
        let (public_key, private_key) = crate::crypto::tests::test_keypair();
        let cipher = PayloadCipher::new(None, Some(private_key));

        let aes_key = generate_aes_key();
        let body = encrypt_with_aes(br#"{"status":"success","data":[1,2]}"#, &aes_key).unwrap();
        let wrapped = PayloadCipher::wrap_key_for(&public_key, &aes_key).unwrap();

        let mut raw = RawResponse::new(StatusCode::OK, body);
        raw.headers
            .insert(ENCRYPT_KEY_HEADER, HeaderValue::from_str(&wrapped).unwrap());

        let ctx = DecodeContext {
            cipher: Some(&cipher),
            ..plain()
        };
        assert_eq!(
            decode(raw, &ctx).unwrap(),
            ApiResponse::Success {
                data: json!([1, 2])
            }
        );
    }

    #[test]
    fn transport_message_priority() {
        assert_eq!(
            transport_message(Some(&json!({"message": "m", "detail": "d"}))).as_deref(),
            Some("m")
        );
        assert_eq!(
            transport_message(Some(&json!({"detail": "d", "email": ["taken"]}))).as_deref(),
            Some("d")
        );
        assert_eq!(
            transport_message(Some(&json!({"email": ["already exists"]}))).as_deref(),
            Some("Email: already exists")
        );
        assert_eq!(
            transport_message(Some(&json!({"student_id": "dup"}))).as_deref(),
            Some("Student ID: dup")
        );
        assert_eq!(
            transport_message(Some(&json!("Bad Gateway"))).as_deref(),
            Some("Bad Gateway")
        );
        assert_eq!(
            transport_message(Some(&json!({"non_field_errors": ["Invalid credentials"]})))
                .as_deref(),
            Some("Invalid credentials")
        );
        assert_eq!(transport_message(Some(&json!({}))), None);
        assert_eq!(transport_message(None), None);
    }
}
