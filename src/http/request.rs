use std::time::Duration;

use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Per-request pipeline switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct RequestOptions {
    /// Attach the bearer header when a token is present.
    pub is_token: bool,
    /// Encrypt the body when global encryption is enabled.
    pub is_encrypt: bool,
    /// Enforce duplicate-submission suppression for POST/PUT.
    pub repeat_submit: bool,
    /// Do not notify the user or prompt for re-authentication on failure.
    pub silent: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            is_token: true,
            is_encrypt: false,
            repeat_submit: true,
            silent: false,
        }
    }
}

impl RequestOptions {
    /// Attach the session token (default on).
    #[must_use]
    pub fn with_token(mut self, is_token: bool) -> Self {
        self.is_token = is_token;
        self
    }

    /// Encrypt the body when global encryption is on (default off).
    #[must_use]
    pub fn with_encrypt(mut self, is_encrypt: bool) -> Self {
        self.is_encrypt = is_encrypt;
        self
    }

    /// Reject duplicate submissions (default on).
    #[must_use]
    pub fn with_repeat_submit(mut self, repeat_submit: bool) -> Self {
        self.repeat_submit = repeat_submit;
        self
    }

    /// Suppress notifications and the re-authentication prompt.
    #[must_use]
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }
}

/// How the caller wants the response body interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    #[default]
    Json,
    Blob,
    ArrayBuffer,
}

impl ResponseType {
    #[must_use]
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Blob | Self::ArrayBuffer)
    }
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: String,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Form(Vec<(String, String)>),
    Multipart(Vec<FormPart>),
}

impl Body {
    /// Serialized form compared by the duplicate-submission check.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
            Self::Form(pairs) => pairs
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&"),
            Self::Multipart(parts) => parts
                .iter()
                .map(FormPart::name)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Bytes to encrypt, or `None` for bodies that are sent as-is.
    pub(crate) fn plaintext(&self) -> Option<String> {
        match self {
            Self::Json(value) => Some(value.to_string()),
            Self::Text(text) => Some(text.clone()),
            Self::Form(_) | Self::Multipart(_) | Self::Empty => None,
        }
    }

    #[must_use]
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart(_))
    }
}

/// A request as issued by callers, before the pipeline transforms it.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `/admin/crud/users/`.
    pub url: String,
    pub params: Option<Value>,
    pub body: Body,
    pub headers: HeaderMap,
    pub options: RequestOptions,
    pub response_type: ResponseType,
    pub timeout: Option<Duration>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: None,
            body: Body::Empty,
            headers: HeaderMap::new(),
            options: RequestOptions::default(),
            response_type: ResponseType::Json,
            timeout: None,
        }
    }

    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    #[must_use]
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Query parameters, flattened into the URL by the pipeline.
    #[must_use]
    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    /// Serialize `data` as the JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `data` cannot be represented as JSON.
    pub fn json<T: Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = Body::Json(serde_json::to_value(data)?);
        Ok(self)
    }

    /// Set the body directly.
    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Add a header. A caller-set `Content-Type` is kept; headers the
    /// pipeline stamps overwrite others of the same name.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the pipeline switches.
    #[must_use]
    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// How to interpret the response body (default JSON).
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Per-request timeout, overriding the transport default.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub(crate) fn is_submit(&self) -> bool {
        self.method == Method::POST || self.method == Method::PUT
    }
}

/// A fully transformed request ready for the transport.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: url::Url,
    pub headers: HeaderMap,
    pub body: Body,
    pub response_type: ResponseType,
    pub timeout: Option<Duration>,
}
