use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use reqwest::header::{AUTHORIZATION, CONTENT_LANGUAGE, CONTENT_TYPE, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::crypto::PayloadCipher;
use crate::error::Error;
use crate::session::Session;

use super::dedup::SubmissionGuard;
use super::query::append_query;
use super::relogin::{
    DeclinePrompt, LogNotifier, MemoryNavigator, Navigator, Notifier, ReloginGate, ReloginPrompt,
};
use super::request::{ApiRequest, Body, PreparedRequest};
use super::response::{
    ApiResponse, DecodeContext, ENCRYPT_KEY_HEADER, UNAUTHENTICATED, decode, parse_body,
    transport_message,
};
use super::transport::{Transport, TransportError};

const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";
const CLIENT_ID_HEADER: &str = "clientid";

/// A successful pipeline result.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Bytes),
}

/// UI-side collaborators of the pipeline.
#[derive(Clone)]
pub struct UiHooks {
    pub prompt: Arc<dyn ReloginPrompt>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

impl Default for UiHooks {
    fn default() -> Self {
        Self {
            prompt: Arc::new(DeclinePrompt),
            navigator: Arc::new(MemoryNavigator::default()),
            notifier: Arc::new(LogNotifier),
        }
    }
}

impl UiHooks {
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn ReloginPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

/// The single choke point for outbound requests.
pub struct HttpClient<T> {
    transport: T,
    config: ClientConfig,
    session: Arc<Session>,
    locale: RwLock<String>,
    submissions: SubmissionGuard,
    cipher: Option<PayloadCipher>,
    relogin: ReloginGate,
    notifier: Arc<dyn Notifier>,
}

impl<T: Transport> HttpClient<T> {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if encryption is enabled and a configured RSA
    /// key fails to parse.
    pub fn new(
        config: ClientConfig,
        transport: T,
        session: Arc<Session>,
        hooks: UiHooks,
    ) -> Result<Self, Error> {
        let cipher = if config.encrypt {
            Some(PayloadCipher::from_pem(
                config.rsa_public_key.as_deref(),
                config.rsa_private_key.as_deref(),
            )?)
        } else {
            None
        };
        Ok(Self::with_cipher(config, transport, session, hooks, cipher))
    }

    /// Like [`new`](Self::new) with ready-made key material. `cipher` is
    /// ignored unless encryption is enabled in `config`.
    #[must_use]
    pub fn with_cipher(
        config: ClientConfig,
        transport: T,
        session: Arc<Session>,
        hooks: UiHooks,
        cipher: Option<PayloadCipher>,
    ) -> Self {
        let relogin = ReloginGate::new(hooks.prompt, hooks.navigator, config.login_route.clone());
        Self {
            transport,
            locale: RwLock::new(config.locale.clone()),
            cipher: cipher.filter(|_| config.encrypt),
            config,
            session,
            submissions: SubmissionGuard::new(),
            relogin,
            notifier: hooks.notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    #[must_use]
    pub fn relogin(&self) -> &ReloginGate {
        &self.relogin
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[must_use]
    pub fn locale(&self) -> String {
        self.locale.read().clone()
    }

    pub fn set_locale(&self, locale: impl Into<String>) {
        *self.locale.write() = locale.into();
    }

    /// Run `request` through the pipeline.
    ///
    /// # Errors
    ///
    /// Every failure is already classified: [`Error::DuplicateSubmission`],
    /// [`Error::Transport`], [`Error::SessionExpired`], [`Error::Api`], or a
    /// crypto/config/decode error. Unless the request is `silent`, the user
    /// has been notified (or prompted, for 401) before this returns.
    pub async fn send(&self, request: ApiRequest) -> Result<Payload, Error> {
        let silent = request.options.silent;
        let is_auth_endpoint = self.config.is_auth_endpoint(&request.url);
        let response_type = request.response_type;

        let prepared = match self.prepare(request) {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.surface(e, silent)),
        };
        tracing::debug!(method = %prepared.method, url = %prepared.url, "Sending request");

        let raw = match self.transport.execute(prepared).await {
            Ok(raw) => raw,
            Err(source) => return Err(self.surface(transport_failure(source), silent)),
        };

        let ctx = DecodeContext {
            is_auth_endpoint,
            response_type,
            cipher: self.cipher.as_ref(),
        };
        match decode(raw, &ctx) {
            Ok(ApiResponse::Success { data }) => Ok(Payload::Json(data)),
            Ok(ApiResponse::RawBinary(bytes)) => Ok(Payload::Binary(bytes)),
            Ok(ApiResponse::Error { code, .. }) if code == UNAUTHENTICATED && !is_auth_endpoint => {
                if !silent {
                    self.relogin.trigger();
                }
                Err(Error::SessionExpired)
            }
            Ok(ApiResponse::Error { code, message }) => {
                Err(self.surface(Error::Api { code, message }, silent))
            }
            Err(e) => Err(self.surface(e, silent)),
        }
    }

    /// [`send`](Self::send) and deserialize the JSON payload.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus [`Error::Decode`] if the payload does not
    /// match `R`.
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R, Error> {
        match self.send(request).await? {
            Payload::Json(value) => Ok(serde_json::from_value(value)?),
            Payload::Binary(bytes) => Ok(serde_json::from_slice(&bytes)?),
        }
    }

    fn prepare(&self, request: ApiRequest) -> Result<PreparedRequest, Error> {
        let is_submit = request.is_submit();
        let ApiRequest {
            method,
            mut url,
            params,
            mut body,
            mut headers,
            options,
            response_type,
            timeout,
        } = request;

        headers.insert(CONTENT_LANGUAGE, header_value(&self.locale())?);
        headers.insert(
            HeaderName::from_static(CLIENT_ID_HEADER),
            header_value(&self.config.client_id)?,
        );
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }

        if options.is_token {
            let token = self.session.token();
            if !token.is_empty() {
                let value = format!("{} {token}", self.config.auth_scheme);
                headers.insert(AUTHORIZATION, header_value(&value)?);
            }
        }

        if let Some(params) = params {
            url = append_query(&url, &params);
        }

        if options.repeat_submit && is_submit && !self.submissions.admit(&url, &body.fingerprint())
        {
            tracing::warn!(url = %url, "Duplicate submission rejected");
            return Err(Error::DuplicateSubmission { url });
        }

        if options.is_encrypt
            && is_submit
            && let Some(cipher) = &self.cipher
            && let Some(plaintext) = body.plaintext()
        {
            let sealed = cipher.seal(plaintext.as_bytes())?;
            headers.insert(
                HeaderName::from_static(ENCRYPT_KEY_HEADER),
                header_value(&sealed.encrypted_key)?,
            );
            body = Body::Text(sealed.body);
        }

        if body.is_multipart() {
            headers.remove(CONTENT_TYPE);
        }

        Ok(PreparedRequest {
            method,
            url: self.config.endpoint(&url)?,
            headers,
            body,
            response_type,
            timeout,
        })
    }

    fn surface(&self, error: Error, silent: bool) -> Error {
        if !silent {
            self.notifier.error(&error.to_string());
        }
        error
    }
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|e| Error::Config(format!("invalid header value: {e}")))
}

fn transport_failure(source: TransportError) -> Error {
    let body = source
        .response
        .as_ref()
        .map(|partial| parse_body(&partial.body));
    let message = transport_message(body.as_ref())
        .or_else(|| Some(source.message.clone()).filter(|m| !m.is_empty()))
        .unwrap_or_else(|| "Request failed".to_owned());
    tracing::warn!(error = %source, resolved = %message, "Transport failure");
    Error::Transport { message, source }
}
