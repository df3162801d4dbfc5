//! In-memory transport and UI doubles shared by the crate's unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::config::ClientConfig;
use crate::session::Session;

use super::client::{HttpClient, UiHooks};
use super::relogin::Notifier;
use super::request::PreparedRequest;
use super::response::RawResponse;
use super::transport::{Transport, TransportError};

type Reply = Result<RawResponse, TransportError>;

/// Replies by URL path and records every request it receives.
///
/// Unscripted paths answer `200 {"status":"success","data":{}}`.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: Mutex<HashMap<String, Reply>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub(crate) fn on(self, path: &str, reply: Reply) -> Self {
        self.replies.lock().insert(path.to_owned(), reply);
        self
    }

    #[must_use]
    pub(crate) fn json(self, path: &str, status: u16, body: Value) -> Self {
        let status = StatusCode::from_u16(status).unwrap();
        self.on(path, Ok(RawResponse::json(status, &body)))
    }

    /// Hold replies for `path` back by `delay`.
    #[must_use]
    pub(crate) fn delay(self, path: &str, delay: Duration) -> Self {
        self.delays.lock().insert(path.to_owned(), delay);
        self
    }

    pub(crate) fn calls(&self) -> Vec<PreparedRequest> {
        self.calls.lock().clone()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.url.path() == path).count()
    }

    pub(crate) fn last(&self) -> PreparedRequest {
        self.calls.lock().last().cloned().unwrap()
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<RawResponse, TransportError> {
        let reply = self.replies.lock().get(request.url.path()).cloned();
        let delay = self.delays.lock().get(request.url.path()).copied();
        self.calls.lock().push(request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        reply.unwrap_or_else(|| {
            Ok(RawResponse::json(
                StatusCode::OK,
                &json!({"status": "success", "data": {}}),
            ))
        })
    }
}

/// Collects notifications instead of showing them.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    pub(crate) messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.messages.lock().push(message.to_owned());
    }
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new("https://attendify.example.com".parse().unwrap())
}

pub(crate) fn test_client(
    transport: ScriptedTransport,
    hooks: UiHooks,
) -> HttpClient<ScriptedTransport> {
    HttpClient::with_cipher(test_config(), transport, Arc::new(Session::new()), hooks, None)
}
