//! The request/response pipeline every backend call goes through.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use attendify_client::http::{ApiRequest, HttpClient, ReqwestTransport, UiHooks};
//!
//! let transport = ReqwestTransport::new(config.timeout())?;
//! let http = HttpClient::new(config, transport, Arc::new(Session::new()), UiHooks::default())?;
//! let leaves = http.send(ApiRequest::get("/admin/crud/leaves/")).await?;
//! ```

mod client;
mod dedup;
mod query;
mod relogin;
mod request;
mod response;
mod transport;

#[cfg(test)]
pub(crate) mod testing;
#[cfg(test)]
pub(crate) use relogin::tests as relogin_tests;

pub use client::{HttpClient, Payload, UiHooks};
pub use dedup::{DEBOUNCE_WINDOW, SubmissionGuard};
pub use query::{append_query, flatten_params};
pub use relogin::{
    DeclinePrompt, LogNotifier, MemoryNavigator, Navigator, Notifier, ReloginGate, ReloginPrompt,
    SessionTerminator, login_redirect,
};
pub use request::{ApiRequest, Body, FormPart, PreparedRequest, RequestOptions, ResponseType};
pub use response::{
    ApiResponse, ENCRYPT_KEY_HEADER, RawResponse, UNAUTHENTICATED, code_message, parse_body,
    transport_message,
};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportErrorKind};
