#![doc = include_str!("../README.md")]

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod http;
pub mod profile;
pub mod session;
pub mod storage;
pub mod token;
pub mod types;

// Re-exports for convenient access
pub use api::{AppealPayload, Document, LeaveRequestPayload, Resource, ResourceClient};
pub use app::AttendifyClient;
pub use auth::AuthController;
pub use config::ClientConfig;
pub use crypto::PayloadCipher;
pub use error::Error;
pub use guard::{GuardDecision, Navigation, NoProgress, ProgressIndicator, RouteGuard};
pub use http::{
    ApiRequest, ApiResponse, Body, HttpClient, Navigator, Notifier, Payload, ReloginPrompt,
    ReqwestTransport, RequestOptions, ResponseType, Transport, UiHooks,
};
pub use profile::{CachedProfile, ProfileCache};
pub use session::{AuthState, Identity, Session, SessionData};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use token::TokenStore;
pub use types::{UserId, is_valid_user_id};
