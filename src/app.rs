//! One-stop wiring of the client.
//!
//! ```rust,ignore
//! use attendify_client::{AttendifyClient, UiHooks};
//!
//! let client = AttendifyClient::from_env(UiHooks::default())?;
//! if let Some(cached) = client.start().await {
//!     render_optimistic_header(&cached.profile);
//! }
//! let decision = client.guard().before_each(&Navigation::new("/leaves")).await;
//! ```

use std::sync::Arc;

use crate::api::ResourceClient;
use crate::auth::AuthController;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::guard::RouteGuard;
use crate::http::{HttpClient, ReqwestTransport, Transport, UiHooks};
use crate::profile::CachedProfile;
use crate::session::Session;
use crate::storage::{FileStore, KeyValueStore};

/// Pipeline, auth controller, route guard and resource client sharing one
/// session.
pub struct AttendifyClient<T = ReqwestTransport, S = FileStore> {
    http: Arc<HttpClient<T>>,
    auth: Arc<AuthController<T, S>>,
    guard: RouteGuard<T, S>,
    resources: ResourceClient<T>,
}

impl AttendifyClient<ReqwestTransport, FileStore> {
    /// Configuration from `ATTENDIFY_*` variables, reqwest transport, and
    /// storage in the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for missing or invalid configuration,
    /// [`Error::Storage`] if no data directory exists.
    pub fn from_env(hooks: UiHooks) -> Result<Self, Error> {
        let config = ClientConfig::from_env()?;
        let transport = ReqwestTransport::new(config.timeout())
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        let storage = Arc::new(FileStore::in_data_dir()?);
        Self::new(config, transport, storage, hooks)
    }
}

impl<T: Transport, S: KeyValueStore> AttendifyClient<T, S> {
    /// # Errors
    ///
    /// Returns [`Error::Config`] if encryption is enabled with unusable keys.
    pub fn new(
        config: ClientConfig,
        transport: T,
        storage: Arc<S>,
        hooks: UiHooks,
    ) -> Result<Self, Error> {
        let http = Arc::new(HttpClient::new(
            config,
            transport,
            Arc::new(Session::new()),
            hooks,
        )?);
        Ok(Self::from_parts(http, storage))
    }

    /// Wire the components around an existing pipeline.
    #[must_use]
    pub fn from_parts(http: Arc<HttpClient<T>>, storage: Arc<S>) -> Self {
        let auth = AuthController::new(http.clone(), storage);
        Self {
            guard: RouteGuard::new(auth.clone()),
            resources: ResourceClient::new(http.clone()),
            auth,
            http,
        }
    }

    /// Customize the route guard (allow-list, progress indicator).
    #[must_use]
    pub fn map_guard(mut self, f: impl FnOnce(RouteGuard<T, S>) -> RouteGuard<T, S>) -> Self {
        self.guard = f(self.guard);
        self
    }

    /// Cold start: restore the persisted token and return the cached profile
    /// for optimistic display. The identity resolves on first guarded
    /// navigation.
    pub async fn start(&self) -> Option<CachedProfile> {
        let cached = self.auth.restore().await;
        tracing::info!(state = ?self.auth.state(), "Client started");
        cached
    }

    #[must_use]
    pub fn http(&self) -> &Arc<HttpClient<T>> {
        &self.http
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<AuthController<T, S>> {
        &self.auth
    }

    #[must_use]
    pub fn guard(&self) -> &RouteGuard<T, S> {
        &self.guard
    }

    #[must_use]
    pub fn resources(&self) -> &ResourceClient<T> {
        &self.resources
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        self.http.session()
    }
}
