//! Login, logout and "who am I" resolution over the shared [`Session`].
//!
//! ```rust,ignore
//! let auth = AuthController::new(http, storage);
//! auth.login("jdoe", "secret").await?;
//! assert_eq!(auth.state(), AuthState::Authenticated);
//! auth.logout().await;
//! ```

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use serde_json::{Value, json};

use crate::error::Error;
use crate::http::{
    ApiRequest, HttpClient, Payload, RequestOptions, SessionTerminator, Transport, parse_body,
};
use crate::profile::{CachedProfile, ProfileCache};
use crate::session::{AuthState, AuthenticatingGuard, Identity, Session};
use crate::storage::KeyValueStore;
use crate::token::TokenStore;

const TOKEN_FIELDS: [&str; 2] = ["token", "access_token"];

/// Owns the session lifecycle: login, identity refresh, logout, cold start.
pub struct AuthController<T, S> {
    http: Arc<HttpClient<T>>,
    tokens: TokenStore<S>,
    profiles: ProfileCache<S>,
}

impl<T: Transport, S: KeyValueStore> AuthController<T, S> {
    /// Build the controller and bind it as the pipeline's session
    /// terminator, so a confirmed re-authentication prompt logs out.
    #[must_use]
    pub fn new(http: Arc<HttpClient<T>>, storage: Arc<S>) -> Arc<Self> {
        let controller = Arc::new(Self {
            http,
            tokens: TokenStore::new(storage.clone()),
            profiles: ProfileCache::new(storage),
        });
        let weak = Arc::downgrade(&controller);
        let terminator: Weak<dyn SessionTerminator> = weak;
        controller.http.relogin().bind(terminator);
        controller
    }

    #[must_use]
    pub fn http(&self) -> &Arc<HttpClient<T>> {
        &self.http
    }

    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        self.http.session()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        self.session().state()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore<S> {
        &self.tokens
    }

    #[must_use]
    pub fn profiles(&self) -> &ProfileCache<S> {
        &self.profiles
    }

    // ── Login ──────────────────────────────────────────────────────────

    /// Exchange credentials for a token and, when the backend includes a
    /// user object, the identity.
    ///
    /// # Errors
    ///
    /// Any pipeline error, or [`Error::MalformedAuthResponse`] when the
    /// response carries no token. The session is left untouched on failure.
    /// Returns [`Error::NoSession`] when a logout ran while the request was
    /// in flight; the response is then discarded.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), Error> {
        let generation = self.session().generation();
        let _authenticating = AuthenticatingGuard::new(self.session());

        let request = ApiRequest::post(self.http.config().login_endpoint.clone())
            .json(&json!({ "username": username, "password": password }))?
            .options(
                RequestOptions::default()
                    .with_token(false)
                    .with_encrypt(false)
                    .with_repeat_submit(false),
            );
        let body = match self.http.send(request).await? {
            Payload::Json(value) => value,
            Payload::Binary(bytes) => parse_body(&bytes),
        };
        let data = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);

        let Some(token) = extract_token(data) else {
            tracing::error!("Login response missing token");
            return Err(Error::MalformedAuthResponse);
        };

        let default_avatar = &self.http.config().default_avatar;
        let user = data.get("user").filter(|u| u.is_object());
        let identity = user.map_or_else(Identity::default, |user| {
            Identity::from_login_user(user, default_avatar)
        });
        if !self.session().commit(generation, Some(&token), identity) {
            tracing::warn!("Logged out while logging in, discarding login response");
            return Err(Error::NoSession);
        }

        self.persist_token(generation, &token).await;
        if let Some(user) = user {
            self.cache_profile(generation, user).await;
        }

        tracing::info!(user_id = ?self.session().user_id(), "Login successful");
        Ok(())
    }

    // ── Identity ───────────────────────────────────────────────────────

    /// Resolve the identity behind the current token.
    ///
    /// Returns immediately when the identity is already resolved. When the
    /// identity endpoint fails but a token is held, a placeholder identity is
    /// applied instead of failing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSession`] when there is no token, or when a logout
    /// ran while the identity was being fetched.
    pub async fn get_info(&self) -> Result<Identity, Error> {
        let session = self.session();
        if session.identity_resolved() {
            return Ok(session.snapshot().identity);
        }
        if !session.has_token() {
            return Err(Error::NoSession);
        }
        let generation = session.generation();

        let default_avatar = &self.http.config().default_avatar;
        let (identity, user) = match self.fetch_info().await {
            Ok(info) => (
                Identity::from_info(&info, default_avatar),
                info.get("user").cloned(),
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Identity endpoint unavailable, using placeholder identity");
                let cached = self.profiles.load().await;
                let identity = Identity::placeholder(
                    cached.as_ref().and_then(CachedProfile::username),
                    default_avatar,
                );
                (identity, None)
            }
        };
        if !session.commit(generation, None, identity) {
            tracing::warn!("Logged out while resolving identity, discarding it");
            return Err(Error::NoSession);
        }
        if let Some(user) = user {
            self.cache_profile(generation, &user).await;
        }
        Ok(session.snapshot().identity)
    }

    async fn fetch_info(&self) -> Result<Value, Error> {
        let request = ApiRequest::get(self.http.config().info_endpoint.clone());
        match self.http.send(request).await? {
            Payload::Json(info) if info.get("user").is_some_and(Value::is_object) => Ok(info),
            _ => Err(Error::Api {
                code: 500,
                message: "Failed to get user info".into(),
            }),
        }
    }

    /// Replace the avatar shown for the current user.
    pub fn set_avatar(&self, url: impl Into<String>) {
        let mut identity = self.session().snapshot().identity;
        identity.avatar_url = url.into();
        self.session().apply_identity(identity);
    }

    // ── Logout ─────────────────────────────────────────────────────────

    /// End the session. Backend calls are best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        let config = self.http.config();
        let options = RequestOptions::default()
            .with_silent(true)
            .with_repeat_submit(false);

        if config.sse_enabled() {
            let close = ApiRequest::get(config.sse_close_endpoint.clone()).options(options);
            if let Err(e) = self.http.send(close).await {
                tracing::warn!(error = %e, "Push channel close failed during logout");
            }
        }
        let request = ApiRequest::post(config.logout_endpoint.clone()).options(options);
        if let Err(e) = self.http.send(request).await {
            tracing::warn!(error = %e, "Logout endpoint failed, clearing local session anyway");
        }

        self.session().clear();
        if let Err(e) = self.tokens.clear().await {
            tracing::warn!(error = %e, "Failed to remove persisted token");
        }
        if let Err(e) = self.profiles.remove().await {
            tracing::warn!(error = %e, "Failed to remove cached profile");
        }
        tracing::info!("Logged out");
    }

    // ── Cold start ─────────────────────────────────────────────────────

    /// Load the persisted token into the session. The identity stays
    /// pending; the cached profile, if any, is returned for optimistic
    /// display.
    pub async fn restore(&self) -> Option<CachedProfile> {
        let token = self.tokens.get().await;
        if token.is_empty() {
            return None;
        }
        self.session().set_token(&token);
        tracing::debug!("Restored persisted token");
        self.profiles.load().await
    }

    // Writes below may finish after a concurrent logout removed the records;
    // re-checking the generation afterwards undoes them.

    async fn persist_token(&self, generation: u64, token: &str) {
        if let Err(e) = self.tokens.set(token).await {
            tracing::warn!(error = %e, "Failed to persist token, session will not survive restart");
            return;
        }
        if self.session().generation() != generation
            && let Err(e) = self.tokens.clear().await
        {
            tracing::warn!(error = %e, "Failed to remove token persisted after logout");
        }
    }

    async fn cache_profile(&self, generation: u64, user: &Value) {
        if let Err(e) = self.profiles.save(user).await {
            tracing::warn!(error = %e, "Failed to cache user profile");
            return;
        }
        if self.session().generation() != generation
            && let Err(e) = self.profiles.remove().await
        {
            tracing::warn!(error = %e, "Failed to remove profile cached after logout");
        }
    }
}

impl<T: Transport, S: KeyValueStore> SessionTerminator for AuthController<T, S> {
    fn terminate(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.logout())
    }
}

fn extract_token(data: &Value) -> Option<String> {
    TOKEN_FIELDS.iter().find_map(|field| {
        data.get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned)
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::http::relogin_tests::HeldPrompt;
    use crate::http::testing::{RecordingNotifier, ScriptedTransport, test_client};
    use crate::http::{MemoryNavigator, Navigator, UiHooks};
    use crate::session::{DEFAULT_ROLE, SessionData};
    use crate::storage::MemoryStore;
    use crate::token::TOKEN_KEY;
    use crate::types::UserId;

    type Controller = Arc<AuthController<ScriptedTransport, MemoryStore>>;

    fn controller_with(transport: ScriptedTransport, hooks: UiHooks) -> (Controller, Arc<MemoryStore>) {
        let storage = Arc::new(MemoryStore::new());
        let http = Arc::new(test_client(transport, hooks));
        (AuthController::new(http, storage.clone()), storage)
    }

    fn controller(transport: ScriptedTransport) -> (Controller, Arc<MemoryStore>) {
        controller_with(transport, UiHooks::default())
    }

    fn login_ok() -> ScriptedTransport {
        ScriptedTransport::new().json(
            "/api/login/",
            200,
            json!({
                "message": "Login successful",
                "token": "tok-1",
                "user": {
                    "id": 42,
                    "username": "jdoe",
                    "first_name": "Jane",
                    "last_name": "Doe",
                    "role_type": "student"
                }
            }),
        )
    }

    #[tokio::test]
    async fn login_populates_session_and_storage() {
        let (auth, storage) = controller(login_ok());
        auth.login("jdoe", "pw").await.unwrap();

        assert_eq!(auth.state(), AuthState::Authenticated);
        let data = auth.session().snapshot();
        assert_eq!(data.token, "tok-1");
        assert_eq!(data.identity.display_name, "jdoe");
        assert_eq!(data.identity.nice_name, "Jane Doe");
        assert_eq!(data.identity.roles, vec!["student"]);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(
            auth.profiles().load().await.unwrap().username(),
            Some("jdoe")
        );

        let sent = auth.http().transport().last();
        assert!(!sent.headers.contains_key(reqwest::header::AUTHORIZATION));
        assert_eq!(
            sent.body,
            crate::http::Body::Json(json!({"username": "jdoe", "password": "pw"}))
        );
    }

    #[tokio::test]
    async fn user_id_survives_other_calls_until_logout() {
        let (auth, _) = controller(login_ok());
        auth.login("jdoe", "pw").await.unwrap();
        let expected = UserId::try_from(42_u64).ok();

        for _ in 0..3 {
            auth.http().send(ApiRequest::get("/leaves/")).await.unwrap();
            auth.get_info().await.unwrap();
            assert_eq!(auth.session().user_id(), expected);
        }

        auth.logout().await;
        assert_eq!(auth.session().user_id(), None);
    }

    #[tokio::test]
    async fn token_inside_data_envelope_and_access_token_alias() {
        let transport = ScriptedTransport::new().json(
            "/api/login/",
            200,
            json!({"status": "success", "data": {"access_token": "tok-2"}}),
        );
        let (auth, _) = controller(transport);
        auth.login("a", "b").await.unwrap();
        assert_eq!(auth.session().token(), "tok-2");
        assert_eq!(auth.state(), AuthState::IdentityPending);
    }

    #[tokio::test]
    async fn login_without_token_stays_anonymous() {
        let transport = ScriptedTransport::new().json(
            "/api/login/",
            200,
            json!({"message": "ok", "user": {"id": 1, "username": "x", "role_type": "admin"}}),
        );
        let (auth, storage) = controller(transport);

        let err = auth.login("x", "y").await.unwrap_err();
        assert!(matches!(err, Error::MalformedAuthResponse));
        assert_eq!(auth.state(), AuthState::Anonymous);
        assert!(auth.session().token().is_empty());
        assert!(auth.session().roles().is_empty());
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejected_login_propagates_and_stays_anonymous() {
        let transport = ScriptedTransport::new()
            .json("/api/login/", 400, json!({"message": "Invalid credentials"}));
        let (auth, _) = controller(transport);

        let err = auth.login("x", "bad").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(auth.state(), AuthState::Anonymous);
    }

    #[tokio::test]
    async fn logout_clears_everything_even_when_backend_fails() {
        let notifier = Arc::new(RecordingNotifier::default());
        let (auth, storage) = controller_with(
            login_ok().json("/api/auth/logout/", 500, json!({"detail": "boom"})),
            UiHooks::default().with_notifier(notifier.clone()),
        );
        auth.login("jdoe", "pw").await.unwrap();

        auth.logout().await;

        let data = auth.session().snapshot();
        assert!(data.token.is_empty());
        assert!(data.identity.roles.is_empty());
        assert!(data.identity.permissions.is_empty());
        assert_eq!(auth.state(), AuthState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert!(auth.profiles().load().await.is_none());
        assert_eq!(auth.http().transport().count("/api/auth/logout/"), 1);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn logout_closes_push_channel_when_enabled() {
        let storage = Arc::new(MemoryStore::new());
        let http = Arc::new(HttpClient::with_cipher(
            crate::http::testing::test_config().with_sse(true),
            ScriptedTransport::new(),
            Arc::new(Session::new()),
            UiHooks::default(),
            None,
        ));
        let auth = AuthController::new(http, storage);
        auth.logout().await;
        assert_eq!(auth.http().transport().count("/api/resource/sse/close"), 1);
        assert_eq!(auth.http().transport().count("/api/auth/logout/"), 1);
    }

    #[tokio::test]
    async fn get_info_with_resolved_identity_makes_no_call() {
        let (auth, _) = controller(login_ok());
        auth.login("jdoe", "pw").await.unwrap();
        let before = auth.http().transport().calls().len();

        let identity = auth.get_info().await.unwrap();
        assert_eq!(identity.display_name, "jdoe");
        assert_eq!(auth.http().transport().calls().len(), before);
    }

    #[tokio::test]
    async fn get_info_without_token_is_no_session() {
        let (auth, _) = controller(ScriptedTransport::new());
        assert!(matches!(auth.get_info().await, Err(Error::NoSession)));
        assert!(auth.http().transport().calls().is_empty());
    }

    #[tokio::test]
    async fn get_info_applies_listed_roles() {
        let transport = ScriptedTransport::new().json(
            "/api/getInfo/",
            200,
            json!({
                "status": "success",
                "data": {
                    "user": {"userName": "lect", "nickName": "Dr. L", "userId": 7, "avatar": ""},
                    "roles": ["lecturer"],
                    "permissions": ["attendance:mark"]
                }
            }),
        );
        let (auth, _) = controller(transport);
        auth.session().set_token("tok");

        let identity = auth.get_info().await.unwrap();
        assert_eq!(identity.roles, vec!["lecturer"]);
        assert!(identity.permissions.contains("attendance:mark"));
        assert_eq!(identity.nice_name, "Dr. L");
        assert_eq!(identity.avatar_url, auth.http().config().default_avatar);
        assert_eq!(auth.state(), AuthState::Authenticated);
        assert_eq!(auth.profiles().load().await.unwrap().username(), Some("lect"));
    }

    #[tokio::test]
    async fn get_info_failure_with_token_degrades_to_placeholder() {
        let transport =
            ScriptedTransport::new().json("/api/getInfo/", 502, json!("Bad gateway"));
        let (auth, _) = controller(transport);
        auth.session().set_token("tok");
        auth.profiles().save(&json!({"username": "cached"})).await.unwrap();

        let identity = auth.get_info().await.unwrap();
        assert_eq!(identity.roles, vec![DEFAULT_ROLE]);
        assert_eq!(identity.display_name, "cached");
        assert_eq!(auth.state(), AuthState::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_identity_fetch_discards_the_identity() {
        let transport = ScriptedTransport::new()
            .json(
                "/api/getInfo/",
                200,
                json!({"user": {"userName": "stale", "userId": 5}, "roles": ["student"]}),
            )
            .delay("/api/getInfo/", Duration::from_millis(200));
        let (auth, storage) = controller(transport);
        auth.session().set_token("tok");

        let (info, ()) = tokio::join!(auth.get_info(), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            auth.logout().await;
        });

        assert!(matches!(info, Err(Error::NoSession)));
        assert_eq!(auth.session().snapshot(), SessionData::default());
        assert_eq!(auth.state(), AuthState::Anonymous);
        assert!(auth.profiles().load().await.is_none());
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_login_discards_the_response() {
        let transport = login_ok().delay("/api/login/", Duration::from_millis(200));
        let (auth, storage) = controller(transport);

        let (login, ()) = tokio::join!(auth.login("jdoe", "pw"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            auth.logout().await;
        });

        assert!(matches!(login, Err(Error::NoSession)));
        assert_eq!(auth.session().snapshot(), SessionData::default());
        assert_eq!(auth.state(), AuthState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert!(auth.profiles().load().await.is_none());
    }

    #[tokio::test]
    async fn restore_loads_token_as_identity_pending() {
        let (auth, storage) = controller(ScriptedTransport::new());
        assert!(auth.restore().await.is_none());
        assert_eq!(auth.state(), AuthState::Anonymous);

        storage.set(TOKEN_KEY, "persisted").await.unwrap();
        auth.profiles().save(&json!({"username": "jdoe"})).await.unwrap();

        let cached = auth.restore().await.unwrap();
        assert_eq!(cached.username(), Some("jdoe"));
        assert_eq!(auth.session().token(), "persisted");
        assert_eq!(auth.state(), AuthState::IdentityPending);
    }

    #[tokio::test]
    async fn set_avatar_keeps_identity() {
        let (auth, _) = controller(login_ok());
        auth.login("jdoe", "pw").await.unwrap();
        auth.set_avatar("https://cdn/new.png");
        let identity = auth.session().snapshot().identity;
        assert_eq!(identity.avatar_url, "https://cdn/new.png");
        assert_eq!(identity.display_name, "jdoe");
    }

    #[tokio::test]
    async fn confirmed_prompt_logs_out_and_redirects() {
        let prompt = Arc::new(HeldPrompt::answering(true));
        let navigator = Arc::new(MemoryNavigator::new("/leaves"));
        let (auth, storage) = controller_with(
            login_ok().json("/api/leaves/", 401, json!({})),
            UiHooks::default()
                .with_prompt(prompt.clone())
                .with_navigator(navigator.clone()),
        );
        auth.login("jdoe", "pw").await.unwrap();

        let result = auth.http().send(ApiRequest::get("/leaves/")).await;
        assert!(matches!(result, Err(Error::SessionExpired)));
        while prompt.shown.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        prompt.release.notify_one();
        crate::http::relogin_tests::wait_released(auth.http().relogin()).await;

        assert_eq!(auth.state(), AuthState::Anonymous);
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(navigator.current_location(), "/login?redirect=%2Fleaves");
    }
}
