use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_CLIENT_ID: &str = "e5cd7e4891bf95d1d19206ce24a7b32e";
const DEFAULT_API_PATH: &str = "/api";

/// Client configuration.
///
/// The backend host is the only required value; everything else has a
/// default matching the production deployment and can be overridden with the
/// `with_*` methods.
///
/// ```rust,ignore
/// use attendify_client::ClientConfig;
///
/// let config = ClientConfig::new("https://attendify.example.com".parse()?)
///     .with_api_path("/api")
///     .with_encryption(true);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) host: Url,
    pub(crate) api_path: String,
    pub(crate) client_id: String,
    pub(crate) auth_scheme: String,
    pub(crate) login_endpoint: String,
    pub(crate) info_endpoint: String,
    pub(crate) logout_endpoint: String,
    pub(crate) sse_close_endpoint: String,
    pub(crate) encrypt: bool,
    pub(crate) sse: bool,
    pub(crate) rsa_public_key: Option<String>,
    pub(crate) rsa_private_key: Option<String>,
    pub(crate) timeout: Duration,
    pub(crate) locale: String,
    pub(crate) default_avatar: String,
    pub(crate) login_route: String,
}

impl ClientConfig {
    /// Configuration for the backend at `host`, every other value defaulted.
    #[must_use]
    pub fn new(host: Url) -> Self {
        Self {
            host,
            api_path: DEFAULT_API_PATH.into(),
            client_id: DEFAULT_CLIENT_ID.into(),
            auth_scheme: "Token".into(),
            login_endpoint: "/login/".into(),
            info_endpoint: "/getInfo/".into(),
            logout_endpoint: "/auth/logout/".into(),
            sse_close_endpoint: "/resource/sse/close".into(),
            encrypt: false,
            sse: false,
            rsa_public_key: None,
            rsa_private_key: None,
            timeout: Duration::from_secs(50),
            locale: "en_US".into(),
            default_avatar: "/static/images/profile.jpg".into(),
            login_route: "/login".into(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `ATTENDIFY_BASE_URL`: backend host, e.g. `https://attendify.example.com`
    ///
    /// # Optional env vars
    /// - `ATTENDIFY_BASE_API`: API path prefix (default `/api`)
    /// - `ATTENDIFY_CLIENT_ID`: value of the `clientid` header
    /// - `ATTENDIFY_ENCRYPT`: `"true"`/`"1"` enables payload encryption
    /// - `ATTENDIFY_SSE`: `"true"`/`"1"` enables the server-push channel
    /// - `ATTENDIFY_RSA_PUBLIC_KEY`: PEM public key for request encryption
    /// - `ATTENDIFY_RSA_PRIVATE_KEY`: PEM private key for response decryption
    /// - `ATTENDIFY_TIMEOUT_SECS`: request timeout in seconds
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the host is missing or any value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let host_str = std::env::var("ATTENDIFY_BASE_URL")
            .map_err(|_| Error::Config("ATTENDIFY_BASE_URL is required".into()))?;
        let host: Url = host_str
            .parse()
            .map_err(|e| Error::Config(format!("ATTENDIFY_BASE_URL: {e}")))?;

        let mut config = Self::new(host);

        if let Ok(path) = std::env::var("ATTENDIFY_BASE_API") {
            config = config.with_api_path(path);
        }
        if let Ok(client_id) = std::env::var("ATTENDIFY_CLIENT_ID")
            && !client_id.trim().is_empty()
        {
            config = config.with_client_id(client_id.trim());
        }
        config = config
            .with_encryption(env_flag("ATTENDIFY_ENCRYPT"))
            .with_sse(env_flag("ATTENDIFY_SSE"));
        if let Ok(pem) = std::env::var("ATTENDIFY_RSA_PUBLIC_KEY") {
            config.rsa_public_key = Some(pem);
        }
        if let Ok(pem) = std::env::var("ATTENDIFY_RSA_PRIVATE_KEY") {
            config.rsa_private_key = Some(pem);
        }
        if let Ok(secs) = std::env::var("ATTENDIFY_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("ATTENDIFY_TIMEOUT_SECS: {e}")))?;
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the API path prefix. Blank means `/api`; a leading `/` is
    /// added when missing.
    #[must_use]
    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = normalize_api_path(&path.into());
        self
    }

    /// Override the `clientid` header value.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Override the authorization scheme (default `Token`).
    #[must_use]
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    /// Override the login endpoint (default `/login/`).
    #[must_use]
    pub fn with_login_endpoint(mut self, path: impl Into<String>) -> Self {
        self.login_endpoint = path.into();
        self
    }

    /// Override the identity endpoint (default `/getInfo/`).
    #[must_use]
    pub fn with_info_endpoint(mut self, path: impl Into<String>) -> Self {
        self.info_endpoint = path.into();
        self
    }

    /// Override the logout endpoint (default `/auth/logout/`).
    #[must_use]
    pub fn with_logout_endpoint(mut self, path: impl Into<String>) -> Self {
        self.logout_endpoint = path.into();
        self
    }

    /// Enable payload encryption globally. Requests opt in per call.
    #[must_use]
    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encrypt = enabled;
        self
    }

    /// Set both RSA keys as PEM strings.
    #[must_use]
    pub fn with_rsa_keys(
        mut self,
        public_pem: Option<String>,
        private_pem: Option<String>,
    ) -> Self {
        self.rsa_public_key = public_pem;
        self.rsa_private_key = private_pem;
        self
    }

    /// Close the push channel on logout.
    #[must_use]
    pub fn with_sse(mut self, enabled: bool) -> Self {
        self.sse = enabled;
        self
    }

    /// Override the transport timeout (default 50s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Initial `Content-Language` (default `en_US`).
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Avatar used when the backend supplies none.
    #[must_use]
    pub fn with_default_avatar(mut self, url: impl Into<String>) -> Self {
        self.default_avatar = url.into();
        self
    }

    /// Client-side route of the login screen, target of re-authentication
    /// redirects.
    #[must_use]
    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    /// Client-side route of the login screen.
    #[must_use]
    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    /// `host` joined with the API path, without a trailing slash.
    #[must_use]
    pub fn api_base(&self) -> String {
        format!("{}{}", self.host.as_str().trim_end_matches('/'), self.api_path)
    }

    /// Absolute URL for an API-relative `path`. Absolute `http(s)` URLs are
    /// used unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the result is not a valid URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let full = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.starts_with('/') {
            format!("{}{path}", self.api_base())
        } else {
            format!("{}/{path}", self.api_base())
        };
        full.parse()
            .map_err(|e| Error::Config(format!("invalid request URL {full:?}: {e}")))
    }

    /// Whether `path` targets the login endpoint, whose responses carry the
    /// token and skip normalization.
    #[must_use]
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        path.contains(self.login_endpoint.as_str())
    }

    /// Backend host.
    #[must_use]
    pub fn host(&self) -> &Url {
        &self.host
    }

    /// API path prefix, always with a leading `/`.
    #[must_use]
    pub fn api_path(&self) -> &str {
        &self.api_path
    }

    /// `clientid` header value.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Global encryption switch.
    #[must_use]
    pub fn encryption_enabled(&self) -> bool {
        self.encrypt
    }

    /// Whether logout closes the push channel.
    #[must_use]
    pub fn sse_enabled(&self) -> bool {
        self.sse
    }

    /// Transport timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn normalize_api_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        DEFAULT_API_PATH.into()
    } else if trimmed.starts_with('/') {
        trimmed.into()
    } else {
        format!("/{trimmed}")
    }
}

fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).as_deref().map(str::trim),
        Ok("1") | Ok("true")
    )
}
