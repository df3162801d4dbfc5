//! Navigation gate in front of every route change.

use std::sync::Arc;

use regex::Regex;

use crate::auth::AuthController;
use crate::error::Error;
use crate::http::{Transport, login_redirect};
use crate::storage::KeyValueStore;

/// Paths reachable without a session.
pub const DEFAULT_ALLOW_LIST: [&str; 5] = [
    "/login",
    "/register",
    "/social-callback",
    "/register*",
    "/register/*",
];

/// A navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Path only, e.g. `/leaves`.
    pub path: String,
    /// Path with query and fragment, e.g. `/leaves?page=2`.
    pub full_path: String,
}

impl Navigation {
    /// Split `full_path` into its path part.
    #[must_use]
    pub fn new(full_path: impl Into<String>) -> Self {
        let full_path = full_path.into();
        let end = full_path.find(['?', '#']).unwrap_or(full_path.len());
        Self {
            path: full_path[..end].to_owned(),
            full_path,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

/// Visible progress bar around navigations.
pub trait ProgressIndicator: Send + Sync {
    fn start(&self);
    fn done(&self);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressIndicator for NoProgress {
    fn start(&self) {}
    fn done(&self) {}
}

struct Progress<'a>(&'a dyn ProgressIndicator);

impl<'a> Progress<'a> {
    fn begin(indicator: &'a dyn ProgressIndicator) -> Self {
        indicator.start();
        Self(indicator)
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        self.0.done();
    }
}

pub struct RouteGuard<T, S> {
    auth: Arc<AuthController<T, S>>,
    allow_list: Vec<Regex>,
    progress: Arc<dyn ProgressIndicator>,
}

impl<T: Transport, S: KeyValueStore> RouteGuard<T, S> {
    #[must_use]
    pub fn new(auth: Arc<AuthController<T, S>>) -> Self {
        Self {
            auth,
            allow_list: compile_allow_list(DEFAULT_ALLOW_LIST),
            progress: Arc::new(NoProgress),
        }
    }

    /// Replace the allow-list. `*` matches within one path segment, `**`
    /// matches anything.
    #[must_use]
    pub fn with_allow_list<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.allow_list = compile_allow_list(patterns);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressIndicator>) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn is_allow_listed(&self, path: &str) -> bool {
        self.allow_list.iter().any(|re| re.is_match(path))
    }

    /// Decide whether `to` may proceed.
    pub async fn before_each(&self, to: &Navigation) -> GuardDecision {
        let _progress = Progress::begin(&*self.progress);
        let session = self.auth.session();
        let login_route = self.auth.http().config().login_route();

        if !session.has_token() {
            if self.is_allow_listed(&to.path) {
                return GuardDecision::Allow;
            }
            let target = if to.full_path.is_empty() {
                "/"
            } else {
                to.full_path.as_str()
            };
            return GuardDecision::Redirect(login_redirect(login_route, target));
        }

        if to.path == login_route {
            return GuardDecision::Redirect("/".into());
        }
        if self.is_allow_listed(&to.path) || !session.roles().is_empty() {
            return GuardDecision::Allow;
        }

        match self.resolve_identity().await {
            Ok(()) => GuardDecision::Allow,
            Err(e) => {
                tracing::warn!(error = %e, path = %to.path, "Identity resolution failed, logging out");
                self.auth.logout().await;
                self.auth.http().notifier().error(&e.to_string());
                GuardDecision::Redirect("/".into())
            }
        }
    }

    /// Holds the re-authentication gate so a 401 from the identity endpoint
    /// does not open a prompt mid-navigation.
    async fn resolve_identity(&self) -> Result<(), Error> {
        let _hold = self.auth.http().relogin().try_hold();
        self.auth.get_info().await.map(|_| ())
    }
}

fn compile_allow_list<I, P>(patterns: I) -> Vec<Regex>
where
    I: IntoIterator<Item = P>,
    P: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|pattern| match glob_to_regex(pattern.as_ref()) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(pattern = pattern.as_ref(), error = %e, "Skipping invalid allow-list pattern");
                None
            }
        })
        .collect()
}

/// `**` matches anything, `*` anything but `/`; anchored at both ends.
fn glob_to_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(pattern)
        .replace("\\*\\*", ".*")
        .replace("\\*", "[^/]*");
    Regex::new(&format!("^{escaped}$"))
}
