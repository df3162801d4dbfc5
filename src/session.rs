//! In-memory session state.
//!
//! One [`Session`] per client, shared through `Arc` by the HTTP pipeline, the
//! auth controller and the route guard.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::types::UserId;

/// Role assigned when the backend does not name one.
pub const DEFAULT_ROLE: &str = "ROLE_DEFAULT";

/// Authentication lifecycle state, derived from the session contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// No token.
    Anonymous,
    /// A login is in flight.
    Authenticating,
    /// Token and identity resolved.
    Authenticated,
    /// Token present, identity not yet resolved (e.g. after cold start).
    IdentityPending,
}

/// Identity fields, applied to the session as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub display_name: String,
    pub nice_name: String,
    pub avatar_url: String,
    pub user_id: Option<UserId>,
    pub tenant_id: String,
    pub roles: Vec<String>,
    pub permissions: BTreeSet<String>,
}

impl Identity {
    /// Identity from the `user` object of a login response.
    #[must_use]
    pub fn from_login_user(user: &Value, default_avatar: &str) -> Self {
        let username = first_str(user, &["username", "userName"]).unwrap_or_default();
        let nice_name = match (
            first_str(user, &["first_name"]),
            first_str(user, &["last_name"]),
        ) {
            (Some(first), Some(last)) => format!("{first} {last}").trim().to_owned(),
            _ => username.clone(),
        };
        let roles = match first_str(user, &["role_type"]) {
            Some(role) => vec![role],
            None => vec![DEFAULT_ROLE.to_owned()],
        };

        Self {
            nice_name,
            avatar_url: first_str(user, &["image_url", "avatar"])
                .unwrap_or_else(|| default_avatar.to_owned()),
            user_id: first_user_id(user, &["id", "userId"]),
            tenant_id: first_str(user, &["tenantId"]).unwrap_or_default(),
            roles,
            permissions: string_set(user.get("permissions")),
            display_name: username,
        }
    }

    /// Identity from an identity-endpoint response
    /// (`{user: {...}, roles: [...], permissions: [...]}`).
    #[must_use]
    pub fn from_info(info: &Value, default_avatar: &str) -> Self {
        let user = info.get("user").unwrap_or(info);
        let display_name = first_str(user, &["userName", "username"]).unwrap_or_default();

        let listed_roles = string_list(info.get("roles"));
        let (roles, permissions) = if listed_roles.is_empty() {
            (vec![DEFAULT_ROLE.to_owned()], BTreeSet::new())
        } else {
            (listed_roles, string_set(info.get("permissions")))
        };

        Self {
            nice_name: first_str(user, &["nickName", "nick_name"])
                .unwrap_or_else(|| display_name.clone()),
            avatar_url: first_str(user, &["avatar", "image_url"])
                .unwrap_or_else(|| default_avatar.to_owned()),
            user_id: first_user_id(user, &["userId", "id"]),
            tenant_id: first_str(user, &["tenantId"]).unwrap_or_default(),
            roles,
            permissions,
            display_name,
        }
    }

    /// Minimal identity used when the identity endpoint is unreachable but
    /// the token is trusted.
    #[must_use]
    pub fn placeholder(display_name: Option<&str>, default_avatar: &str) -> Self {
        let name = display_name
            .filter(|n| !n.is_empty())
            .unwrap_or("User")
            .to_owned();
        Self {
            nice_name: name.clone(),
            display_name: name,
            avatar_url: default_avatar.to_owned(),
            roles: vec![DEFAULT_ROLE.to_owned()],
            ..Self::default()
        }
    }
}

/// Snapshot of the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionData {
    pub token: String,
    #[serde(flatten)]
    pub identity: Identity,
}

#[derive(Debug, Default)]
struct Inner {
    data: SessionData,
    authenticating: bool,
    /// Bumped by every `clear`. Work started under an older generation must
    /// not write into the session.
    generation: u64,
}

/// The process-wide session, explicit and injectable.
#[derive(Debug, Default)]
pub struct Session {
    inner: RwLock<Inner>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> AuthState {
        let inner = self.inner.read();
        if inner.authenticating {
            AuthState::Authenticating
        } else if inner.data.token.is_empty() {
            AuthState::Anonymous
        } else if inner.data.identity.roles.is_empty() {
            AuthState::IdentityPending
        } else {
            AuthState::Authenticated
        }
    }

    #[must_use]
    pub fn token(&self) -> String {
        self.inner.read().data.token.clone()
    }

    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.inner.read().data.token.is_empty()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.read().data.identity.user_id
    }

    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.inner.read().data.identity.roles.clone()
    }

    /// Roles and display name both set.
    #[must_use]
    pub fn identity_resolved(&self) -> bool {
        let inner = self.inner.read();
        !inner.data.identity.roles.is_empty() && !inner.data.identity.display_name.is_empty()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionData {
        self.inner.read().data.clone()
    }

    pub(crate) fn set_authenticating(&self, authenticating: bool) {
        self.inner.write().authenticating = authenticating;
    }

    pub(crate) fn set_token(&self, token: &str) {
        self.inner.write().data.token = token.to_owned();
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub(crate) fn apply_identity(&self, identity: Identity) {
        self.inner.write().data.identity = named(identity);
    }

    /// Applies `identity`, and `token` when given, only if the session has
    /// not been cleared since `generation` was read. Returns whether it did.
    pub(crate) fn commit(&self, generation: u64, token: Option<&str>, identity: Identity) -> bool {
        let mut inner = self.inner.write();
        if inner.generation != generation {
            return false;
        }
        if let Some(token) = token {
            inner.data.token = token.to_owned();
        }
        inner.data.identity = named(identity);
        true
    }

    /// Resets every field and starts a new generation.
    pub(crate) fn clear(&self) {
        let mut inner = self.inner.write();
        inner.data = SessionData::default();
        inner.authenticating = false;
        inner.generation = inner.generation.wrapping_add(1);
    }
}

/// Resets the authenticating flag on drop, whatever path the login takes.
pub(crate) struct AuthenticatingGuard<'a> {
    session: &'a Session,
}

impl<'a> AuthenticatingGuard<'a> {
    pub(crate) fn new(session: &'a Session) -> Self {
        session.set_authenticating(true);
        Self { session }
    }
}

impl Drop for AuthenticatingGuard<'_> {
    fn drop(&mut self) {
        self.session.set_authenticating(false);
    }
}

/// Roles are only kept alongside a display name, so an identity without a
/// name gets one derived from its nice name, or `User`.
fn named(mut identity: Identity) -> Identity {
    if identity.display_name.is_empty() && !identity.roles.is_empty() {
        identity.display_name = if identity.nice_name.is_empty() {
            "User".to_owned()
        } else {
            identity.nice_name.clone()
        };
    }
    identity
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_user_id(value: &Value, keys: &[&str]) -> Option<UserId> {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .find_map(|v| UserId::try_from(v).ok())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

fn string_set(value: Option<&Value>) -> BTreeSet<String> {
    string_list(value).into_iter().collect()
}
