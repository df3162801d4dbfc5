//! Re-authentication prompt coordination.
//!
//! A 401 from any request opens at most one prompt. The gate is a
//! single-permit semaphore: the first 401 takes the permit and keeps it until
//! the prompt task finishes; later 401s see the gate closed and stay quiet.

use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// User-facing confirmation shown when the session has expired.
pub trait ReloginPrompt: Send + Sync {
    /// Resolves `true` if the user chose to log in again.
    fn confirm(&self) -> BoxFuture<'_, bool>;
}

/// Navigation hooks the re-authentication flow needs.
pub trait Navigator: Send + Sync {
    /// Full path of the current location, e.g. `/leaves?page=2`.
    fn current_location(&self) -> String;

    /// Replace the current location.
    fn replace(&self, location: &str);
}

/// Tears down the session (the Auth Controller's logout).
pub trait SessionTerminator: Send + Sync {
    fn terminate(&self) -> BoxFuture<'_, ()>;
}

/// User-visible transient notifications.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

/// Declines every prompt. Used when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclinePrompt;

impl ReloginPrompt for DeclinePrompt {
    fn confirm(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { false })
    }
}

/// Tracks the location in memory; `replace` just records it.
#[derive(Debug)]
pub struct MemoryNavigator {
    location: RwLock<String>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: RwLock::new(location.into()),
        }
    }
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Navigator for MemoryNavigator {
    fn current_location(&self) -> String {
        self.location.read().clone()
    }

    fn replace(&self, location: &str) {
        *self.location.write() = location.to_owned();
    }
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        tracing::warn!(notice = message, "Request failed");
    }
}

/// Single-slot lock around the re-authentication prompt.
pub struct ReloginGate {
    permit: Arc<Semaphore>,
    prompt: Arc<dyn ReloginPrompt>,
    navigator: Arc<dyn Navigator>,
    terminator: RwLock<Option<Weak<dyn SessionTerminator>>>,
    login_path: String,
}

impl ReloginGate {
    #[must_use]
    pub fn new(
        prompt: Arc<dyn ReloginPrompt>,
        navigator: Arc<dyn Navigator>,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            permit: Arc::new(Semaphore::new(1)),
            prompt,
            navigator,
            terminator: RwLock::new(None),
            login_path: login_path.into(),
        }
    }

    /// Attach the component that performs logout on confirmation.
    ///
    /// Held weakly: the controller owns the HTTP client that owns this gate.
    pub fn bind(&self, terminator: Weak<dyn SessionTerminator>) {
        *self.terminator.write() = Some(terminator);
    }

    /// `true` while a prompt (or identity resolution) holds the gate.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.permit.available_permits() == 0
    }

    /// Take the gate without prompting. `None` if it is already held.
    #[must_use]
    pub fn try_hold(&self) -> Option<OwnedSemaphorePermit> {
        self.permit.clone().try_acquire_owned().ok()
    }

    #[must_use]
    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Open the prompt unless one is already showing.
    ///
    /// Returns immediately; the prompt runs on a spawned task that releases
    /// the gate when it finishes. Returns `false` when suppressed.
    pub fn trigger(&self) -> bool {
        let Some(permit) = self.try_hold() else {
            tracing::debug!("Re-authentication prompt already pending, suppressing");
            return false;
        };

        let prompt = self.prompt.clone();
        let navigator = self.navigator.clone();
        let terminator = self.terminator.read().clone();
        let login_path = self.login_path.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if !prompt.confirm().await {
                tracing::info!("Re-authentication declined");
                return;
            }
            if let Some(terminator) = terminator.and_then(|t| t.upgrade()) {
                terminator.terminate().await;
            }
            let location = navigator.current_location();
            let redirect = if location.is_empty() { "/" } else { &location };
            navigator.replace(&login_redirect(&login_path, redirect));
        });
        true
    }
}

/// `<login_path>?redirect=<percent-encoded target>`.
#[must_use]
pub fn login_redirect(login_path: &str, target: &str) -> String {
    format!("{login_path}?redirect={}", urlencoding::encode(target))
}
