use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Two identical submissions closer than this are treated as duplicates.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Fingerprint {
    url: String,
    body: String,
    at: Instant,
}

/// Single-slot duplicate-submission guard.
///
/// Only the most recent mutating request is remembered, so an A-B-A sequence
/// lets the second A through.
#[derive(Debug, Default)]
pub struct SubmissionGuard {
    last: Mutex<Option<Fingerprint>>,
}

impl SubmissionGuard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the submission and returns `true`, or returns `false` if it
    /// duplicates the previous one inside [`DEBOUNCE_WINDOW`]. A rejected
    /// submission does not refresh the stored timestamp.
    pub fn admit(&self, url: &str, body: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        if let Some(prev) = last.as_ref()
            && prev.url == url
            && prev.body == body
            && now.duration_since(prev.at) < DEBOUNCE_WINDOW
        {
            return false;
        }
        *last = Some(Fingerprint {
            url: url.to_owned(),
            body: body.to_owned(),
            at: now,
        });
        true
    }

    pub fn reset(&self) {
        *self.last.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn identical_submissions_inside_window_are_rejected() {
        let guard = SubmissionGuard::new();
        assert!(guard.admit("/leaves/", r#"{"a":1}"#));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(!guard.admit("/leaves/", r#"{"a":1}"#));
    }

    #[tokio::test(start_paused = true)]
    async fn submissions_outside_window_pass() {
        let guard = SubmissionGuard::new();
        assert!(guard.admit("/leaves/", "x"));
        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(guard.admit("/leaves/", "x"));
    }

    #[tokio::test(start_paused = true)]
    async fn different_url_or_body_pass() {
        let guard = SubmissionGuard::new();
        assert!(guard.admit("/leaves/", "x"));
        assert!(guard.admit("/leaves/", "y"));
        assert!(guard.admit("/appeals/", "y"));
    }

    #[tokio::test(start_paused = true)]
    async fn single_slot_does_not_catch_a_b_a() {
        let guard = SubmissionGuard::new();
        assert!(guard.admit("/a/", "1"));
        assert!(guard.admit("/b/", "2"));
        assert!(guard.admit("/a/", "1"));
    }
}
