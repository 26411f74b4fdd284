//! Deadline and cancellation shared by every step of a dispatch.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cloneable flag that cancels a dispatch from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`CancelToken::cancel`] has been called.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

/// Upper bound on the wall-clock time of a whole dispatch.
///
/// A deadline expires when its instant passes or its [`CancelToken`] is
/// cancelled, whichever happens first. [`Deadline::none`] never expires on
/// its own.
#[derive(Debug, Clone, Default)]
pub struct Deadline {
    at: Option<Instant>,
    token: CancelToken,
}

impl Deadline {
    /// A deadline that only expires through cancellation.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// A deadline `timeout` from now.
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// A deadline at a fixed instant.
    #[must_use]
    pub fn at(at: Instant) -> Self {
        Self {
            at: Some(at),
            token: CancelToken::new(),
        }
    }

    /// Attaches an external cancellation token.
    #[must_use]
    pub fn with_token(mut self, token: CancelToken) -> Self {
        self.token = token;
        self
    }

    /// Returns the cancellation token.
    #[must_use]
    pub const fn token(&self) -> &CancelToken {
        &self.token
    }

    /// Returns true once the instant has passed or the token was cancelled.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.token.is_canceled() || self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns the time left, or `None` when there is no fixed instant.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns the whole seconds left, for logging; `0` without an instant.
    #[must_use]
    pub fn remaining_secs(&self) -> u64 {
        self.remaining().map_or(0, |left| left.as_secs())
    }
}
