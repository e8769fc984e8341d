//! Polarion login session state.
//!
//! The session moves Unauthenticated -> Authenticated -> Expired and back
//! to Authenticated on re-login. The client keeps it behind a mutex and
//! holds the lock for the whole call, so a token is never read while
//! another call rotates it.

use std::fmt;
use std::time::{Duration, Instant};

/// An issued session token.
#[derive(Clone)]
pub struct Session {
    token: String,
    expires_at: Instant,
}

impl Session {
    /// Token value.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Whether the session is past its lifetime at `now`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// No login has happened, or the session was logged out.
    #[default]
    Unauthenticated,
    /// A live session.
    Authenticated(Session),
    /// The session outlived its TTL or was rejected by the server.
    Expired,
}

impl SessionState {
    /// Token usable at `now`.
    ///
    /// An Authenticated session past its lifetime transitions to Expired.
    pub fn token_at(&mut self, now: Instant) -> Option<&str> {
        if matches!(self, Self::Authenticated(s) if s.is_expired_at(now)) {
            *self = Self::Expired;
        }
        match self {
            Self::Authenticated(session) => Some(session.token()),
            _ => None,
        }
    }

    /// Record a successful login.
    pub fn authenticate(&mut self, token: String, ttl: Duration, now: Instant) {
        *self = Self::Authenticated(Session {
            token,
            expires_at: now + ttl,
        });
    }

    /// Mark the session as rejected by the server.
    pub fn expire(&mut self) {
        if matches!(self, Self::Authenticated(_)) {
            *self = Self::Expired;
        }
    }

    /// Drop the session entirely, returning the token if one was live.
    pub fn clear(&mut self) -> Option<String> {
        match std::mem::take(self) {
            Self::Authenticated(session) => Some(session.token),
            _ => None,
        }
    }

    /// Short state name for health reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated(_) => "authenticated",
            Self::Expired => "expired",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle() {
        let now = Instant::now();
        let mut state = SessionState::default();
        assert_eq!(state.label(), "unauthenticated");
        assert!(state.token_at(now).is_none());

        state.authenticate("abc".into(), Duration::from_secs(60), now);
        assert_eq!(state.token_at(now), Some("abc"));
        assert_eq!(state.label(), "authenticated");

        assert!(state.token_at(now + Duration::from_secs(61)).is_none());
        assert_eq!(state.label(), "expired");

        state.authenticate("def".into(), Duration::from_secs(60), now);
        state.expire();
        assert_eq!(state.label(), "expired");
        assert!(state.clear().is_none());
        assert_eq!(state.label(), "unauthenticated");
    }

    #[test]
    fn test_clear_returns_live_token() {
        let now = Instant::now();
        let mut state = SessionState::default();
        state.authenticate("abc".into(), Duration::from_secs(60), now);
        assert_eq!(state.clear().as_deref(), Some("abc"));
    }

    #[test]
    fn test_debug_hides_token() {
        let mut state = SessionState::default();
        state.authenticate("secret-token".into(), Duration::from_secs(1), Instant::now());
        assert!(!format!("{state:?}").contains("secret-token"));
    }
}
