//! Time source and freshness evaluation.
//!
//! Expiry is never enforced in the background. Readers call
//! [`Freshness::evaluate`] at the moment they touch an envelope and clear it
//! themselves when it comes back expired.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

/// Default envelope lifetime: 15 minutes from the last write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(15 * 60);

/// Source of "now" for TTL decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render a timestamp the way it is persisted.
pub fn to_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a persisted timestamp. Offsets are normalized to UTC.
pub fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Result of comparing a save time against the TTL window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within the window; `remaining` until expiry.
    Fresh { age: Duration, remaining: Duration },
    /// Older than the TTL.
    Expired { age: Duration },
}

impl Freshness {
    /// Compare `saved_at` against `now`.
    ///
    /// An envelope is expired only when strictly older than the TTL. A save
    /// time in the future (clock skew) counts as age zero.
    pub fn evaluate(saved_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let age = (now - saved_at).to_std().unwrap_or(Duration::ZERO);
        if age > ttl {
            Self::Expired { age }
        } else {
            Self::Fresh {
                age,
                remaining: ttl - age,
            }
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh { .. })
    }

    pub fn age(&self) -> Duration {
        match *self {
            Self::Fresh { age, .. } | Self::Expired { age } => age,
        }
    }
}
