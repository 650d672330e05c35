//! Session expiry policy
//!
//! Combines the global cookie age and "expire at browser close" settings with
//! a per-session [`SessionExpiry`] override into the two values the rest of
//! the subsystem needs: the absolute expiry written to the store and the
//! `Max-Age` written to the cookie (absent for browser-session cookies).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::errors::SessionError;
use crate::settings::SessionSettings;

/// Per-session expiry override, persisted alongside the session data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SessionExpiry {
    /// Follow the global settings
    #[default]
    Default,
    /// Cookie dies with the browser; the store entry is still capped at the default age
    BrowserClose,
    /// Expire this many seconds after the session was last saved
    Age(i64),
    /// Expire at a fixed point in time
    At(DateTime<Utc>),
}

impl SessionExpiry {
    /// Map the classic "seconds or nothing" form onto an override
    ///
    /// `None` reverts to the default, `Some(0)` means browser-session only.
    #[must_use]
    pub fn from_seconds(seconds: Option<i64>) -> Self {
        match seconds {
            None => Self::Default,
            Some(0) => Self::BrowserClose,
            Some(n) => Self::Age(n),
        }
    }
}

/// Partial seconds round away from zero, so only an exactly zero duration
/// means browser close
impl From<Duration> for SessionExpiry {
    fn from(duration: Duration) -> Self {
        let partial = i64::from(duration.subsec_nanos().signum());
        Self::from_seconds(Some(duration.num_seconds().saturating_add(partial)))
    }
}

impl From<DateTime<Utc>> for SessionExpiry {
    fn from(at: DateTime<Utc>) -> Self {
        Self::At(at)
    }
}

/// Where a session's expiry lands for the store and for the cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPlan {
    pub expire_date: DateTime<Utc>,
    /// `None` means omit `Max-Age` so the cookie is dropped at browser close
    pub cookie_max_age: Option<i64>,
}

/// Global expiry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    default_age_seconds: i64,
    expire_at_browser_close: bool,
}

impl ExpiryPolicy {
    #[must_use]
    pub fn new(default_age_seconds: u64, expire_at_browser_close: bool) -> Self {
        Self {
            default_age_seconds: i64::try_from(default_age_seconds).unwrap_or(i64::MAX),
            expire_at_browser_close,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(
            settings.default_age_seconds,
            settings.expire_at_browser_close,
        )
    }

    #[must_use]
    pub fn default_age_seconds(&self) -> i64 {
        self.default_age_seconds
    }

    /// Check an override before it is attached to a session
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidExpiry` for negative ages, ages that
    /// overflow the calendar, and absolute times that are not in the future.
    pub fn validate(
        &self,
        expiry: SessionExpiry,
        now: DateTime<Utc>,
    ) -> Result<SessionExpiry, SessionError> {
        match expiry {
            SessionExpiry::Age(0) => Ok(SessionExpiry::BrowserClose),
            SessionExpiry::Age(seconds) if seconds < 0 => Err(SessionError::InvalidExpiry(
                format!("expiry age must not be negative, got {seconds}s"),
            )),
            SessionExpiry::Age(seconds) => {
                if checked_add_seconds(now, seconds).is_none() {
                    return Err(SessionError::InvalidExpiry(format!(
                        "expiry age {seconds}s is out of range"
                    )));
                }
                Ok(expiry)
            }
            SessionExpiry::At(at) if at <= now => Err(SessionError::InvalidExpiry(format!(
                "expiry {} is not in the future",
                at.to_rfc3339()
            ))),
            SessionExpiry::Default | SessionExpiry::BrowserClose | SessionExpiry::At(_) => {
                Ok(expiry)
            }
        }
    }

    /// Compute store expiry and cookie max-age for a save at `modified_at`
    #[must_use]
    pub fn resolve(&self, expiry: SessionExpiry, modified_at: DateTime<Utc>) -> ExpiryPlan {
        let default_date = saturating_add_seconds(modified_at, self.default_age_seconds);
        match expiry {
            SessionExpiry::Default if self.expire_at_browser_close => ExpiryPlan {
                expire_date: default_date,
                cookie_max_age: None,
            },
            SessionExpiry::Default => ExpiryPlan {
                expire_date: default_date,
                cookie_max_age: Some(self.default_age_seconds),
            },
            SessionExpiry::BrowserClose => ExpiryPlan {
                expire_date: default_date,
                cookie_max_age: None,
            },
            SessionExpiry::Age(seconds) => ExpiryPlan {
                expire_date: saturating_add_seconds(modified_at, seconds),
                cookie_max_age: Some(seconds.max(0)),
            },
            SessionExpiry::At(at) => ExpiryPlan {
                expire_date: at,
                cookie_max_age: Some((at - modified_at).num_seconds().max(0)),
            },
        }
    }

    /// Whether the cookie for this override is a browser-session cookie
    #[must_use]
    pub fn expire_at_browser_close(&self, expiry: SessionExpiry) -> bool {
        match expiry {
            SessionExpiry::Default => self.expire_at_browser_close,
            SessionExpiry::BrowserClose => true,
            SessionExpiry::Age(_) | SessionExpiry::At(_) => false,
        }
    }
}

fn checked_add_seconds(at: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds).and_then(|d| at.checked_add_signed(d))
}

fn saturating_add_seconds(at: DateTime<Utc>, seconds: i64) -> DateTime<Utc> {
    checked_add_seconds(at, seconds).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
