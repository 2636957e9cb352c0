//! Container registry records

use chrono::{DateTime, Utc};

/// A push destination.
///
/// Credentials are stored as given. `last_login` tracks when `podman login`
/// was last refreshed for this registry; logins older than an hour are
/// considered stale.
#[derive(Debug, Clone)]
pub struct Registry {
    pub name: String,
    pub url: String,
    pub user: String,
    pub password: String,
    pub last_login: DateTime<Utc>,
}

impl Registry {
    pub fn new(name: String, url: String, user: String, password: String) -> Self {
        Self {
            name,
            url,
            user,
            password,
            last_login: DateTime::UNIX_EPOCH,
        }
    }

    /// Whether the cached login is older than one hour at `now`.
    pub fn login_stale(&self, now: DateTime<Utc>) -> bool {
        now - self.last_login > chrono::Duration::hours(1)
    }
}
