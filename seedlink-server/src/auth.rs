use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Who may switch a connection into `FEED` mode.
///
/// With `required` unset anyone may feed. Otherwise the connection must
/// either pass `AUTH USERPASS` against `users` or come from one of the
/// `trusted_hosts`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedAccess {
    pub required: bool,
    pub users: HashMap<String, String>,
    pub trusted_hosts: Vec<IpAddr>,
}

impl FeedAccess {
    /// Access that requires authentication, with no users yet.
    pub fn restricted() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(user.into(), password.into());
        self
    }

    pub fn with_trusted_host(mut self, host: IpAddr) -> Self {
        self.trusted_hosts.push(host);
        self
    }

    /// Check `AUTH USERPASS` credentials.
    pub fn verify(&self, user: &str, password: &str) -> bool {
        self.users.get(user).is_some_and(|p| p == password)
    }

    pub fn feed_allowed(&self, authenticated: bool, peer: IpAddr) -> bool {
        !self.required || authenticated || self.trusted_hosts.contains(&peer)
    }
}
