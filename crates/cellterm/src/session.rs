// SPDX-License-Identifier: MIT
//
// Who is on the other end of a backend, and how long since they did
// anything.

use std::time::{Duration, Instant};

/// Descriptive information about one backend's session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    username: String,
    language: String,
    width: u16,
    height: u16,
    last_activity: Instant,
}

impl SessionInfo {
    #[must_use]
    pub fn new(username: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            language: language.into(),
            width: 0,
            height: 0,
            last_activity: Instant::now(),
        }
    }

    /// Session for the local user: `USER` (or `LOGNAME`) and `LANG`.
    #[must_use]
    pub fn from_env() -> Self {
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_default();
        let language = std::env::var("LANG").unwrap_or_else(|_| "C".to_owned());
        Self::new(username, language)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Size in cells, as last recorded by the backend.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    pub const fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    /// Mark the user as active now.
    pub fn reset_idle(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_time(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self::new("", "C")
    }
}
