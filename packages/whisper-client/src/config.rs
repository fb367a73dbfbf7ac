//! Client configuration.
//!
//! Everything the client needs is passed in explicitly; nothing here reads
//! the process environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{Result, WhisperError};

pub const DEFAULT_BASE_URL: &str = "https://llmwhisperer-api.us-central.unstract.com/api/v2";

/// Server-side wait used by synchronous submissions.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(200);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(200);

/// Deadline for a single non-waiting HTTP call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How the credential is attached to requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    Bearer,
    /// `unstract-key: <key>`
    Header,
}

impl FromStr for AuthScheme {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "header" | "unstract-key" => Ok(AuthScheme::Header),
            other => Err(WhisperError::Config(format!(
                "unknown auth scheme '{}' (expected 'bearer' or 'header')",
                other
            ))),
        }
    }
}

/// Submission discipline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionMode {
    /// The service holds the request open until the job finishes or
    /// `wait_timeout` passes.
    Sync { wait_timeout: Duration },
    /// The service acknowledges at once with a job handle to poll.
    Async,
}

impl Default for SubmissionMode {
    fn default() -> Self {
        SubmissionMode::Sync {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

/// Timing for the local polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    /// Give up waiting after this long. The remote job is not cancelled.
    pub timeout: Duration,
    /// Pause between status checks.
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_POLL_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollOptions {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub fn from_secs(timeout_secs: u64, interval_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(timeout_secs),
            Duration::from_secs(interval_secs),
        )
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(WhisperError::InvalidRequest(
                "poll interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration for [`crate::WhisperClient`].
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub auth_scheme: AuthScheme,
    pub submission: SubmissionMode,
    pub poll: PollOptions,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: SecretString::from(api_key.into()),
            auth_scheme: AuthScheme::default(),
            submission: SubmissionMode::default(),
            poll: PollOptions::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Set a custom base URL (self-hosted deployments, proxies).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_auth_scheme(mut self, scheme: AuthScheme) -> Self {
        self.auth_scheme = scheme;
        self
    }

    pub fn with_submission(mut self, submission: SubmissionMode) -> Self {
        self.submission = submission;
        self
    }

    pub fn with_poll(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reject configurations that could never make a successful call.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.expose_secret().trim().is_empty() {
            return Err(WhisperError::Config("API key is empty".into()));
        }
        let base = self.base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(WhisperError::Config(format!(
                "base URL must be http(s): '{}'",
                self.base_url
            )));
        }
        self.poll.validate()
    }
}

impl Clone for ClientConfig {
    fn clone(&self) -> Self {
        Self {
            base_url: self.base_url.clone(),
            api_key: SecretString::from(self.api_key.expose_secret().to_owned()),
            auth_scheme: self.auth_scheme,
            submission: self.submission,
            poll: self.poll,
            request_timeout: self.request_timeout,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("auth_scheme", &self.auth_scheme)
            .field("submission", &self.submission)
            .field("poll", &self.poll)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("key");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(
            config.submission,
            SubmissionMode::Sync {
                wait_timeout: Duration::from_secs(200)
            }
        );
        assert_eq!(config.poll.interval, Duration::from_secs(3));
        assert_eq!(config.poll.timeout, Duration::from_secs(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_key_rejected() {
        for key in ["", "   ", "\t\n"] {
            assert!(matches!(
                ClientConfig::new(key).validate(),
                Err(WhisperError::Config(_))
            ));
        }
    }

    #[test]
    fn test_clone_keeps_key() {
        let config = ClientConfig::new("uk-secret").with_auth_scheme(AuthScheme::Header);
        let copy = config.clone();
        assert_eq!(copy.api_key.expose_secret(), "uk-secret");
        assert_eq!(copy.auth_scheme, AuthScheme::Header);
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let config = ClientConfig::new("key").with_base_url("ftp://example.com");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let debug = format!("{:?}", ClientConfig::new("uk-secret"));
        assert!(!debug.contains("uk-secret"));
    }

    #[test]
    fn test_auth_scheme_parse() {
        assert_eq!("Bearer".parse::<AuthScheme>().unwrap(), AuthScheme::Bearer);
        assert_eq!("header".parse::<AuthScheme>().unwrap(), AuthScheme::Header);
        assert!("basic".parse::<AuthScheme>().is_err());
    }
}
