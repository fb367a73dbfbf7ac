use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use whisper_client::{AuthScheme, ClientConfig, ExposeSecret, SecretString};

/// CLI configuration loaded from environment variables
#[derive(Debug)]
pub struct Config {
    pub api_key: SecretString,
    pub base_url: Option<String>,
    pub auth_scheme: AuthScheme,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// `api_key` from the command line wins over `LLMWHISPERER_API_KEY`.
    pub fn from_env(api_key: Option<String>) -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let api_key = match api_key {
            Some(key) => key,
            None => env::var("LLMWHISPERER_API_KEY")
                .context("LLMWHISPERER_API_KEY must be set (or pass --api-key)")?,
        };

        let auth_scheme = match env::var("LLMWHISPERER_AUTH_SCHEME") {
            Ok(raw) => raw
                .parse()
                .context("LLMWHISPERER_AUTH_SCHEME must be 'bearer' or 'header'")?,
            Err(_) => AuthScheme::default(),
        };

        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: env::var("LLMWHISPERER_BASE_URL").ok().filter(|u| !u.is_empty()),
            auth_scheme,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.api_key.expose_secret()).with_auth_scheme(self.auth_scheme);
        match &self.base_url {
            Some(url) => config.with_base_url(url.clone()),
            None => config,
        }
    }
}
