//! Configuration management for Hireboard tools.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default Firebase web API key (can be overridden at compile time via FIREBASE_API_KEY env var).
pub const DEFAULT_FIREBASE_API_KEY: &str = match option_env!("FIREBASE_API_KEY") {
    Some(key) => key,
    None => "demo-api-key",
};

/// Default Google OAuth client id (compile-time GOOGLE_CLIENT_ID). Empty disables Google sign-in.
pub const DEFAULT_GOOGLE_CLIENT_ID: &str = match option_env!("GOOGLE_CLIENT_ID") {
    Some(id) => id,
    None => "",
};

/// Default Google OAuth client secret (compile-time GOOGLE_CLIENT_SECRET).
pub const DEFAULT_GOOGLE_CLIENT_SECRET: &str = match option_env!("GOOGLE_CLIENT_SECRET") {
    Some(secret) => secret,
    None => "",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Where signed-out visitors of protected pages are sent.
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Default local port for the Google sign-in callback.
pub const DEFAULT_OAUTH_CALLBACK_PORT: u16 = 9876;

/// Default time allowed for a Google sign-in, in seconds.
pub const DEFAULT_OAUTH_TIMEOUT_SECS: u64 = 120;

/// Tool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Firebase web API key (public, safe to expose).
    #[serde(default = "default_firebase_api_key")]
    pub firebase_api_key: String,
    /// OAuth client id of the desktop Google client linked to the Firebase project.
    #[serde(default = "default_google_client_id")]
    pub google_client_id: String,
    /// Secret of that client. Installed-app secrets are not confidential.
    #[serde(default = "default_google_client_secret")]
    pub google_client_secret: String,
    /// Auth emulator origin, e.g. `http://localhost:9099`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_emulator: Option<String>,
    /// Login route used by the route guard.
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Local callback port for Google sign-in.
    #[serde(default = "default_oauth_callback_port")]
    pub oauth_callback_port: u16,
    /// Google sign-in timeout in seconds.
    #[serde(default = "default_oauth_timeout_secs")]
    pub oauth_timeout_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_firebase_api_key() -> String {
    DEFAULT_FIREBASE_API_KEY.to_string()
}

fn default_google_client_id() -> String {
    DEFAULT_GOOGLE_CLIENT_ID.to_string()
}

fn default_google_client_secret() -> String {
    DEFAULT_GOOGLE_CLIENT_SECRET.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_oauth_callback_port() -> u16 {
    DEFAULT_OAUTH_CALLBACK_PORT
}

fn default_oauth_timeout_secs() -> u64 {
    DEFAULT_OAUTH_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            firebase_api_key: default_firebase_api_key(),
            google_client_id: default_google_client_id(),
            google_client_secret: default_google_client_secret(),
            auth_emulator: None,
            login_path: default_login_path(),
            oauth_callback_port: DEFAULT_OAUTH_CALLBACK_PORT,
            oauth_timeout_secs: DEFAULT_OAUTH_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables take precedence over the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `HIREBOARD_*` overrides found through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(log_level) = lookup("HIREBOARD_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Some(api_key) = lookup("HIREBOARD_FIREBASE_API_KEY") {
            self.firebase_api_key = api_key;
        }
        if let Some(client_id) = lookup("HIREBOARD_GOOGLE_CLIENT_ID") {
            self.google_client_id = client_id;
        }
        if let Some(client_secret) = lookup("HIREBOARD_GOOGLE_CLIENT_SECRET") {
            self.google_client_secret = client_secret;
        }
        if let Some(emulator) = lookup("HIREBOARD_AUTH_EMULATOR") {
            self.auth_emulator = Some(emulator);
        }
    }

    /// Check values that would otherwise fail late.
    pub fn validate(&self) -> CoreResult<()> {
        if self.firebase_api_key.trim().is_empty() {
            return Err(CoreError::Config("firebase_api_key is empty".to_string()));
        }
        if !self.login_path.starts_with('/') {
            return Err(CoreError::Config(format!(
                "login_path must be absolute, got {:?}",
                self.login_path
            )));
        }
        self.emulator_url()?;
        Ok(())
    }

    /// The auth emulator origin, if one is configured.
    pub fn emulator_url(&self) -> CoreResult<Option<Url>> {
        let Some(origin) = self.auth_emulator.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(origin)?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(CoreError::Config(format!(
                "auth_emulator must be an http(s) origin, got {:?}",
                origin
            )));
        }
        Ok(Some(url))
    }
}
