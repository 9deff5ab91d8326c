//! Configuration of the sending VASP server.
//!
//! Loaded from a JSON file (`--config`, `$CONFIG`, or `./config.json`). Keys
//! may be given literally or as `$VAR` references, see [`LiteralOrEnv`].

use clap::Parser;
use secp256k1::{PublicKey, SecretKey};
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use uma_types::config::LiteralOrEnv;

use crate::users::{BasicCredentials, LocalUser};

/// CLI arguments for the sending VASP server.
#[derive(Parser, Debug)]
#[command(name = "uma-sender")]
#[command(about = "UMA sending VASP HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    #[serde(default)]
    sending_vasp_domain: Option<String>,
    signing_private_key: LiteralOrEnv<SecretKey>,
    encryption_public_key: LiteralOrEnv<PublicKey>,
    #[serde(default = "config_defaults::default_is_subject_to_travel_rule")]
    is_subject_to_travel_rule: bool,
    user: UserConfig,
    #[serde(default = "config_defaults::default_http_timeout_secs")]
    http_timeout_secs: u64,
    #[serde(default)]
    pending_request_ttl_secs: Option<u64>,
    #[serde(default = "config_defaults::default_nonce_window_secs")]
    nonce_window_secs: u64,
}

/// The local user payments are sent for.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserConfig {
    pub uma_user_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// With `password`, enables HTTP Basic auth on client routes.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<LiteralOrEnv<String>>,
}

impl UserConfig {
    pub fn local_user(&self) -> LocalUser {
        LocalUser {
            uma_user_name: self.uma_user_name.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn credentials(&self) -> Option<BasicCredentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some(BasicCredentials {
                username: username.clone(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

pub mod config_defaults {
    use std::env;
    use std::net::{IpAddr, Ipv4Addr};

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
    pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;
    pub const DEFAULT_NONCE_WINDOW_SECS: u64 = 6 * 60 * 60;

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_HOST)
    }

    pub fn default_is_subject_to_travel_rule() -> bool {
        true
    }

    pub fn default_http_timeout_secs() -> u64 {
        DEFAULT_HTTP_TIMEOUT_SECS
    }

    pub fn default_nonce_window_secs() -> u64 {
        DEFAULT_NONCE_WINDOW_SECS
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    /// Domain announced to counterparties; `None` means "use the request `Host`".
    pub fn sending_vasp_domain(&self) -> Option<&str> {
        self.sending_vasp_domain.as_deref()
    }

    pub fn signing_private_key(&self) -> SecretKey {
        *self.signing_private_key
    }

    pub fn encryption_public_key(&self) -> PublicKey {
        *self.encryption_public_key
    }

    pub fn is_subject_to_travel_rule(&self) -> bool {
        self.is_subject_to_travel_rule
    }

    pub fn user(&self) -> &UserConfig {
        &self.user
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn pending_request_ttl(&self) -> Option<Duration> {
        self.pending_request_ttl_secs.map(Duration::from_secs)
    }

    pub fn nonce_window(&self) -> Duration {
        Duration::from_secs(self.nonce_window_secs)
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// Values not present in the config file are resolved via environment
    /// variables or defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNING_KEY: &str = "1111111111111111111111111111111111111111111111111111111111111111";
    const ENCRYPTION_KEY: &str =
        "034f355bdcb7cc0af728ef3cceb9615d90684bb5b2ca5f859ab0f0b704075871aa";

    #[test]
    fn minimal_config_gets_defaults() {
        let json = format!(
            r#"{{
                "signingPrivateKey": "{SIGNING_KEY}",
                "encryptionPublicKey": "{ENCRYPTION_KEY}",
                "user": {{"umaUserName": "alice"}}
            }}"#
        );
        let config = Config::from_json(&json).unwrap();
        assert!(config.is_subject_to_travel_rule());
        assert_eq!(config.http_timeout(), Duration::from_secs(20));
        assert_eq!(config.nonce_window(), Duration::from_secs(21_600));
        assert_eq!(config.pending_request_ttl(), None);
        assert_eq!(config.sending_vasp_domain(), None);
        assert!(config.user().credentials().is_none());
        assert_eq!(config.user().local_user().uma_user_name, "alice");
    }

    #[test]
    fn keys_resolve_from_env() {
        unsafe { std::env::set_var("UMA_SENDER_TEST_SIGNING_KEY", SIGNING_KEY) };
        let json = format!(
            r#"{{
                "sendingVaspDomain": "vasp1.example",
                "signingPrivateKey": "$UMA_SENDER_TEST_SIGNING_KEY",
                "encryptionPublicKey": "{ENCRYPTION_KEY}",
                "pendingRequestTtlSecs": 600,
                "user": {{"umaUserName": "alice", "username": "alice", "password": "secret"}}
            }}"#
        );
        let config = Config::from_json(&json).unwrap();
        assert_eq!(config.signing_private_key().secret_bytes(), [0x11; 32]);
        assert_eq!(config.sending_vasp_domain(), Some("vasp1.example"));
        assert_eq!(config.pending_request_ttl(), Some(Duration::from_secs(600)));
        let credentials = config.user().credentials().unwrap();
        assert_eq!(credentials.password, "secret");
    }

    #[test]
    fn invalid_key_is_a_parse_error() {
        let json = r#"{"signingPrivateKey": "zz", "encryptionPublicKey": "zz", "user": {"umaUserName": "a"}}"#;
        assert!(matches!(
            Config::from_json(json),
            Err(ConfigError::JsonParse(_))
        ));
    }
}
