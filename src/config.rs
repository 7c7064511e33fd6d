//! Configuration management

use std::{env, path::Path, path::PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Schwab API credentials
    pub credentials: CredentialsConfig,
    /// API endpoint URLs (overridable for testing)
    pub endpoints: EndpointConfig,
    /// Token persistence and expiry handling
    pub token: TokenConfig,
    /// Outbound HTTP behavior
    pub http: HttpConfig,
    /// Default account hash used when a tool call omits `account_id`
    #[serde(default)]
    pub default_account: Option<String>,
}

/// Schwab API client credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// OAuth client ID (supports `env:VAR_NAME`)
    pub client_id: String,
    /// OAuth client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
    /// Redirect URI registered with the Schwab developer app,
    /// used only by the `auth` subcommand's code exchange.
    pub callback_url: String,
}

/// API endpoint URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// OAuth token endpoint
    pub token_url: String,
    /// Trader API base URL (accounts, positions)
    pub trader_base: String,
    /// Market data API base URL (quotes, chains, price history)
    pub market_base: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            token_url: "https://api.schwabapi.com/v1/oauth/token".to_string(),
            trader_base: "https://api.schwabapi.com/trader/v1".to_string(),
            market_base: "https://api.schwabapi.com/marketdata/v1".to_string(),
        }
    }
}

/// Token persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Path to the persisted token record. Supports ~ expansion.
    pub path: String,
    /// Seconds before actual expiry at which the access token is
    /// proactively refreshed.
    pub safety_margin_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            path: "~/.schwab-mcp/token.json".to_string(),
            safety_margin_secs: 60,
        }
    }
}

/// Outbound HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or required credentials are missing after env resolution.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        // Load from file if provided
        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (SCHWAB_MCP_ prefix)
        figment = figment.merge(Env::prefixed("SCHWAB_MCP_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before secret resolution)
        config.load_env_files();

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = expand_tilde(path_str);
            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Resolve the client ID (expand `env:VAR_NAME` indirection)
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        resolve_secret(&self.credentials.client_id)
    }

    /// Resolve the client secret (expand `env:VAR_NAME` indirection)
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        resolve_secret(&self.credentials.client_secret)
    }

    /// Token file path with ~ expanded
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        PathBuf::from(expand_tilde(&self.token.path))
    }

    /// Verify that credentials are present after resolution.
    pub fn validate(&self) -> Result<()> {
        if self.resolve_client_id().is_empty() {
            return Err(Error::Config(
                "Missing client_id (set credentials.client_id or SCHWAB_MCP_CREDENTIALS__CLIENT_ID)"
                    .to_string(),
            ));
        }
        if self.resolve_client_secret().is_empty() {
            return Err(Error::Config(
                "Missing client_secret (set credentials.client_secret or SCHWAB_MCP_CREDENTIALS__CLIENT_SECRET)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Expand a leading ~ to the user's home directory
fn expand_tilde(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.display().to_string(), 1);
        }
    }
    path.to_string()
}

/// Resolve a `env:VAR_NAME` reference, or return the literal value
fn resolve_secret(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_default()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_schwab_production() {
        let config = Config::default();
        assert_eq!(
            config.endpoints.token_url,
            "https://api.schwabapi.com/v1/oauth/token"
        );
        assert_eq!(config.token.safety_margin_secs, 60);
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.token.path.ends_with("token.json"));
    }

    #[test]
    fn env_indirection_resolves() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("SCHWAB_MCP_TEST_SECRET", "s3cret");
            let config = Config {
                credentials: CredentialsConfig {
                    client_id: "literal-id".to_string(),
                    client_secret: "env:SCHWAB_MCP_TEST_SECRET".to_string(),
                    callback_url: String::new(),
                },
                ..Config::default()
            };
            assert_eq!(config.resolve_client_id(), "literal-id");
            assert_eq!(config.resolve_client_secret(), "s3cret");
            Ok(())
        });
    }

    #[test]
    fn unset_env_reference_resolves_empty() {
        assert_eq!(resolve_secret("env:SCHWAB_MCP_DEFINITELY_UNSET_VAR"), "");
    }

    #[test]
    fn missing_credentials_fail_validation() {
        let config = Config::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn tilde_expansion() {
        let expanded = expand_tilde("~/.schwab-mcp/token.json");
        assert!(!expanded.starts_with('~') || dirs::home_dir().is_none());
    }
}
