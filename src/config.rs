//! PBX connection configuration.
//!
//! Everything comes from the environment (a `.env` file is honored). The PBX
//! host has no default and must be set explicitly.

use std::time::Duration;

use thiserror::Error;

const DEFAULT_WS_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("PBX_URL is not set; point it at the PBX host, e.g. pbx.example.com")]
    MissingHost,

    #[error("PBX_URL must be a bare host name, not a URL: {0}")]
    HostIsUrl(String),

    #[error("unknown PBX_DIALECT {0:?} (expected auto, modern or legacy)")]
    UnknownDialect(String),

    #[error("invalid PBX_WS_TIMEOUT_SECS value {0:?}")]
    BadTimeout(String),
}

/// Which login flavor the PBX speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Try the modern flow, fall back to legacy when the endpoint is absent.
    #[default]
    Auto,
    /// Token-based flow of current PBX versions.
    Modern,
    /// Cookie-only flow of older installations.
    Legacy,
}

#[derive(Debug, Clone)]
pub struct PbxConfig {
    /// PBX host or domain, without scheme.
    pub host: String,

    /// Login dialect selection.
    pub dialect: Dialect,

    /// Upper bound for a single websocket read.
    pub ws_read_timeout: Duration,
}

impl PbxConfig {
    /// Reads the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("PBX_URL").map_err(|_| ConfigError::MissingHost)?;

        let dialect = parse_dialect(&std::env::var("PBX_DIALECT").unwrap_or_default())?;

        let ws_read_timeout = match std::env::var("PBX_WS_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs: u64 = raw
                    .parse()
                    .map_err(|_| ConfigError::BadTimeout(raw.clone()))?;
                Duration::from_secs(secs)
            }
            Err(_) => DEFAULT_WS_TIMEOUT,
        };

        let config = Self {
            host,
            dialect,
            ws_read_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        if self.host.contains("://") {
            return Err(ConfigError::HostIsUrl(self.host.clone()));
        }
        Ok(())
    }

    /// HTTPS URL for an API path on the PBX.
    pub fn api_url(&self, path: &str) -> String {
        format!("https://{}{}", self.host, path)
    }

    /// Websocket URL of the push channel for one session.
    pub fn ws_url(&self, session_key: &str, ws_pass: &str) -> String {
        format!(
            "wss://{}/ws/webclient?sessionId={}&pass={}",
            self.host, session_key, ws_pass
        )
    }
}

fn parse_dialect(raw: &str) -> Result<Dialect, ConfigError> {
    match raw.to_lowercase().as_str() {
        "" | "auto" => Ok(Dialect::Auto),
        "modern" => Ok(Dialect::Modern),
        "legacy" => Ok(Dialect::Legacy),
        other => Err(ConfigError::UnknownDialect(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(host: &str) -> PbxConfig {
        PbxConfig {
            host: host.to_string(),
            dialect: Dialect::Auto,
            ws_read_timeout: DEFAULT_WS_TIMEOUT,
        }
    }

    #[test]
    fn dialect_names_map_to_variants() {
        assert_eq!(parse_dialect("").unwrap(), Dialect::Auto);
        assert_eq!(parse_dialect("auto").unwrap(), Dialect::Auto);
        assert_eq!(parse_dialect("Modern").unwrap(), Dialect::Modern);
        assert_eq!(parse_dialect("LEGACY").unwrap(), Dialect::Legacy);
        assert!(matches!(
            parse_dialect("v15"),
            Err(ConfigError::UnknownDialect(_))
        ));
    }

    #[test]
    fn host_must_be_bare() {
        assert!(config("pbx.example.com").validate().is_ok());
        assert!(matches!(
            config("https://pbx.example.com").validate(),
            Err(ConfigError::HostIsUrl(_))
        ));
        assert!(matches!(
            config("  ").validate(),
            Err(ConfigError::MissingHost)
        ));
    }

    #[test]
    fn urls_are_assembled_from_the_host() {
        let config = config("pbx.example.com");
        assert_eq!(
            config.api_url("/MyPhone/MPWebService.asmx"),
            "https://pbx.example.com/MyPhone/MPWebService.asmx"
        );
        assert_eq!(
            config.ws_url("key", "secret"),
            "wss://pbx.example.com/ws/webclient?sessionId=key&pass=secret"
        );
    }
}
