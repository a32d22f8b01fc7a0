// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the application. Configuration is loaded from the environment
//! once at startup into a [`Config`].
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Root directory for tokens, containers and payloads | `./data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8015` |
//! | `TLS_CERT_PATH` | PEM certificate chain; HTTPS when set with `TLS_KEY_PATH` | unset |
//! | `TLS_KEY_PATH` | PEM private key | unset |
//! | `STORE_RETRY_ATTEMPTS` | Attempts for record I/O that hit a locked file | `50` |
//! | `STORE_RETRY_DELAY_MS` | Delay between those attempts | `5` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::storage::paths::DATA_ROOT;
use crate::storage::RetryPolicy;

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const STORE_RETRY_ATTEMPTS_ENV: &str = "STORE_RETRY_ATTEMPTS";
pub const STORE_RETRY_DELAY_MS_ENV: &str = "STORE_RETRY_DELAY_MS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_PORT: u16 = 8015;

/// Default tracing filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Output format of the tracing subscriber.
///
/// Read on its own, before [`Config`], because the subscriber has to exist
/// for configuration warnings to be logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// `LOG_FORMAT` from the process environment, `Pretty` when unset or unknown.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        lookup(LOG_FORMAT_ENV)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// PEM files for HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub bind: SocketAddr,
    pub tls: Option<TlsPaths>,
    pub retry: RetryPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DATA_ROOT),
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            tls: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from any variable source. Unset or unparsable values fall back
    /// to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let host = parse_or(var(HOST_ENV), HOST_ENV, defaults.bind.ip());
        let port = parse_or(var(PORT_ENV), PORT_ENV, defaults.bind.port());

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!(
                    "Only one of {TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} is set, serving plain HTTP"
                );
                None
            }
        };

        let attempts = parse_or(
            var(STORE_RETRY_ATTEMPTS_ENV),
            STORE_RETRY_ATTEMPTS_ENV,
            defaults.retry.attempts,
        )
        .max(1);
        let delay_ms = parse_or(
            var(STORE_RETRY_DELAY_MS_ENV),
            STORE_RETRY_DELAY_MS_ENV,
            defaults.retry.delay.as_millis() as u64,
        );

        Self {
            data_dir: var(DATA_DIR_ENV).map_or(defaults.data_dir, PathBuf::from),
            bind: SocketAddr::new(host, port),
            tls,
            retry: RetryPolicy {
                attempts,
                delay: Duration::from_millis(delay_ms),
            },
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, name: &str, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Ignoring unparsable setting");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.bind, "0.0.0.0:8015".parse().unwrap());
        assert_eq!(config.tls, None);
        assert_eq!(config.retry.attempts, 50);
        assert_eq!(config.retry.delay, Duration::from_millis(5));
    }

    #[test]
    fn values_are_read() {
        let config = config(&[
            ("DATA_DIR", "/srv/vault"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("TLS_CERT_PATH", "/certs/cert.pem"),
            ("TLS_KEY_PATH", "/certs/key.pem"),
            ("STORE_RETRY_ATTEMPTS", "3"),
            ("STORE_RETRY_DELAY_MS", "20"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/srv/vault"));
        assert_eq!(config.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(
            config.tls,
            Some(TlsPaths {
                cert: "/certs/cert.pem".into(),
                key: "/certs/key.pem".into(),
            })
        );
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.retry.delay, Duration::from_millis(20));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config(&[
            ("PORT", "eighty"),
            ("HOST", "not-an-ip"),
            ("STORE_RETRY_ATTEMPTS", "0"),
            ("DATA_DIR", "  "),
        ]);
        assert_eq!(config.bind.port(), DEFAULT_PORT);
        assert_eq!(config.retry.attempts, 1);
        assert_eq!(config.data_dir, PathBuf::from("./data"));
    }

    #[test]
    fn log_format_is_read_separately() {
        let format = |value: Option<&str>| {
            LogFormat::from_lookup(|name| {
                assert_eq!(name, LOG_FORMAT_ENV);
                value.map(str::to_string)
            })
        };
        assert_eq!(format(None), LogFormat::Pretty);
        assert_eq!(format(Some(" JSON ")), LogFormat::Json);
        assert_eq!(format(Some("pretty")), LogFormat::Pretty);
        assert_eq!(format(Some("xml")), LogFormat::Pretty);
    }

    #[test]
    fn half_configured_tls_is_ignored() {
        let config = config(&[("TLS_CERT_PATH", "/certs/cert.pem")]);
        assert_eq!(config.tls, None);
    }
}
