// Copyright 2025
// Licensed under the Elastic License v2.0

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use tracing::{info, warn};

use crate::cluster::{parse_servers, Endpoint};
use crate::core::{CoreError, CoreResult};
use crate::errors::{ErrorLimit, DEFAULT_MAX_ERRORS};
use crate::loader::{LoadTarget, DEFAULT_BATCH_SIZE};

// =============================================================================
// Bridge Parameters
// =============================================================================

/// Which delivery path a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeMode {
    /// One synchronous procedure call per row, status written per row
    Call,
    /// Batched asynchronous loading with an error limit
    Load,
}

impl BridgeMode {
    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "call" => Ok(BridgeMode::Call),
            "load" => Ok(BridgeMode::Load),
            other => anyhow::bail!("Unsupported bridge mode: '{}'. Supported: call, load", other),
        }
    }
}

impl std::fmt::Display for BridgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeMode::Call => write!(f, "call"),
            BridgeMode::Load => write!(f, "load"),
        }
    }
}

/// Named parameters supplied by the host at setup.
#[derive(Debug, Clone, Default)]
pub struct BridgeParams {
    values: BTreeMap<String, String>,
}

impl BridgeParams {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Reads a parameter, falling back to its legacy name with a deprecation warning.
    fn get_with_fallback(&self, name: &str, legacy_name: &str) -> Option<&str> {
        if let Some(value) = self.get(name) {
            return Some(value);
        }

        if let Some(value) = self.get(legacy_name) {
            warn!(
                "Parameter '{}' is deprecated, use '{}' instead",
                legacy_name, name
            );
            return Some(value);
        }

        None
    }

    fn get_non_empty(&self, name: &str, legacy_name: Option<&str>) -> Option<String> {
        let value = match legacy_name {
            Some(legacy) => self.get_with_fallback(name, legacy),
            None => self.get(name),
        };
        value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

/// Validated setup for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub mode: BridgeMode,
    pub servers: String,
    pub endpoints: Vec<Endpoint>,
    pub target: LoadTarget,
    pub error_limit: ErrorLimit,
}

impl BridgeSettings {
    /// Validates the host parameters for the given mode.
    ///
    /// # Parameters
    /// - `servers` (required, legacy `voltservers`): comma-separated `host[:port]` list
    /// - `procedure`: target procedure; required in call mode, preferred in load mode
    /// - `table` (legacy `volttable`): target table for load mode without a procedure
    /// - `maxerrors`: error limit, default 100, `<= 0` disables it
    /// - `batchsize`: rows per table insert, default 200
    pub fn from_params(mode: BridgeMode, params: &BridgeParams) -> CoreResult<Self> {
        info!("No of params: {}", params.len());
        if params.len() < 2 {
            return Err(CoreError::config_error("Must supply at least 2 arguments"));
        }

        let servers = params
            .get_non_empty("servers", Some("voltservers"))
            .ok_or_else(|| CoreError::config_error("'servers' parameter is required"))?;
        let endpoints = parse_servers(&servers)?;

        let error_limit = match params.get("maxerrors") {
            Some(raw) => ErrorLimit::from_param(raw.trim().parse::<i64>().map_err(|_| {
                CoreError::config_error(format!("Invalid maxerrors '{}': expected an integer", raw))
            })?),
            None => ErrorLimit::MaxCount(DEFAULT_MAX_ERRORS),
        };

        let batch_size = match params.get("batchsize") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(CoreError::config_error(format!(
                        "Invalid batchsize '{}': expected a positive integer",
                        raw
                    )))
                }
            },
            None => DEFAULT_BATCH_SIZE,
        };

        info!("Server: {}, Max errors: {}", servers, error_limit);

        let procedure = params.get_non_empty("procedure", None);
        let table = params.get_non_empty("table", Some("volttable"));

        let target = match (mode, procedure, table) {
            (_, Some(procedure), _) => {
                info!("Procedure: {}", procedure);
                LoadTarget::Procedure(procedure)
            }
            (BridgeMode::Call, None, _) => {
                return Err(CoreError::config_error(
                    "'procedure' parameter is required in call mode",
                ))
            }
            (BridgeMode::Load, None, Some(table)) => {
                info!("Table: {}", table);
                LoadTarget::Table {
                    name: table,
                    batch_size,
                }
            }
            (BridgeMode::Load, None, None) => {
                return Err(CoreError::config_error(
                    "Either 'procedure' or 'table' parameter is required",
                ))
            }
        };

        Ok(Self {
            mode,
            servers,
            endpoints,
            target,
            error_limit,
        })
    }
}

// =============================================================================
// Process Configuration
// =============================================================================

/// Configuration for the `voltload` binary, loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    pub source_url: String,
    pub source_query: String,
    pub mode: BridgeMode,
    pub params: BridgeParams,
    pub http_port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("source_url", &"[REDACTED]")
            .field("source_query", &self.source_query)
            .field("mode", &self.mode)
            .field("params", &self.params)
            .field("http_port", &self.http_port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Read environment variable with fallback to legacy name, logging deprecation warning
fn env_with_fallback(new_name: &str, legacy_name: &str) -> Option<String> {
    if let Ok(value) = env::var(new_name) {
        return Some(value);
    }

    if let Ok(value) = env::var(legacy_name) {
        warn!(
            "Environment variable '{}' is deprecated, use '{}' instead",
            legacy_name, new_name
        );
        return Some(value);
    }

    None
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Variables
    /// - SOURCE_URL (legacy DATABASE_URL), SOURCE_QUERY
    /// - BRIDGE_MODE: `call` or `load` (default `load`)
    /// - VOLT_SERVERS, VOLT_PROCEDURE, VOLT_TABLE, VOLT_MAXERRORS, VOLT_BATCH_SIZE
    /// - VOLT_HTTP_PORT (default 8080), VOLT_USER, VOLT_PASSWORD
    pub fn from_env() -> Result<Self> {
        let source_url = env_with_fallback("SOURCE_URL", "DATABASE_URL")
            .context("SOURCE_URL (or legacy DATABASE_URL) must be set")?;
        let source_query = env::var("SOURCE_QUERY").context("SOURCE_QUERY must be set")?;

        let mode = BridgeMode::parse(&env::var("BRIDGE_MODE").unwrap_or_else(|_| "load".to_string()))?;

        let params = BridgeParams::new(
            [
                ("servers", "VOLT_SERVERS"),
                ("procedure", "VOLT_PROCEDURE"),
                ("table", "VOLT_TABLE"),
                ("maxerrors", "VOLT_MAXERRORS"),
                ("batchsize", "VOLT_BATCH_SIZE"),
            ]
            .into_iter()
            .filter_map(|(param, var)| env::var(var).ok().map(|value| (param, value))),
        );

        let http_port: u16 = env::var("VOLT_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("VOLT_HTTP_PORT must be a valid port")?;

        Ok(Self {
            source_url,
            source_query,
            mode,
            params,
            http_port,
            user: env::var("VOLT_USER").ok(),
            password: env::var("VOLT_PASSWORD").ok(),
        })
    }

    /// Print banner with configuration
    pub fn print_banner(&self) {
        info!("Starting voltload ({} mode)...", self.mode);
        info!("Source query: {}", self.source_query);
        if let Some(servers) = self.params.get("servers") {
            info!("VoltDB servers: {} (http port {})", servers, self.http_port);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
