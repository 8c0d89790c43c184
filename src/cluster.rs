// Copyright 2025
// Licensed under the Elastic License v2.0

//! Cluster connection setup
//!
//! Every endpoint in the server list gets its own task that keeps trying to
//! open a connection, sleeping with a capped exponential backoff between
//! attempts (1s, 2s, 4s, 8s, 8s, ...). There is no overall timeout: setup
//! returns only once every endpoint is connected, or fails with
//! [`CoreError::Interrupted`] if the cancellation token fires first. A
//! configuration error reported by the destination ends setup at once.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Host;

use crate::core::{CoreError, CoreResult, Destination};

/// One destination cluster node address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    /// Explicit port; the destination client applies its default when absent
    pub port: Option<u16>,
}

impl Endpoint {
    /// Parses `host`, `host:port`, `[v6addr]` or `[v6addr]:port`.
    ///
    /// The host must be a valid domain name or IP address; IPv6 addresses
    /// keep their brackets so they can be placed in a URL as is.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(CoreError::config_error("empty server address"));
        }

        let (host, port) = if s.starts_with('[') {
            let close = s.find(']').ok_or_else(|| {
                CoreError::config_error(format!("Invalid server address '{}': unclosed '['", s))
            })?;
            let (host, rest) = s.split_at(close + 1);
            match rest {
                "" => (host, None),
                _ => match rest.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(CoreError::config_error(format!(
                            "Invalid server address '{}': unexpected text after ']'",
                            s
                        )))
                    }
                },
            }
        } else {
            match s.split_once(':') {
                None => (s, None),
                Some((host, port)) => (host, Some(port)),
            }
        };

        if host.is_empty() {
            return Err(CoreError::config_error(format!(
                "Invalid server address '{}': missing host",
                s
            )));
        }
        Host::parse(host).map_err(|e| {
            CoreError::config_error(format!("Invalid server address '{}': {}", s, e))
        })?;

        let port = port
            .map(|p| {
                p.parse::<u16>().map_err(|_| {
                    CoreError::config_error(format!("Invalid server address '{}': bad port", s))
                })
            })
            .transpose()?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn port_or(&self, default_port: u16) -> u16 {
        self.port.unwrap_or(default_port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.host, port),
            None => write!(f, "{}", self.host),
        }
    }
}

/// Splits a comma-separated server list. Blank entries are skipped; at least
/// one endpoint is required.
pub fn parse_servers(servers: &str) -> CoreResult<Vec<Endpoint>> {
    let endpoints = servers
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Endpoint::parse)
        .collect::<CoreResult<Vec<_>>>()?;

    if endpoints.is_empty() {
        return Err(CoreError::config_error(format!(
            "No servers found in '{}'",
            servers
        )));
    }
    Ok(endpoints)
}

/// Capped exponential backoff between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(1000),
            max: Duration::from_millis(8000),
        }
    }
}

impl BackoffPolicy {
    /// Delay to use after `current` has been slept.
    pub fn next(&self, current: Duration) -> Duration {
        if current < self.max {
            (current * 2).min(self.max)
        } else {
            self.max
        }
    }
}

/// Live connections to every cluster node, shared by all deliveries.
pub struct ConnectionSet<D: Destination> {
    client: Arc<D>,
    endpoints: Vec<Endpoint>,
}

impl<D: Destination> ConnectionSet<D> {
    pub fn client(&self) -> Arc<D> {
        Arc::clone(&self.client)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

/// Connects to every endpoint in parallel and waits until all succeed.
pub async fn connect<D: Destination>(
    client: Arc<D>,
    endpoints: Vec<Endpoint>,
    backoff: BackoffPolicy,
    cancel: &CancellationToken,
) -> CoreResult<ConnectionSet<D>> {
    info!("Connecting to VoltDB ({} node(s))...", endpoints.len());

    let mut workers = JoinSet::new();
    for endpoint in endpoints.iter().cloned() {
        let client = Arc::clone(&client);
        workers.spawn(async move { connect_with_retry(client.as_ref(), &endpoint, backoff).await });
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                workers.abort_all();
                return Err(CoreError::interrupted("interrupted while waiting for cluster connections"));
            }
            joined = workers.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    workers.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    error!("Connection worker failed: {}", e);
                    workers.abort_all();
                    return Err(CoreError::internal_error(format!("connection worker failed: {}", e)));
                }
            }
        }
    }

    Ok(ConnectionSet { client, endpoints })
}

/// Retries one endpoint until it connects. Connection failures are retried
/// forever; a configuration error cannot succeed on retry and is returned.
pub(crate) async fn connect_with_retry<D: Destination + ?Sized>(
    client: &D,
    endpoint: &Endpoint,
    backoff: BackoffPolicy,
) -> CoreResult<()> {
    let mut delay = backoff.initial;
    loop {
        match client.connect(endpoint).await {
            Ok(()) => break,
            Err(e @ CoreError::ConfigError { .. }) => {
                error!("Cannot connect to {}: {}", endpoint, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "Connection to {} failed - retrying in {} second(s): {}",
                    endpoint,
                    delay.as_secs(),
                    e
                );
                tokio::time::sleep(delay).await;
                delay = backoff.next(delay);
            }
        }
    }
    info!("Connected to VoltDB node at: {}", endpoint);
    Ok(())
}
