//! Service configuration.
//!
//! The core receives configuration as a structured value; the binary loads
//! it from a YAML file via [`Config::from_yaml_str`] and validates it before
//! any task starts.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use thiserror::Error;

/// An execution-client endpoint to observe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Short stable identifier, unique across the configuration.
    pub name: String,
    /// HTTP JSON-RPC URL used by the resolver and reconciler.
    pub rpc_url: String,
    /// Websocket URL used for subscriptions.
    pub websocket_url: String,
    /// Extra headers applied to the websocket upgrade request.
    #[serde(default)]
    pub auth_headers: HashMap<String, String>,
}

/// A consensus-layer endpoint exposing the SSE event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconEndpoint {
    /// Short identifier used in logs.
    pub name: String,
    /// Base URL of the beacon HTTP API.
    pub beacon_url: String,
}

/// Resolver pacing and RPC deadline, as duration strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polling {
    /// Tick interval between queue pops, e.g. `"1s"`.
    pub interval: String,
    /// Per-RPC-call timeout, e.g. `"5s"`.
    pub timeout: String,
}

/// Ingest-side filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filters {
    /// Minimum gas price of interest, decimal wei string; empty disables.
    #[serde(default)]
    pub min_gas_price: String,
}

/// Top-level service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Execution endpoints, one observation pipeline each.
    pub endpoints: Vec<Endpoint>,
    /// Beacon endpoints, one inclusion-list stream each.
    #[serde(default)]
    pub beacon_urls: Vec<BeaconEndpoint>,
    /// Resolver pacing.
    pub polling: Polling,
    /// Ingest filters.
    #[serde(default)]
    pub filters: Filters,
    /// Log level name handed to the tracing filter; empty means `info`.
    #[serde(default)]
    pub log_level: String,
    /// `"true"` enables the inclusion-list and reconciliation tasks.
    #[serde(default)]
    pub focil_enabled: String,
}

impl Config {
    /// Parses and validates a YAML configuration document.
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        let mut seen = std::collections::HashSet::new();
        for endpoint in &self.endpoints {
            if !seen.insert(endpoint.name.as_str()) {
                return Err(ConfigError::DuplicateEndpoint(endpoint.name.clone()));
            }
        }
        self.poll_interval()?;
        self.rpc_timeout()?;
        match self.focil_enabled.as_str() {
            "" | "true" | "false" => Ok(()),
            other => Err(ConfigError::InvalidFlag { field: "focil_enabled", value: other.to_owned() }),
        }
    }

    /// The parsed resolver tick interval.
    pub fn poll_interval(&self) -> Result<Duration, ConfigError> {
        parse_duration("polling.interval", &self.polling.interval)
    }

    /// The parsed per-RPC-call timeout.
    pub fn rpc_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("polling.timeout", &self.polling.timeout)
    }

    /// Whether the inclusion-list tasks are enabled.
    pub fn focil_enabled(&self) -> bool {
        self.focil_enabled == "true"
    }

    /// The effective log level name.
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() { "info" } else { &self.log_level }
    }
}

fn parse_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        field,
        value: value.to_owned(),
        source,
    })
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document was not valid YAML for the config schema.
    #[error("failed to parse configuration")]
    Parse(#[from] serde_yaml::Error),

    /// No execution endpoints were configured.
    #[error("no execution endpoints configured")]
    NoEndpoints,

    /// Two endpoints share a name.
    #[error("duplicate endpoint name: {0}")]
    DuplicateEndpoint(String),

    /// A duration string did not parse.
    #[error("invalid duration {value:?} for {field}")]
    InvalidDuration {
        /// Config field carrying the bad value.
        field: &'static str,
        /// The offending value.
        value: String,
        /// Parse failure detail.
        #[source]
        source: humantime::DurationError,
    },

    /// A string flag held something other than `"true"`/`"false"`.
    #[error("invalid value {value:?} for {field}")]
    InvalidFlag {
        /// Config field carrying the bad value.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}
