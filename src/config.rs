//! Deployment configuration
//!
//! Endpoint tables, broadcast mode, and retry/poll tuning. Everything here
//! is passed explicitly into the orchestrator; there are no module-scope
//! singletons, so tests and parallel UI instances can run with their own
//! configuration.

use crate::error::{AnthemError, AnthemResult};
use crate::types::Network;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// How signed transactions are submitted to Cosmos-family REST endpoints.
/// Fixed per deployment, never chosen per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastMode {
    /// Fire-and-forget; the hash is returned before CheckTx
    Async,
    /// Wait for CheckTx
    Sync,
    /// Wait for block inclusion
    Block,
}

impl BroadcastMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastMode::Async => "async",
            BroadcastMode::Sync => "sync",
            BroadcastMode::Block => "block",
        }
    }
}

/// Signing-core configuration for one deployment
#[derive(Debug, Clone)]
pub struct Config {
    /// Custom REST/RPC endpoint overrides per network
    custom_endpoints: HashMap<Network, String>,
    pub broadcast_mode: BroadcastMode,
    /// Delay between confirmation polls while the transaction is pending
    pub poll_interval: Duration,
    /// Longer delay applied after a transport-level poll error
    pub poll_error_interval: Duration,
    /// Maximum confirmation poll attempts before giving up
    pub max_poll_attempts: u32,
    /// Delay before re-attempting a device connection
    pub connect_retry_delay: Duration,
    /// Longer delay applied when the device reported its screensaver
    pub screensaver_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            custom_endpoints: HashMap::new(),
            broadcast_mode: BroadcastMode::Block,
            poll_interval: Duration::from_millis(1500),
            poll_error_interval: Duration::from_millis(2500),
            max_poll_attempts: 40,
            connect_retry_delay: Duration::from_millis(500),
            screensaver_retry_delay: Duration::from_millis(6500),
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// REST/RPC base URL for a network, honoring overrides
    pub fn endpoint(&self, network: Network) -> &str {
        self.custom_endpoints
            .get(&network)
            .map(String::as_str)
            .unwrap_or_else(|| default_endpoint(network))
    }

    /// Install a custom endpoint after validating it
    pub fn set_endpoint(&mut self, network: Network, url: &str) -> AnthemResult<()> {
        let validated = validate_endpoint(url)?;
        self.custom_endpoints.insert(network, validated);
        Ok(())
    }

    pub fn with_broadcast_mode(mut self, mode: BroadcastMode) -> Self {
        self.broadcast_mode = mode;
        self
    }
}

/// Default REST/RPC base URL per network
fn default_endpoint(network: Network) -> &'static str {
    match network {
        Network::Cosmos => "https://api.cosmos.network",
        Network::Terra => "https://lcd.terra.dev",
        Network::Kava => "https://api.data.kava.io",
        Network::Celo => "https://forno.celo.org",
        Network::Oasis => "https://api.oasis.network",
        Network::Polkadot => "https://rpc.polkadot.io",
    }
}

/// Validate a custom endpoint URL: must parse, must be https, and must
/// not carry userinfo or a fragment.
pub fn validate_endpoint(url: &str) -> AnthemResult<String> {
    let parsed = Url::parse(url.trim())
        .map_err(|e| AnthemError::invalid_input(format!("Invalid endpoint URL: {}", e)))?;

    if parsed.scheme() != "https" {
        return Err(AnthemError::invalid_input(
            "Endpoint must use https",
        ));
    }

    if !parsed.username().is_empty() || parsed.password().is_some() {
        return Err(AnthemError::invalid_input(
            "Endpoint must not embed credentials",
        ));
    }

    if parsed.fragment().is_some() {
        return Err(AnthemError::invalid_input(
            "Endpoint must not contain a fragment",
        ));
    }

    if parsed.host_str().is_none() {
        return Err(AnthemError::invalid_input("Endpoint must have a host"));
    }

    // Normalize away a trailing slash so joins stay predictable
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_endpoints() {
        let config = Config::default();
        assert!(config.endpoint(Network::Cosmos).contains("cosmos"));
        assert!(config.endpoint(Network::Kava).contains("kava"));
    }

    #[test]
    fn test_endpoint_override() {
        let mut config = Config::default();
        config
            .set_endpoint(Network::Cosmos, "https://lcd.example.org/")
            .unwrap();
        assert_eq!(config.endpoint(Network::Cosmos), "https://lcd.example.org");
    }

    #[test]
    fn test_endpoint_validation_rejects_http() {
        assert!(validate_endpoint("http://lcd.example.org").is_err());
        assert!(validate_endpoint("https://user:pw@lcd.example.org").is_err());
        assert!(validate_endpoint("not a url").is_err());
    }

    #[test]
    fn test_broadcast_mode_fixed() {
        let config = Config::default().with_broadcast_mode(BroadcastMode::Sync);
        assert_eq!(config.broadcast_mode.as_str(), "sync");
        // Default deployment waits for block inclusion
        assert_eq!(Config::default().broadcast_mode, BroadcastMode::Block);
    }
}
