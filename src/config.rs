use crate::domain::Address;
use crate::session::NetworkProfile;
use std::collections::HashMap;
use thiserror::Error;

/// Built-in network selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkName {
    Localhost,
    Sepolia,
}

/// Startup configuration, resolved once from the environment.
///
/// An unset or zero contract address puts the client in read-only demo
/// mode: the book can be browsed but every mutating operation is disabled.
#[derive(Debug, Clone)]
pub struct Config {
    pub network: NetworkName,
    pub contract_address: Address,
    /// RPC endpoints that take precedence over the profile's defaults.
    pub extra_rpc_urls: Vec<String>,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let network = match env_map
            .get("AUCTION_NETWORK")
            .map(|s| s.as_str())
            .unwrap_or("localhost")
        {
            "localhost" => NetworkName::Localhost,
            "sepolia" => NetworkName::Sepolia,
            other => {
                return Err(ConfigError::InvalidValue(
                    "AUCTION_NETWORK".to_string(),
                    format!("must be localhost or sepolia, got {}", other),
                ))
            }
        };

        let contract_address = match env_map.get("AUCTION_CONTRACT_ADDRESS") {
            Some(raw) if !raw.trim().is_empty() => {
                let trimmed = raw.trim();
                if !is_hex_address(trimmed) {
                    return Err(ConfigError::InvalidValue(
                        "AUCTION_CONTRACT_ADDRESS".to_string(),
                        "must be a 0x-prefixed 20-byte hex address".to_string(),
                    ));
                }
                Address::new(trimmed.to_string())
            }
            _ => Address::zero(),
        };

        let tick_interval_ms = env_map
            .get("AUCTION_TICK_INTERVAL_MS")
            .map(|s| s.as_str())
            .unwrap_or("1000")
            .parse::<u64>()
            .ok()
            .filter(|ms| *ms > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "AUCTION_TICK_INTERVAL_MS".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        let extra_rpc_urls = parse_rpc_urls_from_map(&env_map)?;

        Ok(Config {
            network,
            contract_address,
            extra_rpc_urls,
            tick_interval_ms,
        })
    }

    /// Whether mutating operations are disabled.
    pub fn is_read_only(&self) -> bool {
        self.contract_address.is_zero()
    }

    /// The chain profile for the selected network, with any configured
    /// RPC overrides taking precedence.
    pub fn profile(&self) -> NetworkProfile {
        let mut profile = match self.network {
            NetworkName::Localhost => NetworkProfile::localhost(),
            NetworkName::Sepolia => NetworkProfile::sepolia(),
        };
        if !self.extra_rpc_urls.is_empty() {
            let mut urls = self.extra_rpc_urls.clone();
            urls.extend(profile.rpc_urls);
            profile.rpc_urls = urls;
        }
        profile
    }

    /// The RPC endpoint the client talks to.
    pub fn rpc_url(&self) -> String {
        self.profile()
            .primary_rpc_url()
            .map(str::to_string)
            .unwrap_or_else(|| "http://127.0.0.1:8545".to_string())
    }
}

fn is_hex_address(raw: &str) -> bool {
    raw.len() == 42
        && raw.starts_with("0x")
        && raw[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_rpc_urls_from_map(env_map: &HashMap<String, String>) -> Result<Vec<String>, ConfigError> {
    if let Some(url) = env_map.get("AUCTION_RPC_URL") {
        Ok(url
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else if let Some(file_path) = env_map.get("AUCTION_RPC_URLS_FILE") {
        let content = std::fs::read_to_string(file_path).map_err(|_| {
            ConfigError::InvalidValue(
                "AUCTION_RPC_URLS_FILE".to_string(),
                "file not found or unreadable".to_string(),
            )
        })?;
        Ok(content
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    } else {
        Ok(Vec::new())
    }
}
