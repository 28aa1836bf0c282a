//! Wallet session: network profiles, the session-provider boundary and the
//! connected-session value.
//!
//! The provider is an environment-supplied capability (a browser wallet, an
//! unlocked node). The client consumes it through a trait plus an inbound
//! event channel; account or chain changes invalidate the session rather
//! than being patched in place.

use crate::domain::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

pub mod rpc;

pub use rpc::RpcSessionProvider;

/// Native-currency metadata for a chain profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// A chain profile: id, display name, endpoints and currency metadata.
///
/// Serializes in the shape wallet providers expect for an add-chain request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkProfile {
    /// Hex-encoded chain id, e.g. `0x7a69`.
    pub chain_id: String,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub block_explorer_urls: Vec<String>,
    pub native_currency: NativeCurrency,
}

impl NetworkProfile {
    /// Local Hardhat development chain.
    pub fn localhost() -> Self {
        NetworkProfile {
            chain_id: "0x7a69".to_string(),
            chain_name: "Hardhat Local".to_string(),
            rpc_urls: vec!["http://127.0.0.1:8545".to_string()],
            block_explorer_urls: vec!["http://127.0.0.1:8545".to_string()],
            native_currency: NativeCurrency {
                name: "ETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }

    /// Sepolia test network.
    pub fn sepolia() -> Self {
        NetworkProfile {
            chain_id: "0xaa36a7".to_string(),
            chain_name: "Sepolia".to_string(),
            rpc_urls: vec!["https://rpc.sepolia.org".to_string()],
            block_explorer_urls: vec!["https://sepolia.etherscan.io".to_string()],
            native_currency: NativeCurrency {
                name: "SepoliaETH".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
        }
    }

    /// Primary RPC endpoint.
    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(|s| s.as_str())
    }
}

/// Error type for session operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("no wallet provider available")]
    NoProvider,
    #[error("no wallet connected")]
    NotConnected,
    #[error("no account selected")]
    NoAccounts,
    #[error("wrong network: {0}")]
    WrongNetwork(String),
    #[error("provider error: {0}")]
    Provider(String),
}

/// Out-of-band notifications from the wallet environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The selected account set changed; empty means disconnected.
    AccountsChanged(Vec<Address>),
    /// The provider switched to a different chain id.
    ChainChanged(String),
}

/// Environment capability for account access and network switching.
#[async_trait]
pub trait SessionProvider: Send + Sync + std::fmt::Debug {
    /// Request access to the user's accounts.
    async fn request_accounts(&self) -> Result<Vec<Address>, SessionError>;

    /// Make sure the provider is on `profile`'s chain, switching or adding
    /// it if necessary.
    async fn ensure_network(&self, profile: &NetworkProfile) -> Result<(), SessionError>;

    /// Revoke account permissions. Best-effort; not every provider
    /// supports it.
    async fn revoke_permissions(&self) -> Result<(), SessionError>;

    /// Subscribe to account/chain change events.
    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<SessionEvent>;
}

/// A connected identity bound to a network profile.
///
/// Every connect mints a fresh `epoch`; in-flight operations carry the epoch
/// they started under, and their results are discarded if it has changed.
/// That is the whole stale-session guard: a late resync can never resurrect
/// state for a session that has since disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSession {
    pub address: Address,
    pub profile: NetworkProfile,
    pub epoch: Uuid,
}

impl WalletSession {
    /// Bind `address` to `profile` under a fresh epoch.
    pub fn new(address: Address, profile: NetworkProfile) -> Self {
        WalletSession {
            address,
            profile,
            epoch: Uuid::new_v4(),
        }
    }
}

/// Scriptable provider for tests.
#[derive(Debug)]
pub struct MockSessionProvider {
    accounts: Vec<Address>,
    chain_ok: bool,
    event_senders: std::sync::Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
    network_requests: std::sync::Mutex<Vec<String>>,
}

impl MockSessionProvider {
    /// Provider exposing the given accounts on the right network.
    pub fn new(accounts: Vec<Address>) -> Self {
        Self {
            accounts,
            chain_ok: true,
            event_senders: std::sync::Mutex::new(Vec::new()),
            network_requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Provider stuck on the wrong chain.
    pub fn wrong_network(accounts: Vec<Address>) -> Self {
        Self {
            chain_ok: false,
            ..Self::new(accounts)
        }
    }

    /// Emit an event to every subscriber.
    pub fn emit(&self, event: SessionEvent) {
        if let Ok(senders) = self.event_senders.lock() {
            for sender in senders.iter() {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Chain ids the client asked to switch to.
    pub fn requested_networks(&self) -> Vec<String> {
        self.network_requests
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SessionProvider for MockSessionProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, SessionError> {
        if self.accounts.is_empty() {
            return Err(SessionError::NoAccounts);
        }
        Ok(self.accounts.clone())
    }

    async fn ensure_network(&self, profile: &NetworkProfile) -> Result<(), SessionError> {
        if let Ok(mut requests) = self.network_requests.lock() {
            requests.push(profile.chain_id.clone());
        }
        if self.chain_ok {
            Ok(())
        } else {
            Err(SessionError::WrongNetwork(profile.chain_id.clone()))
        }
    }

    async fn revoke_permissions(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn subscribe_events(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut senders) = self.event_senders.lock() {
            senders.push(tx);
        }
        rx
    }
}
