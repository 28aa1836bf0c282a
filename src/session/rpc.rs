//! Session provider backed by a plain JSON-RPC node.
//!
//! The headless counterpart of a browser wallet: accounts come from
//! `eth_accounts` (the node signs for its unlocked accounts), the network
//! check reads `eth_chainId`, and there are no account/chain events. A node
//! cannot be switched to another chain, so a mismatch is an error rather
//! than a switch prompt.

use super::{NetworkProfile, SessionError, SessionEvent, SessionProvider};
use crate::domain::Address;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug)]
pub struct RpcSessionProvider {
    client: reqwest::Client,
    url: String,
    // Kept alive so subscribers see a silent, open channel.
    event_senders: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl RpcSessionProvider {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            event_senders: Mutex::new(Vec::new()),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, SessionError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|_| SessionError::NoProvider)?;
        let payload: Value = response
            .json()
            .await
            .map_err(|e| SessionError::Provider(e.to_string()))?;
        if let Some(error) = payload.get("error") {
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown rpc error");
            return Err(SessionError::Provider(message.to_string()));
        }
        payload
            .get("result")
            .cloned()
            .ok_or_else(|| SessionError::Provider("response missing result".to_string()))
    }
}

#[async_trait]
impl SessionProvider for RpcSessionProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>, SessionError> {
        let result = self.request("eth_accounts", json!([])).await?;
        let accounts: Vec<Address> = result
            .as_array()
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(|s| Address::new(s.to_string()))
                    .collect()
            })
            .unwrap_or_default();
        if accounts.is_empty() {
            return Err(SessionError::NoAccounts);
        }
        Ok(accounts)
    }

    async fn ensure_network(&self, profile: &NetworkProfile) -> Result<(), SessionError> {
        let result = self.request("eth_chainId", json!([])).await?;
        let actual = result
            .as_str()
            .ok_or_else(|| SessionError::Provider("chain id not a string".to_string()))?;
        if parse_chain_id(actual) != parse_chain_id(&profile.chain_id) {
            return Err(SessionError::WrongNetwork(format!(
                "node is on {}, expected {} ({})",
                actual, profile.chain_id, profile.chain_name
            )));
        }
        Ok(())
    }

    async fn revoke_permissions(&self) -> Result<(), SessionError> {
        // Nothing to revoke on a bare node.
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

fn parse_chain_id(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok()
}
