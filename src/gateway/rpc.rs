//! JSON-RPC gateway implementation.
//!
//! Reads go through `eth_call`/`eth_getLogs` with exponential backoff on
//! transport failures. Writes are `eth_sendTransaction` followed by receipt
//! polling and are never retried automatically; a failed write is surfaced
//! for the user to re-initiate.

use super::abi::{self, CallData, WordReader};
use super::{ChainGateway, CreateOrderRequest, GatewayError, PendingTx};
use crate::domain::{
    Address, Order, OrderId, PricingParams, Side, SlopeWei, Timestamp, Trade, TxHash, Wei,
};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, warn};

const SIG_GET_ACTIVE_ORDER_IDS: &str = "getActiveOrderIds()";
const SIG_GET_ORDER_WITH_PRICE: &str = "getOrderWithPrice(uint256)";
const SIG_CURRENT_PRICE: &str = "currentPrice(uint256)";
const SIG_CREATE_ORDER: &str = "createOrder(bool,uint256,uint256,int256,uint256,uint256)";
const SIG_EXECUTE_ORDER: &str = "executeOrder(uint256,uint256)";
const SIG_CANCEL_ORDER: &str = "cancelOrder(uint256)";
const SIG_EXPIRE_ORDER: &str = "expireOrder(uint256)";
const SIG_ORDER_EXECUTED: &str = "OrderExecuted(uint256,address,uint256,uint256,uint256)";

/// EIP-1193 "user rejected request" code surfaced by wallet providers.
const CODE_USER_REJECTED: i64 = 4001;

const READ_RETRY_MAX_ELAPSED: Duration = Duration::from_secs(30);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Gateway speaking JSON-RPC to a node that signs for its unlocked accounts.
#[derive(Debug)]
pub struct RpcGateway {
    client: Client,
    url: String,
    contract: Address,
    caller: RwLock<Option<Address>>,
    next_id: AtomicU64,
}

impl RpcGateway {
    /// Create a gateway against `url` for the order-book contract.
    pub fn new(url: String, contract: Address) -> Self {
        Self {
            client: Client::new(),
            url,
            contract,
            caller: RwLock::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set or clear the account writes are sent from. Reads work without it.
    pub fn set_caller(&self, caller: Option<Address>) {
        if let Ok(mut guard) = self.caller.write() {
            *guard = caller;
        }
    }

    fn caller(&self) -> Option<Address> {
        self.caller.read().ok().and_then(|guard| guard.clone())
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Network(format!("http status {}", status)));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        if let Some(error) = payload.get("error") {
            let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(map_rpc_error(code, message));
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| GatewayError::Parse("response missing result".to_string()))
    }

    /// Read-path request: transient transport failures are retried with
    /// exponential backoff; RPC-level errors are permanent.
    async fn request_read(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(READ_RETRY_MAX_ELAPSED),
            ..Default::default()
        };

        retry(backoff, || async {
            self.request(method, params.clone()).await.map_err(|e| match e {
                GatewayError::Network(_) => backoff::Error::transient(e),
                other => backoff::Error::permanent(other),
            })
        })
        .await
    }

    async fn eth_call(&self, data: String) -> Result<WordReader, GatewayError> {
        let params = json!([{ "to": self.contract.as_str(), "data": data }, "latest"]);
        let result = self.request_read("eth_call", params).await?;
        let payload = result
            .as_str()
            .ok_or_else(|| GatewayError::Parse("eth_call result not a string".to_string()))?;
        Ok(WordReader::from_hex(payload)?)
    }

    async fn send_transaction(&self, data: String, value: Wei) -> Result<PendingTx, GatewayError> {
        let from = self.caller().ok_or_else(|| {
            GatewayError::Rejected("no connected account to sign with".to_string())
        })?;

        let mut tx = json!({
            "from": from.as_str(),
            "to": self.contract.as_str(),
            "data": data,
        });
        if !value.is_zero() {
            tx["value"] = json!(format!("0x{:x}", value.as_u128()));
        }

        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| GatewayError::Parse("transaction hash not a string".to_string()))?;
        debug!(tx = hash, "transaction submitted");
        Ok(PendingTx(TxHash::new(hash.to_string())))
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn list_active_order_ids(&self) -> Result<Vec<OrderId>, GatewayError> {
        let data = CallData::new(SIG_GET_ACTIVE_ORDER_IDS).to_hex();
        let mut reader = self.eth_call(data).await?;
        let ids = reader.read_u64_array()?;
        Ok(ids.into_iter().map(OrderId::new).collect())
    }

    async fn get_order_with_price(&self, id: OrderId) -> Result<(Order, Wei), GatewayError> {
        let data = CallData::new(SIG_GET_ORDER_WITH_PRICE)
            .push_u128(id.as_u64() as u128)
            .to_hex();
        let mut reader = self.eth_call(data).await?;
        decode_order_with_price(id, &mut reader)
    }

    async fn current_price(&self, id: OrderId) -> Result<Wei, GatewayError> {
        let data = CallData::new(SIG_CURRENT_PRICE)
            .push_u128(id.as_u64() as u128)
            .to_hex();
        let mut reader = self.eth_call(data).await?;
        Ok(Wei::new(reader.read_u128()?))
    }

    async fn list_recent_executions(&self, limit: usize) -> Result<Vec<Trade>, GatewayError> {
        let params = json!([{
            "address": self.contract.as_str(),
            "fromBlock": "0x0",
            "toBlock": "latest",
            "topics": [abi::event_topic(SIG_ORDER_EXECUTED)],
        }]);
        let result = self.request_read("eth_getLogs", params).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| GatewayError::Parse("eth_getLogs result not an array".to_string()))?;

        let mut trades = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_execution_log(log) {
                Ok(trade) => trades.push(trade),
                Err(e) => warn!("skipping undecodable execution log: {}", e),
            }
        }

        // Logs arrive oldest first; keep the tail, newest first.
        let skip = trades.len().saturating_sub(limit);
        let mut recent = trades.split_off(skip);
        recent.reverse();
        Ok(recent)
    }

    async fn create_order(&self, req: &CreateOrderRequest) -> Result<PendingTx, GatewayError> {
        let data = CallData::new(SIG_CREATE_ORDER)
            .push_bool(req.side.is_buy())
            .push_u128(req.amount as u128)
            .push_u128(req.start_price.as_u128())
            .push_i128(req.price_slope.as_i128())
            .push_u128(req.stop_price.as_u128())
            .push_u128(req.expiry_time.as_u64() as u128)
            .to_hex();
        self.send_transaction(data, req.escrow).await
    }

    async fn execute_order(
        &self,
        id: OrderId,
        amount: u64,
        escrow: Wei,
    ) -> Result<PendingTx, GatewayError> {
        let data = CallData::new(SIG_EXECUTE_ORDER)
            .push_u128(id.as_u64() as u128)
            .push_u128(amount as u128)
            .to_hex();
        self.send_transaction(data, escrow).await
    }

    async fn cancel_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
        let data = CallData::new(SIG_CANCEL_ORDER)
            .push_u128(id.as_u64() as u128)
            .to_hex();
        self.send_transaction(data, Wei::ZERO).await
    }

    async fn expire_order(&self, id: OrderId) -> Result<PendingTx, GatewayError> {
        let data = CallData::new(SIG_EXPIRE_ORDER)
            .push_u128(id.as_u64() as u128)
            .to_hex();
        self.send_transaction(data, Wei::ZERO).await
    }

    async fn confirm(&self, pending: &PendingTx) -> Result<TxHash, GatewayError> {
        let deadline = tokio::time::Instant::now() + CONFIRMATION_TIMEOUT;
        loop {
            let receipt = self
                .request_read("eth_getTransactionReceipt", json!([pending.hash().as_str()]))
                .await?;

            if !receipt.is_null() {
                let status = receipt
                    .get("status")
                    .and_then(|v| v.as_str())
                    .unwrap_or("0x0");
                if status == "0x1" {
                    return Ok(pending.hash().clone());
                }
                return Err(GatewayError::Reverted("transaction reverted".to_string()));
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(GatewayError::Network("confirmation timed out".to_string()));
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

fn map_rpc_error(code: i64, message: String) -> GatewayError {
    if code == CODE_USER_REJECTED {
        GatewayError::Rejected(message)
    } else if message.to_lowercase().contains("revert") {
        GatewayError::Reverted(message)
    } else {
        GatewayError::Rpc { code, message }
    }
}

/// Decode the `(Order, uint256 price)` return tuple. The struct is static,
/// so its fields are laid out inline in declaration order.
fn decode_order_with_price(
    id: OrderId,
    reader: &mut WordReader,
) -> Result<(Order, Wei), GatewayError> {
    let creator = reader.read_address()?;
    let is_buy = reader.read_bool()?;
    let amount = reader.read_u64()?;
    let start_price = reader.read_u128()?;
    let price_slope = reader.read_i128()?;
    let start_time = reader.read_u64()?;
    let stop_price = reader.read_u128()?;
    let expiry_time = reader.read_u64()?;
    let escrowed_value = reader.read_u128()?;
    let active = reader.read_bool()?;
    let price = reader.read_u128()?;

    let order = Order {
        id,
        creator: Address::new(creator),
        amount,
        pricing: PricingParams {
            side: if is_buy { Side::Buy } else { Side::Sell },
            start_price: Wei::new(start_price),
            price_slope: SlopeWei::new(price_slope),
            start_time: Timestamp::new(start_time),
            stop_price: Wei::new(stop_price),
            expiry_time: Timestamp::new(expiry_time),
        },
        escrowed_value: Wei::new(escrowed_value),
        active,
    };
    Ok((order, Wei::new(price)))
}

fn decode_execution_log(log: &Value) -> Result<Trade, GatewayError> {
    let topics = log
        .get("topics")
        .and_then(|v| v.as_array())
        .ok_or_else(|| GatewayError::Parse("log missing topics".to_string()))?;
    let order_topic = topics
        .get(1)
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::Parse("log missing order id topic".to_string()))?;
    let order_id = abi::word_to_u64(order_topic)?;

    let data = log
        .get("data")
        .and_then(|v| v.as_str())
        .ok_or_else(|| GatewayError::Parse("log missing data".to_string()))?;
    let mut reader = WordReader::from_hex(data)?;
    let amount = reader.read_u64()?;
    let price = reader.read_u128()?;
    // Third word is the remaining amount; the trade view does not show it.

    let tx_hash = log
        .get("transactionHash")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(Trade {
        order_id: OrderId::new(order_id),
        amount,
        price: Wei::new(price),
        tx_hash: TxHash::new(tx_hash),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rpc_error_classification() {
        assert_eq!(
            map_rpc_error(4001, "User rejected the request.".to_string()),
            GatewayError::Rejected("User rejected the request.".to_string())
        );
        assert!(matches!(
            map_rpc_error(3, "execution reverted: order not active".to_string()),
            GatewayError::Reverted(_)
        ));
        assert!(matches!(
            map_rpc_error(-32000, "header not found".to_string()),
            GatewayError::Rpc { code: -32000, .. }
        ));
    }

    #[test]
    fn test_decode_order_with_price() {
        // Hand-built return payload: creator, isBuy, amount, startPrice,
        // slope (-1000), startTime, stopPrice, expiryTime, escrowed, active,
        // then the authority price.
        let mut payload = String::from("0x");
        payload.push_str(&format!(
            "{:0>64}",
            "abcdefabcdefabcdefabcdefabcdefabcdefabcd"
        ));
        payload.push_str(&format!("{:064x}", 1)); // isBuy = true
        payload.push_str(&format!("{:064x}", 10u64));
        payload.push_str(&format!("{:064x}", 10_000_000_000_000_000u128));
        payload.push_str(&"f".repeat(64 - 32));
        payload.push_str(&format!("{:032x}", (-1000i128) as u128));
        payload.push_str(&format!("{:064x}", 1_700_000_000u64));
        payload.push_str(&format!("{:064x}", 5_000_000_000_000_000u128));
        payload.push_str(&format!("{:064x}", 0));
        payload.push_str(&format!("{:064x}", 100_000_000_000_000_000u128));
        payload.push_str(&format!("{:064x}", 1)); // active
        payload.push_str(&format!("{:064x}", 9_990_000_000_000_000u128));

        let mut reader = WordReader::from_hex(&payload).unwrap();
        let (order, price) = decode_order_with_price(OrderId::new(7), &mut reader).unwrap();

        assert_eq!(order.id, OrderId::new(7));
        assert_eq!(
            order.creator.as_str(),
            "0xabcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
        assert_eq!(order.pricing.side, Side::Buy);
        assert_eq!(order.amount, 10);
        assert_eq!(order.pricing.price_slope, SlopeWei::new(-1000));
        assert_eq!(order.pricing.stop_price, Wei::new(5_000_000_000_000_000));
        assert!(!order.pricing.expiry_time.is_set());
        assert!(order.active);
        assert_eq!(price, Wei::new(9_990_000_000_000_000));
    }

    #[test]
    fn test_decode_execution_log() {
        let log = json!({
            "topics": [
                abi::event_topic(SIG_ORDER_EXECUTED),
                format!("0x{:064x}", 3),
                format!("0x{:064x}", 0xbeef),
            ],
            "data": format!("0x{:064x}{:064x}{:064x}", 5, 9_900_000_000_000_000u128, 5),
            "transactionHash": "0xdeadbeef",
        });

        let trade = decode_execution_log(&log).unwrap();
        assert_eq!(trade.order_id, OrderId::new(3));
        assert_eq!(trade.amount, 5);
        assert_eq!(trade.price, Wei::new(9_900_000_000_000_000));
        assert_eq!(trade.tx_hash.as_str(), "0xdeadbeef");
    }

    #[test]
    fn test_create_order_calldata_shape() {
        let req = CreateOrderRequest {
            side: Side::Buy,
            amount: 10,
            start_price: Wei::new(10_000_000_000_000_000),
            price_slope: SlopeWei::new(-27_777_777_777),
            stop_price: Wei::new(5_000_000_000_000_000),
            expiry_time: Timestamp::new(0),
            escrow: Wei::new(100_000_000_000_000_000),
        };
        let data = CallData::new(SIG_CREATE_ORDER)
            .push_bool(req.side.is_buy())
            .push_u128(req.amount as u128)
            .push_u128(req.start_price.as_u128())
            .push_i128(req.price_slope.as_i128())
            .push_u128(req.stop_price.as_u128())
            .push_u128(req.expiry_time.as_u64() as u128)
            .to_hex();
        // selector + six words
        assert_eq!(data.len(), 2 + (4 + 6 * 32) * 2);
    }
}
