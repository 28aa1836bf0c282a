//! Domain primitives: OrderId, Address, TxHash, Timestamp, Wei, SlopeWei, Side.

use serde::{Deserialize, Serialize};

/// Order identifier assigned by the on-chain order book at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl OrderId {
    /// Create an OrderId from a raw id.
    pub fn new(id: u64) -> Self {
        OrderId(id)
    }

    /// Get the underlying id value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Wallet or contract address (hex string).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Create an Address from a string.
    pub fn new(addr: String) -> Self {
        Address(addr)
    }

    /// The all-zero address, used by the authority as "unset".
    pub fn zero() -> Self {
        Address("0x0000000000000000000000000000000000000000".to_string())
    }

    /// Get the address as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the all-zero address.
    pub fn is_zero(&self) -> bool {
        self.0.eq_ignore_ascii_case(Self::zero().as_str())
    }

    /// Case-insensitive equality, since hex addresses differ in checksum casing.
    pub fn matches(&self, other: &Address) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Shortened display form, e.g. `0x1234...abcd`.
    pub fn short(&self) -> String {
        if self.0.len() <= 10 {
            return self.0.clone();
        }
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction hash returned by the authority for a confirmed write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHash(pub String);

impl TxHash {
    /// Create a TxHash from a string.
    pub fn new(hash: String) -> Self {
        TxHash(hash)
    }

    /// Get the hash as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Time in seconds since Unix epoch (the authority's clock unit).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Create a Timestamp from seconds.
    pub fn new(secs: u64) -> Self {
        Timestamp(secs)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp().max(0) as u64)
    }

    /// Get the underlying seconds value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Whether this carries a real time. Zero is the authority's "unset" sentinel.
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    /// Signed seconds elapsed since `earlier` (negative if `earlier` is in the future).
    pub fn seconds_since(&self, earlier: Timestamp) -> i128 {
        self.0 as i128 - earlier.0 as i128
    }
}

/// Non-negative value in base units (wei).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Create a Wei value from base units.
    pub fn new(value: u128) -> Self {
        Wei(value)
    }

    /// Get the underlying base-unit value.
    pub fn as_u128(&self) -> u128 {
        self.0
    }

    /// Whether the value is exactly zero (the engine's "not executable" sentinel).
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiply by a whole-unit quantity, failing on overflow.
    pub fn checked_mul_amount(&self, amount: u64) -> Option<Wei> {
        self.0.checked_mul(amount as u128).map(Wei)
    }
}

impl std::fmt::Display for Wei {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed price slope in base units per second.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SlopeWei(pub i128);

impl SlopeWei {
    pub const ZERO: SlopeWei = SlopeWei(0);

    /// Create a slope from signed base units per second.
    pub fn new(value: i128) -> Self {
        SlopeWei(value)
    }

    /// Get the underlying signed base-unit rate.
    pub fn as_i128(&self) -> i128 {
        self.0
    }
}

/// Order side: Buy escrows value, Sell escrows the asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy side (escrow is the value paid).
    Buy,
    /// Sell side (escrow is the asset amount).
    Sell,
}

impl Side {
    /// True for the buy side.
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}
