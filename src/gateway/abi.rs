//! Minimal ABI codec for the order-book contract surface.
//!
//! The contract's call surface only uses static word types (uint256, int256,
//! bool, address) plus one dynamic uint256 array return, so a 32-byte word
//! codec is all that is needed. Selectors and event topics are Keccak-256
//! of the canonical signature.

use sha3::{Digest, Keccak256};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("abi: {0}")]
pub struct AbiError(pub String);

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Full 32-byte Keccak-256 hash of an event signature, hex-encoded.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(Keccak256::digest(signature.as_bytes())))
}

/// Builder for hex-encoded calldata: selector followed by 32-byte words.
#[derive(Debug, Clone)]
pub struct CallData {
    bytes: Vec<u8>,
}

impl CallData {
    /// Start calldata for the given function signature.
    pub fn new(signature: &str) -> Self {
        CallData {
            bytes: selector(signature).to_vec(),
        }
    }

    /// Append an unsigned word.
    pub fn push_u128(mut self, value: u128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        self.bytes.extend_from_slice(&word);
        self
    }

    /// Append a signed word (sign-extended two's complement).
    pub fn push_i128(mut self, value: i128) -> Self {
        let fill = if value < 0 { 0xff } else { 0x00 };
        let mut word = [fill; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        self.bytes.extend_from_slice(&word);
        self
    }

    /// Append a boolean word.
    pub fn push_bool(self, value: bool) -> Self {
        self.push_u128(value as u128)
    }

    /// Hex-encode with the `0x` prefix.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.bytes))
    }
}

/// Sequential reader over ABI-encoded return data.
#[derive(Debug)]
pub struct WordReader {
    data: Vec<u8>,
    pos: usize,
}

impl WordReader {
    /// Parse a `0x`-prefixed hex payload.
    pub fn from_hex(payload: &str) -> Result<Self, AbiError> {
        let stripped = payload.strip_prefix("0x").unwrap_or(payload);
        let data =
            hex::decode(stripped).map_err(|e| AbiError(format!("invalid hex: {}", e)))?;
        Ok(WordReader { data, pos: 0 })
    }

    fn word(&mut self) -> Result<[u8; 32], AbiError> {
        let end = self.pos + 32;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| AbiError("truncated return data".to_string()))?;
        let mut word = [0u8; 32];
        word.copy_from_slice(slice);
        self.pos = end;
        Ok(word)
    }

    /// Read an unsigned word. Values above u128 range are rejected rather
    /// than silently truncated.
    pub fn read_u128(&mut self) -> Result<u128, AbiError> {
        let word = self.word()?;
        if word[..16].iter().any(|b| *b != 0) {
            return Err(AbiError("unsigned value out of range".to_string()));
        }
        let mut tail = [0u8; 16];
        tail.copy_from_slice(&word[16..]);
        Ok(u128::from_be_bytes(tail))
    }

    /// Read an unsigned word expected to fit in u64.
    pub fn read_u64(&mut self) -> Result<u64, AbiError> {
        u64::try_from(self.read_u128()?)
            .map_err(|_| AbiError("unsigned value out of range".to_string()))
    }

    /// Read a signed word (two's complement, sign extension checked).
    pub fn read_i128(&mut self) -> Result<i128, AbiError> {
        let word = self.word()?;
        let negative = word[16] & 0x80 != 0;
        let fill = if negative { 0xff } else { 0x00 };
        if word[..16].iter().any(|b| *b != fill) {
            return Err(AbiError("signed value out of range".to_string()));
        }
        let mut tail = [0u8; 16];
        tail.copy_from_slice(&word[16..]);
        Ok(i128::from_be_bytes(tail))
    }

    /// Read a boolean word.
    pub fn read_bool(&mut self) -> Result<bool, AbiError> {
        Ok(self.read_u128()? != 0)
    }

    /// Read an address word as a lowercase `0x` hex string.
    pub fn read_address(&mut self) -> Result<String, AbiError> {
        let word = self.word()?;
        Ok(format!("0x{}", hex::encode(&word[12..])))
    }

    /// Read a dynamic `uint256[]` return (offset, length, elements), with
    /// each element expected to fit in u64.
    pub fn read_u64_array(&mut self) -> Result<Vec<u64>, AbiError> {
        let offset = self.read_u128()? as usize;
        self.pos = offset;
        let len = self.read_u128()? as usize;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            out.push(self.read_u64()?);
        }
        Ok(out)
    }
}

/// Decode a single 32-byte hex word (e.g. an indexed event topic) as u64.
pub fn word_to_u64(word: &str) -> Result<u64, AbiError> {
    WordReader::from_hex(word)?.read_u64()
}
