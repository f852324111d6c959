//! Basic blockchain types

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Block height type (64-bit unsigned integer)
pub type BlockHeight = u64;

/// Timestamp in seconds since Unix epoch
pub type Timestamp = u64;

/// Chain identifier
pub type ChainId = u32;

/// Gas amount type
pub type Gas = u64;

/// Wei amount type (smallest unit of currency)
pub type Wei = u128;

/// Nonce type for transactions
pub type Nonce = u64;

/// 32-byte hash type
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Create a new hash from byte array
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create hash from slice (panics if length != 32)
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Self(bytes)
    }

    /// Keccak256 digest of arbitrary data
    pub fn digest(data: &[u8]) -> Self {
        let digest = Keccak256::digest(data);
        Self::from_slice(digest.as_slice())
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 32 {
            return Err(CoreError::InvalidHash(hex.to_string()));
        }
        Ok(Self::from_slice(&bytes))
    }

    /// Zero hash (all bytes are 0)
    pub fn zero() -> Self {
        Self([0u8; 32])
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<[u8; 32]> for Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Tag byte marking a user account address
pub const USER_ADDRESS_TAG: u8 = 0x57;

/// Tag byte marking a contract account address
pub const CONTRACT_ADDRESS_TAG: u8 = 0x58;

/// The kind of account an address refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    User,
    Contract,
}

impl AddressKind {
    /// Tag byte embedded as the first byte of the address
    pub fn tag(&self) -> u8 {
        match self {
            AddressKind::User => USER_ADDRESS_TAG,
            AddressKind::Contract => CONTRACT_ADDRESS_TAG,
        }
    }
}

/// 20-byte address type
///
/// The first byte is a kind tag (user or contract account); the remaining
/// 19 bytes are derived from the account's public key or birth transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
pub struct Address([u8; 20]);

impl Address {
    /// Create a new address from byte array
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Create address from slice (panics if length != 20)
    pub fn from_slice(slice: &[u8]) -> Self {
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(slice);
        Self(bytes)
    }

    /// Derive an address from an uncompressed public key
    ///
    /// The content bytes are the last 19 bytes of the Keccak256 digest of the
    /// key material, prefixed with the kind tag.
    pub fn from_public_key(kind: AddressKind, public_key: &[u8]) -> Self {
        let digest = Keccak256::digest(public_key);
        let mut bytes = [0u8; 20];
        bytes[0] = kind.tag();
        bytes[1..].copy_from_slice(&digest[13..32]);
        Self(bytes)
    }

    /// Parse an address from bytes, validating length and kind tag
    pub fn parse_bytes(slice: &[u8]) -> CoreResult<Self> {
        if slice.len() != 20 {
            return Err(CoreError::InvalidAddress(hex::encode(slice)));
        }
        let addr = Self::from_slice(slice);
        addr.kind()?;
        Ok(addr)
    }

    /// The account kind encoded in the tag byte
    pub fn kind(&self) -> CoreResult<AddressKind> {
        match self.0[0] {
            USER_ADDRESS_TAG => Ok(AddressKind::User),
            CONTRACT_ADDRESS_TAG => Ok(AddressKind::Contract),
            _ => Err(CoreError::InvalidAddress(self.to_hex())),
        }
    }

    /// Whether this address refers to a contract account
    pub fn is_contract(&self) -> bool {
        self.0[0] == CONTRACT_ADDRESS_TAG
    }

    /// Get the underlying byte array
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(hex: &str) -> CoreResult<Self> {
        let bytes = hex::decode(hex)?;
        if bytes.len() != 20 {
            return Err(CoreError::InvalidAddress(hex.to_string()));
        }
        Ok(Self::from_slice(&bytes))
    }

    /// Zero address (all bytes are 0)
    pub fn zero() -> Self {
        Self([0u8; 20])
    }
}

impl Default for Address {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
