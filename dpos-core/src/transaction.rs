//! Transaction data structures and operations

use crate::{Address, AddressKind, ChainId, CoreError, CoreResult, Gas, Hash, Nonce, PayloadType, Timestamp, Wei};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Default minimum gas price accepted by the network
pub const TRANSACTION_GAS_PRICE: Wei = 1_000_000;

/// Hard ceiling on a transaction's gas limit
pub const TRANSACTION_MAX_GAS: Gas = 50_000_000_000;

/// Maximum accepted payload size in bytes
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Recoverable transaction signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature {
    /// Create new signature
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Convert to bytes (65 bytes total)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Create from bytes
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() != 65 {
            return Err(CoreError::BadSignature);
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = bytes[64];

        Ok(Self { r, s, v })
    }
}

/// Sign a 32-byte digest with a raw private key, returning r/s/v
pub(crate) fn sign_digest(digest: &Hash, private_key: &[u8]) -> CoreResult<Signature> {
    let secp = secp256k1::Secp256k1::new();
    let secret_key = secp256k1::SecretKey::from_slice(private_key)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let message = secp256k1::Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let sig = secp.sign_ecdsa_recoverable(&message, &secret_key);
    let (recovery_id, sig_bytes) = sig.serialize_compact();

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig_bytes[0..32]);
    s.copy_from_slice(&sig_bytes[32..64]);

    Ok(Signature::new(r, s, recovery_id as u8))
}

/// Recover the signer address of a digest from an r/s/v signature
pub(crate) fn recover_digest(digest: &Hash, signature: &Signature) -> CoreResult<Address> {
    let secp = secp256k1::Secp256k1::new();

    let recovery_id = secp256k1::ecdsa::RecoveryId::try_from(signature.v as i32)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let mut sig_bytes = [0u8; 64];
    sig_bytes[0..32].copy_from_slice(&signature.r);
    sig_bytes[32..64].copy_from_slice(&signature.s);

    let recoverable_sig =
        secp256k1::ecdsa::RecoverableSignature::from_compact(&sig_bytes, recovery_id)
            .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let message = secp256k1::Message::from_digest_slice(digest.as_bytes())
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    let public_key = secp
        .recover_ecdsa(&message, &recoverable_sig)
        .map_err(|e| CoreError::Crypto(e.to_string()))?;

    // Skip the leading 0x04 of the uncompressed encoding
    let pubkey_bytes = public_key.serialize_uncompressed();
    Ok(Address::from_public_key(AddressKind::User, &pubkey_bytes[1..]))
}

/// Transaction data structure
///
/// Immutable once signed; the hash is derived over every field except the
/// signature and fixed at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Transaction {
    /// Chain this transaction is valid on
    pub chain_id: ChainId,
    /// Sender address
    pub from: Address,
    /// Recipient address (contract address for deploy/call payloads)
    pub to: Address,
    /// Value to transfer in wei
    pub value: Wei,
    /// Per-sender monotonic nonce
    pub nonce: Nonce,
    /// Creation timestamp in seconds
    pub timestamp: Timestamp,
    /// Payload discriminator
    pub payload_type: PayloadType,
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Gas price in wei
    pub gas_price: Wei,
    /// Maximum gas to use for this transaction
    pub gas_limit: Gas,
    /// Derived transaction hash
    pub hash: Hash,
    /// Recoverable signature over the hash
    pub signature: Option<Signature>,
}

/// Helper struct for encoding the hashed portion of a transaction
#[derive(bincode::Encode)]
struct TransactionForHashing<'a> {
    chain_id: ChainId,
    from: &'a Address,
    to: &'a Address,
    value: Wei,
    nonce: Nonce,
    timestamp: Timestamp,
    payload_type: &'a PayloadType,
    payload: &'a Vec<u8>,
    gas_price: Wei,
    gas_limit: Gas,
}

impl Transaction {
    /// Create a new unsigned transaction
    ///
    /// Rejects gas limits above [`TRANSACTION_MAX_GAS`] and oversized
    /// payloads. The timestamp is taken from the system clock and the hash
    /// is computed immediately.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain_id: ChainId,
        from: Address,
        to: Address,
        value: Wei,
        nonce: Nonce,
        payload_type: PayloadType,
        payload: Vec<u8>,
        gas_price: Wei,
        gas_limit: Gas,
    ) -> CoreResult<Self> {
        if gas_limit > TRANSACTION_MAX_GAS {
            return Err(CoreError::InvalidGasLimit {
                max: TRANSACTION_MAX_GAS,
                got: gas_limit,
            });
        }

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CoreError::InvalidPayload(format!(
                "payload size {} exceeds {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();

        let mut tx = Self {
            chain_id,
            from,
            to,
            value,
            nonce,
            timestamp,
            payload_type,
            payload,
            gas_price,
            gas_limit,
            hash: Hash::zero(),
            signature: None,
        };
        tx.hash = tx.calculate_hash()?;
        Ok(tx)
    }

    /// Compute the transaction hash over every field except the signature
    pub fn calculate_hash(&self) -> CoreResult<Hash> {
        let hashable = TransactionForHashing {
            chain_id: self.chain_id,
            from: &self.from,
            to: &self.to,
            value: self.value,
            nonce: self.nonce,
            timestamp: self.timestamp,
            payload_type: &self.payload_type,
            payload: &self.payload,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
        };

        let encoded = bincode::encode_to_vec(&hashable, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Sign the transaction with a raw private key
    pub fn sign(&mut self, private_key: &[u8]) -> CoreResult<()> {
        self.signature = Some(sign_digest(&self.hash, private_key)?);
        Ok(())
    }

    /// Recover the sender address from the signature
    pub fn recover_sender(&self) -> CoreResult<Address> {
        let signature = self.signature.as_ref().ok_or(CoreError::Unsigned)?;
        recover_digest(&self.hash, signature)
    }

    /// Verify the transaction is internally consistent
    ///
    /// Checks that the stored hash matches the fields and that the signature
    /// recovers to the declared sender.
    pub fn verify_integrity(&self) -> CoreResult<()> {
        if self.calculate_hash()? != self.hash {
            return Err(CoreError::InvalidHash(self.hash.to_hex()));
        }

        let signer = self.recover_sender()?;
        if signer != self.from {
            return Err(CoreError::BadSignature);
        }

        Ok(())
    }

    /// Check this transaction's nonce against the sender's account nonce
    ///
    /// A transaction is only executable when its nonce is exactly one above
    /// the account nonce; lower nonces have already been consumed.
    pub fn check_nonce(&self, account_nonce: Nonce) -> CoreResult<()> {
        if self.nonce <= account_nonce {
            return Err(CoreError::NonceTooLow {
                expected: account_nonce + 1,
                got: self.nonce,
            });
        }
        Ok(())
    }
}
