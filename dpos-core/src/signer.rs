//! Signing seam used by the consensus engine and account surface

use crate::transaction::{recover_digest, sign_digest, Signature};
use crate::{Address, AddressKind, CoreError, CoreResult, Hash};

/// Capability to sign digests on behalf of one address
///
/// The key store behind this trait is an external collaborator; the node
/// core only ever sees the narrow signing capability.
pub trait Signer: Send + Sync {
    /// The address this signer signs for
    fn address(&self) -> Address;

    /// Produce a recoverable signature over a 32-byte digest
    fn sign(&self, digest: &Hash) -> CoreResult<Signature>;
}

/// In-process signer holding a raw secp256k1 secret key
#[derive(Clone)]
pub struct KeypairSigner {
    secret: [u8; 32],
    address: Address,
}

impl KeypairSigner {
    /// Build a signer from raw secret-key bytes
    pub fn from_secret_bytes(secret: &[u8]) -> CoreResult<Self> {
        let secp = secp256k1::Secp256k1::new();
        let secret_key = secp256k1::SecretKey::from_slice(secret)
            .map_err(|e| CoreError::Crypto(e.to_string()))?;
        let public_key = secp256k1::PublicKey::from_secret_key(&secp, &secret_key);

        let pubkey_bytes = public_key.serialize_uncompressed();
        let address = Address::from_public_key(AddressKind::User, &pubkey_bytes[1..]);

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(secret);
        Ok(Self {
            secret: bytes,
            address,
        })
    }
}

impl Signer for KeypairSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, digest: &Hash) -> CoreResult<Signature> {
        sign_digest(digest, &self.secret)
    }
}

/// Recover the address that signed a digest
pub fn recover_signer(digest: &Hash, signature: &Signature) -> CoreResult<Address> {
    recover_digest(digest, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_round_trip() {
        let signer = KeypairSigner::from_secret_bytes(&[0x42; 32]).unwrap();
        let digest = Hash::digest(b"payload");

        let sig = signer.sign(&digest).unwrap();
        assert_eq!(recover_signer(&digest, &sig).unwrap(), signer.address());
    }

    #[test]
    fn test_signer_address_is_user_kind() {
        let signer = KeypairSigner::from_secret_bytes(&[0x42; 32]).unwrap();
        assert_eq!(signer.address().kind().unwrap(), AddressKind::User);
    }

    #[test]
    fn test_rejects_invalid_secret() {
        assert!(KeypairSigner::from_secret_bytes(&[0u8; 32]).is_err());
        assert!(KeypairSigner::from_secret_bytes(&[1u8; 16]).is_err());
    }
}
