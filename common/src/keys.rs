// Copyright (c) 2019-2023 The Ferrocoin Foundation

//! Ed25519 keypairs and signature checking.
//!
//! Keys are derived deterministically from a secret phrase: the Sha3-256 hash
//! of the phrase is the signing-key seed. Public keys and signatures travel
//! as lowercase hex strings.

use crate::{fast_hash, NodeId};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// An ed25519 keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Derive a keypair from a secret phrase.
    pub fn from_secret_phrase(phrase: &str) -> Self {
        let seed = fast_hash(phrase.as_bytes());
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The hex encoding of the public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// The public key as a node identifier.
    pub fn node_id(&self) -> NodeId {
        NodeId(self.public_key_hex())
    }

    /// Sign a message, returning the hex encoding of the signature.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Check a hex signature made by the holder of a hex public key.
///
/// Returns false for malformed keys and signatures as well as for signatures
/// that do not verify; callers treat all three the same way.
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let key_bytes: [u8; 32] = match hex::decode(public_key_hex) {
        Ok(bytes) => match bytes.try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        },
        Err(_) => return false,
    };
    let key = match VerifyingKey::from_bytes(&key_bytes) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let sig_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    key.verify(message, &signature).is_ok()
}

#[cfg(test)]
mod keys_tests {
    use super::*;

    #[test]
    fn phrase_derivation_is_deterministic() {
        let a = KeyPair::from_secret_phrase("node0");
        let b = KeyPair::from_secret_phrase("node0");
        assert_eq!(a.public_key_hex(), b.public_key_hex());
        assert_ne!(
            a.public_key_hex(),
            KeyPair::from_secret_phrase("node1").public_key_hex()
        );
    }

    #[test]
    fn sign_and_verify() {
        let kp = KeyPair::from_secret_phrase("signer");
        let sig = kp.sign(b"payload");
        assert!(verify_signature(&kp.public_key_hex(), b"payload", &sig));
        assert!(!verify_signature(&kp.public_key_hex(), b"other", &sig));

        let other = KeyPair::from_secret_phrase("other");
        assert!(!verify_signature(&other.public_key_hex(), b"payload", &sig));
    }

    #[test]
    fn verify_rejects_garbage() {
        assert!(!verify_signature("zz", b"payload", "zz"));
        let kp = KeyPair::from_secret_phrase("signer");
        assert!(!verify_signature(&kp.public_key_hex(), b"payload", "abcd"));
    }
}
