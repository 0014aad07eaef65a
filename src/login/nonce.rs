//! Login challenge nonces.
//!
//! A nonce binds the password step to the second-factor step. The raw token
//! travels to the client once; only its SHA-256 digest is stored, so a store
//! dump cannot be replayed as a live challenge.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::otp::base32;
use crate::store::StoredCode;

/// Raw token entropy in bytes.
const NONCE_BYTES: usize = 32;

/// A freshly minted challenge: raw token for the client, hashed record for
/// the store.
pub struct MintedNonce {
    pub token: String,
    pub record: StoredCode,
}

/// Mint a new challenge nonce expiring at `expires_at`.
#[must_use]
pub fn mint(expires_at: i64) -> MintedNonce {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = base32::encode(&bytes);
    let record = StoredCode {
        digest: digest(&token),
        expires_at,
    };
    MintedNonce { token, record }
}

/// SHA-256 digest of a raw token, the stored and compared form.
#[must_use]
pub fn digest(token: &str) -> Vec<u8> {
    Sha256::digest(token.as_bytes()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_record_matches_token_digest() {
        let minted = mint(1_700_000_000);
        assert_eq!(minted.record.digest, digest(&minted.token));
        assert_eq!(minted.record.expires_at, 1_700_000_000);
    }

    #[test]
    fn tokens_are_unique() {
        let first = mint(0);
        let second = mint(0);
        assert_ne!(first.token, second.token);
    }
}
