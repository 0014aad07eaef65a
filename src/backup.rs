//! Backup-code generation and verification helpers.
//!
//! Backup codes are single-use recovery credentials, orthogonal to the
//! user's primary second factor. Codes are Argon2id-hashed with an optional
//! server-side pepper; the plaintext batch is returned exactly once at
//! generation time and never persisted.

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::{rngs::OsRng, Rng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Codes issued per batch.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Digits per code.
pub const BACKUP_CODE_LEN: usize = 8;

/// Whether a new batch replaces the stored set or extends it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum GenerateMode {
    Replace,
    Append,
}

/// A freshly generated batch: plaintext for one-time display plus the
/// hashes to persist.
#[derive(Debug)]
pub struct BackupCodeBatch {
    pub codes: Vec<String>,
    pub code_hashes: Vec<String>,
}

/// Hashing context carrying the optional pepper.
#[derive(Clone)]
pub struct BackupCodeHasher {
    pepper: Option<SecretString>,
}

impl BackupCodeHasher {
    #[must_use]
    pub fn new(pepper: Option<SecretString>) -> Self {
        Self { pepper }
    }

    /// Generate a batch of [`BACKUP_CODE_COUNT`] codes.
    ///
    /// # Errors
    /// Returns `Provisioning` if the hasher cannot be initialized or a code
    /// fails to hash.
    pub fn generate_batch(&self) -> AuthResult<BackupCodeBatch> {
        let mut rng = OsRng;
        self.generate_batch_with_rng(&mut rng)
    }

    fn generate_batch_with_rng<R: RngCore + ?Sized>(
        &self,
        rng: &mut R,
    ) -> AuthResult<BackupCodeBatch> {
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);
        let mut code_hashes = Vec::with_capacity(BACKUP_CODE_COUNT);
        for _ in 0..BACKUP_CODE_COUNT {
            let code = generate_code(rng);
            let hash = self.hash(&code)?;
            codes.push(code);
            code_hashes.push(hash);
        }
        Ok(BackupCodeBatch { codes, code_hashes })
    }

    /// Hash one normalized code to a PHC string.
    ///
    /// # Errors
    /// Returns `Provisioning` on hasher failure.
    pub fn hash(&self, code: &str) -> AuthResult<String> {
        let normalized = normalize_code(code)?;
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()?
            .hash_password(normalized.as_bytes(), &salt)
            .map_err(|_| AuthError::Provisioning("failed to hash backup code".into()))?
            .to_string();
        Ok(hash)
    }

    /// Verify a candidate against one stored hash.
    ///
    /// A malformed candidate verifies false rather than erroring; stored
    /// hashes that fail to parse are treated as non-matching.
    #[must_use]
    pub fn verify(&self, candidate: &str, stored_hash: &str) -> bool {
        let Ok(normalized) = normalize_code(candidate) else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        let Ok(argon2) = self.argon2() else {
            return false;
        };
        argon2
            .verify_password(normalized.as_bytes(), &parsed)
            .is_ok()
    }

    fn argon2(&self) -> AuthResult<Argon2<'_>> {
        match &self.pepper {
            Some(pepper) => Argon2::new_with_secret(
                pepper.expose_secret().as_bytes(),
                argon2::Algorithm::Argon2id,
                argon2::Version::V0x13,
                argon2::Params::default(),
            )
            .map_err(|_| AuthError::Provisioning("failed to initialize Argon2id".into())),
            None => Ok(Argon2::default()),
        }
    }
}

/// Normalize a submitted code: strip separators, require exactly
/// [`BACKUP_CODE_LEN`] digits.
///
/// # Errors
/// Returns `AuthenticationFailed` on anything that cannot be a code.
pub fn normalize_code(input: &str) -> AuthResult<String> {
    let normalized: String = input
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();

    if normalized.len() != BACKUP_CODE_LEN || !normalized.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::AuthenticationFailed);
    }

    Ok(normalized)
}

/// Format a code for display, split in the middle for readability.
#[must_use]
pub fn format_code(normalized: &str) -> String {
    if normalized.len() == BACKUP_CODE_LEN {
        format!(
            "{}-{}",
            &normalized[..BACKUP_CODE_LEN / 2],
            &normalized[BACKUP_CODE_LEN / 2..]
        )
    } else {
        normalized.to_string()
    }
}

fn generate_code<R: RngCore + ?Sized>(rng: &mut R) -> String {
    (0..BACKUP_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn hasher() -> BackupCodeHasher {
        BackupCodeHasher::new(Some(SecretString::from("pepper")))
    }

    #[test]
    fn batch_has_ten_numeric_codes() {
        let batch = hasher().generate_batch().unwrap();
        assert_eq!(batch.codes.len(), BACKUP_CODE_COUNT);
        assert_eq!(batch.code_hashes.len(), BACKUP_CODE_COUNT);
        for code in &batch.codes {
            assert_eq!(code.len(), BACKUP_CODE_LEN);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hasher = hasher();
        let batch = hasher.generate_batch().unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();
        assert!(hasher.verify(code, hash));
        assert!(!hasher.verify("00000000", hash) || code == "00000000");
    }

    #[test]
    fn pepper_changes_verification() {
        let hasher = hasher();
        let batch = hasher.generate_batch().unwrap();
        let code = batch.codes.first().unwrap();
        let hash = batch.code_hashes.first().unwrap();

        let other = BackupCodeHasher::new(Some(SecretString::from("different")));
        assert!(!other.verify(code, hash));
    }

    #[test]
    fn normalize_strips_separators() {
        assert_eq!(normalize_code("1234-5678").unwrap(), "12345678");
        assert_eq!(normalize_code(" 1234 5678 ").unwrap(), "12345678");
        assert!(normalize_code("1234567").is_err());
        assert!(normalize_code("1234567a").is_err());
    }

    #[test]
    fn format_groups_digits() {
        assert_eq!(format_code("12345678"), "1234-5678");
    }

    #[test]
    fn unpeppered_hasher_works() {
        let hasher = BackupCodeHasher::new(None);
        let hash = hasher.hash("12345678").unwrap();
        assert!(hasher.verify("1234-5678", &hash));
    }
}
