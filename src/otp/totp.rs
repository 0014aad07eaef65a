//! TOTP per RFC 6238 on top of the HOTP core, plus secret generation and
//! the `otpauth://` provisioning URI contract.

use rand::{rngs::OsRng, RngCore};
use url::form_urlencoded::byte_serialize;

use crate::clock::unix_now;
use crate::error::AuthResult;
use crate::otp::base32;
use crate::otp::hotp::{check_hotp, hotp, HashAlgorithm};

/// Default secret size in bits.
pub const DEFAULT_KEY_BITS: u32 = 160;

/// Default time step in seconds.
pub const DEFAULT_STEP_SECONDS: i64 = 30;

/// Default drift allowance in steps, checked on both sides of "now"
/// (4 steps of 30 s on each side, so roughly two minutes of skew).
pub const DEFAULT_ALLOWANCE: i64 = 4;

/// TOTP parameters. Defaults interoperate with stock authenticator apps.
#[derive(Clone, Copy, Debug)]
pub struct TotpConfig {
    pub digits: u32,
    pub step_seconds: i64,
    pub allowance: i64,
    pub algorithm: HashAlgorithm,
}

impl Default for TotpConfig {
    fn default() -> Self {
        Self {
            digits: 6,
            step_seconds: DEFAULT_STEP_SECONDS,
            allowance: DEFAULT_ALLOWANCE,
            algorithm: HashAlgorithm::Sha1,
        }
    }
}

/// A shared TOTP secret, held base32-encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Generate a fresh secret of `bit_size` bits from the OS RNG.
    #[must_use]
    pub fn generate(bit_size: u32) -> Self {
        let mut bytes = vec![0u8; (bit_size as usize).div_ceil(8)];
        OsRng.fill_bytes(&mut bytes);
        Self(base32::encode(&bytes))
    }

    /// Wrap an existing base32-encoded secret, validating the encoding.
    ///
    /// # Errors
    /// Returns `InvalidEncoding` when the input is not valid base32.
    pub fn from_base32(encoded: &str) -> AuthResult<Self> {
        base32::decode(encoded)?;
        Ok(Self(encoded.to_uppercase()))
    }

    /// The base32 form, as shown to the user and embedded in the URI.
    #[must_use]
    pub fn as_base32(&self) -> &str {
        &self.0
    }

    /// Raw key bytes.
    ///
    /// # Errors
    /// Returns `InvalidEncoding` if the stored form was corrupted.
    pub fn bytes(&self) -> AuthResult<Vec<u8>> {
        base32::decode(&self.0)
    }
}

impl Default for Secret {
    fn default() -> Self {
        Self::generate(DEFAULT_KEY_BITS)
    }
}

/// Compute the code for a given time step.
///
/// # Errors
/// Returns `InvalidEncoding` on a malformed secret.
pub fn calc_totp(secret: &Secret, step_count: u64, config: &TotpConfig) -> AuthResult<String> {
    let key = secret.bytes()?;
    Ok(hotp(&key, step_count, config.digits, config.algorithm))
}

/// Verify a candidate against the drift window around the current time.
///
/// See [`is_valid_authcode_at`].
///
/// # Errors
/// Returns `InvalidEncoding` on a malformed secret.
pub fn is_valid_authcode(secret: &Secret, candidate: &str) -> AuthResult<Option<i64>> {
    is_valid_authcode_at(secret, candidate, unix_now(), &TotpConfig::default())
}

/// Verify a candidate against steps `-allowance..=+allowance` from `now`,
/// trying the smallest |offset| first, and return the matched absolute step.
///
/// The window tolerates clock drift only; it is not a replay guard. Callers
/// that need replay protection must persist the returned step and reject
/// non-increasing values (the login flow does).
///
/// # Errors
/// Returns `InvalidEncoding` on a malformed secret.
pub fn is_valid_authcode_at(
    secret: &Secret,
    candidate: &str,
    now: i64,
    config: &TotpConfig,
) -> AuthResult<Option<i64>> {
    let candidate = candidate.trim().replace([' ', '-'], "");
    if candidate.len() != config.digits as usize || !candidate.bytes().all(|b| b.is_ascii_digit())
    {
        return Ok(None);
    }

    let key = secret.bytes()?;
    let base = current_step(now, config);

    for offset in 0..=config.allowance {
        for step in [base + offset, base - offset] {
            if step < 0 {
                continue;
            }
            #[allow(clippy::cast_sign_loss)]
            if check_hotp(&key, step as u64, &candidate, config.digits, config.algorithm) {
                return Ok(Some(step));
            }
            if offset == 0 {
                // +0 and -0 are the same step.
                break;
            }
        }
    }

    Ok(None)
}

/// Build the standard `otpauth://totp/{issuer}:{account}?...` URI consumed
/// by authenticator apps for QR provisioning.
#[must_use]
pub fn provisioning_uri(
    secret: &Secret,
    issuer: &str,
    account: &str,
    config: &TotpConfig,
) -> String {
    format!(
        "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm={}&digits={}&period={}",
        escape(issuer),
        escape(account),
        secret.as_base32(),
        escape(issuer),
        config.algorithm.as_str(),
        config.digits,
        config.step_seconds,
    )
}

fn escape(value: &str) -> String {
    // byte_serialize is form encoding; otpauth consumers expect %20 for
    // spaces, not '+'.
    let encoded: String = byte_serialize(value.as_bytes()).collect();
    encoded.replace('+', "%20")
}

pub(crate) fn current_step(now: i64, config: &TotpConfig) -> i64 {
    now.div_euclid(config.step_seconds)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn cfg() -> TotpConfig {
        TotpConfig::default()
    }

    #[test]
    fn generated_secret_has_expected_size() {
        let secret = Secret::generate(160);
        assert_eq!(secret.bytes().unwrap().len(), 20);
        // 20 bytes -> 32 base32 characters
        assert_eq!(secret.as_base32().len(), 32);
    }

    #[test]
    fn round_trip_current_step() {
        let secret = Secret::generate(160);
        let step = current_step(NOW, &cfg());
        let code = calc_totp(&secret, step as u64, &cfg()).unwrap();
        let matched = is_valid_authcode_at(&secret, &code, NOW, &cfg()).unwrap();
        assert_eq!(matched, Some(step));
    }

    #[test]
    fn accepts_codes_within_allowance() {
        let secret = Secret::generate(160);
        let step = current_step(NOW, &cfg());
        for offset in [-4i64, -1, 1, 4] {
            let code = calc_totp(&secret, (step + offset) as u64, &cfg()).unwrap();
            let matched = is_valid_authcode_at(&secret, &code, NOW, &cfg()).unwrap();
            assert_eq!(matched, Some(step + offset), "offset {offset}");
        }
    }

    #[test]
    fn rejects_code_outside_allowance() {
        let secret = Secret::generate(160);
        let step = current_step(NOW, &cfg());
        let code = calc_totp(&secret, (step + DEFAULT_ALLOWANCE + 1) as u64, &cfg()).unwrap();
        // A code from the next-but-one window may collide with an in-window
        // code with probability ~9/10^6 per offset; regenerate secrets would
        // make the test flaky-proof but the probability is negligible.
        assert_eq!(
            is_valid_authcode_at(&secret, &code, NOW, &cfg()).unwrap(),
            None
        );
    }

    #[test]
    fn rejects_malformed_candidates() {
        let secret = Secret::generate(160);
        assert_eq!(
            is_valid_authcode_at(&secret, "12345", NOW, &cfg()).unwrap(),
            None
        );
        assert_eq!(
            is_valid_authcode_at(&secret, "12345a", NOW, &cfg()).unwrap(),
            None
        );
    }

    #[test]
    fn candidate_formatting_is_tolerated() {
        let secret = Secret::generate(160);
        let step = current_step(NOW, &cfg());
        let code = calc_totp(&secret, step as u64, &cfg()).unwrap();
        let spaced = format!("{} {}", &code[..3], &code[3..]);
        assert!(is_valid_authcode_at(&secret, &spaced, NOW, &cfg())
            .unwrap()
            .is_some());
    }

    #[test]
    fn secret_from_base32_validates() {
        assert!(Secret::from_base32("MZXW6YTBOI").is_ok());
        assert!(Secret::from_base32("not base32!").is_err());
    }

    #[test]
    fn provisioning_uri_shape() {
        let secret = Secret::from_base32("MZXW6YTBOI").unwrap();
        let uri = provisioning_uri(&secret, "Tessera", "user@example.com", &cfg());
        assert!(uri.starts_with("otpauth://totp/Tessera:user%40example.com?"));
        assert!(uri.contains("secret=MZXW6YTBOI"));
        assert!(uri.contains("issuer=Tessera"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
        assert!(uri.contains("algorithm=SHA1"));
    }
}
