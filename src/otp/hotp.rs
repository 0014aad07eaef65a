//! HOTP per RFC 4226: HMAC over a big-endian counter with dynamic truncation.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

/// HMAC hash function for code derivation.
///
/// SHA1 is the RFC 6238 default and what authenticator apps expect; the
/// larger variants are supported for deployments that opt in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA1",
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
        }
    }
}

/// Compute an HOTP code for a counter value, zero-padded to `digits`.
#[must_use]
pub fn hotp(secret: &[u8], counter: u64, digits: u32, algorithm: HashAlgorithm) -> String {
    let mac = compute_hmac(secret, &counter.to_be_bytes(), algorithm);
    let code = truncate(&mac, digits);
    format!("{code:0width$}", width = digits as usize)
}

/// Compare a candidate against the code for one counter value.
///
/// Constant-time on the code bytes so the comparison itself does not leak
/// how many leading digits matched.
#[must_use]
pub fn check_hotp(
    secret: &[u8],
    counter: u64,
    candidate: &str,
    digits: u32,
    algorithm: HashAlgorithm,
) -> bool {
    let expected = hotp(secret, counter, digits, algorithm);
    if candidate.len() != expected.len() {
        return false;
    }
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn compute_hmac(secret: &[u8], message: &[u8], algorithm: HashAlgorithm) -> Vec<u8> {
    match algorithm {
        HashAlgorithm::Sha1 => {
            // HMAC accepts keys of any length.
            let mut mac = Hmac::<Sha1>::new_from_slice(secret).expect("HMAC key of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC key of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
        HashAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(secret).expect("HMAC key of any length");
            mac.update(message);
            mac.finalize().into_bytes().to_vec()
        }
    }
}

/// RFC 4226 §5.3 dynamic truncation: the low nibble of the last byte picks
/// the offset of a 31-bit big-endian integer within the MAC.
fn truncate(mac: &[u8], digits: u32) -> u32 {
    let offset = (mac.last().copied().unwrap_or(0) & 0x0f) as usize;
    let code = u32::from_be_bytes([
        mac.get(offset).copied().unwrap_or(0) & 0x7f,
        mac.get(offset + 1).copied().unwrap_or(0),
        mac.get(offset + 2).copied().unwrap_or(0),
        mac.get(offset + 3).copied().unwrap_or(0),
    ]);
    code % 10_u32.pow(digits)
}
