//! RFC 4648 base32 without padding, as used for authenticator shared secrets.

use crate::error::{AuthError, AuthResult};

const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Encode bytes with the RFC 4648 alphabet (`A-Z2-7`), no `=` padding.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(5) * 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            let index = ((buffer >> bits) & 0x1f) as usize;
            out.push(ALPHABET[index] as char);
        }
    }

    if bits > 0 {
        let index = ((buffer << (5 - bits)) & 0x1f) as usize;
        out.push(ALPHABET[index] as char);
    }

    out
}

/// Decode a base32 string produced by [`encode`].
///
/// Lowercase input is accepted; trailing `=` padding is tolerated. Any other
/// character outside the alphabet fails with [`AuthError::InvalidEncoding`].
///
/// # Errors
/// Returns `InvalidEncoding` on characters outside `A-Z2-7`.
pub fn decode(encoded: &str) -> AuthResult<Vec<u8>> {
    let trimmed = encoded.trim_end_matches('=');
    let mut out = Vec::with_capacity(trimmed.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for ch in trimmed.chars() {
        let value = match ch.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u32 - 'A' as u32,
            c @ '2'..='7' => c as u32 - '2' as u32 + 26,
            _ => return Err(AuthError::InvalidEncoding),
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(((buffer >> bits) & 0xff) as u8);
        }
    }

    Ok(out)
}
