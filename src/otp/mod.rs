//! One-time password codec: base32 secrets, HOTP/TOTP per RFC 4226/6238.

pub mod base32;
pub mod hotp;
pub mod totp;

pub use hotp::{hotp, HashAlgorithm};
pub use totp::{
    calc_totp, is_valid_authcode, is_valid_authcode_at, provisioning_uri, Secret, TotpConfig,
    DEFAULT_ALLOWANCE, DEFAULT_KEY_BITS, DEFAULT_STEP_SECONDS,
};
