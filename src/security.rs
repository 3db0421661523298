//! Password encoding helpers for applications built on the engine.
//!
//! Passwords are hashed with PBKDF2-HMAC-SHA256 over a random salt and
//! stored as `salt$base64(hash)`. Verification re-derives the hash and
//! compares in constant time.

use base64::{prelude::BASE64_STANDARD, Engine};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

use crate::params::generate_random_string;

const SALT_LEN: usize = 16;
const ITERATIONS: u32 = 20_000;
const DIGEST_LEN: usize = 32;

/// Compare two strings without early exit on the first mismatch.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Derive the base64 PBKDF2 hash of `password` under `salt`.
pub fn hash_password(password: &str, salt: &str, iterations: u32) -> String {
    let mut derived = [0u8; DIGEST_LEN];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        iterations,
        &mut derived,
    );
    BASE64_STANDARD.encode(derived)
}

/// Hash `password` under a fresh random salt, producing `salt$hash`.
pub fn encode_password(password: &str) -> String {
    let salt = generate_random_string(SALT_LEN);
    let hashed = hash_password(password, &salt, ITERATIONS);
    format!("{salt}${hashed}")
}

/// Check `password` against an encoded `salt$hash` string.
pub fn check_password(password: &str, encoded: &str) -> bool {
    let (salt, hashed) = match encoded.split_once('$') {
        Some(parts) => parts,
        None => (encoded, ""),
    };
    constant_time_compare(&hash_password(password, salt, ITERATIONS), hashed)
}
