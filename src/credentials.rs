//! Password digests
//!
//! Passwords are never stored. The store keeps a SHA-256 digest and login
//! compares digests.

use sha2::{Digest, Sha256};

/// Size of a stored password digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Hash a plaintext password
pub fn password_digest(password: &str) -> [u8; DIGEST_LEN] {
    Sha256::digest(password.as_bytes()).into()
}

/// Compare a plaintext password against a stored digest
pub fn verify_password(password: &str, stored: &[u8]) -> bool {
    let candidate = password_digest(password);
    // Constant-time over the digest length
    stored.len() == DIGEST_LEN
        && candidate
            .iter()
            .zip(stored)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
