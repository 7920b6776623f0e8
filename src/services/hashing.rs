use bcrypt::{hash, verify, DEFAULT_COST};

use crate::errors::Result;

/// One-way hash for passwords and one-time codes. bcrypt keeps its own salt
/// inside the output string, so two hashes of the same input never match.
pub fn hash_secret(plain: &str) -> Result<String> {
    Ok(hash(plain, DEFAULT_COST)?)
}

/// bcrypt's verify re-derives the hash and compares internally, which also
/// gives us the constant-time comparison for OTP codes.
pub fn verify_secret(plain: &str, hashed: &str) -> Result<bool> {
    Ok(verify(plain, hashed)?)
}
