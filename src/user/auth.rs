//! Password hashing

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

#[cfg(not(feature = "test-fast-hasher"))]
fn argon2() -> Result<Argon2<'static>> {
    Ok(Argon2::default())
}

/// Minimal cost parameters, only meant to keep test suites fast.
#[cfg(feature = "test-fast-hasher")]
fn argon2() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(8, 1, 1, None).map_err(|err| anyhow!("{}", err))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

pub fn generate_b64_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Returns the PHC string of `plain` hashed with the given salt.
pub fn hash<T: AsRef<str>>(plain: &[u8], b64_salt: T) -> Result<String> {
    let salt = SaltString::from_b64(b64_salt.as_ref()).map_err(|err| anyhow!("{}", err))?;
    let hash_string = argon2()?
        .hash_password(plain, &salt)
        .map_err(|err| anyhow!("{}", err))?
        .to_string();
    Ok(hash_string)
}

pub fn hash_password(plain: &str) -> Result<String> {
    hash(plain.as_bytes(), generate_b64_salt())
}

/// Cost parameters are read back from the PHC string, so hashes made with
/// either parameter set verify.
pub fn verify<T: AsRef<str>>(plain_pw: &[u8], target_hash: T) -> Result<bool> {
    let password_hash =
        PasswordHash::new(target_hash.as_ref()).map_err(|err| anyhow!("{}", err))?;
    Ok(Argon2::default()
        .verify_password(plain_pw, &password_hash)
        .is_ok())
}
