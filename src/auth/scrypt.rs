//! Password hash format facade (C13): `$s1$NNrrpp$salt$hash`, where `NN`,
//! `rr`, `pp` are the SCrypt `log2(N)`, `r`, and `p` cost parameters as
//! two-digit decimal, and `salt`/`hash` are standard base64.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as base64_standard;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

const PREFIX: &str = "$s1$";
const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ScryptError {
    #[error("malformed scrypt hash string")]
    Malformed,
    #[error("invalid scrypt parameters: {0}")]
    InvalidParams(#[from] scrypt::errors::InvalidParams),
    #[error("invalid scrypt output length: {0}")]
    InvalidOutputLen(#[from] scrypt::errors::InvalidOutputLen),
}

#[derive(Debug, Clone, Copy)]
pub struct ScryptParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for ScryptParams {
    fn default() -> Self {
        ScryptParams { log_n: 14, r: 8, p: 1 }
    }
}

pub fn hash_password(password: &str, params: ScryptParams) -> Result<String, ScryptError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    hash_with_salt(password, &salt, params)
}

fn hash_with_salt(password: &str, salt: &[u8], params: ScryptParams) -> Result<String, ScryptError> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, OUTPUT_LEN)?;
    let mut output = [0u8; OUTPUT_LEN];
    scrypt::scrypt(password.as_bytes(), salt, &scrypt_params, &mut output)?;

    Ok(format!(
        "{PREFIX}{:02}{:02}{:02}${}${}",
        params.log_n,
        params.r,
        params.p,
        base64_standard.encode(salt),
        base64_standard.encode(output),
    ))
}

pub fn verify_password(password: &str, stored: &str) -> Result<bool, ScryptError> {
    let (params, salt, expected) = parse(stored)?;
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, expected.len())?;
    let mut actual = vec![0u8; expected.len()];
    scrypt::scrypt(password.as_bytes(), &salt, &scrypt_params, &mut actual)?;

    Ok(bool::from(actual.as_slice().ct_eq(&expected)))
}

fn parse(stored: &str) -> Result<(ScryptParams, Vec<u8>, Vec<u8>), ScryptError> {
    let rest = stored.strip_prefix(PREFIX).ok_or(ScryptError::Malformed)?;
    let mut parts = rest.splitn(3, '$');
    let params_str = parts.next().ok_or(ScryptError::Malformed)?;
    let salt_str = parts.next().ok_or(ScryptError::Malformed)?;
    let hash_str = parts.next().ok_or(ScryptError::Malformed)?;

    if params_str.len() != 6 {
        return Err(ScryptError::Malformed);
    }
    let log_n: u8 = params_str[0..2].parse().map_err(|_| ScryptError::Malformed)?;
    let r: u32 = params_str[2..4].parse().map_err(|_| ScryptError::Malformed)?;
    let p: u32 = params_str[4..6].parse().map_err(|_| ScryptError::Malformed)?;

    let salt = base64_standard.decode(salt_str).map_err(|_| ScryptError::Malformed)?;
    let hash = base64_standard.decode(hash_str).map_err(|_| ScryptError::Malformed)?;

    Ok((ScryptParams { log_n, r, p }, salt, hash))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_correct_password() {
        let stored = hash_password("hunter2", ScryptParams { log_n: 4, r: 1, p: 1 }).unwrap();
        assert!(stored.starts_with("$s1$040101$"));
        assert!(verify_password("hunter2", &stored).unwrap());
    }

    #[test]
    fn rejects_wrong_password() {
        let stored = hash_password("hunter2", ScryptParams { log_n: 4, r: 1, p: 1 }).unwrap();
        assert!(!verify_password("wrong", &stored).unwrap());
    }

    #[test]
    fn rejects_malformed_stored_hash() {
        assert!(matches!(verify_password("x", "not-a-hash"), Err(ScryptError::Malformed)));
        assert!(matches!(verify_password("x", "$s1$bad$salt$hash"), Err(ScryptError::Malformed)));
    }
}
