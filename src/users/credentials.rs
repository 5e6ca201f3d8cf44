use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use tracing::error;

use crate::config::CredentialsConfig;
use crate::error::{Result, UserError};

type HmacSha256 = Hmac<Sha256>;

/// Number of random bytes behind every remember token.
pub const REMEMBER_TOKEN_BYTES: usize = 32;

/// Password hashing and remember-token primitives, bound to the
/// process-wide pepper and HMAC key.
#[derive(Clone)]
pub struct Credentials {
    pepper: String,
    params: Params,
    mac: HmacSha256,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(config: &CredentialsConfig) -> Result<Self> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| {
                error!(error = %e, "invalid argon2 params");
                UserError::Crypto(e.to_string())
            })?;
        let mac = HmacSha256::new_from_slice(config.hmac_key.as_bytes())
            .map_err(|e| UserError::Crypto(e.to_string()))?;
        Ok(Self {
            pepper: config.pepper.clone(),
            params,
            mac,
        })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    fn peppered(&self, plain: &str) -> String {
        format!("{plain}{}", self.pepper)
    }

    pub fn hash_password(&self, plain: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(self.peppered(plain).as_bytes(), &salt)
            .map_err(|e| {
                error!(error = %e, "argon2 hash_password error");
                UserError::Crypto(e.to_string())
            })?
            .to_string();
        Ok(hash)
    }

    /// `Ok(false)` on mismatch; any other failure is a `Crypto` error.
    pub fn verify_password(&self, hash: &str, plain: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| {
            error!(error = %e, "argon2 parse hash error");
            UserError::Crypto(e.to_string())
        })?;
        match self
            .argon2()
            .verify_password(self.peppered(plain).as_bytes(), &parsed)
        {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(e) => {
                error!(error = %e, "argon2 verify_password error");
                Err(UserError::Crypto(e.to_string()))
            }
        }
    }

    pub fn generate_token(&self) -> Result<String> {
        random_string(REMEMBER_TOKEN_BYTES)
    }

    /// Keyed hash of a remember token; this is what gets stored and queried.
    pub fn digest_token(&self, token: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(token.as_bytes());
        URL_SAFE.encode(mac.finalize().into_bytes())
    }
}

fn random_bytes(n: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    OsRng.try_fill_bytes(&mut buf).map_err(|e| {
        error!(error = %e, "os random source failed");
        UserError::Crypto(e.to_string())
    })?;
    Ok(buf)
}

/// URL-safe base64 over `n` random bytes.
pub fn random_string(n: usize) -> Result<String> {
    Ok(URL_SAFE.encode(random_bytes(n)?))
}

#[cfg(test)]
pub(crate) fn test_credentials() -> Credentials {
    test_credentials_with("test-pepper", "test-hmac-key")
}

#[cfg(test)]
pub(crate) fn test_credentials_with(pepper: &str, hmac_key: &str) -> Credentials {
    Credentials::new(&CredentialsConfig {
        pepper: pepper.into(),
        hmac_key: hmac_key.into(),
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test params are valid")
}
