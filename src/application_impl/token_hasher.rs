use crate::application_port::AuthError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Keyed one-way hash for refresh and completion tokens. Lookups use the
/// hex digest; comparisons go through the MAC's constant-time check.
pub struct HmacTokenHasher {
    key: Vec<u8>,
}

impl HmacTokenHasher {
    pub fn new(key: Vec<u8>) -> Self {
        Self { key }
    }

    fn mac(&self, token: &str) -> Result<HmacSha256, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| AuthError::InternalError(format!("hmac key: {e}")))?;
        mac.update(token.as_bytes());
        Ok(mac)
    }

    pub fn hash(&self, token: &str) -> Result<String, AuthError> {
        Ok(hex::encode(self.mac(token)?.finalize().into_bytes()))
    }

    pub fn matches(&self, token: &str, expected_hex: &str) -> Result<bool, AuthError> {
        let Ok(expected) = hex::decode(expected_hex) else {
            return Ok(false);
        };
        Ok(self.mac(token)?.verify_slice(&expected).is_ok())
    }
}
