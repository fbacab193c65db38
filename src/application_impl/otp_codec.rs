use crate::application_impl::credential_hasher::{Argon2Cost, argon2_hash, argon2_verify};
use crate::application_port::{AuthError, OtpCodec};
use argon2::Argon2;
use rand::Rng;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};

pub const DEFAULT_OTP_LENGTH: usize = 6;

pub struct Argon2OtpCodec {
    length: usize,
    argon2: Argon2<'static>,
}

impl Argon2OtpCodec {
    pub fn new(length: usize, cost: Argon2Cost) -> Result<Self, AuthError> {
        if length == 0 {
            return Err(AuthError::InternalError("otp length must be positive".into()));
        }
        Ok(Self {
            length,
            argon2: cost.build()?,
        })
    }
}

impl OtpCodec for Argon2OtpCodec {
    fn generate(&self) -> SecretString {
        let mut rng = OsRng;
        let code: String = (0..self.length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        SecretString::from(code)
    }

    fn hash(&self, code: &SecretString) -> Result<String, AuthError> {
        argon2_hash(&self.argon2, code.expose_secret().as_bytes())
    }

    fn verify(&self, code: &str, otp_hash: &str) -> Result<bool, AuthError> {
        if code.len() != self.length || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }
        argon2_verify(&self.argon2, code.as_bytes(), otp_hash)
    }
}
