use crate::application_port::AuthError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct RefreshToken(pub String);

/// Single-purpose credential handed out between registration steps.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionToken(pub String);

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
    pub session_id: UserSessionId,
}

#[derive(Debug, Clone)]
pub struct AccessSubject {
    pub user_id: UserId,
    pub session_id: UserSessionId,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct IssuedAccessToken {
    pub token: AccessToken,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AccessTokenClaims {
    pub user_id: UserId,
    pub session_id: UserSessionId,
    pub jti: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RefreshTokenClaims {
    pub user_id: UserId,
    pub session_id: UserSessionId,
    pub token_id: RefreshTokenId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CompletionClaims {
    pub session_id: SessionId,
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies the three token kinds under one signing configuration.
#[async_trait::async_trait]
pub trait TokenCodec: Send + Sync {
    async fn issue_access_token(
        &self,
        subject: &AccessSubject,
    ) -> Result<IssuedAccessToken, AuthError>;
    async fn issue_refresh_token(
        &self,
        user: UserId,
        session: UserSessionId,
        token_id: RefreshTokenId,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError>;
    async fn issue_completion_token(
        &self,
        session_id: SessionId,
        email: &str,
    ) -> Result<(CompletionToken, DateTime<Utc>), AuthError>;
    async fn verify_access_token(&self, token: &AccessToken)
    -> Result<AccessTokenClaims, AuthError>;
    /// Checks signature, issuer and audience only. Expiry is judged against
    /// the stored record so that a replayed expired token is still reported
    /// by its stored state.
    async fn decode_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenClaims, AuthError>;
    async fn verify_completion_token(
        &self,
        token: &CompletionToken,
    ) -> Result<CompletionClaims, AuthError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError>;
    async fn verify_password(&self, password: &str, password_hash: &str)
    -> Result<bool, AuthError>;
}

/// Numeric one-time codes. The plaintext only ever leaves as a
/// `SecretString` destined for the mailer.
pub trait OtpCodec: Send + Sync {
    fn generate(&self) -> SecretString;
    fn hash(&self, code: &SecretString) -> Result<String, AuthError>;
    /// A mismatch is `Ok(false)`, not an error.
    fn verify(&self, code: &str, otp_hash: &str) -> Result<bool, AuthError>;
}
