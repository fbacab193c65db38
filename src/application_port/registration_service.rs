use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, NaiveDate, Utc};
use secrecy::SecretString;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct VerifyRegistrationResult {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub completion_token: CompletionToken,
    pub completion_token_expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SetPasswordInput {
    pub session_id: SessionId,
    pub completion_token: CompletionToken,
    pub password: SecretString,
    pub password_confirmation: SecretString,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetPasswordResult {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub completion_token: CompletionToken,
    pub completion_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CompleteProfileInput {
    pub session_id: SessionId,
    pub completion_token: CompletionToken,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender_code: String,
    pub client: ClientMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationResult {
    pub user: UserSummary,
    pub tokens: AuthTokens,
}

#[async_trait::async_trait]
pub trait RegistrationService: Send + Sync {
    async fn initiate(&self, request: InitiateInput) -> Result<InitiateResult, AuthError>;
    async fn resend_otp(&self, session_id: SessionId) -> Result<ResendResult, AuthError>;
    async fn verify_otp(
        &self,
        request: VerifyOtpInput,
    ) -> Result<VerifyRegistrationResult, AuthError>;
    async fn set_password(&self, request: SetPasswordInput)
    -> Result<SetPasswordResult, AuthError>;
    async fn complete_profile(
        &self,
        request: CompleteProfileInput,
    ) -> Result<RegistrationResult, AuthError>;
    async fn session_status(&self, session_id: SessionId) -> Result<SessionView, AuthError>;
}
