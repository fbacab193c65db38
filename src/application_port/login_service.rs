use crate::application_port::*;
use crate::domain_model::*;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub user: UserSummary,
    pub tokens: AuthTokens,
}

#[async_trait::async_trait]
pub trait LoginService: Send + Sync {
    async fn initiate(&self, request: InitiateInput) -> Result<InitiateResult, AuthError>;
    async fn resend_otp(&self, session_id: SessionId) -> Result<ResendResult, AuthError>;
    async fn verify_otp(&self, request: VerifyOtpInput) -> Result<LoginResult, AuthError>;
    async fn session_status(&self, session_id: SessionId) -> Result<SessionView, AuthError>;
}
