use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::StorageTx;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct TokenSubject {
    pub user_id: UserId,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct RotateInput {
    pub refresh_token: RefreshToken,
    /// Identity the caller claims, usually taken from its access token.
    pub claimed_user_id: Option<UserId>,
    pub client: ClientMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct RotateResult {
    pub user: UserSummary,
    pub tokens: AuthTokens,
}

#[derive(Debug, Clone)]
pub struct LogoutInput {
    pub refresh_token: RefreshToken,
    pub access_token: Option<AccessToken>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub struct RevokeAllResult {
    pub tokens_revoked: u64,
    pub sessions_revoked: u64,
}

#[async_trait::async_trait]
pub trait TokenService: Send + Sync {
    /// Mints a pair inside the caller's transaction; nothing is visible
    /// until the caller commits.
    async fn issue_tokens_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        subject: &TokenSubject,
        client: &ClientMeta,
    ) -> Result<AuthTokens, AuthError>;
    async fn issue_tokens(
        &self,
        subject: &TokenSubject,
        client: &ClientMeta,
    ) -> Result<AuthTokens, AuthError>;
    async fn rotate(&self, request: RotateInput) -> Result<RotateResult, AuthError>;
    async fn revoke(&self, request: LogoutInput) -> Result<(), AuthError>;
    async fn revoke_all(&self, user_id: UserId) -> Result<RevokeAllResult, AuthError>;
    async fn verify_access_token(&self, token: &AccessToken)
    -> Result<AccessTokenClaims, AuthError>;
}
