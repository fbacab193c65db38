use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait UserSessionRepo: Send + Sync {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &UserSessionRecord,
    ) -> Result<(), AuthError>;

    async fn get_by_id(&self, id: UserSessionId) -> Result<Option<UserSessionRecord>, AuthError>;

    async fn get_by_refresh_token_id(
        &self,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError>;

    /// Same lookup inside `tx`, locking the row where the backend can.
    async fn get_by_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError>;

    async fn update_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
        refresh_token_id: RefreshTokenId,
    ) -> Result<(), AuthError>;

    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
    ) -> Result<(), AuthError>;

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
    ) -> Result<u64, AuthError>;
}
