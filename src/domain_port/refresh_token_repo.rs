use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[async_trait::async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &RefreshTokenRecord,
    ) -> Result<(), AuthError>;

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;

    async fn get_by_id(&self, id: RefreshTokenId) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Revokes only a token that is not revoked yet. `false` means someone
    /// else got there first.
    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        reason: RevokeReason,
    ) -> Result<bool, AuthError>;

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError>;

    async fn revoke_by_family_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        family_id: TokenFamilyId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError>;

    async fn set_replaced_by_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        replaced_by: RefreshTokenId,
    ) -> Result<(), AuthError>;
}
