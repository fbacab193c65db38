use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;

#[derive(Debug, Clone)]
pub struct ProfileRecord {
    pub user_id: UserId,
    pub profile: NewProfile,
}

#[async_trait::async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &NewProfile,
    ) -> Result<(), AuthError>;

    async fn get(&self, user_id: UserId) -> Result<Option<ProfileRecord>, AuthError>;
}

/// Masterdata lookups owned by another part of the product.
#[async_trait::async_trait]
pub trait ReferenceDataRepo: Send + Sync {
    async fn gender_exists(&self, code: &str) -> Result<bool, AuthError>;
}
