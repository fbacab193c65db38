use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::repo_tx::StorageTx;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct SecurityStateRecord {
    pub user_id: UserId,
    pub failed_login_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub password_changed_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl SecurityStateRecord {
    pub fn initial(user_id: UserId, password_changed_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            failed_login_count: 0,
            locked_until: None,
            password_changed_at: Some(password_changed_at),
            last_login_at: None,
        }
    }
}

#[async_trait::async_trait]
pub trait AuthRepo: Send + Sync {
    /// Insert a row. The `user_id` row must already exist (FK).
    async fn create_credentials_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), AuthError>;

    async fn create_security_state_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        state: &SecurityStateRecord,
    ) -> Result<(), AuthError>;

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), AuthError>;
}
