use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait BlacklistStore: Send + Sync {
    async fn blacklist_token(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthError>;
    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, AuthError>;
    /// Any access token issued before `since` is invalid for this user.
    async fn blacklist_user(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Result<(), AuthError>;
    async fn get_user_blacklist_timestamp(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, AuthError>;
}
