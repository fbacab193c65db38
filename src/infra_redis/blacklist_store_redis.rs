use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

pub struct RedisBlacklistStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBlacklistStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisBlacklistStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn token_key(&self, jti: &str) -> String {
        format!("{}:jti:{}", self.prefix, jti)
    }

    fn user_key(&self, user_id: UserId) -> String {
        format!("{}:user:{}", self.prefix, user_id)
    }
}

#[async_trait::async_trait]
impl BlacklistStore for RedisBlacklistStore {
    async fn blacklist_token(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.token_key(jti), 1u8, ttl_secs.max(1))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        let mut conn = self.conn.clone();
        conn.exists(self.token_key(jti))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn blacklist_user(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Result<(), AuthError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(self.user_key(user_id), since.timestamp(), ttl_secs.max(1))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_user_blacklist_timestamp(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        let mut conn = self.conn.clone();
        let since: Option<i64> = conn
            .get(self.user_key(user_id))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        since
            .map(|secs| {
                DateTime::from_timestamp(secs, 0)
                    .ok_or_else(|| AuthError::Store(format!("bad blacklist timestamp {secs}")))
            })
            .transpose()
    }
}
