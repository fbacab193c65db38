use crate::application_port::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

const RATE_LIMIT_INCR: &str = include_str!("rate_limit_incr.lua");

pub struct RedisRateLimitStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisRateLimitStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRateLimitStore {
            conn,
            prefix: prefix.into(),
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait::async_trait]
impl RateLimitStore for RedisRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64, AuthError> {
        let mut conn = self.conn.clone();
        let count: u64 = Script::new(RATE_LIMIT_INCR)
            .key(self.key(key))
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(count)
    }

    async fn get(&self, key: &str) -> Result<u64, AuthError> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = conn
            .get(self.key(key))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(count.unwrap_or(0))
    }

    async fn ttl(&self, key: &str) -> Result<u64, AuthError> {
        let mut conn = self.conn.clone();
        // -2 for a missing key, -1 for one without expiry.
        let ttl: i64 = conn
            .ttl(self.key(key))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(ttl.max(0) as u64)
    }
}
