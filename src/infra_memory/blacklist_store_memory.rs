use crate::application_port::AuthError;
use crate::domain_model::UserId;
use crate::domain_port::{BlacklistStore, Clock};
use crate::infra_memory::ttl_map::TtlMap;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MemoryBlacklistStore {
    tokens: TtlMap<String, ()>,
    users: TtlMap<UserId, DateTime<Utc>>,
    unavailable: AtomicBool,
}

impl MemoryBlacklistStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: TtlMap::new(clock.clone()),
            users: TtlMap::new(clock),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: every call fails until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), AuthError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AuthError::Store("blacklist store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BlacklistStore for MemoryBlacklistStore {
    async fn blacklist_token(&self, jti: &str, ttl_secs: u64) -> Result<(), AuthError> {
        self.check()?;
        self.tokens.insert(jti.to_string(), (), ttl_secs);
        Ok(())
    }

    async fn is_token_blacklisted(&self, jti: &str) -> Result<bool, AuthError> {
        self.check()?;
        Ok(self.tokens.get(&jti.to_string()).is_some())
    }

    async fn blacklist_user(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
        ttl_secs: u64,
    ) -> Result<(), AuthError> {
        self.check()?;
        self.users.insert(user_id, since, ttl_secs);
        Ok(())
    }

    async fn get_user_blacklist_timestamp(
        &self,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>, AuthError> {
        self.check()?;
        Ok(self.users.get(&user_id))
    }
}
