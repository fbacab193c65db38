use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_redis::json_session::{JsonSessions, patch_fields};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

const EMAIL_UNLOCK: &str = include_str!("email_unlock.lua");

pub struct RedisRegistrationStore {
    sessions: JsonSessions,
    prefix: String,
}

impl RedisRegistrationStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisRegistrationStore {
            sessions: JsonSessions::new(conn),
            prefix: prefix.into(),
        }
    }

    fn session_key(&self, id: SessionId) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    fn password_key(&self, id: SessionId) -> String {
        format!("{}:password:{}", self.prefix, id)
    }

    fn email_key(&self, email: &str) -> String {
        format!("{}:email:{}", self.prefix, email)
    }
}

#[async_trait::async_trait]
impl RegistrationSessionStore for RedisRegistrationStore {
    async fn create(&self, session: &RegistrationSession, ttl_secs: u64) -> Result<(), AuthError> {
        self.sessions
            .create(&self.session_key(session.session_id), session, ttl_secs)
            .await
    }

    async fn get(&self, id: SessionId) -> Result<Option<RegistrationSession>, AuthError> {
        self.sessions.get(&self.session_key(id)).await
    }

    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError> {
        let fields = patch_fields(patch, true)?;
        self.sessions
            .patch(&self.session_key(id), patch, &fields)
            .await
    }

    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError> {
        self.sessions.record_attempt(&self.session_key(id)).await
    }

    async fn delete(&self, id: SessionId) -> Result<(), AuthError> {
        self.sessions.delete(&self.session_key(id)).await
    }

    async fn save_password_hash(
        &self,
        id: SessionId,
        password_hash: &str,
        ttl_secs: u64,
    ) -> Result<(), AuthError> {
        let mut conn = self.sessions.conn();
        let _: () = conn
            .set_ex(self.password_key(id), password_hash, ttl_secs)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn get_password_hash(&self, id: SessionId) -> Result<Option<String>, AuthError> {
        let mut conn = self.sessions.conn();
        conn.get(self.password_key(id))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn delete_password_hash(&self, id: SessionId) -> Result<(), AuthError> {
        self.sessions.delete(&self.password_key(id)).await
    }

    async fn lock_email(
        &self,
        email: &str,
        session_id: SessionId,
        ttl_secs: u64,
    ) -> Result<bool, AuthError> {
        let mut conn = self.sessions.conn();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.email_key(email))
            .arg(session_id)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(reply.is_some())
    }

    async fn unlock_email(&self, email: &str, session_id: SessionId) -> Result<(), AuthError> {
        let mut conn = self.sessions.conn();
        let _: i64 = Script::new(EMAIL_UNLOCK)
            .key(self.email_key(email))
            .arg(session_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(())
    }

    async fn is_email_locked(&self, email: &str) -> Result<bool, AuthError> {
        let mut conn = self.sessions.conn();
        let owner: Option<SessionId> = conn
            .get(self.email_key(email))
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(owner.is_some())
    }
}

pub struct RedisLoginStore {
    sessions: JsonSessions,
    prefix: String,
}

impl RedisLoginStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        RedisLoginStore {
            sessions: JsonSessions::new(conn),
            prefix: prefix.into(),
        }
    }

    fn key(&self, id: SessionId) -> String {
        format!("{}:session:{}", self.prefix, id)
    }
}

#[async_trait::async_trait]
impl LoginSessionStore for RedisLoginStore {
    async fn create(&self, session: &LoginSession, ttl_secs: u64) -> Result<(), AuthError> {
        self.sessions
            .create(&self.key(session.session_id), session, ttl_secs)
            .await
    }

    async fn get(&self, id: SessionId) -> Result<Option<LoginSession>, AuthError> {
        self.sessions.get(&self.key(id)).await
    }

    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<LoginSession>, AuthError> {
        let fields = patch_fields(patch, false)?;
        self.sessions.patch(&self.key(id), patch, &fields).await
    }

    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<LoginSession>, AuthError> {
        self.sessions.record_attempt(&self.key(id)).await
    }

    async fn delete(&self, id: SessionId) -> Result<(), AuthError> {
        self.sessions.delete(&self.key(id)).await
    }
}
