use crate::application_port::AuthError;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::tx_memory::downcast;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct MemoryUserRepo {
    users: Arc<DashMap<UserId, UserRecord>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an account outside any transaction.
    pub fn insert(&self, record: UserRecord) {
        self.users.insert(record.user_id, record);
    }

    pub fn set_status(&self, user_id: UserId, status: UserStatus) {
        if let Some(mut user) = self.users.get_mut(&user_id) {
            user.status = status;
        }
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait::async_trait]
impl UserRepo for MemoryUserRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &UserRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        if self.users.iter().any(|u| u.email == record.email) {
            return Err(AuthError::Conflict("email already registered".to_string()));
        }
        self.users.insert(record.user_id, record.clone());

        let users = self.users.clone();
        let id = record.user_id;
        tx.on_rollback(move || {
            users.remove(&id);
        });
        Ok(())
    }

    async fn get_by_id(&self, user_id: UserId) -> Result<Option<UserRecord>, AuthError> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<UserRecord>, AuthError> {
        Ok(self
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.clone()))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.users.iter().any(|u| u.email == email))
    }
}

#[derive(Default)]
pub struct MemoryAuthRepo {
    credentials: Arc<DashMap<UserId, String>>,
    security: Arc<DashMap<UserId, SecurityStateRecord>>,
}

impl MemoryAuthRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password_hash(&self, user_id: UserId) -> Option<String> {
        self.credentials.get(&user_id).map(|h| h.clone())
    }

    pub fn security_state(&self, user_id: UserId) -> Option<SecurityStateRecord> {
        self.security.get(&user_id).map(|s| s.clone())
    }
}

#[async_trait::async_trait]
impl AuthRepo for MemoryAuthRepo {
    async fn create_credentials_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        self.credentials.insert(user_id, password_hash.to_string());

        let credentials = self.credentials.clone();
        tx.on_rollback(move || {
            credentials.remove(&user_id);
        });
        Ok(())
    }

    async fn create_security_state_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        state: &SecurityStateRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        self.security.insert(state.user_id, state.clone());

        let security = self.security.clone();
        let user_id = state.user_id;
        tx.on_rollback(move || {
            security.remove(&user_id);
        });
        Ok(())
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<(), AuthError> {
        match self.security.get_mut(&user_id) {
            Some(mut state) => {
                state.last_login_at = Some(at);
                state.failed_login_count = 0;
                Ok(())
            }
            None => Err(AuthError::NotFound("security state".to_string())),
        }
    }
}

#[derive(Default)]
pub struct MemoryProfileRepo {
    profiles: Arc<DashMap<UserId, NewProfile>>,
    failing: AtomicBool,
}

impl MemoryProfileRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes writes fail, to exercise rollback of multi-record commits.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.profiles.len()
    }
}

#[async_trait::async_trait]
impl ProfileRepo for MemoryProfileRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        profile: &NewProfile,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::Store("profile insert failed".to_string()));
        }
        self.profiles.insert(user_id, profile.clone());

        let profiles = self.profiles.clone();
        tx.on_rollback(move || {
            profiles.remove(&user_id);
        });
        Ok(())
    }

    async fn get(&self, user_id: UserId) -> Result<Option<ProfileRecord>, AuthError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AuthError::Store("profile lookup failed".to_string()));
        }
        Ok(self.profiles.get(&user_id).map(|p| ProfileRecord {
            user_id,
            profile: p.clone(),
        }))
    }
}

pub struct MemoryReferenceData {
    genders: HashSet<String>,
}

impl MemoryReferenceData {
    pub fn new<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            genders: codes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for MemoryReferenceData {
    fn default() -> Self {
        Self::new(["M", "F", "X"])
    }
}

#[async_trait::async_trait]
impl ReferenceDataRepo for MemoryReferenceData {
    async fn gender_exists(&self, code: &str) -> Result<bool, AuthError> {
        Ok(self.genders.contains(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryTxManager;

    fn user(email: &str) -> UserRecord {
        UserRecord {
            user_id: UserId::new(),
            email: email.to_string(),
            status: UserStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn rolled_back_user_creation_leaves_nothing_behind() {
        let txm = MemoryTxManager::new();
        let users = MemoryUserRepo::new();
        let auth = MemoryAuthRepo::new();
        let u = user("a@x.com");

        let mut tx = txm.begin().await.unwrap();
        users.create_in_tx(tx.as_mut(), &u).await.unwrap();
        auth.create_credentials_in_tx(tx.as_mut(), u.user_id, "phc")
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(!users.email_exists("a@x.com").await.unwrap());
        assert!(auth.password_hash(u.user_id).is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let txm = MemoryTxManager::new();
        let users = MemoryUserRepo::new();
        users.insert(user("a@x.com"));

        let mut tx = txm.begin().await.unwrap();
        let err = users
            .create_in_tx(tx.as_mut(), &user("a@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }
}
