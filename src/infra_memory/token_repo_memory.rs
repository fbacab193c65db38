use crate::application_port::AuthError;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::tx_memory::{MemoryTx, downcast};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Registers the pre-write values so a rollback puts them back.
fn journal<K, V>(tx: &mut MemoryTx, map: &Arc<DashMap<K, V>>, before: Vec<(K, V)>)
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    if before.is_empty() {
        return;
    }
    let map = map.clone();
    tx.on_rollback(move || {
        for (k, v) in before {
            map.insert(k, v);
        }
    });
}

pub struct MemoryRefreshTokenRepo {
    clock: Arc<dyn Clock>,
    tokens: Arc<DashMap<RefreshTokenId, RefreshTokenRecord>>,
}

impl MemoryRefreshTokenRepo {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            tokens: Arc::new(DashMap::new()),
        }
    }

    pub fn family(&self, family_id: TokenFamilyId) -> Vec<RefreshTokenRecord> {
        let mut family: Vec<_> = self
            .tokens
            .iter()
            .filter(|t| t.family_id == family_id)
            .map(|t| t.clone())
            .collect();
        family.sort_by_key(|t| t.created_at);
        family
    }

    fn revoke_where(
        &self,
        tx: &mut MemoryTx,
        reason: RevokeReason,
        pred: impl Fn(&RefreshTokenRecord) -> bool,
    ) -> u64 {
        let now = self.clock.now();
        let mut before = Vec::new();
        for mut t in self.tokens.iter_mut() {
            if !t.is_revoked() && pred(&*t) {
                before.push((t.id, t.clone()));
                t.revoked_at = Some(now);
                t.revoked_reason = Some(reason);
            }
        }
        let count = before.len() as u64;
        journal(tx, &self.tokens, before);
        count
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &RefreshTokenRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        if self.tokens.iter().any(|t| t.token_hash == record.token_hash) {
            return Err(AuthError::Conflict("refresh token hash".to_string()));
        }
        self.tokens.insert(record.id, record.clone());

        let tokens = self.tokens.clone();
        let id = record.id;
        tx.on_rollback(move || {
            tokens.remove(&id);
        });
        Ok(())
    }

    async fn get_by_hash(&self, token_hash: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self
            .tokens
            .iter()
            .find(|t| t.token_hash == token_hash)
            .map(|t| t.clone()))
    }

    async fn get_by_id(&self, id: RefreshTokenId) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.tokens.get(&id).map(|t| t.clone()))
    }

    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        reason: RevokeReason,
    ) -> Result<bool, AuthError> {
        let tx = downcast(tx)?;
        let revoked = self.revoke_where(tx, reason, |t| t.id == id);
        Ok(revoked == 1)
    }

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;
        Ok(self.revoke_where(tx, reason, |t| t.user_id == user_id))
    }

    async fn revoke_by_family_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        family_id: TokenFamilyId,
        reason: RevokeReason,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;
        Ok(self.revoke_where(tx, reason, |t| t.family_id == family_id))
    }

    async fn set_replaced_by_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: RefreshTokenId,
        replaced_by: RefreshTokenId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        let before = {
            let mut t = self
                .tokens
                .get_mut(&id)
                .ok_or_else(|| AuthError::NotFound("refresh token".to_string()))?;
            let before = t.clone();
            t.replaced_by = Some(replaced_by);
            before
        };
        journal(tx, &self.tokens, vec![(id, before)]);
        Ok(())
    }
}

pub struct MemoryUserSessionRepo {
    clock: Arc<dyn Clock>,
    sessions: Arc<DashMap<UserSessionId, UserSessionRecord>>,
}

impl MemoryUserSessionRepo {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Drops a session row, leaving its refresh tokens orphaned.
    pub fn detach(&self, id: UserSessionId) {
        self.sessions.remove(&id);
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait::async_trait]
impl UserSessionRepo for MemoryUserSessionRepo {
    async fn create_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        record: &UserSessionRecord,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        self.sessions.insert(record.id, record.clone());

        let sessions = self.sessions.clone();
        let id = record.id;
        tx.on_rollback(move || {
            sessions.remove(&id);
        });
        Ok(())
    }

    async fn get_by_id(&self, id: UserSessionId) -> Result<Option<UserSessionRecord>, AuthError> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn get_by_refresh_token_id(
        &self,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.refresh_token_id == refresh_token_id)
            .map(|s| s.clone()))
    }

    async fn get_by_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        refresh_token_id: RefreshTokenId,
    ) -> Result<Option<UserSessionRecord>, AuthError> {
        downcast(tx)?;
        self.get_by_refresh_token_id(refresh_token_id).await
    }

    async fn update_refresh_token_id_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
        refresh_token_id: RefreshTokenId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        let now = self.clock.now();
        let before = match self.sessions.get_mut(&id) {
            Some(mut s) => {
                let before = s.clone();
                s.refresh_token_id = refresh_token_id;
                s.last_used_at = now;
                before
            }
            None => return Ok(()),
        };
        journal(tx, &self.sessions, vec![(id, before)]);
        Ok(())
    }

    async fn revoke_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        id: UserSessionId,
    ) -> Result<(), AuthError> {
        let tx = downcast(tx)?;
        let now = self.clock.now();
        let before = match self.sessions.get_mut(&id) {
            Some(mut s) if s.status == UserSessionStatus::Active => {
                let before = s.clone();
                s.status = UserSessionStatus::Revoked;
                s.revoked_at = Some(now);
                before
            }
            _ => return Ok(()),
        };
        journal(tx, &self.sessions, vec![(id, before)]);
        Ok(())
    }

    async fn revoke_all_by_user_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        user_id: UserId,
    ) -> Result<u64, AuthError> {
        let tx = downcast(tx)?;
        let now = self.clock.now();
        let mut before = Vec::new();
        for mut s in self.sessions.iter_mut() {
            if s.user_id == user_id && s.status == UserSessionStatus::Active {
                before.push((s.id, s.clone()));
                s.status = UserSessionStatus::Revoked;
                s.revoked_at = Some(now);
            }
        }
        let count = before.len() as u64;
        journal(tx, &self.sessions, before);
        Ok(count)
    }
}
