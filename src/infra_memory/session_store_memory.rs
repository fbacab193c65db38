use crate::application_port::AuthError;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::ttl_map::TtlMap;
use std::sync::Arc;

pub struct MemoryRegistrationStore {
    sessions: TtlMap<SessionId, RegistrationSession>,
    password_hashes: TtlMap<SessionId, String>,
    email_locks: TtlMap<String, SessionId>,
}

impl MemoryRegistrationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: TtlMap::new(clock.clone()),
            password_hashes: TtlMap::new(clock.clone()),
            email_locks: TtlMap::new(clock),
        }
    }

    /// Remaining lifetime of a stored session, for assertions on TTL handling.
    pub fn ttl_secs(&self, id: SessionId) -> Option<u64> {
        self.sessions.ttl_secs(&id)
    }
}

#[async_trait::async_trait]
impl RegistrationSessionStore for MemoryRegistrationStore {
    async fn create(&self, session: &RegistrationSession, ttl_secs: u64) -> Result<(), AuthError> {
        self.sessions
            .insert(session.session_id, session.clone(), ttl_secs);
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<RegistrationSession>, AuthError> {
        Ok(self.sessions.get(&id))
    }

    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError> {
        let written = self.sessions.update(&id, |s| {
            if !patch.admits(s.status, &s.challenge) {
                return SessionWrite::Rejected(s.clone());
            }
            patch.apply_to_registration(s);
            SessionWrite::Applied(s.clone())
        });
        Ok(written.unwrap_or(SessionWrite::Missing))
    }

    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError> {
        let written = self.sessions.update(&id, |s| {
            if record_failed_attempt(&mut s.status, &mut s.challenge) {
                SessionWrite::Applied(s.clone())
            } else {
                SessionWrite::Rejected(s.clone())
            }
        });
        Ok(written.unwrap_or(SessionWrite::Missing))
    }

    async fn delete(&self, id: SessionId) -> Result<(), AuthError> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn save_password_hash(
        &self,
        id: SessionId,
        password_hash: &str,
        ttl_secs: u64,
    ) -> Result<(), AuthError> {
        self.password_hashes
            .insert(id, password_hash.to_string(), ttl_secs);
        Ok(())
    }

    async fn get_password_hash(&self, id: SessionId) -> Result<Option<String>, AuthError> {
        Ok(self.password_hashes.get(&id))
    }

    async fn delete_password_hash(&self, id: SessionId) -> Result<(), AuthError> {
        self.password_hashes.remove(&id);
        Ok(())
    }

    async fn lock_email(
        &self,
        email: &str,
        session_id: SessionId,
        ttl_secs: u64,
    ) -> Result<bool, AuthError> {
        Ok(self
            .email_locks
            .insert_if_absent(email.to_string(), session_id, ttl_secs))
    }

    async fn unlock_email(&self, email: &str, session_id: SessionId) -> Result<(), AuthError> {
        self.email_locks
            .remove_if(&email.to_string(), |owner| *owner == session_id);
        Ok(())
    }

    async fn is_email_locked(&self, email: &str) -> Result<bool, AuthError> {
        Ok(self.email_locks.get(&email.to_string()).is_some())
    }
}

pub struct MemoryLoginStore {
    sessions: TtlMap<SessionId, LoginSession>,
}

impl MemoryLoginStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: TtlMap::new(clock),
        }
    }
}

#[async_trait::async_trait]
impl LoginSessionStore for MemoryLoginStore {
    async fn create(&self, session: &LoginSession, ttl_secs: u64) -> Result<(), AuthError> {
        self.sessions
            .insert(session.session_id, session.clone(), ttl_secs);
        Ok(())
    }

    async fn get(&self, id: SessionId) -> Result<Option<LoginSession>, AuthError> {
        Ok(self.sessions.get(&id))
    }

    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<LoginSession>, AuthError> {
        let written = self.sessions.update(&id, |s| {
            if !patch.admits(s.status, &s.challenge) {
                return SessionWrite::Rejected(s.clone());
            }
            patch.apply_to_login(s);
            SessionWrite::Applied(s.clone())
        });
        Ok(written.unwrap_or(SessionWrite::Missing))
    }

    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<LoginSession>, AuthError> {
        let written = self.sessions.update(&id, |s| {
            if record_failed_attempt(&mut s.status, &mut s.challenge) {
                SessionWrite::Applied(s.clone())
            } else {
                SessionWrite::Rejected(s.clone())
            }
        });
        Ok(written.unwrap_or(SessionWrite::Missing))
    }

    async fn delete(&self, id: SessionId) -> Result<(), AuthError> {
        self.sessions.remove(&id);
        Ok(())
    }
}

pub struct MemoryRateLimitStore {
    counters: TtlMap<String, u64>,
}

impl MemoryRateLimitStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counters: TtlMap::new(clock),
        }
    }
}

#[async_trait::async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64, AuthError> {
        Ok(self.counters.upsert(
            key.to_string(),
            window_secs,
            || 0,
            |count| {
                *count += 1;
                *count
            },
        ))
    }

    async fn get(&self, key: &str) -> Result<u64, AuthError> {
        Ok(self.counters.get(&key.to_string()).unwrap_or(0))
    }

    async fn ttl(&self, key: &str) -> Result<u64, AuthError> {
        Ok(self.counters.ttl_secs(&key.to_string()).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::ManualClock;
    use chrono::{Duration, Utc};

    fn policy() -> OtpPolicy {
        OtpPolicy {
            otp_ttl: Duration::minutes(10),
            max_attempts: 3,
            max_resends: 3,
            resend_cooldown: Duration::seconds(60),
        }
    }

    fn session(clock: &ManualClock) -> RegistrationSession {
        RegistrationSession::new(
            SessionId::new(),
            "new@x.com".to_string(),
            "hash".to_string(),
            clock.now(),
            Duration::minutes(30),
            &policy(),
            ClientMeta::default(),
        )
    }

    #[tokio::test]
    async fn attempts_fail_the_session_at_the_limit() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRegistrationStore::new(clock.clone());
        let s = session(&clock);
        store.create(&s, 1800).await.unwrap();

        for expected in 1..=2 {
            let after = store
                .increment_attempts(s.session_id)
                .await
                .unwrap()
                .applied()
                .unwrap();
            assert_eq!(after.challenge.attempts, expected);
            assert_eq!(after.status, SessionStatus::PendingVerification);
        }
        let after = store
            .increment_attempts(s.session_id)
            .await
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(after.challenge.attempts, 3);
        assert_eq!(after.status, SessionStatus::Failed);

        // Nothing counts past the limit.
        let SessionWrite::Rejected(held) = store.increment_attempts(s.session_id).await.unwrap()
        else {
            panic!("attempt counted on a failed session");
        };
        assert_eq!(held.challenge.attempts, 3);
    }

    #[tokio::test]
    async fn status_changes_follow_the_state_machine() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRegistrationStore::new(clock.clone());
        let s = session(&clock);
        store.create(&s, 1800).await.unwrap();
        for _ in 0..3 {
            store.increment_attempts(s.session_id).await.unwrap();
        }

        let written = store
            .update(s.session_id, &SessionPatch::verified("h".into()))
            .await
            .unwrap();
        assert!(matches!(
            written,
            SessionWrite::Rejected(ref held) if held.status == SessionStatus::Failed
        ));
        let stored = store.get(s.session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert_eq!(stored.completion_token_hash, None);

        let fresh = session(&clock);
        store.create(&fresh, 1800).await.unwrap();
        let first = store
            .update(fresh.session_id, &SessionPatch::verified("a".into()))
            .await
            .unwrap();
        assert!(matches!(first, SessionWrite::Applied(_)));
        let second = store
            .update(fresh.session_id, &SessionPatch::verified("b".into()))
            .await
            .unwrap();
        assert!(matches!(second, SessionWrite::Rejected(_)));
        let stored = store.get(fresh.session_id).await.unwrap().unwrap();
        assert_eq!(stored.completion_token_hash.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn rotation_keeps_attempts_counted_since_it_was_built() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRegistrationStore::new(clock.clone());
        let s = session(&clock);
        store.create(&s, 1800).await.unwrap();

        let rotation = s
            .challenge
            .rotation("h2".into(), clock.now(), Duration::minutes(10));
        store.increment_attempts(s.session_id).await.unwrap();

        let after = store
            .update(s.session_id, &SessionPatch::otp(rotation.clone()))
            .await
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(after.challenge.attempts, 1);
        assert_eq!(after.challenge.otp_hash, "h2");
        assert_eq!(after.challenge.resend_count, 1);

        // The same generation cannot be spent twice.
        let again = store
            .update(s.session_id, &SessionPatch::otp(rotation))
            .await
            .unwrap();
        assert!(matches!(again, SessionWrite::Rejected(_)));

        // A match against the replaced code no longer verifies.
        let stale = store
            .update(
                s.session_id,
                &SessionPatch::verified("h".into()).on_generation(0),
            )
            .await
            .unwrap();
        assert!(matches!(
            stale,
            SessionWrite::Rejected(ref held) if held.status == SessionStatus::PendingVerification
        ));
        let current = store
            .update(
                s.session_id,
                &SessionPatch::verified("h".into()).on_generation(1),
            )
            .await
            .unwrap();
        assert!(matches!(current, SessionWrite::Applied(_)));
    }

    #[tokio::test]
    async fn update_keeps_the_original_ttl() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRegistrationStore::new(clock.clone());
        let s = session(&clock);
        store.create(&s, 1800).await.unwrap();

        clock.advance(Duration::seconds(600));
        let patched = store
            .update(s.session_id, &SessionPatch::verified("h".into()))
            .await
            .unwrap()
            .applied()
            .unwrap();
        assert_eq!(patched.status, SessionStatus::Verified);
        assert_eq!(store.ttl_secs(s.session_id), Some(1200));

        clock.advance(Duration::seconds(1200));
        assert!(store.get(s.session_id).await.unwrap().is_none());
        assert_eq!(
            store
                .update(s.session_id, &SessionPatch::status(SessionStatus::Failed))
                .await
                .unwrap(),
            SessionWrite::Missing
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_attempts_stop_at_the_limit() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryLoginStore::new(clock.clone()));
        let s = LoginSession::new(
            SessionId::new(),
            "a@x.com".to_string(),
            UserId::new(),
            "hash".to_string(),
            clock.now(),
            Duration::minutes(10),
            &policy(),
            ClientMeta::default(),
        );
        store.create(&s, 600).await.unwrap();
        let id = s.session_id;

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_attempts(id).await })
            })
            .collect();
        let mut counted = 0;
        for handle in handles {
            if let SessionWrite::Applied(_) = handle.await.unwrap().unwrap() {
                counted += 1;
            }
        }
        assert_eq!(counted, 3);

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.challenge.attempts, 3);
        assert_eq!(stored.status, SessionStatus::Failed);
    }

    #[tokio::test]
    async fn email_lock_is_exclusive_until_released_or_expired() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRegistrationStore::new(clock.clone());

        let owner = SessionId::new();
        assert!(store.lock_email("a@x.com", owner, 60).await.unwrap());
        assert!(!store.lock_email("a@x.com", SessionId::new(), 60).await.unwrap());

        store.unlock_email("a@x.com", SessionId::new()).await.unwrap();
        assert!(store.is_email_locked("a@x.com").await.unwrap());

        store.unlock_email("a@x.com", owner).await.unwrap();
        assert!(store.lock_email("a@x.com", SessionId::new(), 60).await.unwrap());

        clock.advance(Duration::seconds(61));
        assert!(!store.is_email_locked("a@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn rate_limit_window_starts_on_first_hit() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = MemoryRateLimitStore::new(clock.clone());

        assert_eq!(store.increment("register:a@x.com", 3600).await.unwrap(), 1);
        clock.advance(Duration::seconds(100));
        assert_eq!(store.increment("register:a@x.com", 3600).await.unwrap(), 2);
        assert_eq!(store.ttl("register:a@x.com").await.unwrap(), 3500);
        assert_eq!(store.get("register:a@x.com").await.unwrap(), 2);

        clock.advance(Duration::seconds(3500));
        assert_eq!(store.get("register:a@x.com").await.unwrap(), 0);
        assert_eq!(store.increment("register:a@x.com", 3600).await.unwrap(), 1);
    }
}
