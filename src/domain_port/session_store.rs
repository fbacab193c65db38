use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// Field changes applied to a stored session without touching its TTL.
///
/// A patch is conditional: a status change applies only where the state
/// machine allows it, an OTP rotation only to a pending session, and a patch
/// pinned to a generation only while the stored resend count still matches.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub otp: Option<OtpRotation>,
    pub completion_token_hash: Option<String>,
    pub password_set_at: Option<DateTime<Utc>>,
    pub generation: Option<u32>,
}

impl SessionPatch {
    pub fn status(status: SessionStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn otp(rotation: OtpRotation) -> Self {
        Self {
            generation: Some(rotation.resend_count.saturating_sub(1)),
            otp: Some(rotation),
            ..Self::default()
        }
    }

    pub fn verified(completion_token_hash: String) -> Self {
        Self {
            status: Some(SessionStatus::Verified),
            completion_token_hash: Some(completion_token_hash),
            ..Self::default()
        }
    }

    pub fn password_set(completion_token_hash: String, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(SessionStatus::PasswordSet),
            completion_token_hash: Some(completion_token_hash),
            password_set_at: Some(at),
            ..Self::default()
        }
    }

    /// Applies only while the stored code is the one issued at `resend_count`.
    pub fn on_generation(mut self, resend_count: u32) -> Self {
        self.generation = Some(resend_count);
        self
    }

    /// Statuses a stored session may be in for this patch to apply.
    pub fn allowed_from(&self) -> Vec<SessionStatus> {
        SessionStatus::ALL
            .into_iter()
            .filter(|from| self.status.is_none_or(|next| from.can_transition_to(next)))
            .filter(|from| self.otp.is_none() || *from == SessionStatus::PendingVerification)
            .collect()
    }

    pub fn admits(&self, status: SessionStatus, challenge: &OtpChallenge) -> bool {
        if !self.allowed_from().contains(&status) {
            return false;
        }
        self.generation.is_none_or(|g| challenge.resend_count == g)
    }

    pub fn apply_to_registration(&self, session: &mut RegistrationSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(rotation) = &self.otp {
            session.challenge.apply(rotation);
        }
        if let Some(hash) = &self.completion_token_hash {
            session.completion_token_hash = Some(hash.clone());
        }
        if let Some(at) = self.password_set_at {
            session.password_set_at = Some(at);
        }
    }

    pub fn apply_to_login(&self, session: &mut LoginSession) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(rotation) = &self.otp {
            session.challenge.apply(rotation);
        }
    }
}

/// Outcome of a conditional session write.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionWrite<S> {
    /// The change went through; holds the session after it.
    Applied(S),
    /// The stored state no longer admits the change; holds it untouched.
    Rejected(S),
    Missing,
}

impl<S> SessionWrite<S> {
    pub fn applied(self) -> Option<S> {
        match self {
            SessionWrite::Applied(s) => Some(s),
            _ => None,
        }
    }
}

/// One failed verification. Counts only while the session is pending and
/// below its limit, failing it when the limit is reached. Returns whether the
/// attempt was counted. Stores must apply this atomically.
pub fn record_failed_attempt(status: &mut SessionStatus, challenge: &mut OtpChallenge) -> bool {
    if *status != SessionStatus::PendingVerification || challenge.attempts_exhausted() {
        return false;
    }
    challenge.attempts += 1;
    if challenge.attempts_exhausted() {
        *status = SessionStatus::Failed;
    }
    true
}

#[async_trait::async_trait]
pub trait RegistrationSessionStore: Send + Sync {
    async fn create(&self, session: &RegistrationSession, ttl_secs: u64) -> Result<(), AuthError>;
    async fn get(&self, id: SessionId) -> Result<Option<RegistrationSession>, AuthError>;
    /// Applies `patch` only if [`SessionPatch::admits`] the stored state.
    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError>;
    /// Atomic [`record_failed_attempt`]. `Rejected` when the session is no
    /// longer pending or already at its limit.
    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<RegistrationSession>, AuthError>;
    async fn delete(&self, id: SessionId) -> Result<(), AuthError>;

    /// Password hash kept beside the session, never inside it.
    async fn save_password_hash(
        &self,
        id: SessionId,
        password_hash: &str,
        ttl_secs: u64,
    ) -> Result<(), AuthError>;
    async fn get_password_hash(&self, id: SessionId) -> Result<Option<String>, AuthError>;
    async fn delete_password_hash(&self, id: SessionId) -> Result<(), AuthError>;

    /// Acquire-if-absent. `false` means another live session holds the email.
    async fn lock_email(
        &self,
        email: &str,
        session_id: SessionId,
        ttl_secs: u64,
    ) -> Result<bool, AuthError>;
    /// Releases the lock only while `session_id` still holds it.
    async fn unlock_email(&self, email: &str, session_id: SessionId) -> Result<(), AuthError>;
    async fn is_email_locked(&self, email: &str) -> Result<bool, AuthError>;
}

#[async_trait::async_trait]
pub trait LoginSessionStore: Send + Sync {
    async fn create(&self, session: &LoginSession, ttl_secs: u64) -> Result<(), AuthError>;
    async fn get(&self, id: SessionId) -> Result<Option<LoginSession>, AuthError>;
    async fn update(
        &self,
        id: SessionId,
        patch: &SessionPatch,
    ) -> Result<SessionWrite<LoginSession>, AuthError>;
    async fn increment_attempts(
        &self,
        id: SessionId,
    ) -> Result<SessionWrite<LoginSession>, AuthError>;
    async fn delete(&self, id: SessionId) -> Result<(), AuthError>;
}

/// Fixed-window counters keyed by caller-chosen strings.
#[async_trait::async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Increments and returns the new count; the window starts on the first hit.
    async fn increment(&self, key: &str, window_secs: u64) -> Result<u64, AuthError>;
    async fn get(&self, key: &str) -> Result<u64, AuthError>;
    /// Seconds until the current window resets.
    async fn ttl(&self, key: &str) -> Result<u64, AuthError>;
}
