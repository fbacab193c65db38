use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::RateLimitStore;
use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

/// Fixed-window ceiling on initiate calls per email.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u64,
    pub window_secs: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OtpFlowConfig {
    pub policy: OtpPolicy,
    pub session_ttl: Duration,
    pub rate_limit: RateLimitPolicy,
}

impl Default for OtpFlowConfig {
    fn default() -> Self {
        Self {
            policy: OtpPolicy {
                otp_ttl: Duration::minutes(10),
                max_attempts: 5,
                max_resends: 3,
                resend_cooldown: Duration::seconds(60),
            },
            session_ttl: Duration::minutes(30),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl OtpFlowConfig {
    pub(crate) fn session_ttl_secs(&self) -> u64 {
        self.session_ttl.num_seconds().max(1) as u64
    }

    pub(crate) fn otp_ttl_minutes(&self) -> i64 {
        self.policy.otp_ttl.num_minutes().max(1)
    }

    /// Shape of a fresh initiate result, also used for suppressed initiations.
    pub(crate) fn decoy(&self, now: DateTime<Utc>) -> InitiateResult {
        InitiateResult {
            session_id: SessionId::new(),
            expires_at: now + self.session_ttl,
            otp_expires_at: now + self.policy.otp_ttl,
            resend_available_at: now + self.policy.resend_cooldown,
        }
    }
}

pub(crate) fn initiate_result(
    session_id: SessionId,
    challenge: &OtpChallenge,
    expires_at: DateTime<Utc>,
) -> InitiateResult {
    InitiateResult {
        session_id,
        expires_at,
        otp_expires_at: challenge.otp_expires_at,
        resend_available_at: challenge.resend_available_at(),
    }
}

pub(crate) fn resend_result(session_id: SessionId, challenge: &OtpChallenge) -> ResendResult {
    ResendResult {
        session_id,
        otp_expires_at: challenge.otp_expires_at,
        resends_remaining: challenge.resends_remaining(),
        resend_available_at: challenge.resend_available_at(),
    }
}

/// Counts the call, then rejects it once the window's ceiling is passed.
pub(crate) async fn enforce_rate_limit(
    store: &dyn RateLimitStore,
    key: &str,
    policy: &RateLimitPolicy,
) -> Result<(), AuthError> {
    let count = store.increment(key, policy.window_secs).await?;
    if count > policy.max_requests {
        let retry_after_secs = store.ttl(key).await?.max(1);
        tracing::warn!(target: "audit", key, count, "rate limit exceeded");
        return Err(AuthError::TooManyRequests { retry_after_secs });
    }
    Ok(())
}

/// Fresh code plus its stored hash. The plaintext goes to the mailer only.
pub(crate) fn new_code(codec: &dyn OtpCodec) -> Result<(SecretString, String), AuthError> {
    let code = codec.generate();
    let hash = codec.hash(&code)?;
    Ok((code, hash))
}

fn not_pending(status: SessionStatus) -> AuthError {
    match status {
        SessionStatus::Failed => AuthError::AttemptsExhausted,
        SessionStatus::Expired => AuthError::Expired("session".to_string()),
        other => AuthError::Conflict(format!("session already {}", other.as_str())),
    }
}

/// Gate for resending. Session expiry is checked by the caller beforehand.
pub(crate) fn check_resend(
    status: SessionStatus,
    challenge: &OtpChallenge,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    if status != SessionStatus::PendingVerification {
        return Err(not_pending(status));
    }
    if challenge.resends_remaining() == 0 {
        let retry_after_secs = (expires_at - now).num_seconds().max(1) as u64;
        return Err(AuthError::TooManyRequests { retry_after_secs });
    }
    let wait = challenge.resend_wait_secs(now);
    if wait > 0 {
        return Err(AuthError::TooManyRequests {
            retry_after_secs: wait,
        });
    }
    Ok(())
}

/// Error for a verify whose store write was refused because the session
/// moved on after it was read.
pub(crate) fn verify_refused(status: SessionStatus, challenge: &OtpChallenge) -> AuthError {
    match status {
        SessionStatus::PendingVerification if challenge.attempts_exhausted() => {
            AuthError::AttemptsExhausted
        }
        // Still pending, so a resend replaced the code that matched.
        SessionStatus::PendingVerification => AuthError::Expired("otp".to_string()),
        other => not_pending(other),
    }
}

/// Error for a resend whose rotation was refused: another resend, a verify
/// or a failure got there first.
pub(crate) fn resend_refused(
    status: SessionStatus,
    challenge: &OtpChallenge,
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AuthError {
    match check_resend(status, challenge, expires_at, now) {
        Err(e) => e,
        Ok(()) => AuthError::Conflict("code was resent concurrently".to_string()),
    }
}

/// Gate for verifying a code. Session expiry is checked by the caller beforehand.
pub(crate) fn check_verifiable(
    status: SessionStatus,
    challenge: &OtpChallenge,
    now: DateTime<Utc>,
) -> Result<(), AuthError> {
    if status != SessionStatus::PendingVerification {
        return Err(not_pending(status));
    }
    if challenge.attempts_exhausted() {
        return Err(AuthError::AttemptsExhausted);
    }
    if challenge.is_otp_expired(now) {
        return Err(AuthError::Expired("otp".to_string()));
    }
    Ok(())
}
