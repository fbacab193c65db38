use crate::domain_model::UserId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(SessionId)
    }
}

/// Lifecycle of an OTP-driven session. Login sessions only use the
/// `PendingVerification -> Verified` hop plus the two failure states.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    PendingVerification,
    Verified,
    PasswordSet,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 6] = [
        SessionStatus::PendingVerification,
        SessionStatus::Verified,
        SessionStatus::PasswordSet,
        SessionStatus::Completed,
        SessionStatus::Failed,
        SessionStatus::Expired,
    ];

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            PendingVerification => matches!(next, Verified | Failed | Expired),
            Verified => matches!(next, PasswordSet),
            PasswordSet => matches!(next, PasswordSet | Completed),
            Completed | Failed | Expired => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::PendingVerification => "PENDING_VERIFICATION",
            SessionStatus::Verified => "VERIFIED",
            SessionStatus::PasswordSet => "PASSWORD_SET",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Limits applied to every OTP challenge.
#[derive(Debug, Clone, Copy)]
pub struct OtpPolicy {
    pub otp_ttl: Duration,
    pub max_attempts: u32,
    pub max_resends: u32,
    pub resend_cooldown: Duration,
}

/// OTP state shared by registration and login sessions. Only the hash of
/// the code is held here.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub otp_hash: String,
    pub otp_created_at: DateTime<Utc>,
    pub otp_expires_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub resend_count: u32,
    pub max_resends: u32,
    pub resend_cooldown_secs: u64,
    pub last_resent_at: Option<DateTime<Utc>>,
}

impl OtpChallenge {
    pub fn new(otp_hash: String, now: DateTime<Utc>, policy: &OtpPolicy) -> Self {
        Self {
            otp_hash,
            otp_created_at: now,
            otp_expires_at: now + policy.otp_ttl,
            attempts: 0,
            max_attempts: policy.max_attempts,
            resend_count: 0,
            max_resends: policy.max_resends,
            resend_cooldown_secs: policy.resend_cooldown.num_seconds().max(0) as u64,
            last_resent_at: None,
        }
    }

    pub fn is_otp_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.otp_expires_at
    }

    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn resends_remaining(&self) -> u32 {
        self.max_resends.saturating_sub(self.resend_count)
    }

    /// The initial send counts as the first send for cooldown purposes.
    pub fn resend_available_at(&self) -> DateTime<Utc> {
        let last = self.last_resent_at.unwrap_or(self.otp_created_at);
        last + Duration::seconds(self.resend_cooldown_secs as i64)
    }

    /// Whole seconds until a resend is allowed, rounded up. Zero means now.
    pub fn resend_wait_secs(&self, now: DateTime<Utc>) -> u64 {
        let ready_at = self.resend_available_at();
        if now >= ready_at {
            return 0;
        }
        let millis = (ready_at - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000)
    }

    /// The next code for this challenge. Attempts are not part of it.
    pub fn rotation(&self, otp_hash: String, now: DateTime<Utc>, otp_ttl: Duration) -> OtpRotation {
        OtpRotation {
            otp_hash,
            otp_created_at: now,
            otp_expires_at: now + otp_ttl,
            resend_count: self.resend_count + 1,
            last_resent_at: Some(now),
        }
    }

    pub fn apply(&mut self, rotation: &OtpRotation) {
        self.otp_hash = rotation.otp_hash.clone();
        self.otp_created_at = rotation.otp_created_at;
        self.otp_expires_at = rotation.otp_expires_at;
        self.resend_count = rotation.resend_count;
        self.last_resent_at = rotation.last_resent_at;
    }

    pub fn rotated(&self, otp_hash: String, now: DateTime<Utc>, otp_ttl: Duration) -> Self {
        let mut next = self.clone();
        next.apply(&self.rotation(otp_hash, now, otp_ttl));
        next
    }
}

/// Fields a resend replaces. Serialised with the same names the flattened
/// session record uses.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct OtpRotation {
    pub otp_hash: String,
    pub otp_created_at: DateTime<Utc>,
    pub otp_expires_at: DateTime<Utc>,
    pub resend_count: u32,
    pub last_resent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSession {
    pub session_id: SessionId,
    pub email: String,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub challenge: OtpChallenge,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub client: ClientMeta,
    pub completion_token_hash: Option<String>,
    pub password_set_at: Option<DateTime<Utc>>,
}

impl RegistrationSession {
    pub fn new(
        session_id: SessionId,
        email: String,
        otp_hash: String,
        now: DateTime<Utc>,
        session_ttl: Duration,
        policy: &OtpPolicy,
        client: ClientMeta,
    ) -> Self {
        Self {
            session_id,
            email,
            status: SessionStatus::PendingVerification,
            challenge: OtpChallenge::new(otp_hash, now, policy),
            created_at: now,
            expires_at: now + session_ttl,
            client,
            completion_token_hash: None,
            password_set_at: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct LoginSession {
    pub session_id: SessionId,
    pub email: String,
    pub user_id: Option<UserId>,
    pub status: SessionStatus,
    #[serde(flatten)]
    pub challenge: OtpChallenge,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(flatten)]
    pub client: ClientMeta,
}

impl LoginSession {
    pub fn new(
        session_id: SessionId,
        email: String,
        user_id: UserId,
        otp_hash: String,
        now: DateTime<Utc>,
        session_ttl: Duration,
        policy: &OtpPolicy,
        client: ClientMeta,
    ) -> Self {
        Self {
            session_id,
            email,
            user_id: Some(user_id),
            status: SessionStatus::PendingVerification,
            challenge: OtpChallenge::new(otp_hash, now, policy),
            created_at: now,
            expires_at: now + session_ttl,
            client,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> OtpPolicy {
        OtpPolicy {
            otp_ttl: Duration::minutes(5),
            max_attempts: 5,
            max_resends: 3,
            resend_cooldown: Duration::seconds(60),
        }
    }

    #[test]
    fn only_pending_sessions_can_fail_or_expire() {
        use SessionStatus::*;
        assert!(PendingVerification.can_transition_to(Failed));
        assert!(PendingVerification.can_transition_to(Expired));
        assert!(!Verified.can_transition_to(Failed));
        assert!(!PasswordSet.can_transition_to(Expired));
        for terminal in [Completed, Failed, Expired] {
            assert!(terminal.is_terminal());
            for next in [PendingVerification, Verified, PasswordSet, Completed, Failed, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn password_step_is_idempotent() {
        assert!(SessionStatus::Verified.can_transition_to(SessionStatus::PasswordSet));
        assert!(SessionStatus::PasswordSet.can_transition_to(SessionStatus::PasswordSet));
        assert!(!SessionStatus::Verified.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn resend_is_allowed_exactly_at_cooldown_boundary() {
        let t0 = Utc::now();
        let challenge = OtpChallenge::new("h".into(), t0, &policy());
        let sent = challenge.rotated("h2".into(), t0, Duration::minutes(5));

        let boundary = t0 + Duration::seconds(60);
        assert_eq!(sent.resend_wait_secs(boundary), 0);
        assert_eq!(sent.resend_wait_secs(boundary - Duration::seconds(1)), 1);
        assert_eq!(sent.resend_wait_secs(t0), 60);
    }

    #[test]
    fn partial_seconds_round_up() {
        let t0 = Utc::now();
        let challenge = OtpChallenge::new("h".into(), t0, &policy());
        let almost = t0 + Duration::milliseconds(59_500);
        assert_eq!(challenge.resend_wait_secs(almost), 1);
    }

    #[test]
    fn rotation_keeps_attempts_and_counts_resends() {
        let t0 = Utc::now();
        let mut challenge = OtpChallenge::new("h".into(), t0, &policy());
        challenge.attempts = 2;
        let later = t0 + Duration::seconds(90);
        let rotated = challenge.rotated("h2".into(), later, Duration::minutes(5));

        assert_eq!(rotated.attempts, 2);
        assert_eq!(rotated.resend_count, 1);
        assert_eq!(rotated.resends_remaining(), 2);
        assert_eq!(rotated.last_resent_at, Some(later));
        assert_eq!(rotated.otp_expires_at, later + Duration::minutes(5));
    }

    #[test]
    fn session_round_trips_through_flat_json() {
        let now = Utc::now();
        let session = RegistrationSession::new(
            SessionId::new(),
            "new@x.com".into(),
            "hash".into(),
            now,
            Duration::minutes(30),
            &policy(),
            ClientMeta::default(),
        );
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["status"], "PENDING_VERIFICATION");
        assert_eq!(value["attempts"], 0);

        let back: RegistrationSession = serde_json::from_value(value).unwrap();
        assert_eq!(back, session);
    }
}
