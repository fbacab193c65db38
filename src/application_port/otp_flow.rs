use crate::domain_model::*;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct InitiateInput {
    pub email: String,
    pub client: ClientMeta,
}

/// Returned by every initiate call, including the suppressed ones for
/// already-known emails, so callers cannot tell them apart.
#[derive(Debug, Clone, Serialize)]
pub struct InitiateResult {
    pub session_id: SessionId,
    pub expires_at: DateTime<Utc>,
    pub otp_expires_at: DateTime<Utc>,
    pub resend_available_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendResult {
    pub session_id: SessionId,
    pub otp_expires_at: DateTime<Utc>,
    pub resends_remaining: u32,
    pub resend_available_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct VerifyOtpInput {
    pub session_id: SessionId,
    pub otp: SecretString,
}

/// Public view of an OTP session for client UX.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub attempts_remaining: u32,
    pub resends_remaining: u32,
    pub resend_available_at: DateTime<Utc>,
    pub otp_expires_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionView {
    pub fn new(
        session_id: SessionId,
        status: SessionStatus,
        challenge: &OtpChallenge,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id,
            status,
            attempts_remaining: challenge.remaining_attempts(),
            resends_remaining: challenge.resends_remaining(),
            resend_available_at: challenge.resend_available_at(),
            otp_expires_at: challenge.otp_expires_at,
            expires_at,
        }
    }
}
