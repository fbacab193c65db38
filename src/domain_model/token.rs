use crate::domain_model::{ClientMeta, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct RefreshTokenId(pub uuid::Uuid);

impl RefreshTokenId {
    pub fn new() -> Self {
        RefreshTokenId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for RefreshTokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared by every refresh token descended from one login.
#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct TokenFamilyId(pub uuid::Uuid);

impl TokenFamilyId {
    pub fn new() -> Self {
        TokenFamilyId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for TokenFamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(transparent)]
pub struct UserSessionId(pub uuid::Uuid);

impl UserSessionId {
    pub fn new() -> Self {
        UserSessionId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for UserSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserSessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(UserSessionId)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Rotation,
    Logout,
    LogoutAll,
    ReuseDetected,
}

impl RevokeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevokeReason::Rotation => "rotation",
            RevokeReason::Logout => "logout",
            RevokeReason::LogoutAll => "logout_all",
            RevokeReason::ReuseDetected => "reuse_detected",
        }
    }
}

impl std::str::FromStr for RevokeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rotation" => Ok(RevokeReason::Rotation),
            "logout" => Ok(RevokeReason::Logout),
            "logout_all" => Ok(RevokeReason::LogoutAll),
            "reuse_detected" => Ok(RevokeReason::ReuseDetected),
            other => Err(format!("unknown revoke reason: {other}")),
        }
    }
}

/// Durable refresh token row. The raw token value is never stored.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RefreshTokenRecord {
    pub id: RefreshTokenId,
    pub user_id: UserId,
    pub token_hash: String,
    pub family_id: TokenFamilyId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevokeReason>,
    pub replaced_by: Option<RefreshTokenId>,
}

impl RefreshTokenRecord {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserSessionStatus {
    Active,
    Revoked,
    Expired,
}

impl UserSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserSessionStatus::Active => "ACTIVE",
            UserSessionStatus::Revoked => "REVOKED",
            UserSessionStatus::Expired => "EXPIRED",
        }
    }
}

impl std::str::FromStr for UserSessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserSessionStatus::Active),
            "REVOKED" => Ok(UserSessionStatus::Revoked),
            "EXPIRED" => Ok(UserSessionStatus::Expired),
            other => Err(format!("unknown session status: {other}")),
        }
    }
}

/// Human-facing device session, pointing at the family's current token.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UserSessionRecord {
    pub id: UserSessionId,
    pub user_id: UserId,
    pub refresh_token_id: RefreshTokenId,
    pub client: ClientMeta,
    pub status: UserSessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}
