use crate::application_impl::token_hasher::HmacTokenHasher;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TokenServiceConfig {
    /// Lifetime of a per-user blacklist entry; outlives any access token.
    pub refresh_ttl: Duration,
}

pub struct TokenDeps {
    pub codec: Arc<dyn TokenCodec>,
    pub hasher: Arc<HmacTokenHasher>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepo>,
    pub user_sessions: Arc<dyn UserSessionRepo>,
    pub users: Arc<dyn UserRepo>,
    pub profiles: Arc<dyn ProfileRepo>,
    pub blacklist: Arc<dyn BlacklistStore>,
    pub tx_manager: Arc<dyn TxManager>,
    pub clock: Arc<dyn Clock>,
}

pub struct RealTokenService {
    deps: TokenDeps,
    cfg: TokenServiceConfig,
}

/// User projection for token responses. Profile lookup is best effort.
pub(crate) async fn project_user(profiles: &dyn ProfileRepo, user: &UserRecord) -> UserSummary {
    let (first_name, last_name) = match profiles.get(user.user_id).await {
        Ok(Some(p)) => (Some(p.profile.first_name), Some(p.profile.last_name)),
        Ok(None) => (None, None),
        Err(e) => {
            tracing::warn!(user_id = %user.user_id, error = %e, "profile lookup failed");
            (None, None)
        }
    };
    UserSummary {
        user_id: user.user_id,
        email: user.email.clone(),
        first_name,
        last_name,
    }
}

/// Second-resolution cut-off, matching the `iat` granularity of JWTs.
fn blacklist_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

impl RealTokenService {
    pub fn new(deps: TokenDeps, cfg: TokenServiceConfig) -> RealTokenService {
        RealTokenService { deps, cfg }
    }

    /// Revokes every token in the family plus the device session, in one
    /// transaction of its own.
    async fn revoke_family(
        &self,
        record: &RefreshTokenRecord,
        session_id: UserSessionId,
    ) -> Result<u64, AuthError> {
        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let revoked = self
            .deps
            .refresh_tokens
            .revoke_by_family_in_tx(&mut *tx, record.family_id, RevokeReason::ReuseDetected)
            .await?;
        self.deps
            .user_sessions
            .revoke_in_tx(&mut *tx, session_id)
            .await?;

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        tracing::warn!(
            target: "audit",
            user_id = %record.user_id,
            family_id = %record.family_id,
            token_id = %record.id,
            revoked,
            "refresh token reuse detected, family revoked"
        );
        Ok(revoked)
    }

    async fn is_user_blacklisted(&self, user_id: UserId, issued_at: DateTime<Utc>) -> bool {
        match self
            .deps
            .blacklist
            .get_user_blacklist_timestamp(user_id)
            .await
        {
            Ok(Some(since)) => issued_at < since,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(
                    target: "audit",
                    user_id = %user_id,
                    error = %e,
                    "user blacklist unavailable, failing open"
                );
                false
            }
        }
    }
}

#[async_trait::async_trait]
impl TokenService for RealTokenService {
    async fn issue_tokens_in_tx<'t>(
        &self,
        tx: &mut dyn StorageTx<'t>,
        subject: &TokenSubject,
        client: &ClientMeta,
    ) -> Result<AuthTokens, AuthError> {
        let now = self.deps.clock.now();
        let token_id = RefreshTokenId::new();
        let session_id = UserSessionId::new();

        let (refresh_token, refresh_expires_at) = self
            .deps
            .codec
            .issue_refresh_token(subject.user_id, session_id, token_id)
            .await?;

        let record = RefreshTokenRecord {
            id: token_id,
            user_id: subject.user_id,
            token_hash: self.deps.hasher.hash(&refresh_token.0)?,
            family_id: TokenFamilyId::new(),
            created_at: now,
            expires_at: refresh_expires_at,
            revoked_at: None,
            revoked_reason: None,
            replaced_by: None,
        };
        self.deps.refresh_tokens.create_in_tx(tx, &record).await?;

        let session = UserSessionRecord {
            id: session_id,
            user_id: subject.user_id,
            refresh_token_id: token_id,
            client: client.clone(),
            status: UserSessionStatus::Active,
            created_at: now,
            last_used_at: now,
            revoked_at: None,
        };
        self.deps.user_sessions.create_in_tx(tx, &session).await?;

        let access = self
            .deps
            .codec
            .issue_access_token(&AccessSubject {
                user_id: subject.user_id,
                session_id,
                email: subject.email.clone(),
            })
            .await?;

        tracing::info!(
            target: "audit",
            user_id = %subject.user_id,
            session_id = %session_id,
            family_id = %record.family_id,
            "token family issued"
        );

        Ok(AuthTokens {
            access_token: access.token,
            refresh_token,
            access_token_expires_at: access.expires_at,
            refresh_token_expires_at: refresh_expires_at,
            session_id,
        })
    }

    async fn issue_tokens(
        &self,
        subject: &TokenSubject,
        client: &ClientMeta,
    ) -> Result<AuthTokens, AuthError> {
        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let tokens = self.issue_tokens_in_tx(&mut *tx, subject, client).await?;

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        Ok(tokens)
    }

    async fn rotate(&self, request: RotateInput) -> Result<RotateResult, AuthError> {
        let token_hash = self.deps.hasher.hash(&request.refresh_token.0)?;
        let Some(record) = self.deps.refresh_tokens.get_by_hash(&token_hash).await? else {
            return Err(AuthError::invalid_token());
        };
        let claims = self
            .deps
            .codec
            .decode_refresh_token(&request.refresh_token)
            .await?;
        if claims.token_id != record.id || claims.user_id != record.user_id {
            return Err(AuthError::invalid_token());
        }

        if record.is_revoked() {
            self.revoke_family(&record, claims.session_id).await?;
            return Err(AuthError::TokenReused);
        }

        let now = self.deps.clock.now();
        if record.is_expired(now) {
            return Err(AuthError::Unauthorized("token expired".to_string()));
        }

        if let Some(claimed) = request.claimed_user_id {
            if claimed != record.user_id {
                tracing::warn!(
                    target: "audit",
                    claimed = %claimed,
                    owner = %record.user_id,
                    "refresh token presented by another account"
                );
                return Err(AuthError::Unauthorized("token owner mismatch".to_string()));
            }
        }

        if self.is_user_blacklisted(record.user_id, record.created_at).await {
            return Err(AuthError::Unauthorized("token revoked".to_string()));
        }

        let user = self
            .deps
            .users
            .get_by_id(record.user_id)
            .await?
            .ok_or_else(AuthError::invalid_token)?;
        if user.status != UserStatus::Active {
            return Err(AuthError::Forbidden(format!(
                "account is {}",
                user.status.as_str()
            )));
        }

        let linked = self
            .deps
            .user_sessions
            .get_by_refresh_token_id(record.id)
            .await?;
        let session_id = linked.as_ref().map(|s| s.id).unwrap_or(claims.session_id);

        let next_id = RefreshTokenId::new();
        let (refresh_token, refresh_expires_at) = self
            .deps
            .codec
            .issue_refresh_token(user.user_id, session_id, next_id)
            .await?;
        let next = RefreshTokenRecord {
            id: next_id,
            user_id: user.user_id,
            token_hash: self.deps.hasher.hash(&refresh_token.0)?,
            family_id: record.family_id,
            created_at: now,
            expires_at: refresh_expires_at,
            revoked_at: None,
            revoked_reason: None,
            replaced_by: None,
        };

        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        self.deps.refresh_tokens.create_in_tx(&mut *tx, &next).await?;
        let won = self
            .deps
            .refresh_tokens
            .revoke_in_tx(&mut *tx, record.id, RevokeReason::Rotation)
            .await?;
        if !won {
            // Another rotation revoked it first: same token presented twice.
            tx.rollback()
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
            self.revoke_family(&record, session_id).await?;
            return Err(AuthError::TokenReused);
        }
        self.deps
            .refresh_tokens
            .set_replaced_by_in_tx(&mut *tx, record.id, next_id)
            .await?;
        if let Some(linked) = &linked {
            self.deps
                .user_sessions
                .update_refresh_token_id_in_tx(&mut *tx, linked.id, next_id)
                .await?;
        } else {
            tracing::debug!(token_id = %record.id, "rotating token without linked session");
        }

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let access = self
            .deps
            .codec
            .issue_access_token(&AccessSubject {
                user_id: user.user_id,
                session_id,
                email: user.email.clone(),
            })
            .await?;

        tracing::info!(
            user_id = %user.user_id,
            family_id = %record.family_id,
            old = %record.id,
            new = %next_id,
            "refresh token rotated"
        );

        Ok(RotateResult {
            user: project_user(self.deps.profiles.as_ref(), &user).await,
            tokens: AuthTokens {
                access_token: access.token,
                refresh_token,
                access_token_expires_at: access.expires_at,
                refresh_token_expires_at: refresh_expires_at,
                session_id,
            },
        })
    }

    async fn revoke(&self, request: LogoutInput) -> Result<(), AuthError> {
        let token_hash = self.deps.hasher.hash(&request.refresh_token.0)?;
        let record = match self.deps.refresh_tokens.get_by_hash(&token_hash).await? {
            Some(r) if r.is_active(self.deps.clock.now()) => r,
            _ => {
                tracing::debug!("logout with stale refresh token");
                return Ok(());
            }
        };

        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let won = self
            .deps
            .refresh_tokens
            .revoke_in_tx(&mut *tx, record.id, RevokeReason::Logout)
            .await?;
        if won {
            // Only a rotation of this token re-points its session, and that
            // rotation can no longer win, so the link read here is final.
            if let Some(session) = self
                .deps
                .user_sessions
                .get_by_refresh_token_id_in_tx(&mut *tx, record.id)
                .await?
            {
                self.deps
                    .user_sessions
                    .revoke_in_tx(&mut *tx, session.id)
                    .await?;
            }
            tx.commit()
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        } else {
            tracing::debug!(token_id = %record.id, "logout lost to a concurrent rotation or logout");
            tx.rollback()
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        }

        if let Some(access) = &request.access_token {
            match self.deps.codec.verify_access_token(access).await {
                Ok(claims) if claims.user_id != record.user_id => {
                    tracing::warn!(
                        target: "audit",
                        owner = %record.user_id,
                        presented_by = %claims.user_id,
                        "logout with another account's access token"
                    );
                }
                Ok(claims) => {
                    let remaining = (claims.expires_at - self.deps.clock.now()).num_seconds();
                    if remaining > 0 {
                        if let Err(e) = self
                            .deps
                            .blacklist
                            .blacklist_token(&claims.jti, remaining as u64)
                            .await
                        {
                            tracing::warn!(
                                target: "audit",
                                user_id = %record.user_id,
                                error = %e,
                                "access token blacklist failed"
                            );
                        }
                    }
                }
                Err(e) => tracing::debug!(error = %e, "access token not blacklisted"),
            }
        }

        tracing::info!(
            target: "audit",
            user_id = %record.user_id,
            token_id = %record.id,
            "logout"
        );
        Ok(())
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<RevokeAllResult, AuthError> {
        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let tokens_revoked = self
            .deps
            .refresh_tokens
            .revoke_all_by_user_in_tx(&mut *tx, user_id, RevokeReason::LogoutAll)
            .await?;
        let sessions_revoked = self
            .deps
            .user_sessions
            .revoke_all_by_user_in_tx(&mut *tx, user_id)
            .await?;

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let since = blacklist_cutoff(self.deps.clock.now());
        if let Err(e) = self
            .deps
            .blacklist
            .blacklist_user(user_id, since, self.cfg.refresh_ttl.as_secs())
            .await
        {
            tracing::warn!(
                target: "audit",
                user_id = %user_id,
                error = %e,
                "user blacklist failed"
            );
        }

        tracing::info!(
            target: "audit",
            user_id = %user_id,
            tokens_revoked,
            sessions_revoked,
            "logout from all devices"
        );
        Ok(RevokeAllResult {
            tokens_revoked,
            sessions_revoked,
        })
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<AccessTokenClaims, AuthError> {
        let claims = self.deps.codec.verify_access_token(token).await?;

        match self.deps.blacklist.is_token_blacklisted(&claims.jti).await {
            Ok(true) => return Err(AuthError::Unauthorized("token revoked".to_string())),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                target: "audit",
                user_id = %claims.user_id,
                error = %e,
                "token blacklist unavailable, failing open"
            ),
        }
        if self
            .is_user_blacklisted(claims.user_id, claims.issued_at)
            .await
        {
            return Err(AuthError::Unauthorized("token revoked".to_string()));
        }
        Ok(claims)
    }
}
