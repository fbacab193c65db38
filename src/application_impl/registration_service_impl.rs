use crate::application_impl::notification_dispatcher::NotificationDispatcher;
use crate::application_impl::otp_flow::*;
use crate::application_impl::token_hasher::HmacTokenHasher;
use crate::application_impl::validation::{
    PasswordPolicy, check_adult, split_full_name, valid_email, valid_gender_code,
};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use secrecy::ExposeSecret;
use std::sync::Arc;

pub struct RegistrationDeps {
    pub sessions: Arc<dyn RegistrationSessionStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub users: Arc<dyn UserRepo>,
    pub auth: Arc<dyn AuthRepo>,
    pub profiles: Arc<dyn ProfileRepo>,
    pub reference: Arc<dyn ReferenceDataRepo>,
    pub tx_manager: Arc<dyn TxManager>,
    pub tokens: Arc<dyn TokenService>,
    pub codec: Arc<dyn TokenCodec>,
    pub otp_codec: Arc<dyn OtpCodec>,
    pub password_hasher: Arc<dyn CredentialHasher>,
    pub token_hasher: Arc<HmacTokenHasher>,
    pub sender: Arc<dyn NotificationSender>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationConfig {
    pub flow: OtpFlowConfig,
    pub password: PasswordPolicy,
}

pub struct RealRegistrationService {
    deps: RegistrationDeps,
    cfg: RegistrationConfig,
}

impl RealRegistrationService {
    pub fn new(deps: RegistrationDeps, cfg: RegistrationConfig) -> RealRegistrationService {
        RealRegistrationService { deps, cfg }
    }

    fn rate_limit_key(email: &str) -> String {
        format!("register:{email}")
    }

    async fn load(&self, session_id: SessionId) -> Result<RegistrationSession, AuthError> {
        self.deps
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("registration session".to_string()))
    }

    async fn release_email(&self, session: &RegistrationSession) {
        if let Err(e) = self
            .deps
            .sessions
            .unlock_email(&session.email, session.session_id)
            .await
        {
            tracing::warn!(session_id = %session.session_id, error = %e, "email lock release failed");
        }
    }

    /// Moves a pending session past its deadline to `EXPIRED` and frees the email.
    async fn expire(&self, session: &RegistrationSession) -> AuthError {
        if session.status == SessionStatus::PendingVerification {
            if let Err(e) = self
                .deps
                .sessions
                .update(
                    session.session_id,
                    &SessionPatch::status(SessionStatus::Expired),
                )
                .await
            {
                tracing::warn!(session_id = %session.session_id, error = %e, "marking session expired failed");
            }
        }
        self.release_email(session).await;
        AuthError::Expired("registration session".to_string())
    }

    fn send_code(&self, email: &str, code: secrecy::SecretString) {
        let sender = self.deps.sender.clone();
        let email = email.to_string();
        let minutes = self.cfg.flow.otp_ttl_minutes();
        self.deps.dispatcher.dispatch("registration_otp", async move {
            sender
                .send_registration_otp(&email, code.expose_secret(), minutes)
                .await
        });
    }

    /// Checks the completion token against the session and the hash stored
    /// for it, so only the most recently issued token is accepted.
    async fn authorize(
        &self,
        session_id: SessionId,
        token: &CompletionToken,
    ) -> Result<RegistrationSession, AuthError> {
        let claims = self.deps.codec.verify_completion_token(token).await?;
        if claims.session_id != session_id {
            return Err(AuthError::Unauthorized(
                "completion token does not belong to this session".to_string(),
            ));
        }

        let session = self.load(session_id).await?;
        if session.is_expired(self.deps.clock.now()) {
            return Err(self.expire(&session).await);
        }
        if claims.email != session.email {
            return Err(AuthError::invalid_token());
        }
        let Some(stored) = session.completion_token_hash.as_deref() else {
            return Err(AuthError::invalid_token());
        };
        if !self.deps.token_hasher.matches(&token.0, stored)? {
            return Err(AuthError::Unauthorized(
                "completion token superseded".to_string(),
            ));
        }
        Ok(session)
    }

    async fn cleanup_completed(&self, session: &RegistrationSession) {
        if let Err(e) = self.deps.sessions.delete(session.session_id).await {
            tracing::warn!(session_id = %session.session_id, error = %e, "session cleanup failed");
        }
        if let Err(e) = self
            .deps
            .sessions
            .delete_password_hash(session.session_id)
            .await
        {
            tracing::warn!(session_id = %session.session_id, error = %e, "password hash cleanup failed");
        }
        self.release_email(session).await;
    }
}

#[async_trait::async_trait]
impl RegistrationService for RealRegistrationService {
    async fn initiate(&self, request: InitiateInput) -> Result<InitiateResult, AuthError> {
        let email = normalize_email(&request.email);
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }
        enforce_rate_limit(
            self.deps.rate_limits.as_ref(),
            &Self::rate_limit_key(&email),
            &self.cfg.flow.rate_limit,
        )
        .await?;

        let now = self.deps.clock.now();
        if self.deps.users.email_exists(&email).await? {
            // Burn a hash so the suppressed path costs about the same.
            let _ = new_code(self.deps.otp_codec.as_ref())?;
            tracing::info!(target: "audit", email = %email, "registration requested for existing account");
            return Ok(self.cfg.flow.decoy(now));
        }

        let session_id = SessionId::new();
        let ttl_secs = self.cfg.flow.session_ttl_secs();
        if !self
            .deps
            .sessions
            .lock_email(&email, session_id, ttl_secs)
            .await?
        {
            return Err(AuthError::Conflict(
                "a registration is already in progress for this email".to_string(),
            ));
        }

        let created = async {
            let (code, otp_hash) = new_code(self.deps.otp_codec.as_ref())?;
            let session = RegistrationSession::new(
                session_id,
                email.clone(),
                otp_hash,
                now,
                self.cfg.flow.session_ttl,
                &self.cfg.flow.policy,
                request.client,
            );
            self.deps.sessions.create(&session, ttl_secs).await?;
            Ok::<_, AuthError>((session, code))
        }
        .await;
        let (session, code) = match created {
            Ok(v) => v,
            Err(e) => {
                if let Err(unlock) = self.deps.sessions.unlock_email(&email, session_id).await {
                    tracing::warn!(error = %unlock, "email lock release failed");
                }
                return Err(e);
            }
        };

        self.send_code(&email, code);
        tracing::info!(target: "audit", session_id = %session_id, "registration initiated");

        Ok(initiate_result(
            session_id,
            &session.challenge,
            session.expires_at,
        ))
    }

    async fn resend_otp(&self, session_id: SessionId) -> Result<ResendResult, AuthError> {
        let session = self.load(session_id).await?;
        let now = self.deps.clock.now();
        if session.is_expired(now) {
            return Err(self.expire(&session).await);
        }
        check_resend(session.status, &session.challenge, session.expires_at, now)?;

        let (code, otp_hash) = new_code(self.deps.otp_codec.as_ref())?;
        let rotation = session
            .challenge
            .rotation(otp_hash, now, self.cfg.flow.policy.otp_ttl);
        let updated = match self
            .deps
            .sessions
            .update(session_id, &SessionPatch::otp(rotation))
            .await?
        {
            SessionWrite::Applied(updated) => updated,
            SessionWrite::Rejected(held) => {
                return Err(resend_refused(
                    held.status,
                    &held.challenge,
                    held.expires_at,
                    now,
                ));
            }
            SessionWrite::Missing => {
                return Err(AuthError::NotFound("registration session".to_string()));
            }
        };

        self.send_code(&updated.email, code);
        tracing::info!(
            session_id = %session_id,
            resend_count = updated.challenge.resend_count,
            "registration otp resent"
        );
        Ok(resend_result(session_id, &updated.challenge))
    }

    async fn verify_otp(
        &self,
        request: VerifyOtpInput,
    ) -> Result<VerifyRegistrationResult, AuthError> {
        let session = self.load(request.session_id).await?;
        let now = self.deps.clock.now();
        if session.is_expired(now) {
            return Err(self.expire(&session).await);
        }
        check_verifiable(session.status, &session.challenge, now)?;

        let matched = self
            .deps
            .otp_codec
            .verify(request.otp.expose_secret(), &session.challenge.otp_hash)?;
        if !matched {
            let after = match self
                .deps
                .sessions
                .increment_attempts(request.session_id)
                .await?
            {
                SessionWrite::Applied(after) => after,
                SessionWrite::Rejected(held) => {
                    return Err(verify_refused(held.status, &held.challenge));
                }
                SessionWrite::Missing => {
                    return Err(AuthError::NotFound("registration session".to_string()));
                }
            };
            if after.status == SessionStatus::Failed {
                tracing::warn!(
                    target: "audit",
                    session_id = %request.session_id,
                    "registration failed: attempts exhausted"
                );
                self.release_email(&after).await;
            }
            return Err(AuthError::InvalidOtp {
                remaining_attempts: after.challenge.remaining_attempts(),
                status: after.status,
            });
        }

        let (completion_token, completion_token_expires_at) = self
            .deps
            .codec
            .issue_completion_token(request.session_id, &session.email)
            .await?;
        let token_hash = self.deps.token_hasher.hash(&completion_token.0)?;
        match self
            .deps
            .sessions
            .update(
                request.session_id,
                &SessionPatch::verified(token_hash).on_generation(session.challenge.resend_count),
            )
            .await?
        {
            SessionWrite::Applied(_) => {}
            SessionWrite::Rejected(held) => {
                return Err(verify_refused(held.status, &held.challenge));
            }
            SessionWrite::Missing => {
                return Err(AuthError::NotFound("registration session".to_string()));
            }
        }

        tracing::info!(target: "audit", session_id = %request.session_id, "registration email verified");
        Ok(VerifyRegistrationResult {
            session_id: request.session_id,
            status: SessionStatus::Verified,
            completion_token,
            completion_token_expires_at,
        })
    }

    async fn set_password(
        &self,
        request: SetPasswordInput,
    ) -> Result<SetPasswordResult, AuthError> {
        let session = self
            .authorize(request.session_id, &request.completion_token)
            .await?;
        if !session
            .status
            .can_transition_to(SessionStatus::PasswordSet)
        {
            return Err(AuthError::Forbidden(format!(
                "password cannot be set while session is {}",
                session.status
            )));
        }

        let password = request.password.expose_secret();
        if password != request.password_confirmation.expose_secret() {
            return Err(AuthError::Validation(
                "password confirmation does not match".to_string(),
            ));
        }
        self.cfg.password.check(password)?;
        let password_hash = self.deps.password_hasher.hash_password(password).await?;

        let now = self.deps.clock.now();
        let remaining_secs = (session.expires_at - now).num_seconds().max(1) as u64;
        self.deps
            .sessions
            .save_password_hash(request.session_id, &password_hash, remaining_secs)
            .await?;

        let (completion_token, completion_token_expires_at) = self
            .deps
            .codec
            .issue_completion_token(request.session_id, &session.email)
            .await?;
        let token_hash = self.deps.token_hasher.hash(&completion_token.0)?;
        match self
            .deps
            .sessions
            .update(
                request.session_id,
                &SessionPatch::password_set(token_hash, now),
            )
            .await?
        {
            SessionWrite::Applied(_) => {}
            SessionWrite::Rejected(held) => {
                return Err(AuthError::Forbidden(format!(
                    "password cannot be set while session is {}",
                    held.status
                )));
            }
            SessionWrite::Missing => {
                return Err(AuthError::NotFound("registration session".to_string()));
            }
        }

        tracing::info!(session_id = %request.session_id, "registration password set");
        Ok(SetPasswordResult {
            session_id: request.session_id,
            status: SessionStatus::PasswordSet,
            completion_token,
            completion_token_expires_at,
        })
    }

    async fn complete_profile(
        &self,
        request: CompleteProfileInput,
    ) -> Result<RegistrationResult, AuthError> {
        let session = self
            .authorize(request.session_id, &request.completion_token)
            .await?;
        if session.status != SessionStatus::PasswordSet {
            return Err(AuthError::Forbidden(format!(
                "profile cannot be completed while session is {}",
                session.status
            )));
        }

        let now = self.deps.clock.now();
        let (first_name, last_name) = split_full_name(&request.full_name)?;
        check_adult(request.date_of_birth, now.date_naive())?;
        let gender_code = request.gender_code.trim().to_string();
        if !valid_gender_code(&gender_code)
            || !self.deps.reference.gender_exists(&gender_code).await?
        {
            return Err(AuthError::Validation(format!(
                "unknown gender code {gender_code:?}"
            )));
        }

        let password_hash = self
            .deps
            .sessions
            .get_password_hash(request.session_id)
            .await?
            .ok_or_else(|| AuthError::Forbidden("password has not been set".to_string()))?;

        if self.deps.users.email_exists(&session.email).await? {
            return Err(AuthError::Conflict("email already registered".to_string()));
        }

        let user = UserRecord {
            user_id: UserId::new(),
            email: session.email.clone(),
            status: UserStatus::Active,
            created_at: now,
        };
        let profile = NewProfile {
            first_name,
            last_name,
            date_of_birth: request.date_of_birth,
            gender_code,
        };

        let mut tx = self
            .deps
            .tx_manager
            .begin()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        self.deps.users.create_in_tx(&mut *tx, &user).await?;
        self.deps
            .auth
            .create_credentials_in_tx(&mut *tx, user.user_id, &password_hash)
            .await?;
        self.deps
            .profiles
            .create_in_tx(&mut *tx, user.user_id, &profile)
            .await?;
        self.deps
            .auth
            .create_security_state_in_tx(
                &mut *tx,
                &SecurityStateRecord::initial(
                    user.user_id,
                    session.password_set_at.unwrap_or(now),
                ),
            )
            .await?;
        let tokens = self
            .deps
            .tokens
            .issue_tokens_in_tx(
                &mut *tx,
                &TokenSubject {
                    user_id: user.user_id,
                    email: user.email.clone(),
                },
                &request.client,
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        self.cleanup_completed(&session).await;

        let sender = self.deps.sender.clone();
        let email = user.email.clone();
        let first = profile.first_name.clone();
        self.deps.dispatcher.dispatch("welcome", async move {
            sender.send_welcome(&email, &first).await
        });

        tracing::info!(
            target: "audit",
            user_id = %user.user_id,
            session_id = %request.session_id,
            "registration completed"
        );
        Ok(RegistrationResult {
            user: UserSummary {
                user_id: user.user_id,
                email: user.email,
                first_name: Some(profile.first_name),
                last_name: Some(profile.last_name),
            },
            tokens,
        })
    }

    async fn session_status(&self, session_id: SessionId) -> Result<SessionView, AuthError> {
        let session = self.load(session_id).await?;
        let mut status = session.status;
        if session.is_expired(self.deps.clock.now()) {
            let _ = self.expire(&session).await;
            status = SessionStatus::Expired;
        } else if matches!(status, SessionStatus::Failed | SessionStatus::Expired) {
            self.release_email(&session).await;
        }
        Ok(SessionView::new(
            session_id,
            status,
            &session.challenge,
            session.expires_at,
        ))
    }
}
