use crate::application_impl::notification_dispatcher::NotificationDispatcher;
use crate::application_impl::otp_flow::*;
use crate::application_impl::token_service_impl::project_user;
use crate::application_impl::validation::valid_email;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

pub struct LoginDeps {
    pub sessions: Arc<dyn LoginSessionStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub users: Arc<dyn UserRepo>,
    pub auth: Arc<dyn AuthRepo>,
    pub profiles: Arc<dyn ProfileRepo>,
    pub tokens: Arc<dyn TokenService>,
    pub otp_codec: Arc<dyn OtpCodec>,
    pub sender: Arc<dyn NotificationSender>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub clock: Arc<dyn Clock>,
}

pub struct RealLoginService {
    deps: LoginDeps,
    cfg: OtpFlowConfig,
}

impl RealLoginService {
    pub fn new(deps: LoginDeps, cfg: OtpFlowConfig) -> RealLoginService {
        RealLoginService { deps, cfg }
    }

    async fn load(&self, session_id: SessionId) -> Result<LoginSession, AuthError> {
        self.deps
            .sessions
            .get(session_id)
            .await?
            .ok_or_else(|| AuthError::NotFound("login session".to_string()))
    }

    async fn expire(&self, session: &LoginSession) -> AuthError {
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
        AuthError::Expired("login session".to_string())
    }

    fn send_code(&self, email: &str, code: SecretString) {
        let sender = self.deps.sender.clone();
        let email = email.to_string();
        let minutes = self.cfg.otp_ttl_minutes();
        self.deps.dispatcher.dispatch("login_otp", async move {
            sender
                .send_login_otp(&email, code.expose_secret(), minutes)
                .await
        });
    }

    async fn discard(&self, session_id: SessionId) {
        if let Err(e) = self.deps.sessions.delete(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "login session cleanup failed");
        }
    }
}

#[async_trait::async_trait]
impl LoginService for RealLoginService {
    async fn initiate(&self, request: InitiateInput) -> Result<InitiateResult, AuthError> {
        let email = normalize_email(&request.email);
        if !valid_email(&email) {
            return Err(AuthError::Validation("invalid email address".to_string()));
        }
        enforce_rate_limit(
            self.deps.rate_limits.as_ref(),
            &format!("login:{email}"),
            &self.cfg.rate_limit,
        )
        .await?;

        let now = self.deps.clock.now();
        let user = match self.deps.users.get_by_email(&email).await? {
            Some(user) if user.status == UserStatus::Active => user,
            other => {
                let _ = new_code(self.deps.otp_codec.as_ref())?;
                tracing::info!(
                    target: "audit",
                    email = %email,
                    status = other.as_ref().map(|u| u.status.as_str()).unwrap_or("UNKNOWN"),
                    "login requested for ineligible account"
                );
                return Ok(self.cfg.decoy(now));
            }
        };

        let (code, otp_hash) = new_code(self.deps.otp_codec.as_ref())?;
        let session = LoginSession::new(
            SessionId::new(),
            email,
            user.user_id,
            otp_hash,
            now,
            self.cfg.session_ttl,
            &self.cfg.policy,
            request.client,
        );
        self.deps
            .sessions
            .create(&session, self.cfg.session_ttl_secs())
            .await?;

        self.send_code(&session.email, code);
        tracing::info!(
            target: "audit",
            user_id = %user.user_id,
            session_id = %session.session_id,
            "login initiated"
        );
        Ok(initiate_result(
            session.session_id,
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
        let rotation = session.challenge.rotation(otp_hash, now, self.cfg.policy.otp_ttl);
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
            SessionWrite::Missing => return Err(AuthError::NotFound("login session".to_string())),
        };

        self.send_code(&updated.email, code);
        Ok(resend_result(session_id, &updated.challenge))
    }

    async fn verify_otp(&self, request: VerifyOtpInput) -> Result<LoginResult, AuthError> {
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
                    return Err(AuthError::NotFound("login session".to_string()));
                }
            };
            if after.status == SessionStatus::Failed {
                tracing::warn!(
                    target: "audit",
                    session_id = %request.session_id,
                    "login failed: attempts exhausted"
                );
            }
            return Err(AuthError::InvalidOtp {
                remaining_attempts: after.challenge.remaining_attempts(),
                status: after.status,
            });
        }

        let user = match session.user_id {
            Some(user_id) => self.deps.users.get_by_id(user_id).await?,
            None => None,
        };
        let Some(user) = user.filter(|u| u.status == UserStatus::Active) else {
            self.discard(request.session_id).await;
            return Err(AuthError::Forbidden("account is not active".to_string()));
        };

        // Closes the session to a second verify while tokens are minted.
        match self
            .deps
            .sessions
            .update(
                request.session_id,
                &SessionPatch::status(SessionStatus::Verified)
                    .on_generation(session.challenge.resend_count),
            )
            .await?
        {
            SessionWrite::Applied(_) => {}
            SessionWrite::Rejected(held) => {
                return Err(verify_refused(held.status, &held.challenge));
            }
            SessionWrite::Missing => return Err(AuthError::NotFound("login session".to_string())),
        }

        let tokens = self
            .deps
            .tokens
            .issue_tokens(
                &TokenSubject {
                    user_id: user.user_id,
                    email: user.email.clone(),
                },
                &session.client,
            )
            .await?;

        self.discard(request.session_id).await;
        if let Err(e) = self.deps.auth.record_login(user.user_id, now).await {
            tracing::warn!(user_id = %user.user_id, error = %e, "recording login failed");
        }

        tracing::info!(
            target: "audit",
            user_id = %user.user_id,
            session_id = %tokens.session_id,
            "login completed"
        );
        Ok(LoginResult {
            user: project_user(self.deps.profiles.as_ref(), &user).await,
            tokens,
        })
    }

    async fn session_status(&self, session_id: SessionId) -> Result<SessionView, AuthError> {
        let session = self.load(session_id).await?;
        let status = if session.is_expired(self.deps.clock.now()) {
            SessionStatus::Expired
        } else {
            session.status
        };
        Ok(SessionView::new(
            session_id,
            status,
            &session.challenge,
            session.expires_at,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::test_support::*;
    use crate::infra_memory::NotificationKind;

    const EMAIL: &str = "anna@example.org";

    async fn start(h: &Harness, email: &str) -> InitiateResult {
        h.login
            .initiate(InitiateInput {
                email: email.to_string(),
                client: client(),
            })
            .await
            .unwrap()
    }

    async fn verify(h: &Harness, session_id: SessionId, otp: SecretString) -> Result<LoginResult, AuthError> {
        h.login.verify_otp(VerifyOtpInput { session_id, otp }).await
    }

    #[tokio::test]
    async fn code_login_issues_tokens_and_consumes_the_session() {
        let h = Harness::new();
        let registered = h.register(EMAIL).await;
        h.advance(3600);

        let started = start(&h, "ANNA@example.org").await;
        // Mail #1 was the registration code.
        let code = h.otp(EMAIL, 2).await;
        let result = verify(&h, started.session_id, SecretString::from(code.expose_secret().to_string()))
            .await
            .unwrap();

        assert_eq!(result.user.user_id, registered.user.user_id);
        assert_eq!(result.user.first_name.as_deref(), Some("Anna Maria van"));
        assert_ne!(result.tokens.session_id, registered.tokens.session_id);
        let verified = h
            .tokens
            .verify_access_token(&result.tokens.access_token)
            .await
            .unwrap();
        assert_eq!(verified.user_id, registered.user.user_id);

        assert!(h.login_sessions.get(started.session_id).await.unwrap().is_none());
        let state = h.auth.security_state(registered.user.user_id).unwrap();
        assert_eq!(state.last_login_at, Some(h.clock.now()));

        let err = verify(&h, started.session_id, code).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn ineligible_accounts_get_decoys_without_mail() {
        let h = Harness::new();
        let bob = h.register("bob@example.org").await;
        h.users.set_status(bob.user.user_id, UserStatus::Suspended);

        for email in ["nobody@example.org", "bob@example.org"] {
            let decoy = start(&h, email).await;
            assert_eq!(decoy.expires_at, h.clock.now() + chrono::Duration::minutes(30));
            let err = h.login.session_status(decoy.session_id).await.unwrap_err();
            assert!(matches!(err, AuthError::NotFound(_)));
        }

        h.settle().await;
        assert_eq!(h.sender.count(NotificationKind::LoginOtp), 0);
    }

    #[tokio::test]
    async fn wrong_codes_spend_attempts_until_the_session_fails() {
        let h = Harness::new();
        h.register(EMAIL).await;
        let started = start(&h, EMAIL).await;
        let code = h.otp(EMAIL, 2).await;

        let err = verify(&h, started.session_id, wrong(&code)).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::InvalidOtp { remaining_attempts: 4, status: SessionStatus::PendingVerification }
        ));
        let view = h.login.session_status(started.session_id).await.unwrap();
        assert_eq!(view.attempts_remaining, 4);

        for _ in 0..4 {
            let _ = verify(&h, started.session_id, wrong(&code)).await;
        }
        let view = h.login.session_status(started.session_id).await.unwrap();
        assert_eq!(view.status, SessionStatus::Failed);

        let err = verify(&h, started.session_id, code).await.unwrap_err();
        assert!(matches!(err, AuthError::AttemptsExhausted));
        assert_eq!(h.user_sessions.count(), 1);
    }

    #[tokio::test]
    async fn account_suspended_mid_flow_is_refused() {
        let h = Harness::new();
        let registered = h.register(EMAIL).await;
        let started = start(&h, EMAIL).await;
        let code = h.otp(EMAIL, 2).await;

        h.users.set_status(registered.user.user_id, UserStatus::Suspended);
        let err = verify(&h, started.session_id, code).await.unwrap_err();
        assert!(matches!(err, AuthError::Forbidden(_)));
        assert!(h.login_sessions.get(started.session_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resent_code_replaces_the_old_one() {
        let h = Harness::new();
        h.register(EMAIL).await;
        let started = start(&h, EMAIL).await;
        let first = h.otp(EMAIL, 2).await;

        let err = h.login.resend_otp(started.session_id).await.unwrap_err();
        assert!(matches!(err, AuthError::TooManyRequests { retry_after_secs: 60 }));

        h.advance(60);
        let resent = h.login.resend_otp(started.session_id).await.unwrap();
        assert_eq!(resent.resends_remaining, 2);
        let second = h.otp(EMAIL, 3).await;

        let err = verify(&h, started.session_id, first).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOtp { remaining_attempts: 4, .. }));
        verify(&h, started.session_id, second).await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_session_disappears_with_its_deadline() {
        let h = Harness::new();
        h.register(EMAIL).await;
        let started = start(&h, EMAIL).await;
        let code = h.otp(EMAIL, 2).await;

        h.advance(30 * 60);
        let err = verify(&h, started.session_id, code).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[tokio::test]
    async fn login_limit_is_separate_from_registration() {
        let h = Harness::new();
        h.register(EMAIL).await;
        for _ in 0..5 {
            start(&h, EMAIL).await;
        }
        let err = h
            .login
            .initiate(InitiateInput {
                email: EMAIL.to_string(),
                client: client(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TooManyRequests);

        // Registration keeps its own counter and answers with a decoy.
        h.start_registration(EMAIL).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_guesses_respect_the_attempt_limit() {
        for _ in 0..10 {
            let h = Arc::new(Harness::new());
            h.register(EMAIL).await;
            let id = start(&h, EMAIL).await.session_id;
            let code = h.otp(EMAIL, 2).await;

            let mut guesses: Vec<_> = (0..11).map(|_| wrong(&code)).collect();
            guesses.insert(5, SecretString::from(code.expose_secret().to_string()));
            let handles: Vec<_> = guesses
                .into_iter()
                .map(|otp| {
                    let h = h.clone();
                    tokio::spawn(async move { verify(&h, id, otp).await })
                })
                .collect();

            let mut logged_in = 0;
            let mut failed_seen = false;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => logged_in += 1,
                    Err(AuthError::InvalidOtp {
                        status: SessionStatus::Failed,
                        ..
                    }) => failed_seen = true,
                    Err(
                        AuthError::InvalidOtp { .. }
                        | AuthError::AttemptsExhausted
                        | AuthError::Conflict(_)
                        | AuthError::NotFound(_),
                    ) => {}
                    Err(other) => panic!("unexpected error {other:?}"),
                }
            }
            assert!(logged_in <= 1);
            assert!(!(logged_in == 1 && failed_seen));

            match h.login_sessions.get(id).await.unwrap() {
                Some(stored) => {
                    assert_eq!(logged_in, 0);
                    assert_eq!(stored.status, SessionStatus::Failed);
                    assert_eq!(stored.challenge.attempts, stored.challenge.max_attempts);
                }
                None => assert_eq!(logged_in, 1),
            }
            assert_eq!(h.user_sessions.count(), 1 + logged_in);
        }
    }
}
