//! In-memory wiring for service tests: one manual clock drives every store,
//! token and session deadline.

use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const PASSWORD: &str = "Corr3ct-Horse-Battery!";

pub(crate) fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap()
}

pub(crate) fn client() -> ClientMeta {
    ClientMeta {
        ip_address: Some("10.0.0.7".to_string()),
        user_agent: Some("tests".to_string()),
    }
}

/// A six-digit code guaranteed to differ from `code`.
pub(crate) fn wrong(code: &SecretString) -> SecretString {
    let flipped: String = code
        .expose_secret()
        .chars()
        .enumerate()
        .map(|(i, c)| if i == 0 { if c == '9' { '0' } else { '9' } } else { c })
        .collect();
    SecretString::from(flipped)
}

pub(crate) struct Harness {
    pub clock: Arc<ManualClock>,
    pub sender: Arc<RecordingNotificationSender>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub registration_sessions: Arc<MemoryRegistrationStore>,
    pub login_sessions: Arc<MemoryLoginStore>,
    pub rate_limits: Arc<MemoryRateLimitStore>,
    pub blacklist: Arc<MemoryBlacklistStore>,
    pub users: Arc<MemoryUserRepo>,
    pub auth: Arc<MemoryAuthRepo>,
    pub profiles: Arc<MemoryProfileRepo>,
    pub refresh_tokens: Arc<MemoryRefreshTokenRepo>,
    pub user_sessions: Arc<MemoryUserSessionRepo>,
    pub tx_manager: Arc<MemoryTxManager>,
    pub codec: Arc<JwtHs256Codec>,
    pub token_hasher: Arc<HmacTokenHasher>,
    pub tokens: Arc<RealTokenService>,
    pub registration: RealRegistrationService,
    pub login: RealLoginService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_flow(OtpFlowConfig::default())
    }

    pub fn with_flow(flow: OtpFlowConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let sender = Arc::new(RecordingNotificationSender::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(DispatcherConfig {
            capacity: 16,
            send_timeout: Duration::from_secs(5),
        }));
        let registration_sessions = Arc::new(MemoryRegistrationStore::new(dyn_clock.clone()));
        let login_sessions = Arc::new(MemoryLoginStore::new(dyn_clock.clone()));
        let rate_limits = Arc::new(MemoryRateLimitStore::new(dyn_clock.clone()));
        let blacklist = Arc::new(MemoryBlacklistStore::new(dyn_clock.clone()));
        let users = Arc::new(MemoryUserRepo::new());
        let auth = Arc::new(MemoryAuthRepo::new());
        let profiles = Arc::new(MemoryProfileRepo::new());
        let reference = Arc::new(MemoryReferenceData::default());
        let refresh_tokens = Arc::new(MemoryRefreshTokenRepo::new(dyn_clock.clone()));
        let user_sessions = Arc::new(MemoryUserSessionRepo::new(dyn_clock.clone()));
        let tx_manager = Arc::new(MemoryTxManager::new());

        let codec = Arc::new(JwtHs256Codec::new(
            JwtConfig {
                issuer: "pensionid.test".to_string(),
                audience: "pensionid-app".to_string(),
                access_ttl: Duration::from_secs(15 * 60),
                refresh_ttl: Duration::from_secs(7 * 24 * 3600),
                completion_ttl: Duration::from_secs(30 * 60),
                signing_key: b"test-signing-key-of-at-least-32-bytes".to_vec(),
            },
            dyn_clock.clone(),
        ));
        let token_hasher = Arc::new(HmacTokenHasher::new(
            b"test-token-hash-key-of-at-least-32b".to_vec(),
        ));
        let otp_codec: Arc<dyn OtpCodec> =
            Arc::new(Argon2OtpCodec::new(DEFAULT_OTP_LENGTH, Argon2Cost::minimal()).unwrap());
        let password_hasher: Arc<dyn CredentialHasher> =
            Arc::new(Argon2PasswordHasher::new(Argon2Cost::minimal()).unwrap());

        let tokens = Arc::new(RealTokenService::new(
            TokenDeps {
                codec: codec.clone(),
                hasher: token_hasher.clone(),
                refresh_tokens: refresh_tokens.clone(),
                user_sessions: user_sessions.clone(),
                users: users.clone(),
                profiles: profiles.clone(),
                blacklist: blacklist.clone(),
                tx_manager: tx_manager.clone(),
                clock: dyn_clock.clone(),
            },
            TokenServiceConfig {
                refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            },
        ));

        let registration = RealRegistrationService::new(
            RegistrationDeps {
                sessions: registration_sessions.clone(),
                rate_limits: rate_limits.clone(),
                users: users.clone(),
                auth: auth.clone(),
                profiles: profiles.clone(),
                reference,
                tx_manager: tx_manager.clone(),
                tokens: tokens.clone(),
                codec: codec.clone(),
                otp_codec: otp_codec.clone(),
                password_hasher,
                token_hasher: token_hasher.clone(),
                sender: sender.clone(),
                dispatcher: dispatcher.clone(),
                clock: dyn_clock.clone(),
            },
            RegistrationConfig {
                flow,
                password: PasswordPolicy::default(),
            },
        );

        let login = RealLoginService::new(
            LoginDeps {
                sessions: login_sessions.clone(),
                rate_limits: rate_limits.clone(),
                users: users.clone(),
                auth: auth.clone(),
                profiles: profiles.clone(),
                tokens: tokens.clone(),
                otp_codec,
                sender: sender.clone(),
                dispatcher: dispatcher.clone(),
                clock: dyn_clock,
            },
            flow,
        );

        Harness {
            clock,
            sender,
            dispatcher,
            registration_sessions,
            login_sessions,
            rate_limits,
            blacklist,
            users,
            auth,
            profiles,
            refresh_tokens,
            user_sessions,
            tx_manager,
            codec,
            token_hasher,
            tokens,
            registration,
            login,
        }
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    fn otp_mails(&self, email: &str) -> usize {
        self.sender
            .sent()
            .iter()
            .filter(|n| {
                n.email == email
                    && matches!(
                        n.kind,
                        NotificationKind::RegistrationOtp | NotificationKind::LoginOtp
                    )
            })
            .count()
    }

    /// Waits for the `nth` code mailed to `email` (1-based) and returns it.
    pub async fn otp(&self, email: &str, nth: usize) -> SecretString {
        for _ in 0..400 {
            if self.otp_mails(email) >= nth {
                if let Some(code) = self.sender.latest_otp(email) {
                    return SecretString::from(code);
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("otp #{nth} for {email} never arrived");
    }

    /// Lets in-flight sends land before counting mail.
    pub async fn settle(&self) {
        for _ in 0..400 {
            if self.dispatcher.in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("dispatcher never drained");
    }

    pub async fn start_registration(&self, email: &str) -> InitiateResult {
        self.registration
            .initiate(InitiateInput {
                email: email.to_string(),
                client: client(),
            })
            .await
            .unwrap()
    }

    /// Initiate, verify and set the password; returns the session and the
    /// completion token for the profile step.
    pub async fn registration_ready_for_profile(&self, email: &str) -> (SessionId, CompletionToken) {
        let started = self.start_registration(email).await;
        let code = self.otp(&normalize_email(email), 1).await;
        let verified = self
            .registration
            .verify_otp(VerifyOtpInput {
                session_id: started.session_id,
                otp: code,
            })
            .await
            .unwrap();
        let set = self
            .registration
            .set_password(SetPasswordInput {
                session_id: started.session_id,
                completion_token: verified.completion_token,
                password: SecretString::from(PASSWORD.to_string()),
                password_confirmation: SecretString::from(PASSWORD.to_string()),
            })
            .await
            .unwrap();
        (started.session_id, set.completion_token)
    }

    pub fn profile_input(&self, session_id: SessionId, token: CompletionToken) -> CompleteProfileInput {
        CompleteProfileInput {
            session_id,
            completion_token: token,
            full_name: "Anna Maria van Dijk".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1962, 3, 1).unwrap(),
            gender_code: "F".to_string(),
            client: client(),
        }
    }

    pub async fn register(&self, email: &str) -> RegistrationResult {
        let (session_id, token) = self.registration_ready_for_profile(email).await;
        self.registration
            .complete_profile(self.profile_input(session_id, token))
            .await
            .unwrap()
    }

    pub async fn record_for(&self, token: &RefreshToken) -> RefreshTokenRecord {
        let hash = self.token_hasher.hash(&token.0).unwrap();
        self.refresh_tokens.get_by_hash(&hash).await.unwrap().unwrap()
    }
}
