#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use pensionid::application_impl::*;
use pensionid::application_port::*;
use pensionid::domain_model::*;
use pensionid::domain_port::Clock;
use pensionid::infra_memory::{ManualClock, NotificationKind, RecordingNotificationSender};
use pensionid::server::{Engine, EngineConfig, Stores};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;

pub const PASSWORD: &str = "Pension-Plan-2024!";

pub fn client() -> ClientMeta {
    ClientMeta {
        ip_address: Some("192.0.2.10".to_string()),
        user_agent: Some("integration".to_string()),
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        jwt: JwtConfig {
            issuer: "pensionid.it".to_string(),
            audience: "pensionid-it".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 3600),
            completion_ttl: Duration::from_secs(30 * 60),
            signing_key: b"integration-signing-key-32-bytes-min".to_vec(),
        },
        token_hash_key: b"integration-token-hash-key-32-bytes".to_vec(),
        otp_length: DEFAULT_OTP_LENGTH,
        argon2: Argon2Cost::minimal(),
        registration: RegistrationConfig::default(),
        login: OtpFlowConfig::default(),
        dispatcher: DispatcherConfig {
            capacity: 8,
            send_timeout: Duration::from_secs(5),
        },
    }
}

pub struct World {
    pub clock: Arc<ManualClock>,
    pub sender: Arc<RecordingNotificationSender>,
    pub engine: Engine,
}

impl World {
    pub fn new() -> Self {
        let start: DateTime<Utc> = Utc.with_ymd_and_hms(2025, 1, 6, 8, 30, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let sender = Arc::new(RecordingNotificationSender::new());
        let engine = Engine::assemble(
            Stores::in_memory(clock.clone()),
            sender.clone(),
            clock.clone(),
            engine_config(),
        )
        .unwrap();
        World {
            clock,
            sender,
            engine,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    /// Waits for the `nth` code mailed to `email` and returns it.
    pub async fn code(&self, email: &str, nth: usize) -> SecretString {
        for _ in 0..400 {
            let codes: Vec<String> = self
                .sender
                .sent()
                .into_iter()
                .filter(|n| {
                    n.email == email
                        && matches!(
                            n.kind,
                            NotificationKind::RegistrationOtp | NotificationKind::LoginOtp
                        )
                })
                .map(|n| n.payload)
                .collect();
            if let Some(code) = codes.get(nth - 1) {
                return SecretString::from(code.clone());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("code #{nth} for {email} never arrived");
    }

    pub async fn register(&self, email: &str) -> RegistrationResult {
        let registration = &self.engine.registration;
        let started = registration
            .initiate(InitiateInput {
                email: email.to_string(),
                client: client(),
            })
            .await
            .unwrap();
        let otp = self.code(email, 1).await;
        let verified = registration
            .verify_otp(VerifyOtpInput {
                session_id: started.session_id,
                otp,
            })
            .await
            .unwrap();
        let set = registration
            .set_password(SetPasswordInput {
                session_id: started.session_id,
                completion_token: verified.completion_token,
                password: SecretString::from(PASSWORD.to_string()),
                password_confirmation: SecretString::from(PASSWORD.to_string()),
            })
            .await
            .unwrap();
        registration
            .complete_profile(CompleteProfileInput {
                session_id: started.session_id,
                completion_token: set.completion_token,
                full_name: "Pieter de Vries".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1958, 11, 23).unwrap(),
                gender_code: "M".to_string(),
                client: client(),
            })
            .await
            .unwrap()
    }

    /// Logs in by code; `nth` is the position of the login code among all
    /// codes mailed to `email`.
    pub async fn login(&self, email: &str, nth: usize) -> LoginResult {
        let started = self
            .engine
            .login
            .initiate(InitiateInput {
                email: email.to_string(),
                client: client(),
            })
            .await
            .unwrap();
        let otp = self.code(email, nth).await;
        self.engine
            .login
            .verify_otp(VerifyOtpInput {
                session_id: started.session_id,
                otp,
            })
            .await
            .unwrap()
    }

    pub async fn rotate(&self, token: &RefreshToken) -> Result<RotateResult, AuthError> {
        self.engine
            .tokens
            .rotate(RotateInput {
                refresh_token: token.clone(),
                claimed_user_id: None,
                client: client(),
            })
            .await
    }
}

/// Same length as `code`, never equal to it.
pub fn wrong(code: &SecretString) -> SecretString {
    let flipped: String = code
        .expose_secret()
        .chars()
        .map(|c| if c == '0' { '1' } else { '0' })
        .collect();
    SecretString::from(flipped)
}
