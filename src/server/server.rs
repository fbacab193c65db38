use crate::application_impl::*;
use crate::domain_model::OtpPolicy;
use crate::domain_port::*;
use crate::infra_mail::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::{BackendKind, SenderKind, Settings};
use nanoid::nanoid;
use secrecy::ExposeSecret;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    pub engine: Engine,
    pub run_id: String,
    pool: Option<Pool<MySql>>,
    shutdown_grace: Duration,
}

impl EngineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let otp = &settings.otp;
        let policy = OtpPolicy {
            otp_ttl: chrono::Duration::seconds(otp.ttl_secs),
            max_attempts: otp.max_attempts,
            max_resends: otp.max_resends,
            resend_cooldown: chrono::Duration::seconds(otp.resend_cooldown_secs),
        };
        let rate_limit = RateLimitPolicy {
            max_requests: settings.rate_limit.max_requests,
            window_secs: settings.rate_limit.window_secs,
        };
        let password = &settings.password;

        EngineConfig {
            jwt: JwtConfig {
                issuer: settings.jwt.issuer.clone(),
                audience: settings.jwt.audience.clone(),
                access_ttl: Duration::from_secs(settings.jwt.access_ttl_secs),
                refresh_ttl: Duration::from_secs(settings.jwt.refresh_ttl_secs),
                completion_ttl: Duration::from_secs(settings.jwt.completion_ttl_secs),
                signing_key: settings.jwt.signing_key.expose_secret().as_bytes().to_vec(),
            },
            token_hash_key: settings
                .session
                .token_hash_key
                .expose_secret()
                .as_bytes()
                .to_vec(),
            otp_length: otp.length,
            argon2: Argon2Cost {
                memory_kib: password.argon2_memory_kib,
                iterations: password.argon2_iterations,
                parallelism: password.argon2_parallelism,
            },
            registration: RegistrationConfig {
                flow: OtpFlowConfig {
                    policy,
                    session_ttl: chrono::Duration::seconds(settings.session.registration_ttl_secs),
                    rate_limit,
                },
                password: PasswordPolicy {
                    min_length: password.min_length,
                },
            },
            login: OtpFlowConfig {
                policy,
                session_ttl: chrono::Duration::seconds(settings.session.login_ttl_secs),
                rate_limit,
            },
            dispatcher: DispatcherConfig {
                capacity: settings.notification.capacity,
                send_timeout: Duration::from_secs(settings.notification.send_timeout_secs),
            },
        }
    }
}

fn build_sender(settings: &Settings) -> anyhow::Result<Arc<dyn NotificationSender>> {
    match settings.notification.sender {
        SenderKind::Log => Ok(Arc::new(LogNotificationSender)),
        SenderKind::Smtp => {
            let smtp = settings
                .notification
                .smtp
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("missing [notification.smtp] settings"))?;
            let sender = SmtpNotificationSender::new(&SmtpConfig {
                host: smtp.host.clone(),
                port: smtp.port,
                username: smtp.username.clone(),
                password: smtp.password.clone(),
                from: smtp.from.clone(),
                starttls: smtp.starttls,
                timeout: Duration::from_secs(smtp.timeout_secs),
            })?;
            Ok(Arc::new(sender))
        }
    }
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let alphabet: [char; 16] = [
            '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
        ];
        let run_id = nanoid!(10, &alphabet);

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (stores, pool) = match settings.backend.kind {
            BackendKind::Memory => (Stores::in_memory(clock.clone()), None),
            BackendKind::Real => {
                let redis_client = redis::Client::open(settings.redis.url.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                let prefix = &settings.redis.key_prefix;

                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.mysql.max_connections)
                    .connect(&settings.mysql.url)
                    .await?;

                let stores = Stores {
                    registration_sessions: Arc::new(RedisRegistrationStore::new(
                        redis_manager.clone(),
                        format!("{prefix}:reg"),
                    )),
                    login_sessions: Arc::new(RedisLoginStore::new(
                        redis_manager.clone(),
                        format!("{prefix}:login"),
                    )),
                    rate_limits: Arc::new(RedisRateLimitStore::new(
                        redis_manager.clone(),
                        format!("{prefix}:rl"),
                    )),
                    blacklist: Arc::new(RedisBlacklistStore::new(
                        redis_manager,
                        format!("{prefix}:bl"),
                    )),
                    users: Arc::new(MySqlUserRepo::new(pool.clone())),
                    auth: Arc::new(MySqlAuthRepo::new(pool.clone())),
                    profiles: Arc::new(MySqlProfileRepo::new(pool.clone())),
                    reference: Arc::new(MySqlReferenceData::new(pool.clone())),
                    refresh_tokens: Arc::new(MySqlRefreshTokenRepo::new(
                        pool.clone(),
                        clock.clone(),
                    )),
                    user_sessions: Arc::new(MySqlUserSessionRepo::new(
                        pool.clone(),
                        clock.clone(),
                    )),
                    tx_manager: Arc::new(MySqlTxManager::new(pool.clone())),
                };
                (stores, Some(pool))
            }
        };

        let sender = build_sender(settings)?;
        let engine = Engine::assemble(
            stores,
            sender,
            clock,
            EngineConfig::from_settings(settings),
        )?;

        info!(
            %run_id,
            backend = ?settings.backend.kind,
            sender = ?settings.notification.sender,
            "server started"
        );

        Ok(Self {
            engine,
            run_id,
            pool,
            shutdown_grace: Duration::from_secs(settings.notification.shutdown_grace_secs),
        })
    }

    pub async fn shutdown(&self) {
        info!(run_id = %self.run_id, "server shutting down...");

        let drained = self.engine.dispatcher.shutdown(self.shutdown_grace).await;
        info!(drained, "notification dispatcher stopped");

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
