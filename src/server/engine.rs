use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use std::sync::Arc;

/// Every storage port the engine needs. Backends are picked by whoever
/// builds this.
#[derive(Clone)]
pub struct Stores {
    pub registration_sessions: Arc<dyn RegistrationSessionStore>,
    pub login_sessions: Arc<dyn LoginSessionStore>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub blacklist: Arc<dyn BlacklistStore>,
    pub users: Arc<dyn UserRepo>,
    pub auth: Arc<dyn AuthRepo>,
    pub profiles: Arc<dyn ProfileRepo>,
    pub reference: Arc<dyn ReferenceDataRepo>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepo>,
    pub user_sessions: Arc<dyn UserSessionRepo>,
    pub tx_manager: Arc<dyn TxManager>,
}

impl Stores {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Stores {
            registration_sessions: Arc::new(MemoryRegistrationStore::new(clock.clone())),
            login_sessions: Arc::new(MemoryLoginStore::new(clock.clone())),
            rate_limits: Arc::new(MemoryRateLimitStore::new(clock.clone())),
            blacklist: Arc::new(MemoryBlacklistStore::new(clock.clone())),
            users: Arc::new(MemoryUserRepo::new()),
            auth: Arc::new(MemoryAuthRepo::new()),
            profiles: Arc::new(MemoryProfileRepo::new()),
            reference: Arc::new(MemoryReferenceData::default()),
            refresh_tokens: Arc::new(MemoryRefreshTokenRepo::new(clock.clone())),
            user_sessions: Arc::new(MemoryUserSessionRepo::new(clock)),
            tx_manager: Arc::new(MemoryTxManager::new()),
        }
    }
}

#[derive(Clone)]
pub struct EngineConfig {
    pub jwt: JwtConfig,
    pub token_hash_key: Vec<u8>,
    pub otp_length: usize,
    pub argon2: Argon2Cost,
    pub registration: RegistrationConfig,
    pub login: OtpFlowConfig,
    pub dispatcher: DispatcherConfig,
}

pub struct Engine {
    pub registration: Arc<dyn RegistrationService>,
    pub login: Arc<dyn LoginService>,
    pub tokens: Arc<dyn TokenService>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl Engine {
    pub fn assemble(
        stores: Stores,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        cfg: EngineConfig,
    ) -> Result<Engine, AuthError> {
        let refresh_ttl = cfg.jwt.refresh_ttl;
        let codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(cfg.jwt, clock.clone()));
        let token_hasher = Arc::new(HmacTokenHasher::new(cfg.token_hash_key));
        let otp_codec: Arc<dyn OtpCodec> =
            Arc::new(Argon2OtpCodec::new(cfg.otp_length, cfg.argon2)?);
        let password_hasher: Arc<dyn CredentialHasher> =
            Arc::new(Argon2PasswordHasher::new(cfg.argon2)?);
        let dispatcher = Arc::new(NotificationDispatcher::new(cfg.dispatcher));

        let tokens: Arc<dyn TokenService> = Arc::new(RealTokenService::new(
            TokenDeps {
                codec: codec.clone(),
                hasher: token_hasher.clone(),
                refresh_tokens: stores.refresh_tokens,
                user_sessions: stores.user_sessions,
                users: stores.users.clone(),
                profiles: stores.profiles.clone(),
                blacklist: stores.blacklist,
                tx_manager: stores.tx_manager.clone(),
                clock: clock.clone(),
            },
            TokenServiceConfig { refresh_ttl },
        ));

        let registration: Arc<dyn RegistrationService> = Arc::new(RealRegistrationService::new(
            RegistrationDeps {
                sessions: stores.registration_sessions,
                rate_limits: stores.rate_limits.clone(),
                users: stores.users.clone(),
                auth: stores.auth.clone(),
                profiles: stores.profiles.clone(),
                reference: stores.reference,
                tx_manager: stores.tx_manager,
                tokens: tokens.clone(),
                codec,
                otp_codec: otp_codec.clone(),
                password_hasher,
                token_hasher,
                sender: sender.clone(),
                dispatcher: dispatcher.clone(),
                clock: clock.clone(),
            },
            cfg.registration,
        ));

        let login: Arc<dyn LoginService> = Arc::new(RealLoginService::new(
            LoginDeps {
                sessions: stores.login_sessions,
                rate_limits: stores.rate_limits,
                users: stores.users,
                auth: stores.auth,
                profiles: stores.profiles,
                tokens: tokens.clone(),
                otp_codec,
                sender,
                dispatcher: dispatcher.clone(),
                clock,
            },
            cfg.login,
        ));

        Ok(Engine {
            registration,
            login,
            tokens,
            dispatcher,
        })
    }
}
