use anyhow::{Result, anyhow};
use config::{Config, File};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub log: Log,
    pub backend: Backend,
    pub redis: Redis,
    pub mysql: MySql,
    pub jwt: Jwt,
    pub otp: Otp,
    pub session: Session,
    pub rate_limit: RateLimit,
    pub password: Password,
    pub notification: Notification,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Real,
}

#[derive(Debug, Deserialize)]
pub struct Backend {
    pub kind: BackendKind,
}

#[derive(Debug, Deserialize)]
pub struct Redis {
    pub url: String,
    pub key_prefix: String,
}

#[derive(Debug, Deserialize)]
pub struct MySql {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct Jwt {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_secs: u64,
    pub refresh_ttl_secs: u64,
    pub completion_ttl_secs: u64,
    #[serde(deserialize_with = "secret")]
    pub signing_key: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct Otp {
    pub length: usize,
    pub ttl_secs: i64,
    pub max_attempts: u32,
    pub max_resends: u32,
    pub resend_cooldown_secs: i64,
}

#[derive(Debug, Deserialize)]
pub struct Session {
    pub registration_ttl_secs: i64,
    pub login_ttl_secs: i64,
    #[serde(deserialize_with = "secret")]
    pub token_hash_key: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct RateLimit {
    pub max_requests: u64,
    pub window_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Password {
    pub min_length: usize,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Log,
    Smtp,
}

#[derive(Debug, Deserialize)]
pub struct Notification {
    pub sender: SenderKind,
    pub capacity: usize,
    pub send_timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub smtp: Option<Smtp>,
}

#[derive(Debug, Deserialize)]
pub struct Smtp {
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(deserialize_with = "secret")]
    pub password: SecretString,
    pub from: String,
    pub starttls: bool,
    pub timeout_secs: u64,
}

fn secret<'de, D>(deserializer: D) -> std::result::Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

const MIN_KEY_LEN: usize = 32;

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let mut settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    if let Ok(key) = std::env::var("JWT_SIGNING_KEY") {
        settings.jwt.signing_key = SecretString::from(key);
    }
    if let Ok(key) = std::env::var("TOKEN_HASH_KEY") {
        settings.session.token_hash_key = SecretString::from(key);
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if self.jwt.signing_key.expose_secret().len() < MIN_KEY_LEN {
            return Err(anyhow!("jwt.signing_key must be at least {MIN_KEY_LEN} bytes"));
        }
        if self.session.token_hash_key.expose_secret().len() < MIN_KEY_LEN {
            return Err(anyhow!(
                "session.token_hash_key must be at least {MIN_KEY_LEN} bytes"
            ));
        }
        if self.notification.capacity == 0 {
            return Err(anyhow!("notification.capacity must be positive"));
        }
        if self.notification.sender == SenderKind::Smtp && self.notification.smtp.is_none() {
            return Err(anyhow!("notification.sender = \"smtp\" needs a [notification.smtp] section"));
        }
        Ok(())
    }
}
