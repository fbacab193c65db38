use crate::application_port::AuthError;
use crate::domain_port::{SessionPatch, SessionWrite};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

const SESSION_PATCH: &str = include_str!("session_patch.lua");
const SESSION_ATTEMPT: &str = include_str!("session_attempt.lua");

fn store_err(e: redis::RedisError) -> AuthError {
    AuthError::Store(e.to_string())
}

fn codec_err(e: serde_json::Error) -> AuthError {
    AuthError::InternalError(format!("session json: {e}"))
}

/// Flat field overrides sent to the patch script. Session records are stored
/// flattened, so OTP fields sit at the top level.
pub(crate) fn patch_fields(patch: &SessionPatch, registration: bool) -> Result<Value, AuthError> {
    let mut fields = Map::new();
    if let Some(status) = patch.status {
        fields.insert("status".into(), serde_json::to_value(status).map_err(codec_err)?);
    }
    if let Some(rotation) = &patch.otp {
        if let Value::Object(rotation) = serde_json::to_value(rotation).map_err(codec_err)? {
            fields.extend(rotation);
        }
    }
    if registration {
        if let Some(hash) = &patch.completion_token_hash {
            fields.insert("completion_token_hash".into(), Value::String(hash.clone()));
        }
        if let Some(at) = patch.password_set_at {
            fields.insert(
                "password_set_at".into(),
                serde_json::to_value(at).map_err(codec_err)?,
            );
        }
    }
    Ok(Value::Object(fields))
}

/// Guard arguments for the patch script: the admitted statuses and the
/// resend count the patch is pinned to, if any.
pub(crate) fn patch_guard(patch: &SessionPatch) -> (String, String) {
    let statuses = patch
        .allowed_from()
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let resend_count = patch
        .generation
        .map(|g| g.to_string())
        .unwrap_or_default();
    (statuses, resend_count)
}

fn written<T: DeserializeOwned>(reply: Option<(i64, String)>) -> Result<SessionWrite<T>, AuthError> {
    let Some((applied, raw)) = reply else {
        return Ok(SessionWrite::Missing);
    };
    let session = serde_json::from_str(&raw).map_err(codec_err)?;
    Ok(if applied == 1 {
        SessionWrite::Applied(session)
    } else {
        SessionWrite::Rejected(session)
    })
}

/// JSON-per-key session storage with TTL-preserving updates.
#[derive(Clone)]
pub(crate) struct JsonSessions {
    conn: ConnectionManager,
}

impl JsonSessions {
    pub(crate) fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub(crate) async fn create<T: Serialize>(
        &self,
        key: &str,
        session: &T,
        ttl_secs: u64,
    ) -> Result<(), AuthError> {
        let json = serde_json::to_string(session).map_err(codec_err)?;
        let mut conn = self.conn();
        let _: () = conn.set_ex(key, json, ttl_secs).await.map_err(store_err)?;
        Ok(())
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, AuthError> {
        let mut conn = self.conn();
        let raw: Option<String> = conn.get(key).await.map_err(store_err)?;
        raw.map(|s| serde_json::from_str(&s).map_err(codec_err))
            .transpose()
    }

    pub(crate) async fn patch<T: DeserializeOwned>(
        &self,
        key: &str,
        patch: &SessionPatch,
        fields: &Value,
    ) -> Result<SessionWrite<T>, AuthError> {
        let (statuses, resend_count) = patch_guard(patch);
        let mut conn = self.conn();
        let reply: Option<(i64, String)> = Script::new(SESSION_PATCH)
            .key(key)
            .arg(fields.to_string())
            .arg(statuses)
            .arg(resend_count)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        written(reply)
    }

    pub(crate) async fn record_attempt<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<SessionWrite<T>, AuthError> {
        let mut conn = self.conn();
        let reply: Option<(i64, String)> = Script::new(SESSION_ATTEMPT)
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        written(reply)
    }

    pub(crate) async fn delete(&self, key: &str) -> Result<(), AuthError> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(store_err)?;
        Ok(())
    }
}
