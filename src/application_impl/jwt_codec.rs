use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::Clock;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const TYP_ACCESS: &str = "access";
const TYP_REFRESH: &str = "refresh";
const PURPOSE_REGISTRATION: &str = "registration_completion";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub completion_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String, // user id as string
    sid: String, // user session id
    email: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // blacklist key
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    sid: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // refresh token record id
    typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RegistrationClaims {
    sub: String, // registration session id
    email: String,
    purpose: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String, // makes every rotation distinct
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
    clock: Arc<dyn Clock>,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig, clock: Arc<dyn Clock>) -> Self {
        JwtHs256Codec { cfg, clock }
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn window(&self, ttl: Duration) -> Result<(DateTime<Utc>, DateTime<Utc>), AuthError> {
        let iat = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AuthError::InternalError(format!("ttl out of range: {e}")))?;
        Ok((iat, iat + ttl))
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&self.cfg.signing_key),
        )
        .map_err(|e| AuthError::InternalError(e.to_string()))
    }

    /// Signature, issuer and audience are checked here; expiry is compared
    /// against the injected clock by the callers.
    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = false;
        v.set_audience(&[self.cfg.audience.clone()]);
        v.set_issuer(&[self.cfg.issuer.clone()]);
        let data = decode::<T>(token, &DecodingKey::from_secret(&self.cfg.signing_key), &v)
            .map_err(|_| AuthError::invalid_token())?;
        Ok(data.claims)
    }

    fn is_expired(&self, exp: i64) -> bool {
        self.clock.now().timestamp() >= exp
    }

    #[inline]
    fn parse_uuid(s: &str) -> Result<uuid::Uuid, AuthError> {
        uuid::Uuid::parse_str(s).map_err(|_| AuthError::invalid_token())
    }

    fn timestamp(secs: i64) -> Result<DateTime<Utc>, AuthError> {
        DateTime::from_timestamp(secs, 0).ok_or_else(AuthError::invalid_token)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        subject: &AccessSubject,
    ) -> Result<IssuedAccessToken, AuthError> {
        let (iat, exp) = self.window(self.cfg.access_ttl)?;
        let jti = Self::gen_jti();
        let claims = AccessClaims {
            sub: subject.user_id.to_string(),
            sid: subject.session_id.to_string(),
            email: subject.email.clone(),
            exp: exp.timestamp(),
            iat: iat.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: jti.clone(),
            typ: TYP_ACCESS.to_string(),
        };
        Ok(IssuedAccessToken {
            token: AccessToken(self.sign(&claims)?),
            jti,
            expires_at: exp,
        })
    }

    async fn issue_refresh_token(
        &self,
        user: UserId,
        session: UserSessionId,
        token_id: RefreshTokenId,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError> {
        let (iat, exp) = self.window(self.cfg.refresh_ttl)?;
        let claims = RefreshClaims {
            sub: user.to_string(),
            sid: session.to_string(),
            exp: exp.timestamp(),
            iat: iat.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: token_id.to_string(),
            typ: TYP_REFRESH.to_string(),
        };
        Ok((RefreshToken(self.sign(&claims)?), exp))
    }

    async fn issue_completion_token(
        &self,
        session_id: SessionId,
        email: &str,
    ) -> Result<(CompletionToken, DateTime<Utc>), AuthError> {
        let (iat, exp) = self.window(self.cfg.completion_ttl)?;
        let claims = RegistrationClaims {
            sub: session_id.to_string(),
            email: email.to_string(),
            purpose: PURPOSE_REGISTRATION.to_string(),
            exp: exp.timestamp(),
            iat: iat.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: Self::gen_jti(),
        };
        Ok((CompletionToken(self.sign(&claims)?), exp))
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<AccessTokenClaims, AuthError> {
        let claims: AccessClaims = self.decode_claims(&token.0)?;
        if claims.typ != TYP_ACCESS {
            return Err(AuthError::invalid_token());
        }
        if self.is_expired(claims.exp) {
            return Err(AuthError::Unauthorized("token expired".to_string()));
        }
        Ok(AccessTokenClaims {
            user_id: UserId(Self::parse_uuid(&claims.sub)?),
            session_id: UserSessionId(Self::parse_uuid(&claims.sid)?),
            jti: claims.jti,
            issued_at: Self::timestamp(claims.iat)?,
            expires_at: Self::timestamp(claims.exp)?,
        })
    }

    async fn decode_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenClaims, AuthError> {
        let claims: RefreshClaims = self.decode_claims(&token.0)?;
        if claims.typ != TYP_REFRESH {
            return Err(AuthError::invalid_token());
        }
        Ok(RefreshTokenClaims {
            user_id: UserId(Self::parse_uuid(&claims.sub)?),
            session_id: UserSessionId(Self::parse_uuid(&claims.sid)?),
            token_id: RefreshTokenId(Self::parse_uuid(&claims.jti)?),
            expires_at: Self::timestamp(claims.exp)?,
        })
    }

    async fn verify_completion_token(
        &self,
        token: &CompletionToken,
    ) -> Result<CompletionClaims, AuthError> {
        let claims: RegistrationClaims = self.decode_claims(&token.0)?;
        if claims.purpose != PURPOSE_REGISTRATION {
            return Err(AuthError::invalid_token());
        }
        if self.is_expired(claims.exp) {
            return Err(AuthError::Expired("completion token".to_string()));
        }
        Ok(CompletionClaims {
            session_id: SessionId(Self::parse_uuid(&claims.sub)?),
            email: claims.email,
            expires_at: Self::timestamp(claims.exp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::ManualClock;

    fn config() -> JwtConfig {
        JwtConfig {
            issuer: "pensionid.auth".to_string(),
            audience: "pension-portal".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            completion_ttl: Duration::from_secs(10 * 60),
            signing_key: b"test-signing-key".to_vec(),
        }
    }

    fn codec() -> (JwtHs256Codec, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (JwtHs256Codec::new(config(), clock.clone()), clock)
    }

    fn subject() -> AccessSubject {
        AccessSubject {
            user_id: UserId::new(),
            session_id: UserSessionId::new(),
            email: "a@x.com".to_string(),
        }
    }

    #[tokio::test]
    async fn access_token_round_trips_claims() {
        let (codec, _) = codec();
        let subject = subject();
        let issued = codec.issue_access_token(&subject).await.unwrap();

        let claims = codec.verify_access_token(&issued.token).await.unwrap();
        assert_eq!(claims.user_id, subject.user_id);
        assert_eq!(claims.session_id, subject.session_id);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.expires_at.timestamp(), issued.expires_at.timestamp());
    }

    #[tokio::test]
    async fn every_access_token_gets_a_fresh_jti() {
        let (codec, _) = codec();
        let subject = subject();
        let a = codec.issue_access_token(&subject).await.unwrap();
        let b = codec.issue_access_token(&subject).await.unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[tokio::test]
    async fn access_token_expires_on_the_clock() {
        let (codec, clock) = codec();
        let issued = codec.issue_access_token(&subject()).await.unwrap();

        clock.advance(chrono::Duration::minutes(15));
        let err = codec.verify_access_token(&issued.token).await.unwrap_err();
        assert!(matches!(err, AuthError::Unauthorized(m) if m == "token expired"));
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let (codec, _) = codec();
        let subject = subject();
        let (refresh, _) = codec
            .issue_refresh_token(subject.user_id, subject.session_id, RefreshTokenId::new())
            .await
            .unwrap();
        let access = codec.issue_access_token(&subject).await.unwrap();

        assert!(codec.verify_access_token(&AccessToken(refresh.0.clone())).await.is_err());
        assert!(codec.decode_refresh_token(&RefreshToken(access.token.0)).await.is_err());
        assert!(
            codec
                .verify_completion_token(&CompletionToken(refresh.0))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn refresh_decode_ignores_expiry() {
        let (codec, clock) = codec();
        let token_id = RefreshTokenId::new();
        let user = UserId::new();
        let (refresh, _) = codec
            .issue_refresh_token(user, UserSessionId::new(), token_id)
            .await
            .unwrap();

        clock.advance(chrono::Duration::days(30));
        let claims = codec.decode_refresh_token(&refresh).await.unwrap();
        assert_eq!(claims.token_id, token_id);
        assert_eq!(claims.user_id, user);
    }

    #[tokio::test]
    async fn tampered_or_foreign_tokens_are_rejected() {
        let (codec, clock) = codec();
        let issued = codec.issue_access_token(&subject()).await.unwrap();
        let mut tampered = issued.token.0.clone();
        tampered.push('x');
        assert!(codec.verify_access_token(&AccessToken(tampered)).await.is_err());

        let mut other_cfg = config();
        other_cfg.signing_key = b"another-key".to_vec();
        let other = JwtHs256Codec::new(other_cfg, clock);
        assert!(other.verify_access_token(&issued.token).await.is_err());
    }

    #[tokio::test]
    async fn completion_token_binds_session_and_email() {
        let (codec, clock) = codec();
        let sid = SessionId::new();
        let (token, _) = codec.issue_completion_token(sid, "new@x.com").await.unwrap();
        let (again, _) = codec.issue_completion_token(sid, "new@x.com").await.unwrap();
        assert_ne!(token.0, again.0);

        let claims = codec.verify_completion_token(&token).await.unwrap();
        assert_eq!(claims.session_id, sid);
        assert_eq!(claims.email, "new@x.com");

        clock.advance(chrono::Duration::minutes(11));
        let err = codec.verify_completion_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::Expired(_)));
    }
}
