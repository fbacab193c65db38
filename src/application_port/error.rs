use crate::domain_model::SessionStatus;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} expired")]
    Expired(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("too many requests, retry in {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64 },
    #[error("verification attempts exhausted")]
    AttemptsExhausted,
    #[error("incorrect code, {remaining_attempts} attempt(s) left")]
    InvalidOtp {
        remaining_attempts: u32,
        status: SessionStatus,
    },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("refresh token reused, token family revoked")]
    TokenReused,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

/// Coarse classification used by transport layers to pick a status code.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Expired,
    Conflict,
    TooManyRequests,
    Unauthorized,
    Forbidden,
    Internal,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Validation(_) => ErrorKind::Validation,
            AuthError::NotFound(_) => ErrorKind::NotFound,
            AuthError::Expired(_) => ErrorKind::Expired,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::TooManyRequests { .. } | AuthError::AttemptsExhausted => {
                ErrorKind::TooManyRequests
            }
            AuthError::InvalidOtp { .. } | AuthError::Unauthorized(_) | AuthError::TokenReused => {
                ErrorKind::Unauthorized
            }
            AuthError::Forbidden(_) => ErrorKind::Forbidden,
            AuthError::Store(_) | AuthError::InternalError(_) => ErrorKind::Internal,
        }
    }

    pub fn invalid_token() -> Self {
        AuthError::Unauthorized("invalid token".to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError::Store(format!("{err:#}"))
    }
}
