#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Outbound lifecycle mail. Delivery mechanics belong to the adapter.
#[async_trait::async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send_registration_otp(
        &self,
        email: &str,
        otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError>;

    async fn send_login_otp(
        &self,
        email: &str,
        otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError>;

    async fn send_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError>;

    async fn send_password_reset(
        &self,
        email: &str,
        reset_token: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError>;
}
