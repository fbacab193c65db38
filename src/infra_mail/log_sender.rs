use crate::domain_port::{NotificationSender, NotifyError};

/// Development sender: records that a mail would go out, never its secret.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSender;

#[async_trait::async_trait]
impl NotificationSender for LogNotificationSender {
    async fn send_registration_otp(
        &self,
        email: &str,
        _otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        tracing::info!(to = %email, expires_in_minutes, "registration otp mail (not sent)");
        Ok(())
    }

    async fn send_login_otp(
        &self,
        email: &str,
        _otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        tracing::info!(to = %email, expires_in_minutes, "login otp mail (not sent)");
        Ok(())
    }

    async fn send_welcome(&self, email: &str, _first_name: &str) -> Result<(), NotifyError> {
        tracing::info!(to = %email, "welcome mail (not sent)");
        Ok(())
    }

    async fn send_password_reset(
        &self,
        email: &str,
        _reset_token: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        tracing::info!(to = %email, expires_in_minutes, "password reset mail (not sent)");
        Ok(())
    }
}
