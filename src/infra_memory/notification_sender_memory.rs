use crate::domain_port::{NotificationSender, NotifyError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum NotificationKind {
    RegistrationOtp,
    LoginOtp,
    Welcome,
    PasswordReset,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub email: String,
    /// OTP, reset token or first name, depending on the kind.
    pub payload: String,
}

/// Keeps every message in memory so callers can read back delivered codes.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<SentNotification>>,
    failing: AtomicBool,
    changed: Notify,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }

    pub fn latest_otp(&self, email: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|n| {
                n.email == email
                    && matches!(
                        n.kind,
                        NotificationKind::RegistrationOtp | NotificationKind::LoginOtp
                    )
            })
            .map(|n| n.payload)
    }

    /// Waits until at least `count` messages were recorded. `false` on timeout.
    pub async fn wait_until_sent(&self, count: usize, within: Duration) -> bool {
        let wait = async {
            loop {
                let changed = self.changed.notified();
                tokio::pin!(changed);
                changed.as_mut().enable();
                if self.sent().len() >= count {
                    return;
                }
                changed.await;
            }
        };
        tokio::time::timeout(within, wait).await.is_ok()
    }

    fn record(&self, kind: NotificationKind, email: &str, payload: &str) -> Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mailbox unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentNotification {
                kind,
                email: email.to_string(),
                payload: payload.to_string(),
            });
        self.changed.notify_waiters();
        Ok(())
    }
}

#[async_trait::async_trait]
impl NotificationSender for RecordingNotificationSender {
    async fn send_registration_otp(
        &self,
        email: &str,
        otp: &str,
        _expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::RegistrationOtp, email, otp)
    }

    async fn send_login_otp(
        &self,
        email: &str,
        otp: &str,
        _expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::LoginOtp, email, otp)
    }

    async fn send_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError> {
        self.record(NotificationKind::Welcome, email, first_name)
    }

    async fn send_password_reset(
        &self,
        email: &str,
        reset_token: &str,
        _expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.record(NotificationKind::PasswordReset, email, reset_token)
    }
}
