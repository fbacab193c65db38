use crate::domain_port::{NotificationSender, NotifyError};
use crate::infra_mail::template::{self, MailContent};
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
    pub starttls: bool,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct SmtpNotificationSender {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotificationSender {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let builder = if config.starttls {
            SmtpTransport::starttls_relay(&config.host)?
        } else {
            SmtpTransport::builder_dangerous(&config.host)
        };
        let mut builder = builder
            .port(config.port)
            .timeout(Some(config.timeout));
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ));
        }

        tracing::info!(host = %config.host, port = config.port, "smtp sender initialized");
        Ok(Self {
            mailer: builder.build(),
            from: config.from.parse()?,
        })
    }

    pub(crate) fn compose(&self, to: &str, content: &MailContent) -> Result<Message, NotifyError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e: lettre::address::AddressError| NotifyError::Address(e.to_string()))?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(content.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(content.plain.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(content.html.clone()),
                    ),
            )
            .map_err(|e| NotifyError::InternalError(e.into()))
    }

    async fn deliver(&self, to: &str, content: MailContent) -> Result<(), NotifyError> {
        let message = self.compose(to, &content)?;

        // SmtpTransport is blocking.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::debug!(subject = %content.subject, "mail delivered");
                Ok(())
            }
            Err(e) => Err(NotifyError::Delivery(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send_registration_otp(
        &self,
        email: &str,
        otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.deliver(email, template::registration_otp(otp, expires_in_minutes))
            .await
    }

    async fn send_login_otp(
        &self,
        email: &str,
        otp: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.deliver(email, template::login_otp(otp, expires_in_minutes))
            .await
    }

    async fn send_welcome(&self, email: &str, first_name: &str) -> Result<(), NotifyError> {
        self.deliver(email, template::welcome(first_name)).await
    }

    async fn send_password_reset(
        &self,
        email: &str,
        reset_token: &str,
        expires_in_minutes: i64,
    ) -> Result<(), NotifyError> {
        self.deliver(email, template::password_reset(reset_token, expires_in_minutes))
            .await
    }
}
