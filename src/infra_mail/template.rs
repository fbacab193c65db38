/// Rendered subject and bodies for one outbound mail.
#[derive(Debug, Clone)]
pub struct MailContent {
    pub subject: String,
    pub plain: String,
    pub html: String,
}

fn code_mail(subject: &str, lead: &str, code: &str, expires_in_minutes: i64) -> MailContent {
    MailContent {
        subject: subject.to_string(),
        plain: format!(
            "{lead}\n\nYour code: {code}\n\nThe code expires in {expires_in_minutes} minutes. \
             If you did not request it, you can ignore this message."
        ),
        html: format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <p>{lead}</p>
    <p style="font-size: 28px; letter-spacing: 6px;"><strong>{code}</strong></p>
    <p style="color: #666; font-size: 12px;">The code expires in {expires_in_minutes} minutes. If you did not request it, you can ignore this message.</p>
  </body>
</html>"#
        ),
    }
}

pub fn registration_otp(code: &str, expires_in_minutes: i64) -> MailContent {
    code_mail(
        "Confirm your email address",
        "Use the code below to continue your registration.",
        code,
        expires_in_minutes,
    )
}

pub fn login_otp(code: &str, expires_in_minutes: i64) -> MailContent {
    code_mail(
        "Your sign-in code",
        "Use the code below to sign in.",
        code,
        expires_in_minutes,
    )
}

pub fn welcome(first_name: &str) -> MailContent {
    MailContent {
        subject: "Welcome".to_string(),
        plain: format!("Hello {first_name},\n\nYour account is ready."),
        html: format!(
            r#"<html>
  <body style="font-family: Arial, sans-serif;">
    <h2>Hello {first_name},</h2>
    <p>Your account is ready.</p>
  </body>
</html>"#
        ),
    }
}

pub fn password_reset(reset_token: &str, expires_in_minutes: i64) -> MailContent {
    code_mail(
        "Reset your password",
        "Use the token below to choose a new password.",
        reset_token,
        expires_in_minutes,
    )
}
