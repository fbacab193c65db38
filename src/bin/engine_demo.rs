//! Walks one user through registration, refresh rotation, a replayed refresh
//! token and a fresh login, all on the in-memory backend.
//!
//! $ cargo run --bin engine_demo -- --settings=settings/dev.toml

use chrono::NaiveDate;
use futures_util::future::join_all;
use pensionid::application_port::*;
use pensionid::domain_model::*;
use pensionid::domain_port::*;
use pensionid::infra_memory::*;
use pensionid::logger::*;
use pensionid::server::*;
use pensionid::settings::*;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

async fn next_otp(sender: &RecordingNotificationSender, sent: usize, email: &str) -> anyhow::Result<String> {
    if !sender.wait_until_sent(sent, Duration::from_secs(5)).await {
        anyhow::bail!("no mail for {email}");
    }
    sender
        .latest_otp(email)
        .ok_or_else(|| anyhow::anyhow!("no otp recorded for {email}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new_bootstrap();
    let settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig {
        filter: "info,pensionid=debug".to_string(),
    })?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sender = Arc::new(RecordingNotificationSender::new());
    let engine = Engine::assemble(
        Stores::in_memory(clock.clone()),
        sender.clone(),
        clock,
        EngineConfig::from_settings(&settings),
    )?;

    let email = "Jan.Jansen@Example.org";
    let client = ClientMeta {
        ip_address: Some("127.0.0.1".to_string()),
        user_agent: Some("engine_demo".to_string()),
    };

    // region registration

    let started = engine
        .registration
        .initiate(InitiateInput {
            email: email.to_string(),
            client: client.clone(),
        })
        .await?;
    info!(session_id = %started.session_id, "registration started");

    let code = next_otp(&sender, 1, &normalize_email(email)).await?;
    let verified = engine
        .registration
        .verify_otp(VerifyOtpInput {
            session_id: started.session_id,
            otp: SecretString::from(code),
        })
        .await?;

    let password = "Corr3ct-Horse-Battery!";
    let password_set = engine
        .registration
        .set_password(SetPasswordInput {
            session_id: started.session_id,
            completion_token: verified.completion_token,
            password: SecretString::from(password.to_string()),
            password_confirmation: SecretString::from(password.to_string()),
        })
        .await?;

    let registered = engine
        .registration
        .complete_profile(CompleteProfileInput {
            session_id: started.session_id,
            completion_token: password_set.completion_token,
            full_name: "Jan Jansen".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1961, 4, 12)
                .ok_or_else(|| anyhow::anyhow!("bad date"))?,
            gender_code: "M".to_string(),
            client: client.clone(),
        })
        .await?;
    info!(user = ?registered.user, "registration complete");

    // endregion

    // region rotation and replay

    let rotated = engine
        .tokens
        .rotate(RotateInput {
            refresh_token: registered.tokens.refresh_token.clone(),
            claimed_user_id: Some(registered.user.user_id),
            client: client.clone(),
        })
        .await?;
    info!(session_id = %rotated.tokens.session_id, "refresh token rotated");

    // Replaying the old token twice at once: both are reuse, the family dies.
    let replays = join_all((0..2).map(|_| {
        engine.tokens.rotate(RotateInput {
            refresh_token: registered.tokens.refresh_token.clone(),
            claimed_user_id: None,
            client: client.clone(),
        })
    }))
    .await;
    for replay in &replays {
        info!(outcome = ?replay.as_ref().map(|_| "rotated"), "replayed refresh token");
    }

    let after_reuse = engine
        .tokens
        .rotate(RotateInput {
            refresh_token: rotated.tokens.refresh_token.clone(),
            claimed_user_id: None,
            client: client.clone(),
        })
        .await;
    info!(outcome = ?after_reuse.map(|_| "rotated"), "current token after reuse");

    // endregion

    // region login and logout

    let login = engine
        .login
        .initiate(InitiateInput {
            email: email.to_string(),
            client: client.clone(),
        })
        .await?;
    let code = next_otp(&sender, 3, &normalize_email(email)).await?;
    let logged_in = engine
        .login
        .verify_otp(VerifyOtpInput {
            session_id: login.session_id,
            otp: SecretString::from(code),
        })
        .await?;
    info!(session_id = %logged_in.tokens.session_id, "logged in");

    let claims = engine
        .tokens
        .verify_access_token(&logged_in.tokens.access_token)
        .await?;
    info!(jti = %claims.jti, "access token accepted");

    engine
        .tokens
        .revoke(LogoutInput {
            refresh_token: logged_in.tokens.refresh_token.clone(),
            access_token: Some(logged_in.tokens.access_token.clone()),
        })
        .await?;
    let rejected = engine
        .tokens
        .verify_access_token(&logged_in.tokens.access_token)
        .await;
    info!(outcome = ?rejected.map(|c| c.jti), "access token after logout");

    // endregion

    engine.dispatcher.shutdown(Duration::from_secs(5)).await;
    for mail in sender.sent() {
        info!(kind = ?mail.kind, to = %mail.email, "mail recorded");
    }

    Ok(())
}
