mod common;

use common::*;
use pensionid::application_port::*;
use pensionid::domain_model::*;
use std::time::Duration;

const EMAIL: &str = "pieter@example.nl";

async fn start_registration(w: &World, email: &str) -> Result<InitiateResult, AuthError> {
    w.engine
        .registration
        .initiate(InitiateInput {
            email: email.to_string(),
            client: client(),
        })
        .await
}

#[tokio::test]
async fn second_initiate_for_a_locked_email_conflicts() {
    let w = World::new();
    start_registration(&w, EMAIL).await.unwrap();

    let err = start_registration(&w, EMAIL).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn exhausted_attempts_are_terminal() {
    let w = World::new();
    let started = w
        .engine
        .registration
        .initiate(InitiateInput {
            email: EMAIL.to_string(),
            client: client(),
        })
        .await
        .unwrap();
    let code = w.code(EMAIL, 1).await;

    let mut last = None;
    for _ in 0..5 {
        last = w
            .engine
            .registration
            .verify_otp(VerifyOtpInput {
                session_id: started.session_id,
                otp: wrong(&code),
            })
            .await
            .err();
    }
    assert!(matches!(
        last,
        Some(AuthError::InvalidOtp {
            remaining_attempts: 0,
            status: SessionStatus::Failed
        })
    ));

    let err = w
        .engine
        .registration
        .verify_otp(VerifyOtpInput {
            session_id: started.session_id,
            otp: code,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AttemptsExhausted));
    let view = w
        .engine
        .registration
        .session_status(started.session_id)
        .await
        .unwrap();
    assert_eq!(view.status, SessionStatus::Failed);
    assert_eq!(view.attempts_remaining, 0);
}

#[tokio::test]
async fn replaying_a_rotated_token_burns_the_family() {
    let w = World::new();
    let registered = w.register(EMAIL).await;
    w.advance(60);

    let rotated = w.rotate(&registered.tokens.refresh_token).await.unwrap();
    assert_eq!(rotated.user.user_id, registered.user.user_id);
    assert_eq!(rotated.tokens.session_id, registered.tokens.session_id);

    let err = w.rotate(&registered.tokens.refresh_token).await.unwrap_err();
    assert!(matches!(err, AuthError::TokenReused));

    let err = w.rotate(&rotated.tokens.refresh_token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn logout_everywhere_revokes_every_session() {
    let w = World::new();
    let registered = w.register(EMAIL).await;
    w.advance(60);
    let logged_in = w.login(EMAIL, 2).await;
    assert_ne!(logged_in.tokens.session_id, registered.tokens.session_id);

    w.advance(1);
    let result = w
        .engine
        .tokens
        .revoke_all(registered.user.user_id)
        .await
        .unwrap();
    assert_eq!(result.tokens_revoked, 2);
    assert_eq!(result.sessions_revoked, 2);

    for token in [&registered.tokens.refresh_token, &logged_in.tokens.refresh_token] {
        let err = w.rotate(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
    for token in [&registered.tokens.access_token, &logged_in.tokens.access_token] {
        let err = w.engine.tokens.verify_access_token(token).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}

#[tokio::test]
async fn logout_twice_succeeds_both_times() {
    let w = World::new();
    let registered = w.register(EMAIL).await;

    for _ in 0..2 {
        w.engine
            .tokens
            .revoke(LogoutInput {
                refresh_token: registered.tokens.refresh_token.clone(),
                access_token: Some(registered.tokens.access_token.clone()),
            })
            .await
            .unwrap();
    }
    let err = w.rotate(&registered.tokens.refresh_token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn resend_opens_exactly_when_the_cooldown_ends() {
    let w = World::new();
    let started = w
        .engine
        .login
        .initiate(InitiateInput {
            email: EMAIL.to_string(),
            client: client(),
        })
        .await
        .unwrap();
    // Unknown account: the decoy has no session behind it.
    assert!(w.engine.login.resend_otp(started.session_id).await.is_err());

    let started = w
        .engine
        .registration
        .initiate(InitiateInput {
            email: EMAIL.to_string(),
            client: client(),
        })
        .await
        .unwrap();
    assert_eq!(started.resend_available_at, w.now() + chrono::Duration::seconds(60));

    w.advance(59);
    let err = w
        .engine
        .registration
        .resend_otp(started.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TooManyRequests { retry_after_secs: 1 }));

    w.advance(1);
    let resent = w
        .engine
        .registration
        .resend_otp(started.session_id)
        .await
        .unwrap();
    assert_eq!(resent.resend_available_at, w.now() + chrono::Duration::seconds(60));
}

#[tokio::test]
async fn shutdown_drains_pending_mail() {
    let w = World::new();
    w.register(EMAIL).await;

    assert!(w.engine.dispatcher.shutdown(Duration::from_secs(2)).await);
    assert_eq!(w.engine.dispatcher.in_flight(), 0);
    // Welcome mail went out before the drain finished.
    assert_eq!(w.sender.sent().len(), 2);

    let err = w
        .engine
        .registration
        .initiate(InitiateInput {
            email: "late@example.nl".to_string(),
            client: client(),
        })
        .await;
    // Sends are shed after shutdown, but the flow itself still answers.
    assert!(err.is_ok());
    assert_eq!(w.sender.sent().len(), 2);
}
