//! Tests for the session service: lifecycle, expiry transition, token
//! blacklist and rate limiting through the service surface

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::time::Duration;

use tradepulse::session::{SessionStatus, UserSession};
use tradepulse::{CacheFacade, StoreConfig};

fn facade() -> CacheFacade {
    CacheFacade::init(StoreConfig::default()).unwrap()
}

async fn create_default_session(facade: &CacheFacade) -> UserSession {
    facade
        .sessions()
        .create_session(
            "user-1",
            "user1@example.com",
            "member",
            "jwt-abc123",
            vec!["notes:read".to_string(), "notes:write".to_string()],
            "10.1.2.3",
            "Mozilla/5.0",
            false,
        )
        .await
}

#[tokio::test]
async fn created_sessions_are_readable_and_active() {
    let facade = facade();
    let created = create_default_session(&facade).await;
    assert_eq!(created.session_id.len(), 32);

    let read = facade
        .sessions()
        .get_session(&created.session_id)
        .await
        .unwrap();
    assert_eq!(read.user_id, "user-1");
    assert_eq!(read.status, SessionStatus::Active);
    assert!(read.has_permission("notes:read"));
    assert!(!read.has_permission("admin:users"));

    // The JWT is kept only as a digest
    let digest = read.token_digest.unwrap();
    assert_eq!(digest.len(), 64);
    assert!(!digest.contains("jwt-abc123"));
}

#[tokio::test]
async fn remember_sessions_get_the_extended_window() {
    let facade = facade();
    let short = create_default_session(&facade).await;
    let long = facade
        .sessions()
        .create_session(
            "user-2",
            "user2@example.com",
            "member",
            "jwt-def456",
            vec![],
            "10.1.2.4",
            "Mozilla/5.0",
            true,
        )
        .await;

    let short_window = short.expires_at - short.created_at;
    let long_window = long.expires_at - long.created_at;
    assert_eq!(short_window, ChronoDuration::minutes(30));
    assert_eq!(long_window, ChronoDuration::hours(24));
}

#[tokio::test]
async fn lapsed_sessions_transition_to_expired_before_read_out() {
    let facade = facade();
    let mut session = create_default_session(&facade).await;

    // Back-date the expiry and write the doctored session through the
    // unified surface, then read through the service.
    session.expires_at = Utc::now() - ChronoDuration::minutes(1);
    facade
        .set(
            "session",
            &session.session_id.clone(),
            serde_json::to_value(&session).unwrap(),
        )
        .await;

    assert!(facade
        .sessions()
        .get_session(&session.session_id)
        .await
        .is_none());

    // The stored record must now carry the terminal Expired status
    let raw = facade.get("session", &session.session_id).await.unwrap();
    let stored: UserSession = serde_json::from_value(raw).unwrap();
    assert_eq!(stored.status, SessionStatus::Expired);
}

#[tokio::test]
async fn terminated_sessions_stop_resolving() {
    let facade = facade();
    let session = create_default_session(&facade).await;

    assert!(facade
        .sessions()
        .terminate_session(&session.session_id, "logout")
        .await);
    assert!(facade
        .sessions()
        .get_session(&session.session_id)
        .await
        .is_none());

    // Terminating twice reports false
    assert!(!facade
        .sessions()
        .terminate_session(&session.session_id, "logout")
        .await);
}

#[tokio::test]
async fn activity_updates_merge_valid_data_and_reject_bad_data() {
    let facade = facade();
    let session = create_default_session(&facade).await;

    let good = json!({"path": "/api/notes", "metadata": {"page": 2}});
    assert!(
        facade
            .sessions()
            .update_activity(&session.session_id, good.as_object().cloned())
            .await
    );

    let read = facade
        .sessions()
        .get_session(&session.session_id)
        .await
        .unwrap();
    assert_eq!(read.activity_data["path"], json!("/api/notes"));
    assert!(read.last_active >= session.last_active);

    let bad = json!({"user_agent": "x".repeat(600)});
    assert!(
        !facade
            .sessions()
            .update_activity(&session.session_id, bad.as_object().cloned())
            .await
    );
}

#[tokio::test]
async fn token_blacklist_stores_only_digests() {
    let facade = facade();
    let token = "eyJhbGciOiJIUzI1NiJ9.top-secret-claims.sig";

    assert!(
        facade
            .sessions()
            .blacklist_token(token, Duration::from_secs(60))
            .await
    );
    assert!(facade.sessions().is_token_blacklisted(token).await);
    assert!(!facade.sessions().is_token_blacklisted("other-token").await);

    // The raw token never appears as a key in the blacklist namespace
    assert!(!facade.exists("token_blacklist", token).await);
}

#[tokio::test]
async fn rate_limit_enforces_the_minute_window_through_the_service() {
    let facade = facade();
    let sessions = facade.sessions();

    for _ in 0..60 {
        assert!(sessions.check_rate_limit("user-9", "/api/quotes").allowed);
    }
    let decision = sessions.check_rate_limit("user-9", "/api/quotes");
    assert!(!decision.allowed);
    assert!(decision.limits_exceeded.contains(&"minute".to_string()));

    // Other endpoints are unaffected
    assert!(sessions.check_rate_limit("user-9", "/api/notes").allowed);
}

#[tokio::test]
async fn rate_limit_check_fails_open_on_invalid_input() {
    let facade = facade();
    let decision = facade.sessions().check_rate_limit("", "/api/quotes");
    assert!(decision.allowed);
}
