// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Session cache service
//!
//! Sessions live in the tiered store under their own namespace. Token
//! blacklisting stores a digest of the token, never the token itself.
//! Rate limiting is delegated to the in-process limiter; a limiter
//! failure fails open so availability wins over strict enforcement.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

use super::models::{SessionStatus, UserSession};
use super::rate_limit::{RateLimitConfig, RateLimitDecision, RateLimiter};
use crate::cache::CacheStore;
use crate::validate::{validate_fields, Constraint, FieldKind, FieldRule, RuleTable};

const NS_SESSION: &str = "session";
const NS_TOKEN_BLACKLIST: &str = "token_blacklist";

/// Default session lifetime
const SESSION_WINDOW_SECS: i64 = 30 * 60;
/// Lifetime for "remember me" sessions
const REMEMBER_WINDOW_SECS: i64 = 24 * 60 * 60;
/// How long terminal sessions stay readable for auditing
const TERMINAL_RETENTION_SECS: u64 = 300;

static IP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F:.]{3,45}$").expect("static pattern"));

fn activity_rules() -> RuleTable {
    let mut rules = RuleTable::new();
    rules.insert(
        "ip",
        FieldRule::new(FieldKind::String).constrain(Constraint::Matches(&IP_PATTERN)),
    );
    rules.insert(
        "user_agent",
        FieldRule::new(FieldKind::String).constrain(Constraint::MaxLen(512)),
    );
    rules.insert(
        "path",
        FieldRule::new(FieldKind::String).constrain(Constraint::MaxLen(2048)),
    );
    rules.insert("metadata", FieldRule::new(FieldKind::Object));
    rules
}

/// Session service over the tiered store
pub struct SessionService {
    store: Arc<CacheStore>,
    rate_limiter: RateLimiter,
    activity_rules: RuleTable,
}

impl SessionService {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self::with_limits(store, RateLimitConfig::default())
    }

    pub fn with_limits(store: Arc<CacheStore>, limits: RateLimitConfig) -> Self {
        Self {
            store,
            rate_limiter: RateLimiter::new(limits),
            activity_rules: activity_rules(),
        }
    }

    fn window(remember: bool) -> ChronoDuration {
        if remember {
            ChronoDuration::seconds(REMEMBER_WINDOW_SECS)
        } else {
            ChronoDuration::seconds(SESSION_WINDOW_SECS)
        }
    }

    /// Create a session and store it with its lifetime-matched TTL
    #[allow(clippy::too_many_arguments)]
    pub async fn create_session(
        &self,
        user_id: &str,
        email: &str,
        role: &str,
        token: &str,
        permissions: Vec<String>,
        ip_address: &str,
        user_agent: &str,
        remember: bool,
    ) -> UserSession {
        let now = Utc::now();
        let session_id = derive_session_id(user_id, ip_address, user_agent, now);
        let window = Self::window(remember);

        let session = UserSession {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            email: email.to_string(),
            role: role.to_string(),
            permissions,
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            token_digest: (!token.is_empty()).then(|| token_digest(token)),
            created_at: now,
            last_active: now,
            expires_at: now + window,
            remember,
            status: SessionStatus::Active,
            terminated_reason: None,
            activity_data: Default::default(),
        };

        self.write_session(&session, window_ttl(window)).await;
        log::info!(
            "session {} created for user {} (remember: {})",
            session_id,
            user_id,
            remember
        );
        session
    }

    /// Fetch a session; lapsed sessions transition to Expired first and
    /// are then reported as invalid (`None`).
    pub async fn get_session(&self, session_id: &str) -> Option<UserSession> {
        let mut session: UserSession = self.store.get_as(NS_SESSION, session_id).await?;
        let now = Utc::now();

        if session.status == SessionStatus::Active && session.is_expired_at(now) {
            session.status = SessionStatus::Expired;
            self.write_session(&session, Duration::from_secs(TERMINAL_RETENTION_SECS))
                .await;
            log::debug!("session {} expired on read", session_id);
            return None;
        }
        if !session.is_valid_at(now) {
            return None;
        }
        Some(session)
    }

    /// Record activity on a session, optionally merging validated data
    ///
    /// Returns false when the session is missing/invalid or the supplied
    /// data fails validation.
    pub async fn update_activity(&self, session_id: &str, data: Option<Map<String, Value>>) -> bool {
        let Some(mut session) = self.get_session(session_id).await else {
            return false;
        };

        if let Some(fields) = data {
            if let Err(violations) = validate_fields(&self.activity_rules, &fields) {
                log::warn!(
                    "rejected activity update for session {}: {}",
                    session_id,
                    violations.join("; ")
                );
                return false;
            }
            for (key, value) in fields {
                session.activity_data.insert(key, value);
            }
        }

        let window = Self::window(session.remember);
        session.touch(Utc::now(), window);
        self.write_session(&session, window_ttl(window)).await;
        true
    }

    /// Terminate a session, keeping a short-lived tombstone for audits
    pub async fn terminate_session(&self, session_id: &str, reason: &str) -> bool {
        let Some(mut session) = self
            .store
            .get_as::<UserSession>(NS_SESSION, session_id)
            .await
        else {
            return false;
        };
        if session.status == SessionStatus::Terminated {
            return false;
        }

        session.status = SessionStatus::Terminated;
        session.terminated_reason = Some(reason.to_string());
        self.write_session(&session, Duration::from_secs(TERMINAL_RETENTION_SECS))
            .await;
        log::info!("session {} terminated: {}", session_id, reason);
        true
    }

    /// Suspend a session without destroying it
    pub async fn suspend_session(&self, session_id: &str) -> bool {
        let Some(mut session) = self.get_session(session_id).await else {
            return false;
        };
        session.status = SessionStatus::Suspended;
        let window = Self::window(session.remember);
        self.write_session(&session, window_ttl(window)).await;
        true
    }

    /// Rate-limit gate for `(user, endpoint)`; check failures fail open
    pub fn check_rate_limit(&self, user_id: &str, endpoint: &str) -> RateLimitDecision {
        match self.rate_limiter.check(user_id, endpoint) {
            Ok(decision) => decision,
            Err(e) => {
                log::warn!(
                    "rate limit check failed for {} {} ({}); allowing request",
                    user_id,
                    endpoint,
                    e
                );
                RateLimitDecision {
                    allowed: true,
                    limits_exceeded: Vec::new(),
                    remaining_minute: 0,
                    remaining_hour: 0,
                    remaining_day: 0,
                    retry_after_secs: None,
                }
            }
        }
    }

    /// Blacklist a token for `ttl`; only its digest is stored
    pub async fn blacklist_token(&self, token: &str, ttl: Duration) -> bool {
        let key = token_digest(token);
        let stored = self
            .store
            .set(NS_TOKEN_BLACKLIST, &key, Value::Bool(true))
            .await;
        if stored {
            self.store.expire(NS_TOKEN_BLACKLIST, &key, ttl).await;
        }
        stored
    }

    pub async fn is_token_blacklisted(&self, token: &str) -> bool {
        self.store
            .exists(NS_TOKEN_BLACKLIST, &token_digest(token))
            .await
    }

    /// Drop idle rate-limit windows; called from the cleanup task
    pub fn prune_rate_windows(&self, now: DateTime<Utc>) -> usize {
        self.rate_limiter.prune(now)
    }

    async fn write_session(&self, session: &UserSession, ttl: Duration) {
        if self
            .store
            .set_as(NS_SESSION, &session.session_id, session)
            .await
        {
            self.store
                .expire(NS_SESSION, &session.session_id, ttl)
                .await;
        }
    }
}

/// Fixed-length session token from user, client fingerprint and time
fn derive_session_id(
    user_id: &str,
    ip_address: &str,
    user_agent: &str,
    now: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b"|");
    hasher.update(ip_address.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(now.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 32)
}

fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex_prefix(&hasher.finalize(), 64)
}

fn hex_prefix(bytes: &[u8], chars: usize) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out.truncate(chars);
    out
}

fn window_ttl(window: ChronoDuration) -> Duration {
    Duration::from_secs(window.num_seconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_fixed_length_and_distinct_over_time() {
        let t1 = Utc::now();
        let t2 = t1 + ChronoDuration::nanoseconds(1);
        let a = derive_session_id("u1", "10.0.0.1", "agent", t1);
        let b = derive_session_id("u1", "10.0.0.1", "agent", t2);
        assert_eq!(a.len(), 32);
        assert_eq!(b.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn token_digest_never_contains_the_token() {
        let digest = token_digest("eyJhbGciOiJIUzI1NiJ9.secret-token");
        assert_eq!(digest.len(), 64);
        assert!(!digest.contains("secret"));
    }
}
