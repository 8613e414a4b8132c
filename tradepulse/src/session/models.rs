// Copyright (c) 2024-2025 TradePulse Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Session models

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Session lifecycle state
///
/// `Expired` and `Terminated` are terminal; a session read past its
/// expiry must be transitioned to `Expired` before it is reported invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Expired,
    Terminated,
    Suspended,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Expired | SessionStatus::Terminated)
    }
}

/// Authenticated user session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSession {
    /// Fixed-length token derived from user, client and creation time
    pub session_id: String,
    pub user_id: String,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,

    pub ip_address: String,
    pub user_agent: String,
    /// Digest of the JWT bound to this session; the token itself is
    /// never stored
    pub token_digest: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Extended-lifetime session ("remember me")
    pub remember: bool,

    pub status: SessionStatus,
    /// Reason recorded when the session was terminated
    pub terminated_reason: Option<String>,

    /// Free-form activity data accepted through `update_activity`
    pub activity_data: HashMap<String, Value>,
}

impl UserSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Whether the session can still be served to callers
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SessionStatus::Active && !self.is_expired_at(now)
    }

    /// Refresh activity and push the expiry forward by the session window
    pub fn touch(&mut self, now: DateTime<Utc>, window: ChronoDuration) {
        self.last_active = now;
        self.expires_at = now + window;
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
