/// Session management
///
/// Owns the session and refresh-token rows and the login, quick-login,
/// refresh, and logout operations around them.

mod manager;

pub use manager::SessionManager;

use crate::account::AccountSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client device description sent with login requests
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl DeviceInfo {
    /// Placeholder identity for clients that did not report a device.
    pub fn unknown() -> Self {
        Self {
            device_id: "unknown".to_string(),
            device_name: None,
            platform: None,
        }
    }
}

/// Access/refresh token pair
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}

/// Session summary returned to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: String,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
    pub quick_login_enabled: bool,
    pub quick_login_expires_at: Option<DateTime<Utc>>,
}

/// Result of a successful login, quick login, or refresh
#[derive(Debug, Clone, Serialize)]
pub struct LoginGrant {
    pub user: AccountSummary,
    pub tokens: TokenPair,
    pub session: SessionSummary,
}

/// Saved-account entry for the device's account picker
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAccount {
    pub id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub has_quick_access: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Identity attached to a request after bearer-token validation
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub account_id: String,
    pub session_id: String,
}
