/// Identity store
///
/// Owns the account rows: lookup, creation on first scan, and the atomic
/// flag transitions the registration machine and session manager depend on.

mod store;

pub use store::AccountStore;

use serde::Serialize;

/// Account summary returned to clients; never includes secrets or
/// verification state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub name: String,
    pub phone: String,
    pub is_registered: bool,
    pub last_login_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl From<&crate::db::models::Account> for AccountSummary {
    fn from(account: &crate::db::models::Account) -> Self {
        Self {
            id: account.id.clone(),
            external_id: account.external_id.clone(),
            username: account.username.clone(),
            email: account.email.clone(),
            name: account.name.clone(),
            phone: account.phone.clone(),
            is_registered: account.is_registered,
            last_login_at: account.last_login_at,
        }
    }
}
