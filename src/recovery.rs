/// Recovery advisor
///
/// When quick login rejects a client-presented account id, the client needs
/// to know whether the identity is gone (re-register via QR) or merely
/// stale (fall back to password entry). The session manager alone cannot
/// distinguish the two; this component consults the identity store.
use crate::{account::AccountStore, error::CoreResult};
use serde::Serialize;
use std::sync::Arc;

/// What the client must do to get back in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Identity is gone or disabled; only a fresh QR scan can help.
    QrRegistrationRequired,
    /// Identity is fine; the session is stale or logged out.
    LoginRequired,
}

/// Advice returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryAdvice {
    pub action: RecoveryAction,
    pub message: String,
}

/// Recovery advisor service
pub struct RecoveryAdvisor {
    accounts: Arc<AccountStore>,
}

impl RecoveryAdvisor {
    pub fn new(accounts: Arc<AccountStore>) -> Self {
        Self { accounts }
    }

    pub async fn advise(&self, account_id: &str) -> CoreResult<RecoveryAdvice> {
        let account = self.accounts.find_by_id(account_id).await?;

        let advice = match account {
            None => RecoveryAdvice {
                action: RecoveryAction::QrRegistrationRequired,
                message: "This identity is not known to the server; scan your employer QR code"
                    .to_string(),
            },
            Some(account) if !account.is_active => RecoveryAdvice {
                action: RecoveryAction::QrRegistrationRequired,
                message: "This account has been disabled; contact your administrator".to_string(),
            },
            Some(_) => RecoveryAdvice {
                action: RecoveryAction::LoginRequired,
                message: "Your session has expired; log in with your password".to_string(),
            },
        };

        Ok(advice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sqlx::SqlitePool;

    async fn advisor() -> (RecoveryAdvisor, Arc<AccountStore>, SqlitePool) {
        // one connection so every query sees the same in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let accounts = Arc::new(AccountStore::new(pool.clone()));
        (RecoveryAdvisor::new(Arc::clone(&accounts)), accounts, pool)
    }

    #[tokio::test]
    async fn unknown_identity_requires_qr() {
        let (advisor, _, _) = advisor().await;

        let advice = advisor.advise("no-such-id").await.unwrap();
        assert_eq!(advice.action, RecoveryAction::QrRegistrationRequired);
    }

    #[tokio::test]
    async fn stale_but_existing_identity_requires_login_only() {
        let (advisor, accounts, pool) = advisor().await;
        let account = accounts
            .create_pending(
                "E1",
                "jdoe",
                "j@x.com",
                "Jane Doe",
                "555",
                "123456",
                Utc::now() + Duration::minutes(10),
            )
            .await
            .unwrap()
            .unwrap();
        accounts.mark_logged_out(&account.id, Utc::now()).await.unwrap();

        let advice = advisor.advise(&account.id).await.unwrap();
        assert_eq!(advice.action, RecoveryAction::LoginRequired);

        // a disabled account is treated as gone
        sqlx::query("UPDATE account SET is_active = 0 WHERE id = ?1")
            .bind(&account.id)
            .execute(&pool)
            .await
            .unwrap();
        let advice = advisor.advise(&account.id).await.unwrap();
        assert_eq!(advice.action, RecoveryAction::QrRegistrationRequired);
    }
}
