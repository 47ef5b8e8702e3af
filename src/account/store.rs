/// Account store implementation using runtime queries
///
/// Flag transitions are conditional UPDATEs (compare-and-swap on the
/// registration flags) checked through `rows_affected`, so two concurrent
/// requests for the same identity cannot interleave into an inconsistent
/// state. Account creation relies on the UNIQUE constraints on
/// `external_id`, `email`, and `username` as the race backstop.
use crate::{
    db::models::Account,
    error::{CoreError, CoreResult},
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

const ACCOUNT_SELECT: &str = "SELECT id, external_id, email, username, name, phone, \
     email_verified, password_verified, is_registered, is_active, is_logged_out, \
     password_hash, verification_code, verification_expires_at, \
     last_login_at, last_logout_at, last_password_check, created_at \
     FROM account";

/// Identity store service
pub struct AccountStore {
    db: SqlitePool,
}

impl AccountStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Look up by employer-assigned id, falling back to email.
    pub async fn find_by_external_id_or_email(
        &self,
        external_id: &str,
        email: &str,
    ) -> CoreResult<Option<Account>> {
        let query = format!("{} WHERE external_id = ?1 OR email = ?2 LIMIT 1", ACCOUNT_SELECT);
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(external_id)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    pub async fn find_by_id(&self, id: &str) -> CoreResult<Option<Account>> {
        let query = format!("{} WHERE id = ?1", ACCOUNT_SELECT);
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    pub async fn find_by_email(&self, email: &str) -> CoreResult<Option<Account>> {
        let query = format!("{} WHERE email = ?1", ACCOUNT_SELECT);
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    /// Find by username or email, for login.
    pub async fn find_by_identifier(&self, identifier: &str) -> CoreResult<Option<Account>> {
        let query = format!("{} WHERE username = ?1 OR email = ?1 LIMIT 1", ACCOUNT_SELECT);
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(identifier)
            .fetch_optional(&self.db)
            .await?;

        Ok(account)
    }

    /// Create a pending (unregistered) account for a first-time scan.
    ///
    /// Returns `Ok(None)` when another request created the row first (the
    /// UNIQUE constraint fired); the caller re-reads and resumes.
    pub async fn create_pending(
        &self,
        external_id: &str,
        username: &str,
        email: &str,
        name: &str,
        phone: &str,
        verification_code: &str,
        verification_expires_at: DateTime<Utc>,
    ) -> CoreResult<Option<Account>> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let result = sqlx::query(
            "INSERT INTO account (id, external_id, email, username, name, phone, \
             email_verified, password_verified, is_registered, is_active, is_logged_out, \
             verification_code, verification_expires_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, 1, 0, ?7, ?8, ?9)",
        )
        .bind(&id)
        .bind(external_id)
        .bind(email)
        .bind(username)
        .bind(name)
        .bind(phone)
        .bind(verification_code)
        .bind(verification_expires_at)
        .bind(now)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => Ok(self.find_by_id(&id).await?),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(CoreError::Database(e)),
        }
    }

    /// Reset a logged-out account back to the start of the pipeline and
    /// issue a fresh code. CAS on `is_logged_out`: only succeeds when the
    /// account is still logged out at write time.
    pub async fn reset_for_resume(
        &self,
        account_id: &str,
        verification_code: &str,
        verification_expires_at: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET email_verified = 0, password_verified = 0, is_registered = 0, \
             is_logged_out = 0, password_hash = NULL, \
             verification_code = ?1, verification_expires_at = ?2 \
             WHERE id = ?3 AND is_logged_out = 1",
        )
        .bind(verification_code)
        .bind(verification_expires_at)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Re-issue a verification code for a pending registration. CAS:
    /// refuses once the account completed registration or logged out.
    pub async fn reissue_code(
        &self,
        account_id: &str,
        verification_code: &str,
        verification_expires_at: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET verification_code = ?1, verification_expires_at = ?2 \
             WHERE id = ?3 AND is_registered = 0 AND is_logged_out = 0",
        )
        .bind(verification_code)
        .bind(verification_expires_at)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Consume a verification code: marks the email verified and clears the
    /// code in one statement. The code is single-use by construction.
    pub async fn consume_verification_code(
        &self,
        account_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET email_verified = 1, \
             verification_code = NULL, verification_expires_at = NULL \
             WHERE id = ?1 AND verification_code = ?2 AND verification_expires_at >= ?3",
        )
        .bind(account_id)
        .bind(code)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Store the password hash and promote the account to registered.
    /// CAS: only succeeds for an email-verified, not-yet-registered row, so
    /// a concurrent duplicate call or an interleaved logout loses cleanly.
    pub async fn complete_registration(
        &self,
        account_id: &str,
        password_hash: &str,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE account SET password_hash = ?1, password_verified = 1, is_registered = 1, \
             is_logged_out = 0 \
             WHERE id = ?2 AND email_verified = 1 AND is_registered = 0",
        )
        .bind(password_hash)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a successful credential check and clear the logged-out flag.
    pub async fn mark_logged_in(&self, account_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query(
            "UPDATE account SET is_logged_out = 0, last_login_at = ?1, last_password_check = ?1 \
             WHERE id = ?2",
        )
        .bind(now)
        .bind(account_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Quick login refreshes activity but is not a password check.
    pub async fn mark_quick_logged_in(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        sqlx::query("UPDATE account SET is_logged_out = 0, last_login_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Set the logged-out flag, the one bit that reopens registration.
    pub async fn mark_logged_out(&self, account_id: &str, now: DateTime<Utc>) -> CoreResult<()> {
        sqlx::query("UPDATE account SET is_logged_out = 1, last_logout_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(account_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// Housekeeping: drop verification codes past their expiry.
    pub async fn clear_expired_codes(&self, now: DateTime<Utc>) -> CoreResult<u64> {
        let result = sqlx::query(
            "UPDATE account SET verification_code = NULL, verification_expires_at = NULL \
             WHERE verification_expires_at IS NOT NULL AND verification_expires_at < ?1",
        )
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Whether an insert failed on a UNIQUE constraint
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_store() -> AccountStore {
        // one connection so every query sees the same in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        AccountStore::new(pool)
    }

    async fn seed(store: &AccountStore) -> Account {
        store
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
            .unwrap()
    }

    #[tokio::test]
    async fn create_and_lookup_fallbacks() {
        let store = test_store().await;
        let account = seed(&store).await;

        assert!(!account.is_registered);
        assert_eq!(account.verification_code.as_deref(), Some("123456"));

        let by_external = store
            .find_by_external_id_or_email("E1", "nobody@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_external.id, account.id);

        // email fallback when the employer id changed
        let by_email = store
            .find_by_external_id_or_email("E-other", "j@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, account.id);

        let by_username = store.find_by_identifier("jdoe").await.unwrap().unwrap();
        assert_eq!(by_username.id, account.id);
    }

    #[tokio::test]
    async fn duplicate_create_reports_conflict_not_error() {
        let store = test_store().await;
        seed(&store).await;

        let second = store
            .create_pending(
                "E1",
                "jdoe",
                "j@x.com",
                "Jane Doe",
                "555",
                "999999",
                Utc::now() + Duration::minutes(10),
            )
            .await
            .unwrap();

        assert!(second.is_none());
    }

    #[tokio::test]
    async fn complete_registration_cas_requires_verified_email() {
        let store = test_store().await;
        let account = seed(&store).await;

        // not email-verified yet: the CAS refuses
        assert!(!store
            .complete_registration(&account.id, "hash")
            .await
            .unwrap());

        assert!(store
            .consume_verification_code(&account.id, "123456", Utc::now())
            .await
            .unwrap());
        assert!(store
            .complete_registration(&account.id, "hash")
            .await
            .unwrap());

        // second completion loses the CAS
        assert!(!store
            .complete_registration(&account.id, "other-hash")
            .await
            .unwrap());

        let account = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(account.is_registered);
        assert!(account.flags_consistent());
        assert_eq!(account.password_hash.as_deref(), Some("hash"));
    }

    #[tokio::test]
    async fn verification_code_is_single_use_and_expiring() {
        let store = test_store().await;
        let account = seed(&store).await;

        assert!(!store
            .consume_verification_code(&account.id, "wrong", Utc::now())
            .await
            .unwrap());
        assert!(store
            .consume_verification_code(&account.id, "123456", Utc::now())
            .await
            .unwrap());
        // consumed: gone
        assert!(!store
            .consume_verification_code(&account.id, "123456", Utc::now())
            .await
            .unwrap());

        // expired code never consumes, even when correct
        assert!(store
            .reissue_code(&account.id, "222222", Utc::now() - Duration::seconds(1))
            .await
            .unwrap());
        assert!(!store
            .consume_verification_code(&account.id, "222222", Utc::now())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn resume_cas_requires_logged_out() {
        let store = test_store().await;
        let account = seed(&store).await;

        // not logged out: resume refused
        assert!(!store
            .reset_for_resume(&account.id, "111111", Utc::now() + Duration::minutes(10))
            .await
            .unwrap());

        store
            .consume_verification_code(&account.id, "123456", Utc::now())
            .await
            .unwrap();
        store
            .complete_registration(&account.id, "hash")
            .await
            .unwrap();
        store.mark_logged_out(&account.id, Utc::now()).await.unwrap();

        assert!(store
            .reset_for_resume(&account.id, "111111", Utc::now() + Duration::minutes(10))
            .await
            .unwrap());

        let account = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(!account.is_registered);
        assert!(!account.email_verified);
        assert!(!account.is_logged_out);
        assert!(account.password_hash.is_none());
        assert_eq!(account.verification_code.as_deref(), Some("111111"));
    }

    #[tokio::test]
    async fn clear_expired_codes_leaves_live_ones() {
        let store = test_store().await;
        let account = seed(&store).await;

        let other = store
            .create_pending(
                "E2",
                "asmith",
                "a@x.com",
                "Al Smith",
                "556",
                "654321",
                Utc::now() - Duration::minutes(1),
            )
            .await
            .unwrap()
            .unwrap();

        let cleared = store.clear_expired_codes(Utc::now()).await.unwrap();
        assert_eq!(cleared, 1);

        let live = store.find_by_id(&account.id).await.unwrap().unwrap();
        assert!(live.verification_code.is_some());
        let swept = store.find_by_id(&other.id).await.unwrap().unwrap();
        assert!(swept.verification_code.is_none());
    }
}
