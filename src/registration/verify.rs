/// Verification pipeline
///
/// Advances a pending registration through its two sequential steps. Both
/// are safe against replay inside their validity window: the email code is
/// consumed on first use, and the password step is a compare-and-swap that
/// refuses once the account is registered.
use crate::{
    account::AccountStore,
    db::models::{Account, RegistrationState},
    error::{CoreError, CoreResult},
    password,
};
use chrono::Utc;
use std::sync::Arc;

/// Email verification and password setup service
pub struct VerificationPipeline {
    store: Arc<AccountStore>,
}

impl VerificationPipeline {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }

    /// Verify the email address with a single-use code.
    pub async fn verify_email(&self, email: &str, code: &str) -> CoreResult<Account> {
        let account = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound("No registration for this email".to_string()))?;

        let consumed = self
            .store
            .consume_verification_code(&account.id, code, Utc::now())
            .await?;

        if !consumed {
            // Absent, mismatched, or expired: one error, retryable via resend.
            return Err(CoreError::InvalidVerificationCode(
                "The verification code is incorrect or has expired".to_string(),
            ));
        }

        tracing::info!(account_id = %account.id, "email verified");

        self.store
            .find_by_id(&account.id)
            .await?
            .ok_or_else(|| CoreError::Internal("account row vanished mid-operation".to_string()))
    }

    /// Hash and store the mobile password, promoting the account to
    /// registered. Never overwrites an active account's credentials.
    pub async fn set_password(
        &self,
        email: &str,
        mobile_password: &str,
        confirm_password: &str,
    ) -> CoreResult<Account> {
        if mobile_password != confirm_password {
            return Err(CoreError::PasswordMismatch(
                "Password and confirmation do not match".to_string(),
            ));
        }
        if mobile_password.len() < 6 {
            return Err(CoreError::Validation(
                "Password must be at least 6 characters".to_string(),
            ));
        }

        let account = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound("No registration for this email".to_string()))?;

        match account.registration_state() {
            RegistrationState::Active => {
                return Err(CoreError::AlreadyRegistered(
                    "An account with this email already exists".to_string(),
                ))
            }
            RegistrationState::PendingVerification | RegistrationState::LoggedOut => {
                return Err(CoreError::NotEmailVerified(
                    "Verify your email before setting a password".to_string(),
                ))
            }
            RegistrationState::PendingPassword => {}
            RegistrationState::Unregistered => {
                return Err(CoreError::Internal(
                    "unregistered state for an existing account row".to_string(),
                ))
            }
        }

        let hash = password::hash_password(mobile_password)?;

        if !self.store.complete_registration(&account.id, &hash).await? {
            // The CAS lost a race; re-read to report the precise cause.
            let current = self
                .store
                .find_by_id(&account.id)
                .await?
                .ok_or_else(|| CoreError::AccountNotFound("Account no longer exists".to_string()))?;
            return if current.is_registered {
                Err(CoreError::AlreadyRegistered(
                    "An account with this email already exists".to_string(),
                ))
            } else {
                Err(CoreError::NotEmailVerified(
                    "Verify your email before setting a password".to_string(),
                ))
            };
        }

        tracing::info!(account_id = %account.id, "registration completed");

        self.store
            .find_by_id(&account.id)
            .await?
            .ok_or_else(|| CoreError::Internal("account row vanished mid-operation".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_pipeline() -> (VerificationPipeline, Arc<AccountStore>) {
        // one connection so every query sees the same in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let store = Arc::new(AccountStore::new(pool));
        (VerificationPipeline::new(Arc::clone(&store)), store)
    }

    async fn seed_pending(store: &AccountStore, code: &str) -> Account {
        store
            .create_pending(
                "E1",
                "jdoe",
                "j@x.com",
                "Jane Doe",
                "555",
                code,
                Utc::now() + Duration::minutes(10),
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn verify_then_set_password_promotes_account() {
        let (pipeline, store) = test_pipeline().await;
        seed_pending(&store, "123456").await;

        let verified = pipeline.verify_email("j@x.com", "123456").await.unwrap();
        assert!(verified.email_verified);
        assert!(verified.verification_code.is_none());

        let registered = pipeline
            .set_password("j@x.com", "P@ss1!", "P@ss1!")
            .await
            .unwrap();
        assert!(registered.is_registered);
        assert!(registered.password_verified);
        assert!(!registered.is_logged_out);
        assert!(registered.flags_consistent());
        assert!(password::verify_password(
            "P@ss1!",
            registered.password_hash.as_deref().unwrap()
        )
        .unwrap());
    }

    #[tokio::test]
    async fn wrong_or_expired_code_fails() {
        let (pipeline, store) = test_pipeline().await;
        let account = seed_pending(&store, "123456").await;

        assert!(matches!(
            pipeline.verify_email("j@x.com", "000000").await,
            Err(CoreError::InvalidVerificationCode(_))
        ));

        // correct code past expiry still fails
        store
            .reissue_code(&account.id, "123456", Utc::now() - Duration::seconds(1))
            .await
            .unwrap();
        assert!(matches!(
            pipeline.verify_email("j@x.com", "123456").await,
            Err(CoreError::InvalidVerificationCode(_))
        ));
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (pipeline, store) = test_pipeline().await;
        seed_pending(&store, "123456").await;

        pipeline.verify_email("j@x.com", "123456").await.unwrap();
        assert!(matches!(
            pipeline.verify_email("j@x.com", "123456").await,
            Err(CoreError::InvalidVerificationCode(_))
        ));
    }

    #[tokio::test]
    async fn set_password_guards() {
        let (pipeline, store) = test_pipeline().await;
        seed_pending(&store, "123456").await;

        assert!(matches!(
            pipeline.set_password("j@x.com", "P@ss1!", "different").await,
            Err(CoreError::PasswordMismatch(_))
        ));

        // email not verified yet
        assert!(matches!(
            pipeline.set_password("j@x.com", "P@ss1!", "P@ss1!").await,
            Err(CoreError::NotEmailVerified(_))
        ));

        pipeline.verify_email("j@x.com", "123456").await.unwrap();
        pipeline
            .set_password("j@x.com", "P@ss1!", "P@ss1!")
            .await
            .unwrap();

        // second set-password after registration: 409, never an overwrite
        assert!(matches!(
            pipeline.set_password("j@x.com", "Other1!", "Other1!").await,
            Err(CoreError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn unknown_email_reports_account_not_found() {
        let (pipeline, _) = test_pipeline().await;

        assert!(matches!(
            pipeline.verify_email("nobody@x.com", "123456").await,
            Err(CoreError::AccountNotFound(_))
        ));
        assert!(matches!(
            pipeline.set_password("nobody@x.com", "P@ss1!", "P@ss1!").await,
            Err(CoreError::AccountNotFound(_))
        ));
    }
}
