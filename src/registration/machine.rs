/// Registration state machine
///
/// Decides what a QR scan means for an identity: a new pending
/// registration, an idempotent retry of one already underway, a clean
/// restart after logout, or a rejection because the identity is registered
/// and logged in. The decision is driven entirely by the derived
/// `RegistrationState`, and every mutation is a compare-and-swap in the
/// account store, so concurrent scans for the same identity converge on a
/// single row.
use crate::{
    account::AccountStore,
    db::models::{Account, RegistrationState},
    error::{CoreError, CoreResult},
    qr::QrPayload,
    registration::NextStep,
};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

/// A freshly issued, single-use verification code
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Successful scan result. Rejection of an active duplicate surfaces as
/// `CoreError::AlreadyRegistered`.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// New registration, or an idempotent retry of a pending one.
    Started {
        account: Account,
        /// None when the email step is already done and the client may go
        /// straight to setting a password.
        verification: Option<IssuedCode>,
        next_step: NextStep,
    },
    /// A logged-out identity starting over; all progress flags were reset.
    Resumed {
        account: Account,
        verification: IssuedCode,
    },
}

impl ScanOutcome {
    pub fn account(&self) -> &Account {
        match self {
            ScanOutcome::Started { account, .. } => account,
            ScanOutcome::Resumed { account, .. } => account,
        }
    }

    pub fn verification(&self) -> Option<&IssuedCode> {
        match self {
            ScanOutcome::Started { verification, .. } => verification.as_ref(),
            ScanOutcome::Resumed { verification, .. } => Some(verification),
        }
    }
}

/// Registration state machine service
pub struct RegistrationMachine {
    store: Arc<AccountStore>,
    code_ttl: Duration,
}

impl RegistrationMachine {
    pub fn new(store: Arc<AccountStore>, code_ttl_minutes: i64) -> Self {
        Self {
            store,
            code_ttl: Duration::minutes(code_ttl_minutes),
        }
    }

    /// Process a decoded QR payload.
    pub async fn scan(&self, payload: &QrPayload) -> CoreResult<ScanOutcome> {
        // One retry absorbs races lost to a concurrent scan of the same
        // identity: the loser re-reads and lands on the idempotent path.
        for _ in 0..2 {
            let existing = self
                .store
                .find_by_external_id_or_email(&payload.external_id, &payload.email)
                .await?;

            let account = match existing {
                None => {
                    let issued = self.new_code();
                    match self
                        .store
                        .create_pending(
                            &payload.external_id,
                            &payload.username,
                            &payload.email,
                            payload.display_name(),
                            &payload.phone,
                            &issued.code,
                            issued.expires_at,
                        )
                        .await?
                    {
                        Some(account) => {
                            tracing::info!(external_id = %payload.external_id, "registration started");
                            return Ok(ScanOutcome::Started {
                                account,
                                verification: Some(issued),
                                next_step: NextStep::VerifyEmail,
                            });
                        }
                        // Unique constraint fired: someone else created the
                        // row between our read and write.
                        None => continue,
                    }
                }
                Some(account) => account,
            };

            match account.registration_state() {
                // Anti-replay: an identity that is registered and has not
                // logged out cannot be re-registered out from under itself.
                // An administratively disabled account is rejected the same
                // way; re-registering would not make it usable.
                RegistrationState::Active => {
                    tracing::info!(external_id = %payload.external_id, "scan rejected, already registered");
                    return Err(CoreError::AlreadyRegistered(
                        "This identity is already registered on this server".to_string(),
                    ));
                }
                RegistrationState::LoggedOut => {
                    let issued = self.new_code();
                    if self
                        .store
                        .reset_for_resume(&account.id, &issued.code, issued.expires_at)
                        .await?
                    {
                        let account = self.reload(&account.id).await?;
                        tracing::info!(external_id = %payload.external_id, "registration resumed after logout");
                        return Ok(ScanOutcome::Resumed {
                            account,
                            verification: issued,
                        });
                    }
                    // Lost a race against a concurrent login; re-evaluate.
                    continue;
                }
                RegistrationState::PendingVerification => {
                    let issued = self.new_code();
                    if self
                        .store
                        .reissue_code(&account.id, &issued.code, issued.expires_at)
                        .await?
                    {
                        let account = self.reload(&account.id).await?;
                        return Ok(ScanOutcome::Started {
                            account,
                            verification: Some(issued),
                            next_step: NextStep::VerifyEmail,
                        });
                    }
                    continue;
                }
                // Email already verified; the client resumes at the
                // password step without a new code.
                RegistrationState::PendingPassword => {
                    return Ok(ScanOutcome::Started {
                        account,
                        verification: None,
                        next_step: NextStep::SetPassword,
                    });
                }
                RegistrationState::Unregistered => {
                    return Err(CoreError::Internal(
                        "unregistered state for an existing account row".to_string(),
                    ));
                }
            }
        }

        Err(CoreError::Internal(
            "registration raced repeatedly; retry".to_string(),
        ))
    }

    /// Re-issue a code for a pending registration without a QR scan.
    pub async fn resend_code(&self, email: &str) -> CoreResult<IssuedCode> {
        let account = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound("No registration for this email".to_string()))?;

        match account.registration_state() {
            RegistrationState::PendingVerification | RegistrationState::PendingPassword => {}
            RegistrationState::Active => {
                return Err(CoreError::AlreadyRegistered(
                    "This identity is already registered".to_string(),
                ))
            }
            _ => {
                return Err(CoreError::Validation(
                    "No registration in progress for this email".to_string(),
                ))
            }
        }

        let issued = self.new_code();
        if self
            .store
            .reissue_code(&account.id, &issued.code, issued.expires_at)
            .await?
        {
            Ok(issued)
        } else {
            Err(CoreError::Validation(
                "No registration in progress for this email".to_string(),
            ))
        }
    }

    fn new_code(&self) -> IssuedCode {
        IssuedCode {
            code: generate_verification_code(),
            expires_at: Utc::now() + self.code_ttl,
        }
    }

    async fn reload(&self, account_id: &str) -> CoreResult<Account> {
        self.store
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| CoreError::Internal("account row vanished mid-operation".to_string()))
    }
}

/// Generate a 6-digit numeric verification code
fn generate_verification_code() -> String {
    let mut rng = rand::thread_rng();
    format!("{:06}", rng.gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QrPayload {
        serde_json::from_value(serde_json::json!({
            "emp_id": "E1",
            "emp_uname": "jdoe",
            "emp_email": "j@x.com",
            "emp_mobile_no": "555",
            "emp_name": "Jane Doe"
        }))
        .unwrap()
    }

    async fn test_machine() -> (RegistrationMachine, Arc<AccountStore>) {
        // one connection so every query sees the same in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        let store = Arc::new(AccountStore::new(pool));
        (RegistrationMachine::new(Arc::clone(&store), 10), store)
    }

    #[tokio::test]
    async fn first_scan_starts_registration() {
        let (machine, _) = test_machine().await;

        let outcome = machine.scan(&payload()).await.unwrap();
        match &outcome {
            ScanOutcome::Started {
                account,
                verification: Some(code),
                next_step,
            } => {
                assert_eq!(account.external_id, "E1");
                assert!(!account.is_registered);
                assert_eq!(code.code.len(), 6);
                assert_eq!(*next_step, NextStep::VerifyEmail);
            }
            other => panic!("expected started with code, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rescan_is_idempotent_and_never_duplicates() {
        let (machine, store) = test_machine().await;

        let first = machine.scan(&payload()).await.unwrap();
        let second = machine.scan(&payload()).await.unwrap();

        assert_eq!(first.account().id, second.account().id);
        // a fresh code is issued on retry
        assert!(second.verification().is_some());

        // still exactly one row for the identity
        let account = store
            .find_by_external_id_or_email("E1", "j@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.id, first.account().id);
    }

    #[tokio::test]
    async fn scan_after_email_verified_skips_to_password() {
        let (machine, store) = test_machine().await;

        let outcome = machine.scan(&payload()).await.unwrap();
        let code = outcome.verification().unwrap().code.clone();
        store
            .consume_verification_code(&outcome.account().id, &code, Utc::now())
            .await
            .unwrap();

        match machine.scan(&payload()).await.unwrap() {
            ScanOutcome::Started {
                verification: None,
                next_step: NextStep::SetPassword,
                ..
            } => {}
            other => panic!("expected password-step resume, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn registered_identity_is_rejected_until_logout() {
        let (machine, store) = test_machine().await;

        let outcome = machine.scan(&payload()).await.unwrap();
        let account_id = outcome.account().id.clone();
        let code = outcome.verification().unwrap().code.clone();
        store
            .consume_verification_code(&account_id, &code, Utc::now())
            .await
            .unwrap();
        store
            .complete_registration(&account_id, "hash")
            .await
            .unwrap();

        // anti-replay holds across retries
        for _ in 0..3 {
            assert!(matches!(
                machine.scan(&payload()).await,
                Err(CoreError::AlreadyRegistered(_))
            ));
        }

        // logout is the escape hatch
        store.mark_logged_out(&account_id, Utc::now()).await.unwrap();
        match machine.scan(&payload()).await.unwrap() {
            ScanOutcome::Resumed {
                account,
                verification,
            } => {
                assert_eq!(account.id, account_id);
                assert!(!account.is_registered);
                assert!(!account.email_verified);
                assert_eq!(verification.code.len(), 6);
            }
            other => panic!("expected resumed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn resend_code_only_for_pending_registrations() {
        let (machine, store) = test_machine().await;

        assert!(matches!(
            machine.resend_code("j@x.com").await,
            Err(CoreError::AccountNotFound(_))
        ));

        let outcome = machine.scan(&payload()).await.unwrap();
        let reissued = machine.resend_code("j@x.com").await.unwrap();
        assert_eq!(reissued.code.len(), 6);

        let account_id = outcome.account().id.clone();
        store
            .consume_verification_code(&account_id, &reissued.code, Utc::now())
            .await
            .unwrap();
        store
            .complete_registration(&account_id, "hash")
            .await
            .unwrap();

        assert!(matches!(
            machine.resend_code("j@x.com").await,
            Err(CoreError::AlreadyRegistered(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_first_scans_create_one_row() {
        let (machine, store) = test_machine().await;
        let machine = Arc::new(machine);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let machine = Arc::clone(&machine);
            handles.push(tokio::spawn(async move { machine.scan(&payload()).await }));
        }

        let mut ids = std::collections::HashSet::new();
        for handle in handles {
            let outcome = handle.await.unwrap().unwrap();
            ids.insert(outcome.account().id.clone());
        }
        assert_eq!(ids.len(), 1);

        let account = store
            .find_by_external_id_or_email("E1", "j@x.com")
            .await
            .unwrap()
            .unwrap();
        assert!(ids.contains(&account.id));
    }
}
