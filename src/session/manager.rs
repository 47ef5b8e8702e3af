/// Session manager implementation using runtime queries
///
/// Issues sessions on full login, re-issues token pairs on quick login and
/// refresh, enforces the expiry policy, and tears sessions down on logout.
/// The session row stores the latest access token for its session id, so
/// minting a new pair invalidates earlier bearer tokens for that session.
use crate::{
    account::{AccountStore, AccountSummary},
    config::AuthConfig,
    db::models::{Account, QuickLoginDenial, Session},
    error::{CoreError, CoreResult},
    password,
    session::{DeviceInfo, LoginGrant, SavedAccount, SessionSummary, TokenPair, ValidatedSession},
    token::{TokenIssuer, TokenKind},
};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const SESSION_SELECT: &str = "SELECT id, account_id, device_id, device_name, platform, \
     access_token, expires_at, is_active, quick_login_enabled, quick_login_expires_at, \
     created_at, last_activity_at \
     FROM session";

/// Session manager service
pub struct SessionManager {
    db: SqlitePool,
    accounts: Arc<AccountStore>,
    tokens: TokenIssuer,
    access_ttl: Duration,
    refresh_ttl: Duration,
    quick_login_window: Duration,
    quick_login_idle_cutoff: Duration,
}

impl SessionManager {
    pub fn new(
        db: SqlitePool,
        accounts: Arc<AccountStore>,
        tokens: TokenIssuer,
        auth: &AuthConfig,
    ) -> Self {
        Self {
            db,
            accounts,
            tokens,
            access_ttl: Duration::hours(auth.access_token_ttl_hours),
            refresh_ttl: Duration::days(auth.refresh_token_ttl_days),
            quick_login_window: Duration::days(auth.quick_login_window_days),
            quick_login_idle_cutoff: Duration::hours(auth.quick_login_idle_hours),
        }
    }

    /// Authenticate with full credentials and open a fresh session.
    pub async fn login(
        &self,
        identifier: &str,
        password_input: &str,
        device: &DeviceInfo,
    ) -> CoreResult<LoginGrant> {
        let account = self
            .accounts
            .find_by_identifier(identifier)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !account.is_active || !account.is_registered {
            return Err(invalid_credentials());
        }

        let hash = account.password_hash.as_deref().ok_or_else(invalid_credentials)?;
        if !password::verify_password(password_input, hash)? {
            return Err(invalid_credentials());
        }

        let now = Utc::now();
        self.accounts.mark_logged_in(&account.id, now).await?;

        // One live session per (account, device): retire predecessors.
        sqlx::query(
            "UPDATE session SET is_active = 0 WHERE account_id = ?1 AND device_id = ?2 AND is_active = 1",
        )
        .bind(&account.id)
        .bind(&device.device_id)
        .execute(&self.db)
        .await?;

        let session = self.create_session(&account.id, device, now).await?;
        let refresh_token = self.issue_refresh(&account.id, &session.id, now).await?;

        tracing::info!(account_id = %account.id, device_id = %device.device_id, "full login");
        crate::metrics::record_login("password");

        let account = self.reload_account(&account.id).await?;
        self.grant(account, session, refresh_token).await
    }

    /// Password-less re-authentication on a trusted device.
    pub async fn quick_login(&self, account_id: &str, device: &DeviceInfo) -> CoreResult<LoginGrant> {
        let account = self.accounts.find_by_id(account_id).await?.ok_or_else(|| {
            CoreError::AccountNotFound("This identity is no longer known; scan your QR code".to_string())
        })?;

        if !account.is_active {
            return Err(CoreError::QuickLoginUnavailable(
                "This account has been disabled".to_string(),
            ));
        }

        let session = self
            .latest_session(&account.id, &device.device_id)
            .await?
            .ok_or_else(|| {
                CoreError::QuickLoginUnavailable(
                    "No saved session for this device".to_string(),
                )
            })?;

        let now = Utc::now();
        session
            .quick_login_eligible(now, self.quick_login_idle_cutoff)
            .map_err(|denial| match denial {
                QuickLoginDenial::Unavailable => CoreError::QuickLoginUnavailable(
                    "Quick login is not enabled for this session".to_string(),
                ),
                QuickLoginDenial::Stale => CoreError::ReauthenticationRequired(
                    "Session expired; enter your password to continue".to_string(),
                ),
            })?;

        // New token pair under the same session id; the 30-day window is
        // only reopened by a full login.
        let access_token = self.tokens.issue(TokenKind::Access, &account.id, &session.id)?;
        let expires_at = now + self.access_ttl;
        sqlx::query(
            "UPDATE session SET access_token = ?1, expires_at = ?2, last_activity_at = ?3 \
             WHERE id = ?4",
        )
        .bind(&access_token)
        .bind(expires_at)
        .bind(now)
        .bind(&session.id)
        .execute(&self.db)
        .await?;

        let refresh_token = self.issue_refresh(&account.id, &session.id, now).await?;
        self.accounts.mark_quick_logged_in(&account.id, now).await?;

        tracing::info!(account_id = %account.id, session_id = %session.id, "quick login");
        crate::metrics::record_login("quick");

        let session = Session {
            access_token: access_token.clone(),
            expires_at,
            last_activity_at: now,
            ..session
        };
        let account = self.reload_account(&account.id).await?;
        self.grant(account, session, refresh_token).await
    }

    /// Exchange an unused, unexpired refresh token for a new pair under the
    /// same session. The presented token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> CoreResult<LoginGrant> {
        let claims = self.tokens.verify(refresh_token, TokenKind::Refresh)?;

        let now = Utc::now();
        // Single use, enforced by the conditional UPDATE.
        let consumed = sqlx::query(
            "UPDATE refresh_token SET used = 1, used_at = ?1 \
             WHERE token = ?2 AND used = 0 AND expires_at >= ?1",
        )
        .bind(now)
        .bind(refresh_token)
        .execute(&self.db)
        .await?;

        if consumed.rows_affected() != 1 {
            return Err(CoreError::InvalidToken(
                "Refresh token is expired, revoked, or already used".to_string(),
            ));
        }

        let session = self
            .session_by_id(&claims.sid)
            .await?
            .filter(|s| s.is_active)
            .ok_or_else(|| CoreError::InvalidToken("Session is no longer active".to_string()))?;

        let account = self.reload_account(&session.account_id).await?;
        if !account.is_active {
            return Err(CoreError::InvalidToken("Account is disabled".to_string()));
        }

        let access_token = self.tokens.issue(TokenKind::Access, &account.id, &session.id)?;
        let expires_at = now + self.access_ttl;
        sqlx::query(
            "UPDATE session SET access_token = ?1, expires_at = ?2, last_activity_at = ?3 \
             WHERE id = ?4",
        )
        .bind(&access_token)
        .bind(expires_at)
        .bind(now)
        .bind(&session.id)
        .execute(&self.db)
        .await?;

        let new_refresh = self.issue_refresh(&account.id, &session.id, now).await?;

        let session = Session {
            access_token,
            expires_at,
            last_activity_at: now,
            ..session
        };
        self.grant(account, session, new_refresh).await
    }

    /// Validate a bearer access token against the session store.
    pub async fn validate_access_token(&self, token: &str) -> CoreResult<ValidatedSession> {
        let claims = self.tokens.verify(token, TokenKind::Access)?;

        let session = self
            .session_by_id(&claims.sid)
            .await?
            .ok_or_else(|| CoreError::InvalidToken("Unknown session".to_string()))?;

        // The row stores the latest token for this session; older mints are
        // rejected even before their exp.
        if !session.is_active || session.access_token != token {
            return Err(CoreError::InvalidToken("Session is no longer active".to_string()));
        }
        if Utc::now() > session.expires_at {
            return Err(CoreError::InvalidToken("Session expired".to_string()));
        }

        let account = self.reload_account(&session.account_id).await?;
        if !account.is_active {
            return Err(CoreError::InvalidToken("Account is disabled".to_string()));
        }

        Ok(ValidatedSession {
            account_id: session.account_id,
            session_id: session.id,
        })
    }

    /// Tear the session down and flip the account's logged-out bit, the one
    /// transition that reopens QR registration for this identity.
    pub async fn logout(&self, validated: &ValidatedSession) -> CoreResult<()> {
        let now = Utc::now();

        sqlx::query("UPDATE session SET is_active = 0 WHERE id = ?1")
            .bind(&validated.session_id)
            .execute(&self.db)
            .await?;

        self.accounts
            .mark_logged_out(&validated.account_id, now)
            .await?;

        tracing::info!(account_id = %validated.account_id, session_id = %validated.session_id, "logout");
        crate::metrics::record_logout();

        Ok(())
    }

    /// Accounts known on a device. Logged-out accounts are omitted entirely;
    /// accounts whose quick-login window lapsed stay listed with
    /// `has_quick_access = false` so the client can offer password login.
    pub async fn saved_accounts(&self, device_id: &str) -> CoreResult<Vec<SavedAccount>> {
        let query = format!(
            "{} WHERE device_id = ?1 AND created_at = (\
                SELECT MAX(s2.created_at) FROM session s2 \
                WHERE s2.account_id = session.account_id AND s2.device_id = session.device_id)",
            SESSION_SELECT
        );
        let sessions = sqlx::query_as::<_, Session>(&query)
            .bind(device_id)
            .fetch_all(&self.db)
            .await?;

        let now = Utc::now();
        let mut saved = Vec::new();
        for session in sessions {
            let account = match self.accounts.find_by_id(&session.account_id).await? {
                Some(a) => a,
                None => continue,
            };
            if account.is_logged_out || !account.is_active {
                continue;
            }

            let has_quick_access = session.is_active
                && session.quick_login_enabled
                && session
                    .quick_login_expires_at
                    .map(|t| t > now)
                    .unwrap_or(false);

            saved.push(SavedAccount {
                id: account.id,
                username: account.username,
                email: account.email,
                name: account.name,
                has_quick_access,
                last_login_at: account.last_login_at,
            });
        }

        Ok(saved)
    }

    /// Housekeeping: physically remove rows that can no longer authenticate
    /// anything. A session is kept while either its access token or its
    /// quick-login window is still live.
    ///
    /// Returns (sessions_deleted, refresh_tokens_deleted).
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> CoreResult<(u64, u64)> {
        let sessions = sqlx::query(
            "DELETE FROM session WHERE expires_at < ?1 \
             AND (quick_login_expires_at IS NULL OR quick_login_expires_at < ?1)",
        )
        .bind(now)
        .execute(&self.db)
        .await?
        .rows_affected();

        let refresh_tokens = sqlx::query("DELETE FROM refresh_token WHERE expires_at < ?1")
            .bind(now)
            .execute(&self.db)
            .await?
            .rows_affected();

        Ok((sessions, refresh_tokens))
    }

    async fn create_session(
        &self,
        account_id: &str,
        device: &DeviceInfo,
        now: DateTime<Utc>,
    ) -> CoreResult<Session> {
        let session_id = Uuid::new_v4().to_string();
        let access_token = self.tokens.issue(TokenKind::Access, account_id, &session_id)?;
        let expires_at = now + self.access_ttl;
        let quick_login_expires_at = now + self.quick_login_window;

        sqlx::query(
            "INSERT INTO session (id, account_id, device_id, device_name, platform, \
             access_token, expires_at, is_active, quick_login_enabled, quick_login_expires_at, \
             created_at, last_activity_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 1, ?8, ?9, ?9)",
        )
        .bind(&session_id)
        .bind(account_id)
        .bind(&device.device_id)
        .bind(&device.device_name)
        .bind(&device.platform)
        .bind(&access_token)
        .bind(expires_at)
        .bind(quick_login_expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(Session {
            id: session_id,
            account_id: account_id.to_string(),
            device_id: device.device_id.clone(),
            device_name: device.device_name.clone(),
            platform: device.platform.clone(),
            access_token,
            expires_at,
            is_active: true,
            quick_login_enabled: true,
            quick_login_expires_at: Some(quick_login_expires_at),
            created_at: now,
            last_activity_at: now,
        })
    }

    async fn issue_refresh(
        &self,
        account_id: &str,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<String> {
        let token = self.tokens.issue(TokenKind::Refresh, account_id, session_id)?;

        sqlx::query(
            "INSERT INTO refresh_token (id, session_id, account_id, token, expires_at, used, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(session_id)
        .bind(account_id)
        .bind(&token)
        .bind(now + self.refresh_ttl)
        .bind(now)
        .execute(&self.db)
        .await?;

        Ok(token)
    }

    async fn latest_session(
        &self,
        account_id: &str,
        device_id: &str,
    ) -> CoreResult<Option<Session>> {
        let query = format!(
            "{} WHERE account_id = ?1 AND device_id = ?2 ORDER BY created_at DESC LIMIT 1",
            SESSION_SELECT
        );
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(account_id)
            .bind(device_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(session)
    }

    async fn session_by_id(&self, session_id: &str) -> CoreResult<Option<Session>> {
        let query = format!("{} WHERE id = ?1", SESSION_SELECT);
        let session = sqlx::query_as::<_, Session>(&query)
            .bind(session_id)
            .fetch_optional(&self.db)
            .await?;

        Ok(session)
    }

    async fn reload_account(&self, account_id: &str) -> CoreResult<Account> {
        self.accounts
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| CoreError::AccountNotFound("Account no longer exists".to_string()))
    }

    async fn grant(
        &self,
        account: Account,
        session: Session,
        refresh_token: String,
    ) -> CoreResult<LoginGrant> {
        Ok(LoginGrant {
            user: AccountSummary::from(&account),
            tokens: TokenPair {
                access_token: session.access_token.clone(),
                refresh_token,
                expires_in: self.tokens.access_ttl_seconds(),
            },
            session: SessionSummary {
                id: session.id,
                device_id: session.device_id,
                expires_at: session.expires_at,
                quick_login_enabled: session.quick_login_enabled,
                quick_login_expires_at: session.quick_login_expires_at,
            },
        })
    }
}

fn invalid_credentials() -> CoreError {
    CoreError::InvalidCredentials("Invalid username or password".to_string())
}
