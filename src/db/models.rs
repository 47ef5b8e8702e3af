/// Identity and session store models
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in the identity store, one per employee identity.
///
/// Registration progress is tracked by three monotonic flags
/// (`email_verified`, `password_verified`, `is_registered`); lifecycle by
/// `is_active` (administrative) and `is_logged_out` (explicit logout, the
/// bit that reopens the registration pipeline). The short-lived email
/// verification code lives on the row and is single-use.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub phone: String,
    pub email_verified: bool,
    pub password_verified: bool,
    pub is_registered: bool,
    pub is_active: bool,
    pub is_logged_out: bool,
    pub password_hash: Option<String>,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_logout_at: Option<DateTime<Utc>>,
    pub last_password_check: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Registration lifecycle state, derived from the account flags.
///
/// Every decision in the registration machine goes through this enum
/// rather than ad-hoc boolean combinations. `Unregistered` is the implicit
/// state of an identity with no account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    PendingVerification,
    PendingPassword,
    Active,
    LoggedOut,
}

impl Account {
    /// Derive the registration state from the stored flags.
    ///
    /// The mapping is total: `is_logged_out` dominates (logout is the one
    /// sanctioned path back into registration), then `is_registered`, then
    /// verification progress.
    pub fn registration_state(&self) -> RegistrationState {
        if self.is_logged_out {
            RegistrationState::LoggedOut
        } else if self.is_registered {
            RegistrationState::Active
        } else if self.email_verified {
            RegistrationState::PendingPassword
        } else {
            RegistrationState::PendingVerification
        }
    }

    /// Flag invariant: `is_registered ⇒ password_verified ⇒ email_verified`.
    pub fn flags_consistent(&self) -> bool {
        (!self.password_verified || self.email_verified)
            && (!self.is_registered || self.password_verified)
    }

    /// Whether the stored verification code matches and is still live.
    pub fn verification_code_valid(&self, code: &str, now: DateTime<Utc>) -> bool {
        match (&self.verification_code, self.verification_expires_at) {
            (Some(stored), Some(expires_at)) => stored == code && now <= expires_at,
            _ => false,
        }
    }
}

/// Session record, one per (account, device) pairing known to the server.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub account_id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub platform: Option<String>,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub quick_login_enabled: bool,
    pub quick_login_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Why a session cannot be used for quick login right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickLoginDenial {
    /// Quick login was never enabled or the session was deactivated.
    Unavailable,
    /// The eligibility window closed or the session went idle too long;
    /// the client must fall back to password entry.
    Stale,
}

impl Session {
    /// Single testable eligibility check for quick login.
    ///
    /// Two independent thresholds apply: the window opened by the last full
    /// login (`quick_login_expires_at`) and the idle cutoff since
    /// `last_activity_at`. Idle time exactly at the cutoff is still
    /// eligible; one second past it is not.
    pub fn quick_login_eligible(
        &self,
        now: DateTime<Utc>,
        idle_cutoff: Duration,
    ) -> Result<(), QuickLoginDenial> {
        if !self.is_active || !self.quick_login_enabled {
            return Err(QuickLoginDenial::Unavailable);
        }
        let window_end = match self.quick_login_expires_at {
            Some(t) => t,
            None => return Err(QuickLoginDenial::Unavailable),
        };
        if now > window_end || now - self.last_activity_at > idle_cutoff {
            return Err(QuickLoginDenial::Stale);
        }
        Ok(())
    }
}

/// Refresh token record, single-use, bound to a session.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RefreshToken {
    pub id: String,
    pub session_id: String,
    pub account_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with_flags(email_verified: bool, password_verified: bool, registered: bool, logged_out: bool) -> Account {
        Account {
            id: "a1".into(),
            external_id: "E1".into(),
            email: "a@x.com".into(),
            username: "a".into(),
            name: "A".into(),
            phone: "1".into(),
            email_verified,
            password_verified,
            is_registered: registered,
            is_active: true,
            is_logged_out: logged_out,
            password_hash: None,
            verification_code: None,
            verification_expires_at: None,
            last_login_at: None,
            last_logout_at: None,
            last_password_check: None,
            created_at: Utc::now(),
        }
    }

    fn session_with(
        active: bool,
        quick_enabled: bool,
        window_end: Option<DateTime<Utc>>,
        last_activity: DateTime<Utc>,
    ) -> Session {
        Session {
            id: "s1".into(),
            account_id: "a1".into(),
            device_id: "d1".into(),
            device_name: None,
            platform: None,
            access_token: "t".into(),
            expires_at: Utc::now() + Duration::hours(24),
            is_active: active,
            quick_login_enabled: quick_enabled,
            quick_login_expires_at: window_end,
            created_at: Utc::now() - Duration::days(1),
            last_activity_at: last_activity,
        }
    }

    #[test]
    fn state_transition_table() {
        use RegistrationState::*;

        // (email_verified, password_verified, registered, logged_out) -> state
        let table = [
            ((false, false, false, false), PendingVerification),
            ((true, false, false, false), PendingPassword),
            ((true, true, true, false), Active),
            ((true, true, true, true), LoggedOut),
            // logout dominates even for odd mid-flow combinations
            ((true, false, false, true), LoggedOut),
            ((false, false, false, true), LoggedOut),
        ];

        for ((ev, pv, reg, out), expected) in table {
            let account = account_with_flags(ev, pv, reg, out);
            assert_eq!(account.registration_state(), expected, "flags {:?}", (ev, pv, reg, out));
        }
    }

    #[test]
    fn flag_invariant_detects_violations() {
        assert!(account_with_flags(true, true, true, false).flags_consistent());
        assert!(account_with_flags(true, false, false, false).flags_consistent());
        // password verified without email verified
        assert!(!account_with_flags(false, true, false, false).flags_consistent());
        // registered without password verified
        assert!(!account_with_flags(true, false, true, false).flags_consistent());
    }

    #[test]
    fn verification_code_checks_match_and_expiry() {
        let now = Utc::now();
        let mut account = account_with_flags(false, false, false, false);

        assert!(!account.verification_code_valid("123456", now));

        account.verification_code = Some("123456".to_string());
        account.verification_expires_at = Some(now + Duration::minutes(10));
        assert!(account.verification_code_valid("123456", now));
        assert!(!account.verification_code_valid("654321", now));

        // a correct code past its expiry never validates
        account.verification_expires_at = Some(now - Duration::seconds(1));
        assert!(!account.verification_code_valid("123456", now));
    }

    #[test]
    fn quick_login_idle_boundary() {
        let now = Utc::now();
        let window_end = Some(now + Duration::days(10));
        let idle = Duration::hours(24);

        // 23 hours idle: eligible
        let fresh = session_with(true, true, window_end, now - Duration::hours(23));
        assert!(fresh.quick_login_eligible(now, idle).is_ok());

        // 24 hours and 1 second idle: stale
        let stale = session_with(
            true,
            true,
            window_end,
            now - Duration::hours(24) - Duration::seconds(1),
        );
        assert_eq!(
            stale.quick_login_eligible(now, idle),
            Err(QuickLoginDenial::Stale)
        );

        // exactly 24 hours: still eligible, by the single <= comparison
        let edge = session_with(true, true, window_end, now - Duration::hours(24));
        assert!(edge.quick_login_eligible(now, idle).is_ok());
    }

    #[test]
    fn quick_login_window_and_deactivation() {
        let now = Utc::now();
        let idle = Duration::hours(24);

        // window closed: stale (fall back to password, not to QR)
        let expired_window = session_with(true, true, Some(now - Duration::seconds(1)), now);
        assert_eq!(
            expired_window.quick_login_eligible(now, idle),
            Err(QuickLoginDenial::Stale)
        );

        // deactivated session is never eligible
        let deactivated = session_with(false, true, Some(now + Duration::days(1)), now);
        assert_eq!(
            deactivated.quick_login_eligible(now, idle),
            Err(QuickLoginDenial::Unavailable)
        );

        // quick login never enabled
        let disabled = session_with(true, false, Some(now + Duration::days(1)), now);
        assert_eq!(
            disabled.quick_login_eligible(now, idle),
            Err(QuickLoginDenial::Unavailable)
        );
    }
}
