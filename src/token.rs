/// Stateless access and refresh token issuer
///
/// Pure function of the signing key and claims; no locking, no storage.
/// Session state (revocation, quick-login windows) lives in the session
/// store and is checked separately.
use crate::error::{CoreError, CoreResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims for both token classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Account id
    pub sub: String,
    /// Session id the token is bound to
    pub sid: String,
    /// "access" or "refresh"
    pub typ: String,
    pub iat: i64,
    pub exp: i64,
}

/// Token kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// Mints and verifies signed, time-limited tokens
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: String, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            secret,
            access_ttl,
            refresh_ttl,
        }
    }

    /// Access token lifetime in whole seconds, for `expiresIn` fields.
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Mint a token of the given kind bound to (account, session)
    pub fn issue(&self, kind: TokenKind, account_id: &str, session_id: &str) -> CoreResult<String> {
        let now = Utc::now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = TokenClaims {
            sub: account_id.to_string(),
            sid: session_id.to_string(),
            typ: kind.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| CoreError::Internal(format!("Failed to sign token: {}", e)))
    }

    /// Verify signature, expiry, and token kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> CoreResult<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                CoreError::InvalidToken("Token has expired".to_string())
            }
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                CoreError::InvalidToken("Invalid token signature".to_string())
            }
            _ => CoreError::InvalidToken(format!("Malformed token: {}", e)),
        })?;

        if data.claims.typ != expected.as_str() {
            return Err(CoreError::InvalidToken(format!(
                "Expected {} token",
                expected.as_str()
            )));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(
            "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            Duration::hours(24),
            Duration::days(7),
        )
    }

    #[test]
    fn access_token_round_trip() {
        let issuer = issuer();
        let token = issuer.issue(TokenKind::Access, "acct-1", "sess-1").unwrap();
        let claims = issuer.verify(&token, TokenKind::Access).unwrap();

        assert_eq!(claims.sub, "acct-1");
        assert_eq!(claims.sid, "sess-1");
        assert_eq!(claims.typ, "access");
    }

    #[test]
    fn refresh_token_rejected_as_access() {
        let issuer = issuer();
        let token = issuer.issue(TokenKind::Refresh, "acct-1", "sess-1").unwrap();

        assert!(issuer.verify(&token, TokenKind::Refresh).is_ok());
        assert!(matches!(
            issuer.verify(&token, TokenKind::Access),
            Err(CoreError::InvalidToken(_))
        ));
    }

    #[test]
    fn expired_token_rejected() {
        let expired = TokenIssuer::new(
            "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            Duration::seconds(-10),
            Duration::days(7),
        );
        let token = expired.issue(TokenKind::Access, "acct-1", "sess-1").unwrap();

        assert!(matches!(
            issuer().verify(&token, TokenKind::Access),
            Err(CoreError::InvalidToken(_))
        ));
    }

    #[test]
    fn wrong_key_rejected() {
        let other = TokenIssuer::new(
            "another-secret-key-that-is-also-long-enough".to_string(),
            Duration::hours(24),
            Duration::days(7),
        );
        let token = other.issue(TokenKind::Access, "acct-1", "sess-1").unwrap();

        assert!(matches!(
            issuer().verify(&token, TokenKind::Access),
            Err(CoreError::InvalidToken(_))
        ));
    }
}
