/// Unified error types for the Crewgate identity service
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// QR scan against an identity that is already registered and logged in
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Verification code absent, mismatched, or expired
    #[error("Invalid verification code: {0}")]
    InvalidVerificationCode(String),

    /// Password and confirmation do not match
    #[error("Password mismatch: {0}")]
    PasswordMismatch(String),

    /// Password set attempted before email verification
    #[error("Email not verified: {0}")]
    NotEmailVerified(String),

    /// Unknown account, disabled account, or wrong password
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No quick-login-capable session for this account/device
    #[error("Quick login unavailable: {0}")]
    QuickLoginUnavailable(String),

    /// Quick login window or idle threshold exceeded; password entry required
    #[error("Re-authentication required: {0}")]
    ReauthenticationRequired(String),

    /// Identity no longer resolves to an account
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    /// QR payload is not base64(JSON) with the expected fields
    #[error("Invalid QR payload: {0}")]
    InvalidQrPayload(String),

    /// Bearer or refresh token missing, malformed, expired, or revoked
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Request input failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rate limiting
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Stable machine-readable discriminator. Clients branch on this field,
    /// never on the message text.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::Database(_) => "StoreUnavailable",
            CoreError::Io(_) => "InternalServerError",
            CoreError::AlreadyRegistered(_) => "AlreadyRegistered",
            CoreError::InvalidVerificationCode(_) => "InvalidVerificationCode",
            CoreError::PasswordMismatch(_) => "PasswordMismatch",
            CoreError::NotEmailVerified(_) => "NotEmailVerified",
            CoreError::InvalidCredentials(_) => "InvalidCredentials",
            CoreError::QuickLoginUnavailable(_) => "QuickLoginUnavailable",
            CoreError::ReauthenticationRequired(_) => "ReauthenticationRequired",
            CoreError::AccountNotFound(_) => "AccountNotFound",
            CoreError::InvalidQrPayload(_) => "InvalidQrPayload",
            CoreError::InvalidToken(_) => "InvalidToken",
            CoreError::Validation(_) => "InvalidRequest",
            CoreError::RateLimitExceeded { .. } => "RateLimitExceeded",
            CoreError::Internal(_) => "InternalServerError",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            CoreError::AlreadyRegistered(_) => StatusCode::CONFLICT,
            CoreError::InvalidVerificationCode(_)
            | CoreError::PasswordMismatch(_)
            | CoreError::NotEmailVerified(_)
            | CoreError::InvalidQrPayload(_)
            | CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidCredentials(_)
            | CoreError::QuickLoginUnavailable(_)
            | CoreError::ReauthenticationRequired(_)
            | CoreError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            CoreError::AccountNotFound(_) => StatusCode::NOT_FOUND,
            CoreError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Database(_) | CoreError::Io(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
    #[serde(rename = "alreadyRegistered", skip_serializing_if = "Option::is_none")]
    pub already_registered: Option<bool>,
}

/// Convert CoreError to HTTP response
impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            // Don't leak store/internal details
            CoreError::Database(_) | CoreError::Io(_) | CoreError::Internal(_) => {
                "Internal server error".to_string()
            }
            ref e => e.to_string(),
        };

        let body = Json(ErrorResponse {
            success: false,
            error: self.error_code().to_string(),
            message,
            already_registered: match self {
                CoreError::AlreadyRegistered(_) => Some(true),
                _ => None,
            },
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            CoreError::AlreadyRegistered("x".into()).error_code(),
            "AlreadyRegistered"
        );
        assert_eq!(
            CoreError::ReauthenticationRequired("x".into()).error_code(),
            "ReauthenticationRequired"
        );
        assert_eq!(
            CoreError::QuickLoginUnavailable("x".into()).error_code(),
            "QuickLoginUnavailable"
        );
    }

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            CoreError::AlreadyRegistered("x".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CoreError::InvalidCredentials("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CoreError::AccountNotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CoreError::InvalidVerificationCode("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
