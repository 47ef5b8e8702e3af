/// Registration endpoints: QR scan, email verification, password setup
use crate::{
    account::AccountSummary,
    context::AppContext,
    error::{CoreError, CoreResult},
    qr,
    registration::{NextStep, ScanOutcome},
};
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build registration routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/registration/scan", post(scan))
        .route("/api/registration/verify-email", post(verify_email))
        .route("/api/registration/set-password", post(set_password))
        .route("/api/registration/resend-code", post(resend_code))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ScanRequest {
    #[validate(length(min = 1))]
    qr_payload: String,
}

/// Registration progress handed back after a scan. The verification code
/// itself travels only through the notification channel; the response
/// carries its expiry so the client can show a countdown.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanResponse {
    success: bool,
    next_step: NextStep,
    resumed: bool,
    skip_verification: bool,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    verification_expires_at: Option<DateTime<Utc>>,
}

async fn scan(
    State(ctx): State<AppContext>,
    Json(req): Json<ScanRequest>,
) -> CoreResult<Json<ScanResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let payload = qr::decode_qr_payload(&req.qr_payload).map_err(|e| {
        crate::metrics::record_scan("invalid");
        e
    })?;

    let outcome = match ctx.registration.scan(&payload).await {
        Ok(outcome) => outcome,
        Err(e) => {
            if matches!(e, CoreError::AlreadyRegistered(_)) {
                crate::metrics::record_scan("rejected");
            }
            return Err(e);
        }
    };

    let account = outcome.account();

    // Hand the code to the notification channel. A send failure is the
    // collaborator's problem; the registration itself already happened and
    // the client can ask for a resend.
    if let Some(issued) = outcome.verification() {
        if let Err(e) = ctx
            .mailer
            .send_verification_code(
                &account.email,
                &account.name,
                &issued.code,
                ctx.config.authentication.verification_code_ttl_minutes,
            )
            .await
        {
            tracing::warn!("Failed to send verification email: {}", e);
        }
    }

    let response = match &outcome {
        ScanOutcome::Started {
            verification,
            next_step,
            ..
        } => {
            crate::metrics::record_scan("started");
            ScanResponse {
                success: true,
                next_step: *next_step,
                resumed: false,
                skip_verification: verification.is_none(),
                email: account.email.clone(),
                verification_expires_at: verification.as_ref().map(|v| v.expires_at),
            }
        }
        ScanOutcome::Resumed { verification, .. } => {
            crate::metrics::record_scan("resumed");
            ScanResponse {
                success: true,
                next_step: NextStep::VerifyEmail,
                resumed: true,
                skip_verification: false,
                email: account.email.clone(),
                verification_expires_at: Some(verification.expires_at),
            }
        }
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct VerifyEmailRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 1))]
    verification_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyEmailResponse {
    success: bool,
    next_step: NextStep,
}

async fn verify_email(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyEmailRequest>,
) -> CoreResult<Json<VerifyEmailResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    ctx.verification
        .verify_email(&req.email, &req.verification_code)
        .await?;

    Ok(Json(VerifyEmailResponse {
        success: true,
        next_step: NextStep::SetPassword,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct SetPasswordRequest {
    #[validate(email)]
    email: String,
    #[validate(length(min = 6))]
    mobile_password: String,
    confirm_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetPasswordResponse {
    success: bool,
    next_step: NextStep,
    account: AccountSummary,
}

async fn set_password(
    State(ctx): State<AppContext>,
    Json(req): Json<SetPasswordRequest>,
) -> CoreResult<Json<SetPasswordResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let account = ctx
        .verification
        .set_password(&req.email, &req.mobile_password, &req.confirm_password)
        .await?;

    Ok(Json(SetPasswordResponse {
        success: true,
        next_step: NextStep::Login,
        account: AccountSummary::from(&account),
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ResendCodeRequest {
    #[validate(email)]
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResendCodeResponse {
    success: bool,
    verification_expires_at: DateTime<Utc>,
}

async fn resend_code(
    State(ctx): State<AppContext>,
    Json(req): Json<ResendCodeRequest>,
) -> CoreResult<Json<ResendCodeResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let issued = ctx.registration.resend_code(&req.email).await?;

    if let Some(account) = ctx.accounts.find_by_email(&req.email).await? {
        if let Err(e) = ctx
            .mailer
            .send_verification_code(
                &account.email,
                &account.name,
                &issued.code,
                ctx.config.authentication.verification_code_ttl_minutes,
            )
            .await
        {
            tracing::warn!("Failed to send verification email: {}", e);
        }
    }

    Ok(Json(ResendCodeResponse {
        success: true,
        verification_expires_at: issued.expires_at,
    }))
}
