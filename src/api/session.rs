/// Session endpoints: login, quick login, refresh, logout, saved accounts,
/// recovery advice
use crate::{
    account::AccountSummary,
    auth::AuthContext,
    context::AppContext,
    error::{CoreError, CoreResult},
    recovery::RecoveryAdvice,
    session::{DeviceInfo, LoginGrant, SavedAccount},
};
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build session routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/quick-login", post(quick_login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/session", get(get_session))
        .route("/api/auth/saved-accounts", get(saved_accounts))
        .route("/api/auth/recovery-check", post(recovery_check))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    /// Username or email
    #[serde(alias = "username", alias = "email")]
    #[validate(length(min = 1))]
    identifier: String,
    #[validate(length(min = 1))]
    password: String,
    #[serde(default)]
    device_info: Option<DeviceInfo>,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    success: bool,
    data: LoginGrant,
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> CoreResult<Json<LoginResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let device = req.device_info.unwrap_or_else(DeviceInfo::unknown);
    let grant = ctx.sessions.login(&req.identifier, &req.password, &device).await?;

    Ok(Json(LoginResponse {
        success: true,
        data: grant,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct QuickLoginRequest {
    #[validate(length(min = 1))]
    user_id: String,
    device_info: DeviceInfo,
}

async fn quick_login(
    State(ctx): State<AppContext>,
    Json(req): Json<QuickLoginRequest>,
) -> CoreResult<Json<LoginResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let grant = ctx.sessions.quick_login(&req.user_id, &req.device_info).await?;

    Ok(Json(LoginResponse {
        success: true,
        data: grant,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    #[validate(length(min = 1))]
    refresh_token: String,
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> CoreResult<Json<LoginResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let grant = ctx.sessions.refresh(&req.refresh_token).await?;

    Ok(Json(LoginResponse {
        success: true,
        data: grant,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    success: bool,
}

async fn logout(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    body: Option<Json<LogoutRequest>>,
) -> CoreResult<Json<LogoutResponse>> {
    // The bearer token is authoritative; a mismatched body id is logged and
    // otherwise ignored.
    if let Some(Json(LogoutRequest {
        user_id: Some(user_id),
    })) = body
    {
        if user_id != auth.account_id {
            tracing::warn!(
                token_account = %auth.account_id,
                body_account = %user_id,
                "logout body names a different account than the token"
            );
        }
    }

    ctx.sessions.logout(&auth.session).await?;

    Ok(Json(LogoutResponse { success: true }))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    success: bool,
    user: AccountSummary,
}

async fn get_session(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> CoreResult<Json<SessionResponse>> {
    let account = ctx
        .accounts
        .find_by_id(&auth.account_id)
        .await?
        .ok_or_else(|| CoreError::AccountNotFound("Account no longer exists".to_string()))?;

    Ok(Json(SessionResponse {
        success: true,
        user: AccountSummary::from(&account),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedAccountsQuery {
    device_id: String,
}

#[derive(Debug, Serialize)]
struct SavedAccountsResponse {
    success: bool,
    accounts: Vec<SavedAccount>,
}

async fn saved_accounts(
    State(ctx): State<AppContext>,
    Query(query): Query<SavedAccountsQuery>,
) -> CoreResult<Json<SavedAccountsResponse>> {
    let accounts = ctx.sessions.saved_accounts(&query.device_id).await?;

    Ok(Json(SavedAccountsResponse {
        success: true,
        accounts,
    }))
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct RecoveryCheckRequest {
    #[validate(length(min = 1))]
    user_id: String,
}

#[derive(Debug, Serialize)]
struct RecoveryCheckResponse {
    success: bool,
    #[serde(flatten)]
    advice: RecoveryAdvice,
}

async fn recovery_check(
    State(ctx): State<AppContext>,
    Json(req): Json<RecoveryCheckRequest>,
) -> CoreResult<Json<RecoveryCheckResponse>> {
    req.validate()
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    let advice = ctx.recovery.advise(&req.user_id).await?;

    Ok(Json(RecoveryCheckResponse {
        success: true,
        advice,
    }))
}
