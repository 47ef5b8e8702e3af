/// Background task implementations
use crate::{context::AppContext, error::CoreResult};
use chrono::Utc;

/// Delete sessions and refresh tokens whose every lifetime has lapsed.
/// Returns the total number of rows removed.
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> CoreResult<u64> {
    let (sessions, refresh_tokens) = ctx.sessions.cleanup_expired(Utc::now()).await?;
    Ok(sessions + refresh_tokens)
}

/// Clear verification codes past their expiry from account rows.
pub async fn cleanup_expired_codes(ctx: &AppContext) -> CoreResult<u64> {
    ctx.accounts.clear_expired_codes(Utc::now()).await
}
