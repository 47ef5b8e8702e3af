/// API routes and handlers
pub mod middleware;
pub mod registration;
pub mod session;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(registration::routes())
        .merge(session::routes())
}
