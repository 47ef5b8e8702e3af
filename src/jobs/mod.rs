use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

pub mod tasks;

/// Job scheduler for background tasks
///
/// Expiry is checked at use time everywhere, so none of these jobs are
/// required for correctness; they keep the store small.
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::expired_session_cleanup_job(Arc::clone(&self)));
        tokio::spawn(Self::expired_code_cleanup_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Cleanup expired sessions and refresh tokens (runs every hour)
    async fn expired_session_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(3600));

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_sessions(&scheduler.context).await {
                Ok(count) => {
                    crate::metrics::record_background_job("session_cleanup", "ok");
                    if count > 0 {
                        info!("Cleaned up {} expired sessions and refresh tokens", count);
                    }
                }
                Err(e) => {
                    crate::metrics::record_background_job("session_cleanup", "error");
                    error!("Failed to cleanup expired sessions: {}", e);
                }
            }
        }
    }

    /// Clear expired verification codes (runs every 15 minutes)
    async fn expired_code_cleanup_job(scheduler: Arc<Self>) {
        let mut interval = interval(Duration::from_secs(900));

        loop {
            interval.tick().await;

            match tasks::cleanup_expired_codes(&scheduler.context).await {
                Ok(count) => {
                    crate::metrics::record_background_job("code_cleanup", "ok");
                    if count > 0 {
                        info!("Cleared {} expired verification codes", count);
                    }
                }
                Err(e) => {
                    crate::metrics::record_background_job("code_cleanup", "error");
                    error!("Failed to clear expired verification codes: {}", e);
                }
            }
        }
    }
}
