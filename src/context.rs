/// Application context and dependency injection
use crate::{
    account::AccountStore,
    config::ServerConfig,
    db,
    error::CoreResult,
    mailer::Mailer,
    rate_limit::{RateLimitConfig, RateLimiter},
    recovery::RecoveryAdvisor,
    registration::{RegistrationMachine, VerificationPipeline},
    session::SessionManager,
    token::TokenIssuer,
};
use chrono::Duration;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountStore>,
    pub registration: Arc<RegistrationMachine>,
    pub verification: Arc<VerificationPipeline>,
    pub sessions: Arc<SessionManager>,
    pub recovery: Arc<RecoveryAdvisor>,
    pub mailer: Arc<Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> CoreResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.identity_db, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::with_pool(config, pool)
    }

    /// Wire services over an existing pool. Used directly by tests with an
    /// in-memory database.
    pub fn with_pool(config: ServerConfig, pool: SqlitePool) -> CoreResult<Self> {
        let auth = &config.authentication;

        let accounts = Arc::new(AccountStore::new(pool.clone()));

        let tokens = TokenIssuer::new(
            auth.jwt_secret.clone(),
            Duration::hours(auth.access_token_ttl_hours),
            Duration::days(auth.refresh_token_ttl_days),
        );

        let registration = Arc::new(RegistrationMachine::new(
            Arc::clone(&accounts),
            auth.verification_code_ttl_minutes,
        ));
        let verification = Arc::new(VerificationPipeline::new(Arc::clone(&accounts)));
        let sessions = Arc::new(SessionManager::new(
            pool.clone(),
            Arc::clone(&accounts),
            tokens,
            auth,
        ));
        let recovery = Arc::new(RecoveryAdvisor::new(Arc::clone(&accounts)));

        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        let rate_limiter = Arc::new(RateLimiter::new(RateLimitConfig::from_server_config(
            &config.rate_limit,
        )));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            accounts,
            registration,
            verification,
            sessions,
            recovery,
            mailer,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
