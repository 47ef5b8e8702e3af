/// Crewgate - workforce identity and session service

use crewgate::{config::ServerConfig, context::AppContext, error::CoreResult, jobs, server};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> CoreResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crewgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;

    // Create application context
    let ctx = AppContext::new(config).await?;
    let ctx = Arc::new(ctx);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ______                                __
  / ____/_______ _      ______ _____ _/ /____
 / /   / ___/ _ \ | /| / / __ `/ __ `/ __/ _ \
/ /___/ /  /  __/ |/ |/ / /_/ / /_/ / /_/  __/
\____/_/   \___/|__/|__/\__, /\__,_/\__/\___/
                       /____/
        Workforce identity service v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
