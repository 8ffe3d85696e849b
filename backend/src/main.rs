use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use soporte_backend::{
    config::Config,
    database,
    notifications::{EmailNotificationSink, PgTicketMutator, RetryPolicy, WithRetry},
    router,
    services::EmailService,
    workflows::{PgRecipientDirectory, PgWorkflowStore, WorkflowEngine, WorkflowStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;

    database::migrate(&db_pool).await?;

    if !config.smtp.is_configured() {
        tracing::warn!("SMTP credentials not set, notifications will be sent unauthenticated");
    }
    let email = EmailService::new(&config.smtp)?;

    let policy = RetryPolicy::new(config.dispatch.retry_config());
    let sink = WithRetry::new(EmailNotificationSink::new(email, db_pool.clone()), policy.clone());
    let mutator = WithRetry::new(PgTicketMutator::new(db_pool.clone()), policy);

    let store: Arc<dyn WorkflowStore> = Arc::new(PgWorkflowStore::new(db_pool.clone()));
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(PgRecipientDirectory::new(db_pool.clone())),
        Arc::new(sink),
        Arc::new(mutator),
    );

    let app = router(Arc::new(AppState {
        db_pool,
        engine,
        store,
    }));

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
