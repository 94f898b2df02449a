mod clients;
mod config;
mod handlers;
mod models;
mod repository;
mod services;
mod workers;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::clients::{AdyenApi, AdyenClient, MiraklApi, MiraklClient};
use crate::config::{AdyenEnvironment, Config};
use crate::repository::{NotificationRepository, PgRepository};
use crate::services::address::HouseNumberParser;
use crate::services::delta::DeltaService;
use crate::services::document::{DocumentService, DocumentSettings};
use crate::services::mail::{EmailSender, MailTemplateService, SmtpMailer};
use crate::services::notification::NotificationService;
use crate::services::payout::PayoutService;
use crate::services::retry_payout::RetryPayoutService;
use crate::services::shareholder_mapping::ShareholderMappingService;
use crate::services::shop::ShopService;
use crate::services::ubo::UboService;
use crate::workers::email_sender::EmailSenderWorker;
use crate::workers::notification_listener::{requeue_pending, NotificationListener};
use crate::workers::scheduler::{self, SyncJobs};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match std::env::var("CONNECTOR_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };
    shared::observability::init_logging(&config.logging)?;

    info!("Starting Connector Service...");
    config.validate()?;
    info!(adyen_environment = ?config.adyen.environment, "Configuration loaded successfully");

    // Initialize database connection pool
    let db_pool = shared::database::create_pool(&config.database).await?;
    shared::database::health_check(&db_pool).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    info!("Database migrations completed");

    let repository = Arc::new(PgRepository::new(db_pool));

    // API clients
    let mirakl: Arc<dyn MiraklApi> = Arc::new(MiraklClient::new(&config.mirakl)?);
    let adyen: Arc<dyn AdyenApi> = Arc::new(AdyenClient::new(&config.adyen)?);

    // Services
    let connector = &config.connector;
    let house_numbers = Arc::new(HouseNumberParser::new(&connector.house_number_patterns)?);
    let deltas = DeltaService::new(repository.clone());
    let mappings = ShareholderMappingService::new(connector.max_ubos, repository.clone());
    let documents = Arc::new(DocumentService::new(
        mirakl.clone(),
        adyen.clone(),
        deltas.clone(),
        mappings.clone(),
        repository.clone(),
        DocumentSettings {
            max_ubos: connector.max_ubos,
            max_doc_retries: connector.max_doc_retries,
            test_environment: config.adyen.environment == AdyenEnvironment::Test,
        },
    ));
    let shops = Arc::new(ShopService::new(
        mirakl.clone(),
        adyen.clone(),
        deltas,
        UboService::new(connector.max_ubos, repository.clone(), house_numbers.clone()),
        mappings,
        documents.clone(),
        house_numbers,
        connector.default_processing_tier,
    ));
    let payouts = PayoutService::new(adyen.clone(), repository.clone());
    let retry_payouts = RetryPayoutService::new(adyen.clone(), repository.clone(), connector.max_payout_failed);
    let mail = Arc::new(MailTemplateService::new(
        repository.clone(),
        config.mail.from_name.clone(),
        config.mail.operator_email.clone(),
    )?);
    let notification_service = Arc::new(NotificationService::new(
        repository.clone(),
        mirakl,
        adyen,
        mail,
        documents.clone(),
        shops.clone(),
        retry_payouts.clone(),
    ));
    info!("Services initialized");

    // Start background workers
    let (notification_tx, notification_rx) = mpsc::unbounded_channel();
    requeue_pending(repository.as_ref(), &notification_tx).await?;

    let listener = NotificationListener::new(notification_service);
    tokio::spawn(async move {
        listener.run(notification_rx).await;
    });

    let email_sender = Arc::new(EmailSender::new(
        Arc::new(SmtpMailer::new(&config.mail)?),
        repository.clone(),
        connector.max_email_retries,
    ));
    let email_worker = EmailSenderWorker::new(email_sender, config.scheduler.email_send_interval_seconds);
    tokio::spawn(async move {
        email_worker.run().await;
    });

    let _scheduler = scheduler::start(
        &config.scheduler,
        SyncJobs {
            shops,
            documents,
            retry_payouts,
        },
    )
    .await?;

    info!("Background workers started");

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        notifications: repository,
        notification_tx,
        payouts,
    });

    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Connector Service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    if let Err(e) = axum::serve(listener, app).await {
        warn!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/adyen-notifications", post(handlers::notification::receive_notification))
        .route("/api/payouts", post(handlers::payout::create_payout))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub notifications: Arc<dyn NotificationRepository>,
    pub notification_tx: mpsc::UnboundedSender<i64>,
    pub payouts: PayoutService,
}
