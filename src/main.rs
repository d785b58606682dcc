use pix_donations::api::{build_router, AppState};
use pix_donations::config::{AppConfig, NotificationBackend, NotificationConfig};
use pix_donations::database::donation_repository::DonationRepository;
use pix_donations::database::subscription_repository::SubscriptionRepository;
use pix_donations::database::transaction_repository::TransactionRepository;
use pix_donations::database::user_repository::UserRepository;
use pix_donations::database::{init_pool_from_config, run_migrations};
use pix_donations::health::HealthChecker;
use pix_donations::logging::init_tracing;
use pix_donations::payments::{EfiPixClient, PixGateway};
use pix_donations::services::notification::{NotificationChannel, SocketRegistry};
use pix_donations::services::payout::PayoutService;
use pix_donations::services::transaction_lifecycle::TransactionLifecycle;
use pix_donations::services::webhook_processor::WebhookProcessor;
use pix_donations::workers::subscription_sweeper::{SubscriptionSweeper, SweeperConfig};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[cfg(feature = "cache")]
async fn broadcast_notifier(
    config: &NotificationConfig,
    health_checker: &mut HealthChecker,
) -> anyhow::Result<Arc<dyn NotificationChannel>> {
    use pix_donations::cache::{init_cache_pool, CacheConfig};
    use pix_donations::services::notification::RedisBroadcast;

    info!("🔄 Initializing Redis pool for broadcast notifications...");
    let pool = init_cache_pool(CacheConfig {
        redis_url: config.redis_url.clone(),
        ..Default::default()
    })
    .await
    .map_err(|e| {
        error!("Failed to initialize cache pool: {}", e);
        e
    })?;

    *health_checker = health_checker.clone().with_cache(pool.clone());
    info!(channel = %config.channel, "✅ Broadcast notification channel ready");
    Ok(Arc::new(RedisBroadcast::new(pool, config.channel.clone())))
}

#[cfg(not(feature = "cache"))]
async fn broadcast_notifier(
    _config: &NotificationConfig,
    _health_checker: &mut HealthChecker,
) -> anyhow::Result<Arc<dyn NotificationChannel>> {
    anyhow::bail!("NOTIFICATION_BACKEND=broadcast requires the `cache` feature")
}

fn socket_notifier(pool: &PgPool) -> Arc<dyn NotificationChannel> {
    let store = Arc::new(SubscriptionRepository::new(pool.clone()));
    let transactions = Arc::new(TransactionRepository::new(pool.clone()));
    info!("✅ Socket notification registry ready");
    Arc::new(
        SocketRegistry::new()
            .with_store(store)
            .with_transactions(transactions),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    config.validate()?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "🚀 Starting Pix donations service"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = init_pool_from_config(&config.database).await.map_err(|e| {
        error!("Failed to initialize database pool: {}", e);
        e
    })?;
    info!(
        max_connections = db_pool.options().get_max_connections(),
        "✅ Database connection pool initialized"
    );

    if config.database.run_migrations {
        run_migrations(&db_pool).await?;
    }

    info!("💳 Initializing Pix gateway client...");
    let gateway = Arc::new(EfiPixClient::new(&config.pix).map_err(|e| {
        error!("❌ Failed to initialize Pix gateway client: {}", e);
        e
    })?);

    if let Some(webhook_url) = &config.pix.webhook_url {
        // Registration failure is not fatal, an earlier registration stays active
        if let Err(e) = gateway.configure_webhook(webhook_url).await {
            warn!(error = %e, "⚠️  Pix webhook registration failed");
        }
    }

    let mut health_checker = HealthChecker::new(Some(db_pool.clone()));
    let notifier = match config.notification.backend {
        NotificationBackend::Socket => socket_notifier(&db_pool),
        NotificationBackend::Broadcast => {
            broadcast_notifier(&config.notification, &mut health_checker).await?
        }
    };

    let donations = Arc::new(DonationRepository::new(db_pool.clone()));
    let transactions = Arc::new(TransactionRepository::new(db_pool.clone()));
    let users = Arc::new(UserRepository::new(db_pool.clone()));

    let lifecycle = Arc::new(TransactionLifecycle::new(
        donations.clone(),
        transactions.clone(),
        gateway.clone(),
        config.pix.split_config_id.clone(),
    ));

    let mut processor = WebhookProcessor::new(transactions, donations, users, notifier.clone());
    if config.pix.payout_enabled {
        info!("💸 Payout to campaign owners enabled");
        processor = processor.with_payout(Arc::new(PayoutService::new(
            gateway.clone(),
            config.pix.pix_key.clone(),
        )));
    }

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let sweeper = SubscriptionSweeper::new(
        notifier.clone(),
        SweeperConfig::from_notification_config(&config.notification),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(worker_shutdown_rx));

    info!("🛣️  Setting up application routes...");
    let app = build_router(
        AppState {
            lifecycle,
            processor: Arc::new(processor),
            notifier,
            health_checker,
        },
        Arc::new(config.webhook.clone()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if tokio::time::timeout(Duration::from_secs(5), sweeper_handle)
        .await
        .is_err()
    {
        error!("Timed out waiting for subscription sweeper shutdown");
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
