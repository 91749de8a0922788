use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use sqlx::postgres::PgPoolOptions;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use workforce_backend::{
    api,
    calendar::{Calendar, SystemClock},
    config::{Config, FaceProviderConfig},
    services::{
        face::{FaceCapability, HttpFaceProvider, MockFaceProvider},
        sinks::{LogNotificationSink, NotificationSink, Sinks, WebhookNotificationSink},
    },
    store::{PgStore, Stores},
    AppState, Wiring,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (dev convenience)
    let _ = dotenvy::dotenv();

    let cfg = Config::from_env()?;

    // Tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    if cfg.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Database pool
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&cfg.database_url)
        .await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("Database connected and migrations applied");

    let pg = Arc::new(PgStore::new(pool));

    let face: Arc<dyn FaceCapability> = match &cfg.face_provider {
        FaceProviderConfig::Mock => {
            tracing::warn!("using the mock face provider; every non-empty image verifies");
            Arc::new(MockFaceProvider::new(cfg.face_match_threshold))
        }
        FaceProviderConfig::Http { url, api_key } => {
            Arc::new(HttpFaceProvider::new(
                url.clone(),
                api_key.clone(),
                cfg.face_match_threshold,
                cfg.outbound_timeout,
            )?)
        }
    };

    let notifications: Arc<dyn NotificationSink> = match &cfg.notification_webhook_url {
        Some(url) => Arc::new(WebhookNotificationSink::new(url.clone(), cfg.outbound_timeout)?),
        None => Arc::new(LogNotificationSink),
    };

    let state = AppState::new(Wiring {
        stores: Stores::from_backend(pg.clone()),
        face,
        clock: Arc::new(SystemClock),
        calendar: Calendar::new(cfg.workday_offset),
        default_weekly_offs: cfg.default_weekly_offs,
        sinks: Sinks::new(notifications, pg),
        jwt_secret: cfg.jwt_secret.clone(),
    });

    // CORS
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any)
        .allow_origin(
            cfg.cors_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        );

    let app = api::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr).await?;
    tracing::info!("Listening on {}", cfg.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
