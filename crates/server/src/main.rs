//! tunepoll server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fred::interfaces::ClientLike;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunepoll_api::{AppState, router};
use tunepoll_common::{CacheBackend, Config, DocumentCache, MemoryCache, NoCache, RedisCache};
use tunepoll_core::clients::{SlackClient, SpotifyClient};
use tunepoll_core::store::{AggregateStore, DocumentStore, MemoryDocumentStore, SqlDocumentStore};
use tunepoll_core::{InstallationService, PollService, SpotifyInstallationService, UserService};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

async fn document_store(config: &Config) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    let Some(database) = &config.database else {
        warn!("No database configured, documents are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryDocumentStore::new()));
    };

    let db = tunepoll_db::init(database).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    tunepoll_db::migrate(&db).await?;
    info!("Migrations completed");

    Ok(Arc::new(SqlDocumentStore::new(Arc::new(db))))
}

async fn document_cache(config: &Config) -> Result<Arc<dyn DocumentCache>, Box<dyn std::error::Error>> {
    let ttl = Duration::from_secs(config.cache.ttl_secs);
    match config.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new(ttl, config.cache.max_entries))),
        CacheBackend::Disabled => Ok(Arc::new(NoCache)),
        CacheBackend::Redis => {
            let redis = config
                .redis
                .as_ref()
                .ok_or("cache.backend = \"redis\" requires a [redis] section")?;

            info!("Connecting to Redis...");
            let fred_config = fred::types::config::Config::from_url(&redis.url)?;
            let client = fred::clients::Client::new(fred_config, None, None, None);
            client.connect();
            client.wait_for_connect().await?;
            info!("Connected to Redis document cache");

            Ok(Arc::new(RedisCache::new(Arc::new(client), redis.prefix.clone(), ttl)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunepoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting tunepoll server...");

    // Load configuration
    let config = Config::load()?;
    let tz = config.poll.tz()?;
    let attempts = config.poll.max_update_attempts;

    let store = document_store(&config).await?;
    let cache = document_cache(&config).await?;

    // Installations
    let installations =
        InstallationService::new(AggregateStore::new(store.clone(), cache.clone(), attempts));
    let spotify_installations = SpotifyInstallationService::new(AggregateStore::new(
        store.clone(),
        cache.clone(),
        attempts,
    ));

    // Platform clients
    let slack = SlackClient::new(config.slack.clone(), installations.clone());
    let spotify = SpotifyClient::new(
        config.spotify.clone(),
        config.spotify_redirect_uri(),
        spotify_installations.clone(),
    );

    // Services
    let users = UserService::new(
        AggregateStore::new(store.clone(), cache.clone(), attempts),
        Arc::new(slack.clone()),
    );
    let poll_service = PollService::new(
        AggregateStore::new(store, cache, attempts),
        users,
        Arc::new(spotify.clone()),
        &config.poll,
        tz,
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = AppState {
        config: Arc::new(config),
        poll_service,
        installations,
        spotify_installations,
        chat: Arc::new(slack.clone()),
        slack,
        spotify,
    };

    // Build router
    let app = router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server with graceful shutdown
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
