//! minichat relay
//!
//! Entry point. Wires the presence store, the in-process push platform and
//! the HTTP surface, then serves until SIGINT/SIGTERM.

use chat_relay::channel::{ChannelProvisioner, LocalChannelProvisioner};
use chat_relay::config::{Config, LogFormat, PresenceBackend};
use chat_relay::fanout::Fanout;
use chat_relay::identity::{IdentityProvider, TrustedHeaderIdentityProvider};
use chat_relay::lifecycle::{drain_local_sessions, run_disconnect_pump, SessionLifecycle};
use chat_relay::observability::{init_metrics_recorder, HealthState};
use chat_relay::presence::{InMemoryPresenceStore, PresenceStore, RedisPresenceStore};
use chat_relay::routes::{self, AppState};
use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Config first: it selects the log format.
    let config = Config::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.log_format);

    info!("Starting minichat relay");
    info!(
        bind_address = %config.bind_address,
        presence_backend = config.presence_backend.as_str(),
        store_timeout_ms = config.store_timeout.as_millis(),
        send_timeout_ms = config.send_timeout.as_millis(),
        identity_header = %config.identity_header,
        "Configuration loaded successfully"
    );

    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to initialize metrics recorder");
        e
    })?;

    let health_state = Arc::new(HealthState::new());

    let presence: Arc<dyn PresenceStore> = match &config.presence_backend {
        PresenceBackend::Memory => {
            warn!("No REDIS_URL set, presence is process-local");
            Arc::new(InMemoryPresenceStore::new())
        }
        PresenceBackend::Redis { url, key } => {
            info!(key = %key, "Connecting to Redis...");
            let store =
                RedisPresenceStore::connect(url.expose_secret(), key.clone(), config.store_timeout)
                    .await
                    .map_err(|e| {
                        error!(error = %e, "Failed to connect to Redis");
                        e
                    })?;
            info!("Redis connection established");
            Arc::new(store)
        }
    };

    let (platform, notices) =
        LocalChannelProvisioner::new(config.channel_token_ttl, config.channel_buffer);
    let channels: Arc<dyn ChannelProvisioner> = Arc::new(platform.clone());
    let identities: Arc<dyn IdentityProvider> = Arc::new(TrustedHeaderIdentityProvider::new(
        config.identity_header.clone(),
        config.login_url.clone(),
    ));

    let lifecycle = SessionLifecycle::new(
        Arc::clone(&presence),
        Arc::clone(&channels),
        identities,
    );
    let fanout = Fanout::new(presence, channels, config.send_timeout);

    let shutdown_token = CancellationToken::new();

    let pump = tokio::spawn(run_disconnect_pump(
        lifecycle.clone(),
        platform.clone(),
        notices,
        shutdown_token.child_token(),
    ));

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        e
    })?;

    let state = Arc::new(AppState {
        lifecycle: lifecycle.clone(),
        fanout,
        platform: Some(platform.clone()),
        config,
    });
    let app = routes::build_routes(state, Arc::clone(&health_state), Some(prometheus_handle));

    // Bind before marking ready to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(error = %e, addr = %addr, "Failed to bind listener");
        e
    })?;

    health_state.set_ready();
    info!(addr = %addr, "minichat relay listening");

    let server_token = shutdown_token.clone();
    let server_health = Arc::clone(&health_state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Mark as not ready immediately so load balancers stop routing
            server_health.set_not_ready();
            server_token.cancel();

            drain_local_sessions(&platform, &lifecycle).await;
        })
        .await?;

    if let Err(e) = pump.await {
        warn!(error = %e, "Disconnect pump task ended abnormally");
    }

    info!("minichat relay shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "chat_relay=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
