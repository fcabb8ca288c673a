//! Test server harness for E2E testing
//!
//! Provides `TestRelayServer` for spawning real relay instances in tests.

use crate::fixtures::{test_config, TEST_IDENTITY_HEADER};
use chat_relay::channel::{ChannelProvisioner, LocalChannelProvisioner};
use chat_relay::config::Config;
use chat_relay::fanout::Fanout;
use chat_relay::identity::{IdentityProvider, TrustedHeaderIdentityProvider};
use chat_relay::lifecycle::{run_disconnect_pump, SessionLifecycle};
use chat_relay::observability::HealthState;
use chat_relay::presence::{InMemoryPresenceStore, PresenceStore};
use chat_relay::routes::{self, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the relay in E2E tests.
///
/// Wires the production route builder with the in-process push platform,
/// header-based identities and the disconnect pump. Requests identify
/// themselves with [`TEST_IDENTITY_HEADER`].
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_connect_e2e() -> Result<()> {
///     let server = TestRelayServer::spawn().await?;
///
///     let response = server
///         .client()
///         .get(server.url())
///         .header(TEST_IDENTITY_HEADER, "alice")
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRelayServer {
    addr: SocketAddr,
    config: Config,
    presence: Arc<dyn PresenceStore>,
    platform: LocalChannelProvisioner,
    health: Arc<HealthState>,
    client: reqwest::Client,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
    _pump: JoinHandle<()>,
}

impl TestRelayServer {
    /// Spawn a relay backed by a fresh in-memory presence store.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with(Arc::new(InMemoryPresenceStore::new()), test_config()).await
    }

    /// Spawn a relay over the given presence store and configuration.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server and the disconnect pump in the background
    pub async fn spawn_with(
        presence: Arc<dyn PresenceStore>,
        config: Config,
    ) -> Result<Self, anyhow::Error> {
        let (platform, notices) =
            LocalChannelProvisioner::new(config.channel_token_ttl, config.channel_buffer);
        let channels: Arc<dyn ChannelProvisioner> = Arc::new(platform.clone());
        let identities: Arc<dyn IdentityProvider> = Arc::new(TrustedHeaderIdentityProvider::new(
            config.identity_header.clone(),
            config.login_url.clone(),
        ));

        let lifecycle =
            SessionLifecycle::new(Arc::clone(&presence), Arc::clone(&channels), identities);
        let fanout = Fanout::new(Arc::clone(&presence), channels, config.send_timeout);

        let shutdown = CancellationToken::new();
        let pump = tokio::spawn(run_disconnect_pump(
            lifecycle.clone(),
            platform.clone(),
            notices,
            shutdown.child_token(),
        ));

        let health = Arc::new(HealthState::new());
        health.set_ready();

        let state = Arc::new(AppState {
            lifecycle,
            fanout,
            platform: Some(platform.clone()),
            config: config.clone(),
        });
        let app = routes::build_routes(state, Arc::clone(&health), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            addr,
            config,
            presence,
            platform,
            health,
            client,
            shutdown,
            _handle: handle,
            _pump: pump,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The presence store the server writes to.
    pub fn presence(&self) -> &Arc<dyn PresenceStore> {
        &self.presence
    }

    /// The in-process push platform behind the server.
    pub fn platform(&self) -> &LocalChannelProvisioner {
        &self.platform
    }

    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    /// HTTP client that does not follow redirects.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// `GET /` as `identity`.
    pub async fn connect(&self, identity: &str) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .get(self.url())
            .header(TEST_IDENTITY_HEADER, identity)
            .send()
            .await?)
    }

    /// `POST /chat` as `identity`.
    pub async fn post_message(
        &self,
        identity: &str,
        body: impl Into<reqwest::Body>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .post(format!("{}/chat", self.url()))
            .header(TEST_IDENTITY_HEADER, identity)
            .body(body)
            .send()
            .await?)
    }

    /// `GET /_ah/channel/connect?token=...`.
    pub async fn open_channel(&self, token: &str) -> Result<reqwest::Response, anyhow::Error> {
        Ok(self
            .client
            .get(format!("{}/_ah/channel/connect?token={token}", self.url()))
            .send()
            .await?)
    }
}

impl Drop for TestRelayServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self._handle.abort();
    }
}
