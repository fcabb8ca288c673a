//! Session lifecycle integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::http::HeaderMap;
use chat_relay::channel::{ChannelProvisioner, DisconnectNotice, LocalChannelProvisioner};
use chat_relay::errors::RelayError;
use chat_relay::identity::IdentityProvider;
use chat_relay::lifecycle::{drain_local_sessions, run_disconnect_pump, SessionLifecycle};
use chat_relay::presence::{InMemoryPresenceStore, PresenceStore};
use relay_test_utils::{
    MockChannelProvisioner, MockPresenceStore, StaticIdentityProvider, TEST_LOGIN_URL,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

fn lifecycle(
    presence: &Arc<MockPresenceStore>,
    channels: &Arc<MockChannelProvisioner>,
) -> SessionLifecycle {
    SessionLifecycle::new(
        Arc::clone(presence) as Arc<dyn PresenceStore>,
        Arc::clone(channels) as Arc<dyn ChannelProvisioner>,
        Arc::new(StaticIdentityProvider::signed_in("u1")),
    )
}

#[tokio::test]
async fn test_connect_provisions_and_registers() -> Result<(), anyhow::Error> {
    let presence = Arc::new(MockPresenceStore::new());
    let channels = Arc::new(MockChannelProvisioner::accepting());

    let connection = lifecycle(&presence, &channels).connect("u1").await?;

    assert_eq!(connection.identity, "u1");
    assert_eq!(
        channels.provisioned(),
        vec![("u1".to_string(), connection.token.clone())]
    );
    assert_eq!(presence.snapshot().await?, vec!["u1".to_string()]);
    assert!(channels.revoked().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_register_failure_fails_connect_and_revokes_token() -> Result<(), anyhow::Error> {
    let presence = Arc::new(MockPresenceStore::new().failing_register());
    let channels = Arc::new(MockChannelProvisioner::accepting());

    let result = lifecycle(&presence, &channels).connect("u3").await;

    assert!(matches!(result, Err(RelayError::Storage(_))));
    assert_eq!(channels.provision_calls(), 1);

    presence.set_fail_register(false);
    assert!(!presence.snapshot().await?.contains(&"u3".to_string()));

    let issued: Vec<_> = channels.provisioned().into_iter().map(|(_, t)| t).collect();
    assert_eq!(channels.revoked(), issued);
    Ok(())
}

#[tokio::test]
async fn test_provision_failure_skips_registration() {
    let presence = Arc::new(MockPresenceStore::new());
    let channels = Arc::new(MockChannelProvisioner::failing_provision());

    let result = lifecycle(&presence, &channels).connect("u1").await;

    assert!(matches!(result, Err(RelayError::Provision(_))));
    assert_eq!(presence.register_calls(), 0);
    assert!(presence.identities().is_empty());
}

#[tokio::test]
async fn test_reconnect_issues_new_token_single_record() -> Result<(), anyhow::Error> {
    let presence = Arc::new(MockPresenceStore::new());
    let channels = Arc::new(MockChannelProvisioner::accepting());
    let lifecycle = lifecycle(&presence, &channels);

    let first = lifecycle.connect("u1").await?;
    lifecycle.disconnect("u1").await?;
    let second = lifecycle.connect("u1").await?;

    assert_ne!(first.token, second.token);
    assert_eq!(presence.identities(), vec!["u1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_after_removal_is_noop() -> Result<(), anyhow::Error> {
    let presence = Arc::new(MockPresenceStore::with_sessions(&["u1", "u2"]));
    let channels = Arc::new(MockChannelProvisioner::accepting());
    let lifecycle = lifecycle(&presence, &channels);

    lifecycle.disconnect("u1").await?;
    lifecycle.disconnect("u1").await?;

    assert_eq!(presence.identities(), vec!["u2".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_empty_identity_touches_nothing() -> Result<(), anyhow::Error> {
    let presence = Arc::new(MockPresenceStore::with_sessions(&["u1"]));
    let channels = Arc::new(MockChannelProvisioner::accepting());

    lifecycle(&presence, &channels).disconnect("").await?;

    assert_eq!(presence.deregister_calls(), 0);
    assert_eq!(presence.identities(), vec!["u1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_storage_failure_is_reported() {
    let presence = Arc::new(MockPresenceStore::with_sessions(&["u1"]).failing_deregister());
    let channels = Arc::new(MockChannelProvisioner::accepting());

    let result = lifecycle(&presence, &channels).disconnect("u1").await;

    assert!(matches!(result, Err(RelayError::Storage(_))));
    assert_eq!(presence.deregister_calls(), 1);
    assert!(presence.contains("u1"));
}

#[test]
fn test_identify_anonymous_requires_login() {
    let lifecycle = SessionLifecycle::new(
        Arc::new(MockPresenceStore::new()),
        Arc::new(MockChannelProvisioner::accepting()),
        Arc::new(StaticIdentityProvider::anonymous()),
    );

    let result = lifecycle.identify(&HeaderMap::new());

    assert!(matches!(
        result,
        Err(RelayError::AuthRequired { login_url }) if login_url == TEST_LOGIN_URL
    ));
}

#[test]
fn test_identify_signed_in() {
    let identities: Arc<dyn IdentityProvider> = Arc::new(StaticIdentityProvider::signed_in("u7"));
    let lifecycle = SessionLifecycle::new(
        Arc::new(MockPresenceStore::new()),
        Arc::new(MockChannelProvisioner::accepting()),
        identities,
    );

    assert_eq!(lifecycle.identify(&HeaderMap::new()).ok(), Some("u7".to_string()));
}

/// Wait until `identity` leaves the registry, or give up after ~2s.
async fn wait_until_absent(presence: &InMemoryPresenceStore, identity: &str) -> bool {
    for _ in 0..100 {
        match presence.snapshot().await {
            Ok(snapshot) if !snapshot.iter().any(|id| id == identity) => return true,
            _ => tokio::time::sleep(Duration::from_millis(20)).await,
        }
    }
    false
}

#[tokio::test]
async fn test_dropped_channel_deregisters_through_pump() -> Result<(), anyhow::Error> {
    let presence = InMemoryPresenceStore::new();
    let (platform, notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let lifecycle = SessionLifecycle::new(
        Arc::new(presence.clone()),
        Arc::new(platform.clone()),
        Arc::new(StaticIdentityProvider::signed_in("u1")),
    );

    let cancel = CancellationToken::new();
    let pump = tokio::spawn(run_disconnect_pump(
        lifecycle.clone(),
        platform.clone(),
        notices,
        cancel.child_token(),
    ));

    let connection = lifecycle.connect("u1").await?;
    let stream = platform.open(connection.token.as_str())?;
    assert_eq!(presence.snapshot().await?, vec!["u1".to_string()]);

    drop(stream);

    assert!(wait_until_absent(&presence, "u1").await);

    cancel.cancel();
    pump.await?;
    Ok(())
}

#[tokio::test]
async fn test_superseded_channel_drop_keeps_reconnected_session() -> Result<(), anyhow::Error> {
    let presence = InMemoryPresenceStore::new();
    let (platform, notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let lifecycle = SessionLifecycle::new(
        Arc::new(presence.clone()),
        Arc::new(platform.clone()),
        Arc::new(StaticIdentityProvider::signed_in("u1")),
    );

    let cancel = CancellationToken::new();
    let pump = tokio::spawn(run_disconnect_pump(
        lifecycle.clone(),
        platform.clone(),
        notices,
        cancel.child_token(),
    ));

    let first = lifecycle.connect("u1").await?;
    let old_stream = platform.open(first.token.as_str())?;

    let second = lifecycle.connect("u1").await?;
    let _new_stream = platform.open(second.token.as_str())?;

    drop(old_stream);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(presence.snapshot().await?, vec!["u1".to_string()]);
    assert!(platform.is_open("u1"));

    cancel.cancel();
    pump.await?;
    Ok(())
}

fn local_lifecycle(
    presence: Arc<dyn PresenceStore>,
    platform: &LocalChannelProvisioner,
) -> SessionLifecycle {
    SessionLifecycle::new(
        presence,
        Arc::new(platform.clone()),
        Arc::new(StaticIdentityProvider::signed_in("u1")),
    )
}

#[tokio::test]
async fn test_stale_notice_after_reconnect_keeps_session() -> Result<(), anyhow::Error> {
    let presence = InMemoryPresenceStore::new();
    let (platform, notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let lifecycle = local_lifecycle(Arc::new(presence.clone()), &platform);

    // Page reload: the old stream closes and the client reconnects before
    // the pump gets to the queued notice.
    let first = lifecycle.connect("u1").await?;
    drop(platform.open(first.token.as_str())?);
    let second = lifecycle.connect("u1").await?;
    let _stream = platform.open(second.token.as_str())?;

    let cancel = CancellationToken::new();
    let pump = tokio::spawn(run_disconnect_pump(
        lifecycle.clone(),
        platform.clone(),
        notices,
        cancel.child_token(),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(platform.is_open("u1"));
    assert_eq!(presence.snapshot().await?, vec!["u1".to_string()]);

    cancel.cancel();
    pump.await?;
    Ok(())
}

/// Presence store that lets a reconnect land in the middle of a deregister.
struct ReconnectDuringDeregister {
    inner: InMemoryPresenceStore,
    platform: LocalChannelProvisioner,
}

#[async_trait::async_trait]
impl PresenceStore for ReconnectDuringDeregister {
    async fn register(&self, identity: &str) -> Result<(), RelayError> {
        self.inner.register(identity).await
    }

    async fn deregister(&self, identity: &str) -> Result<(), RelayError> {
        self.platform.provision(identity).await?;
        self.inner.register(identity).await?;
        self.inner.deregister(identity).await
    }

    async fn snapshot(&self) -> Result<Vec<String>, RelayError> {
        self.inner.snapshot().await
    }
}

#[tokio::test]
async fn test_reconnect_during_deregister_restores_presence() -> Result<(), anyhow::Error> {
    let memory = InMemoryPresenceStore::new();
    let (platform, mut notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let presence = Arc::new(ReconnectDuringDeregister {
        inner: memory.clone(),
        platform: platform.clone(),
    });
    let lifecycle = local_lifecycle(presence, &platform);

    let connection = lifecycle.connect("u1").await?;
    drop(platform.open(connection.token.as_str())?);
    let notice: DisconnectNotice = notices.recv().await.expect("notice");

    lifecycle.channel_closed(&platform, &notice).await;

    assert!(platform.is_superseded("u1", &notice.token));
    assert_eq!(memory.snapshot().await?, vec!["u1".to_string()]);
    Ok(())
}

#[tokio::test]
async fn test_current_notice_deregisters() -> Result<(), anyhow::Error> {
    let presence = InMemoryPresenceStore::new();
    let (platform, mut notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let lifecycle = local_lifecycle(Arc::new(presence.clone()), &platform);

    let connection = lifecycle.connect("u1").await?;
    drop(platform.open(connection.token.as_str())?);
    let notice = notices.recv().await.expect("notice");

    lifecycle.channel_closed(&platform, &notice).await;

    assert!(presence.snapshot().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_drain_local_sessions_empties_registry() -> Result<(), anyhow::Error> {
    let presence = InMemoryPresenceStore::new();
    let (platform, mut notices) = LocalChannelProvisioner::new(Duration::from_secs(60), 8);
    let lifecycle = local_lifecycle(Arc::new(presence.clone()), &platform);

    let alice = lifecycle.connect("alice").await?;
    let bob = lifecycle.connect("bob").await?;
    let mut alice_stream = platform.open(alice.token.as_str())?;
    let mut bob_stream = platform.open(bob.token.as_str())?;
    assert_eq!(presence.snapshot().await?.len(), 2);

    let drained = drain_local_sessions(&platform, &lifecycle).await;

    assert_eq!(drained, 2);
    assert!(presence.snapshot().await?.is_empty());
    assert_eq!(platform.slot_count(), 0);
    assert!(alice_stream.next().await.is_none());
    assert!(bob_stream.next().await.is_none());

    drop(alice_stream);
    drop(bob_stream);
    assert!(notices.try_recv().is_err());
    Ok(())
}
