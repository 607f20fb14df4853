//! Transport-level tests: handshake, framing and heartbeat over a real socket.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use room_protocol::ServerEvent;
use room_service::transport::TransportSettings;
use room_test_utils::{TestRoomServer, WsTestClient};
use std::time::Duration;

#[tokio::test]
async fn test_connected_is_first_frame() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn().await?;
    let mut raw = WsTestClient::connect_raw(&server.url()).await?;

    let ServerEvent::Connected { id } = raw.next_event().await? else {
        anyhow::bail!("expected connected");
    };

    let other = WsTestClient::connect(&server.url()).await?;
    assert_ne!(Some(id), other.id());
    Ok(())
}

#[tokio::test]
async fn test_undecodable_frames_are_ignored() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn().await?;
    let mut client = WsTestClient::connect(&server.url()).await?;

    client.send_text("not json").await?;
    client.send_text(r#"{"event":"no-such-event"}"#).await?;
    client
        .send_text(r#"{"event":"join-room","data":{"roomId":"R1"}}"#)
        .await?;
    client.expect_silence(Duration::from_millis(200)).await?;

    // The connection is still usable.
    client
        .send_text(r#"{"event":"join-room","data":{"roomId":"R1","username":"alice"}}"#)
        .await?;
    client.expect_join_success().await?;
    Ok(())
}

#[tokio::test]
async fn test_blank_join_rejected() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn().await?;
    let mut client = WsTestClient::connect(&server.url()).await?;

    client.join("R1", "   ", None).await?;
    assert!(matches!(client.next_event().await?, ServerEvent::JoinError(_)));
    Ok(())
}

#[tokio::test]
async fn test_connection_count_tracks_sockets() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn().await?;
    let client = WsTestClient::connect(&server.url()).await?;
    assert_eq!(server.metrics().connection_count(), 1);

    client.close().await?;
    for _ in 0..50 {
        if server.metrics().connection_count() == 0 {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    anyhow::bail!("connection never released")
}

#[tokio::test]
async fn test_silent_client_times_out() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn_with(TransportSettings {
        heartbeat_interval: Duration::from_millis(100),
        max_missed_heartbeats: 2,
        ..TestRoomServer::default_settings()
    })
    .await?;
    let mut alice = WsTestClient::connect(&server.url()).await?;
    alice.join("R1", "alice", None).await?;
    alice.expect_join_success().await?;

    let mut bob = WsTestClient::connect(&server.url()).await?;
    bob.join("R1", "bob", None).await?;
    bob.expect_join_success().await?;
    let bob_id = bob.connection_id();

    // Bob stops reading, so pings go unanswered. Alice keeps reading,
    // which answers hers, and sees Bob leave.
    let event = alice
        .wait_for(|e| matches!(e, ServerEvent::UserLeft { id, .. } if *id == bob_id))
        .await?;
    assert!(matches!(event, ServerEvent::UserLeft { .. }));

    bob.expect_closed(Duration::from_secs(2)).await?;
    Ok(())
}

#[tokio::test]
async fn test_server_shutdown_closes_sockets() -> Result<(), anyhow::Error> {
    let server = TestRoomServer::spawn().await?;
    let mut client = WsTestClient::connect(&server.url()).await?;

    server.close_connections();
    client.expect_closed(Duration::from_secs(2)).await?;
    Ok(())
}
