//! Session lifecycle against a fake peer on a Unix socket.

#![cfg(unix)]

mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use presence_client::{
    ConnectionOptions, ReconnectConfig, RpcClient, RpcError, SessionEvent, SessionState,
};
use presence_protocol::Activity;
use serde_json::json;

use support::{FakePeer, assert_no_event, details, next_event};

fn fast_reconnect(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        enabled: true,
        max_attempts,
        delay: Duration::from_millis(100),
        connect_timeout: Duration::from_secs(2),
    }
}

#[tokio::test]
async fn connect_sends_handshake_and_fires_ready_once() {
    let peer = FakePeer::bind();
    let client = RpcClient::new(peer.options("app-1"));
    let mut events = client.take_events().unwrap();

    client.connect().await.unwrap();
    assert_eq!(client.state(), SessionState::Ready);
    let _conn = peer.accept_handshake("app-1").await;

    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    // A second connect while ready is ignored.
    client.connect().await.unwrap();
    assert_no_event(&mut events, Duration::from_millis(200)).await;
}

#[tokio::test]
async fn first_activity_is_sent_and_peer_ack_is_surfaced() {
    let peer = FakePeer::bind();
    let client = RpcClient::new(peer.options("app"));
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let mut conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    client.set_activity(Activity::with_details("A")).await.unwrap();
    let frame = conn.recv().await;
    assert_eq!(frame.opcode, 1);
    assert_eq!(frame.payload["cmd"], "SET_ACTIVITY");
    assert_eq!(frame.payload["args"]["pid"], std::process::id());
    assert_eq!(details(&frame), Some("A"));
    let nonce = frame.payload["nonce"].as_str().unwrap().to_string();
    assert!(!nonce.is_empty());

    conn.send(
        1,
        &json!({"cmd": "SET_ACTIVITY", "data": {"details": "A"}, "evt": null, "nonce": nonce}),
    )
    .await;
    match next_event(&mut events).await {
        SessionEvent::ActivityUpdate(payload) => assert_eq!(payload["nonce"], nonce),
        other => panic!("expected activity update, got {other:?}"),
    }
}

#[tokio::test]
async fn raw_observers_see_every_frame_in_order() {
    let peer = FakePeer::bind();
    let client = RpcClient::new(peer.options("app"));
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        client.on_raw_event(move |opcode, payload| {
            seen.lock().unwrap().push((opcode, payload["seq"].as_i64()));
        });
    }
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let mut conn = peer.accept_handshake("app").await;

    conn.send(1, &json!({"evt": "READY", "seq": 1})).await;
    conn.send(3, &json!({"seq": 2})).await;
    conn.send(1, &json!({"cmd": "SET_ACTIVITY", "seq": 3})).await;

    // The ping is answered with a pong echoing its payload.
    let pong = conn.recv().await;
    assert_eq!(pong.opcode, 4);
    assert_eq!(pong.payload["seq"], 2);

    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));
    assert!(matches!(next_event(&mut events).await, SessionEvent::ActivityUpdate(_)));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, Some(1)), (3, Some(2)), (1, Some(3))]
    );
}

#[tokio::test]
async fn malformed_frame_is_reported_and_connection_survives() {
    let peer = FakePeer::bind();
    let client = RpcClient::new(peer.options("app"));
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let mut conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    let mut bad = Vec::new();
    bad.extend_from_slice(&1i32.to_le_bytes());
    bad.extend_from_slice(&5i32.to_le_bytes());
    bad.extend_from_slice(b"{oops");
    conn.send_raw(&bad).await;
    conn.send(1, &json!({"cmd": "SET_ACTIVITY"})).await;

    match next_event(&mut events).await {
        SessionEvent::Error(e) => assert!(matches!(*e, RpcError::Protocol(_))),
        other => panic!("expected protocol error, got {other:?}"),
    }
    assert!(matches!(next_event(&mut events).await, SessionEvent::ActivityUpdate(_)));
    assert_eq!(client.state(), SessionState::Ready);
}

#[tokio::test]
async fn disconnect_closes_transport_without_reconnecting() {
    let peer = FakePeer::bind();
    let client = RpcClient::with_reconnect(peer.options("app"), fast_reconnect(3));
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let mut conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    client.disconnect().await;
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));
    assert!(conn.recv_within(Duration::from_secs(2)).await.is_none());

    assert_no_event(&mut events, Duration::from_millis(400)).await;
    assert_eq!(client.state(), SessionState::Disconnected);
    assert!(matches!(
        client.set_activity(Activity::with_details("late")).await,
        Err(RpcError::NotConnected)
    ));
}

#[tokio::test]
async fn peer_hangup_triggers_reconnect() {
    let peer = FakePeer::bind();
    let client = RpcClient::with_reconnect(peer.options("app"), fast_reconnect(3));
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    drop(conn);

    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));
    match next_event(&mut events).await {
        SessionEvent::Reconnecting { attempt, delay } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(100));
        }
        other => panic!("expected reconnecting, got {other:?}"),
    }
    let _conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));
    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(client.session().reconnect_attempts(), 0);
}

#[tokio::test]
async fn reconnect_budget_is_bounded_and_terminal_error_fires_once() {
    let peer = FakePeer::bind();
    let options = peer.options("app");
    let client = RpcClient::with_reconnect(options, fast_reconnect(2));
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    // The peer goes away entirely: socket file and all.
    drop(conn);
    drop(peer);

    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));
    for expected in 1..=2 {
        match next_event(&mut events).await {
            SessionEvent::Reconnecting { attempt, .. } => assert_eq!(attempt, expected),
            other => panic!("expected reconnecting, got {other:?}"),
        }
        match next_event(&mut events).await {
            SessionEvent::Error(e) => assert!(e.is_connection_error(), "got {e}"),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
    match next_event(&mut events).await {
        SessionEvent::Error(e) => {
            assert!(matches!(*e, RpcError::ExhaustedRetries { attempts: 2 }));
            assert!(e.is_terminal());
        }
        other => panic!("expected terminal error, got {other:?}"),
    }

    assert_no_event(&mut events, Duration::from_millis(500)).await;
    assert_eq!(client.state(), SessionState::Failed);
    assert_eq!(client.session().reconnect_attempts(), 2);
}

#[tokio::test]
async fn failed_initial_connect_retries_in_background() {
    let peer = FakePeer::bind();
    let options = peer.options("app");
    drop(peer);

    let client = RpcClient::with_reconnect(options, fast_reconnect(1));
    let mut events = client.take_events().unwrap();

    let err = client.connect().await.unwrap_err();
    assert!(err.is_connection_error());

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Error(_)));
    match next_event(&mut events).await {
        SessionEvent::Error(e) => assert!(e.is_terminal()),
        other => panic!("expected terminal error, got {other:?}"),
    }
    assert_eq!(client.state(), SessionState::Failed);
}

#[tokio::test]
async fn manual_connect_after_failure_starts_over() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("discord-ipc-0");
    let client = RpcClient::with_reconnect(
        ConnectionOptions::new("app").with_endpoint(path.to_string_lossy()),
        fast_reconnect(0),
    );
    assert!(client.connect().await.is_err());
    assert_eq!(client.state(), SessionState::Failed);

    let peer = FakePeer::bind_at(path);
    client.connect().await.unwrap();
    let _conn = peer.accept_handshake("app").await;
    assert_eq!(client.state(), SessionState::Ready);
    assert_eq!(client.session().reconnect_attempts(), 0);
}

#[tokio::test]
async fn disconnect_cancels_pending_reconnect() {
    let peer = FakePeer::bind();
    let mut config = fast_reconnect(5);
    config.delay = Duration::from_millis(300);
    let client = RpcClient::with_reconnect(peer.options("app"), config);
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let conn = peer.accept_handshake("app").await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));

    drop(conn);
    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));

    client.disconnect().await;
    assert!(matches!(next_event(&mut events).await, SessionEvent::Disconnected));
    assert_no_event(&mut events, Duration::from_millis(600)).await;
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn disconnected_is_delivered_to_a_lagging_consumer() {
    let peer = FakePeer::bind();
    let client = RpcClient::with_reconnect(
        peer.options("app"),
        ReconnectConfig {
            enabled: false,
            ..fast_reconnect(0)
        },
    );
    let mut events = client.take_events().unwrap();
    client.connect().await.unwrap();
    let mut conn = peer.accept_handshake("app").await;

    // More acks than the event channel holds, none of them read yet.
    for seq in 0..80 {
        conn.send(1, &json!({"cmd": "SET_ACTIVITY", "seq": seq})).await;
    }
    drop(conn);

    let mut state = client.subscribe_state();
    tokio::time::timeout(
        support::WAIT,
        state.wait_for(|s| *s == SessionState::Disconnected),
    )
    .await
    .expect("session should notice the hangup")
    .unwrap();

    assert!(matches!(next_event(&mut events).await, SessionEvent::Ready));
    let mut updates = 0;
    loop {
        match next_event(&mut events).await {
            SessionEvent::ActivityUpdate(_) => updates += 1,
            SessionEvent::Disconnected => break,
            other => panic!("expected update or disconnect, got {other:?}"),
        }
    }
    assert!(updates > 0);
    assert_no_event(&mut events, Duration::from_millis(300)).await;
}
