//! End-to-end signaling flows over in-process peer queues

use livecast_core::{
    bootstrap::{init_services, Services},
    models::{ConnectionId, CreateSessionRequest, MediaKind, Transport, UserId},
    signaling::{ClientMessage, ServerMessage},
    Config,
};
use tokio::sync::mpsc::Receiver;

fn services(root: &std::path::Path) -> Services {
    let mut config = Config::default();
    config.streaming.hls_root = root.to_path_buf();
    config.server.base_url = "https://live.example.com".to_string();
    init_services(None, &config)
}

async fn start_stream(services: &Services, owner: &str) -> (String, String) {
    let created = services
        .sessions
        .create_session(
            &UserId::from(owner),
            CreateSessionRequest {
                title: format!("{owner} live"),
                transport: Transport::PeerRelay,
                media_kind: MediaKind::Video,
                overlay_image: None,
            },
        )
        .await
        .unwrap();
    (created.public_id, created.private_key)
}

fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut out = Vec::new();
    while let Ok(message) = rx.try_recv() {
        out.push(message);
    }
    out
}

fn join(stream_id: &str, is_external_id: bool) -> ClientMessage {
    ClientMessage::JoinStream {
        stream_id: stream_id.to_string(),
        is_external_id,
    }
}

#[tokio::test]
async fn host_two_viewers_then_host_disconnects() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let (public_id, key) = start_stream(&services, "alice").await;

    let host = ConnectionId::from("host");
    let a = ConnectionId::from("viewer-a");
    let b = ConnectionId::from("viewer-b");
    let mut host_rx = relay.connect(host.clone());
    let mut a_rx = relay.connect(a.clone());
    let mut b_rx = relay.connect(b.clone());

    relay
        .handle(
            &host,
            ClientMessage::HostStream {
                stream_id: public_id.clone(),
                private_key: Some(key.clone()),
            },
        )
        .await;
    drain(&mut host_rx);

    relay.handle(&a, join(&public_id, false)).await;
    assert_eq!(
        drain(&mut host_rx),
        vec![
            ServerMessage::ViewerJoined { viewer_id: a.clone() },
            ServerMessage::ViewerCount { count: 1 },
        ]
    );
    assert_eq!(drain(&mut a_rx), vec![ServerMessage::ViewerCount { count: 1 }]);

    relay.handle(&b, join(&public_id, false)).await;
    assert_eq!(
        drain(&mut host_rx),
        vec![
            ServerMessage::ViewerJoined { viewer_id: b.clone() },
            ServerMessage::ViewerCount { count: 2 },
        ]
    );
    assert_eq!(drain(&mut a_rx), vec![ServerMessage::ViewerCount { count: 2 }]);
    assert_eq!(drain(&mut b_rx), vec![ServerMessage::ViewerCount { count: 2 }]);

    relay.disconnect(&host).await;
    assert_eq!(drain(&mut a_rx), vec![ServerMessage::StreamEnded {}]);
    assert_eq!(drain(&mut b_rx), vec![ServerMessage::StreamEnded {}]);
    assert!(!relay.is_registered(&public_id));

    let session = services
        .sessions
        .find_by_public_id(&public_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!session.is_live);
    assert!(session.ended_at.is_some());
    assert_eq!(session.peak_viewer_count, 2);
}

#[tokio::test]
async fn unknown_alias_yields_stream_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let _ = start_stream(&services, "alice").await;

    let viewer = ConnectionId::from("viewer");
    let mut rx = relay.connect(viewer.clone());
    let before = relay.stats().registry.live_streams;

    relay.handle(&viewer, join("no-such-alias", true)).await;
    relay.handle(&viewer, join("no-such-id", false)).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            ServerMessage::StreamNotFound { stream_id: Some("no-such-alias".to_string()) },
            ServerMessage::StreamNotFound { stream_id: Some("no-such-id".to_string()) },
        ]
    );
    assert_eq!(relay.stats().registry.live_streams, before);
}

#[tokio::test]
async fn viewer_count_tracks_joins_and_leaves() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let (public_id, key) = start_stream(&services, "alice").await;

    let host = ConnectionId::from("host");
    let mut host_rx = relay.connect(host.clone());
    relay
        .handle(
            &host,
            ClientMessage::HostStream {
                stream_id: public_id.clone(),
                private_key: Some(key.clone()),
            },
        )
        .await;

    let viewers: Vec<ConnectionId> = (0..4).map(|i| ConnectionId::from(format!("v{i}").as_str())).collect();
    let mut receivers: Vec<_> = viewers.iter().map(|v| relay.connect(v.clone())).collect();

    for viewer in &viewers {
        relay.handle(viewer, join(&public_id, true)).await;
    }
    relay
        .handle(&viewers[1], ClientMessage::LeaveStream { stream_id: public_id.clone() })
        .await;
    relay.disconnect(&viewers[2]).await;
    // Leaving twice changes nothing
    relay
        .handle(&viewers[1], ClientMessage::LeaveStream { stream_id: public_id.clone() })
        .await;

    let counts: Vec<usize> = drain(&mut host_rx)
        .into_iter()
        .filter_map(|m| match m {
            ServerMessage::ViewerCount { count } => Some(count),
            _ => None,
        })
        .collect();
    assert_eq!(counts, vec![0, 1, 2, 3, 4, 3, 2]);
    assert_eq!(relay.viewer_count(&public_id), 2);

    let last_seen = drain(&mut receivers[0]).into_iter().last();
    assert_eq!(last_seen, Some(ServerMessage::ViewerCount { count: 2 }));

    let session = services
        .sessions
        .find_by_public_id(&public_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.viewer_count, 2);
    assert_eq!(session.peak_viewer_count, 4);
}

#[tokio::test]
async fn viewer_joining_before_host_gets_announced_on_host_register() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let (public_id, key) = start_stream(&services, "alice").await;

    let viewer = ConnectionId::from("early");
    let mut viewer_rx = relay.connect(viewer.clone());
    relay.handle(&viewer, join(&public_id, false)).await;
    assert_eq!(drain(&mut viewer_rx), vec![ServerMessage::ViewerCount { count: 1 }]);

    let host = ConnectionId::from("host");
    let mut host_rx = relay.connect(host.clone());
    relay
        .handle(
            &host,
            ClientMessage::HostStream {
                stream_id: public_id.clone(),
                private_key: Some(key.clone()),
            },
        )
        .await;

    assert_eq!(
        drain(&mut host_rx),
        vec![
            ServerMessage::ViewerJoined { viewer_id: viewer },
            ServerMessage::ViewerCount { count: 1 },
        ]
    );
}

#[tokio::test]
async fn ended_session_cannot_be_joined_or_hosted() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let (public_id, key) = start_stream(&services, "alice").await;
    services.sessions.end_by_public_id(&public_id).await.unwrap();

    let conn = ConnectionId::from("late");
    let mut rx = relay.connect(conn.clone());
    relay.handle(&conn, join(&public_id, false)).await;
    relay
        .handle(
            &conn,
            ClientMessage::HostStream {
                stream_id: public_id.clone(),
                private_key: Some(key.clone()),
            },
        )
        .await;

    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 2);
    assert!(messages
        .iter()
        .all(|m| matches!(m, ServerMessage::StreamNotFound { .. })));
    assert!(!relay.is_registered(&public_id));
}

#[tokio::test]
async fn malformed_frames_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let services = services(dir.path());
    let relay = &services.relay;
    let (public_id, _) = start_stream(&services, "alice").await;

    let conn = ConnectionId::from("viewer");
    let mut rx = relay.connect(conn.clone());
    relay.handle_text(&conn, "not json").await;
    relay.handle_text(&conn, r#"{"type":"teleport","data":{}}"#).await;
    assert!(drain(&mut rx).is_empty());

    let frame = format!(r#"{{"type":"join-stream","data":{{"streamId":"{public_id}","isExternalId":false}}}}"#);
    relay.handle_text(&conn, &frame).await;
    assert_eq!(drain(&mut rx), vec![ServerMessage::ViewerCount { count: 1 }]);
}
