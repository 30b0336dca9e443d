use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::message::{ClientMessage, ServerMessage};
use super::registry::{RegistryStats, StreamRegistry};
use crate::{
    models::{ConnectionId, StreamSession, UserId},
    service::SessionService,
};

/// Relay statistics for the status endpoint
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    #[serde(flatten)]
    pub registry: RegistryStats,
    pub connections: usize,
}

/// Store writes that follow a registry mutation
///
/// Collected while the registry lock is held and awaited after it is released.
#[derive(Debug, Default)]
#[must_use]
struct Followups {
    viewer_counts: Vec<(String, usize)>,
    ended: Vec<String>,
}

/// Outbound queue of one connection and the user it authenticated as, if any
#[derive(Debug)]
struct Peer {
    tx: mpsc::Sender<ServerMessage>,
    user: Option<UserId>,
}

/// Routes signaling messages between hosts and viewers
///
/// Each registry mutation and the fanout it causes happen under one lock
/// with no await in between, so every `viewer-count` reflects the state right
/// after its triggering change. Sends never block: a peer whose queue is full
/// or closed just misses that message.
pub struct SignalingRelay {
    registry: Mutex<StreamRegistry>,
    peers: DashMap<ConnectionId, Peer>,
    sessions: Arc<SessionService>,
    outbound_buffer: usize,
}

impl std::fmt::Debug for SignalingRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalingRelay")
            .field("peers", &self.peers.len())
            .field("outbound_buffer", &self.outbound_buffer)
            .finish_non_exhaustive()
    }
}

impl SignalingRelay {
    #[must_use]
    pub fn new(sessions: Arc<SessionService>, outbound_buffer: usize) -> Self {
        Self {
            registry: Mutex::new(StreamRegistry::new()),
            peers: DashMap::new(),
            sessions,
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register an anonymous connection and hand back its outbound queue
    pub fn connect(&self, conn: ConnectionId) -> mpsc::Receiver<ServerMessage> {
        self.connect_as(conn, None)
    }

    /// Register a connection made on behalf of `user`
    ///
    /// Only an authenticated owner may host with a key minted before the
    /// last rotation; anonymous hosts must present the current key.
    pub fn connect_as(&self, conn: ConnectionId, user: Option<UserId>) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.outbound_buffer);
        debug!(connection_id = %conn, user = ?user, "Signaling connection opened");
        self.peers.insert(conn, Peer { tx, user });
        rx
    }

    #[must_use]
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            registry: self.registry.lock().stats(),
            connections: self.peers.len(),
        }
    }

    #[must_use]
    pub fn viewer_count(&self, public_id: &str) -> usize {
        self.registry.lock().viewer_count(public_id)
    }

    #[must_use]
    pub fn is_registered(&self, public_id: &str) -> bool {
        self.registry.lock().contains(public_id)
    }

    /// Parse and handle one text frame; malformed frames are logged and dropped
    pub async fn handle_text(&self, conn: &ConnectionId, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle(conn, message).await,
            Err(e) => warn!(connection_id = %conn, error = %e, "Ignoring unrecognized signaling message"),
        }
    }

    pub async fn handle(&self, conn: &ConnectionId, message: ClientMessage) {
        match message {
            ClientMessage::HostStream {
                stream_id,
                private_key,
            } => self.host_stream(conn, &stream_id, private_key.as_deref()).await,
            ClientMessage::JoinStream {
                stream_id,
                is_external_id,
            } => self.join_stream(conn, &stream_id, is_external_id).await,
            ClientMessage::StreamOffer {
                viewer_id,
                description,
                ..
            } => self.send(
                &viewer_id,
                ServerMessage::StreamOffer {
                    host_id: conn.clone(),
                    description,
                },
            ),
            ClientMessage::StreamAnswer {
                host_id,
                description,
            } => self.send(
                &host_id,
                ServerMessage::StreamAnswer {
                    viewer_id: conn.clone(),
                    description,
                },
            ),
            ClientMessage::IceCandidate {
                target_id,
                candidate,
            } => self.send(
                &target_id,
                ServerMessage::IceCandidate {
                    from: conn.clone(),
                    candidate,
                },
            ),
            ClientMessage::ChatMessage { stream_id, message } => self.chat(conn, stream_id, message),
            ClientMessage::EndStream { stream_id } => self.end_stream(conn, &stream_id).await,
            ClientMessage::LeaveStream { stream_id } => {
                let followups = {
                    let mut registry = self.registry.lock();
                    self.leave_locked(&mut registry, &stream_id, conn)
                };
                self.apply(followups).await;
            }
        }
    }

    /// Transport-level close: end every hosted stream, leave every watched one
    pub async fn disconnect(&self, conn: &ConnectionId) {
        self.peers.remove(conn);

        let followups = {
            let mut registry = self.registry.lock();
            let streams = registry.streams_for(conn);
            let mut followups = Followups::default();

            for public_id in &streams.hosting {
                info!(connection_id = %conn, stream_id = %public_id, "Host disconnected, ending stream");
                followups.merge(self.end_locked(&mut registry, public_id));
            }
            for public_id in &streams.viewing {
                followups.merge(self.leave_locked(&mut registry, public_id, conn));
            }
            followups
        };

        self.apply(followups).await;
        debug!(connection_id = %conn, "Signaling connection closed");
    }

    /// End a stream from outside the relay (HTTP end); notifies every participant
    ///
    /// The durable row must already be marked ended.
    pub fn close_stream(&self, public_id: &str) -> bool {
        let mut registry = self.registry.lock();
        let Some(entry) = registry.remove(public_id) else {
            return false;
        };
        for peer in entry.host.iter().chain(entry.viewers.iter()) {
            self.send(peer, ServerMessage::StreamEnded {});
        }
        info!(stream_id = %public_id, "Stream closed");
        true
    }

    async fn host_stream(&self, conn: &ConnectionId, public_id: &str, private_key: Option<&str>) {
        let Some(session) = self.live_session(conn, public_id).await else {
            return;
        };

        if !self.host_key_accepted(conn, &session, private_key) {
            warn!(connection_id = %conn, stream_id = %public_id, "Host presented a missing or invalid private key");
            self.send(conn, ServerMessage::error("Invalid private key"));
            return;
        }

        let mut registry = self.registry.lock();
        if registry.is_ending(public_id) {
            drop(registry);
            self.send(conn, ServerMessage::StreamNotFound { stream_id: Some(public_id.to_string()) });
            return;
        }
        let previous = registry.register_host(
            public_id,
            conn.clone(),
            &session.owner_user_id,
            &session.private_key,
        );
        if let Some(previous) = previous {
            info!(stream_id = %public_id, previous = %previous, "Host connection replaced");
            self.send(&previous, ServerMessage::error("Another connection is now hosting this stream"));
        }
        info!(connection_id = %conn, stream_id = %public_id, "Host registered");

        // A reconnecting host needs to renegotiate with viewers that stayed
        let viewers = registry.viewers(public_id);
        for viewer in &viewers {
            self.send(conn, ServerMessage::ViewerJoined { viewer_id: viewer.clone() });
        }
        self.send(conn, ServerMessage::ViewerCount { count: viewers.len() });
    }

    async fn join_stream(&self, conn: &ConnectionId, stream_id: &str, is_external_id: bool) {
        let known = !is_external_id && self.registry.lock().contains(stream_id);

        // Aliases and unregistered ids are resolved against the durable store
        let entry_seed = if known {
            None
        } else {
            let Some(session) = self.live_session(conn, stream_id).await else {
                return;
            };
            Some(session)
        };
        let public_id = entry_seed
            .as_ref()
            .map_or_else(|| stream_id.to_string(), |s| s.public_id.clone());

        let count = {
            let mut registry = self.registry.lock();
            let joined = if registry.is_ending(&public_id) {
                None
            } else {
                if let Some(session) = &entry_seed {
                    registry.open(&public_id, &session.owner_user_id, &session.private_key);
                }
                registry.add_viewer(&public_id, conn.clone())
            };
            let Some(joined) = joined else {
                // Ended between the lookup and now
                drop(registry);
                self.send(conn, ServerMessage::StreamNotFound { stream_id: Some(stream_id.to_string()) });
                return;
            };

            if !joined.inserted {
                drop(registry);
                self.send(conn, ServerMessage::ViewerCount { count: joined.count });
                return;
            }

            let count = joined.count;
            debug!(connection_id = %conn, stream_id = %public_id, count, "Viewer joined");
            if let Some(host) = registry.host_of(&public_id) {
                self.send(host, ServerMessage::ViewerJoined { viewer_id: conn.clone() });
            }
            self.broadcast(&registry.participants(&public_id), &ServerMessage::ViewerCount { count });
            count
        };

        self.sessions.record_viewer_count(&public_id, count).await;
    }

    fn chat(&self, conn: &ConnectionId, stream_id: String, message: String) {
        let registry = self.registry.lock();
        let participants = registry.participants(&stream_id);
        if !participants.contains(conn) {
            drop(registry);
            warn!(connection_id = %conn, stream_id = %stream_id, "Chat from a connection outside the stream");
            self.send(conn, ServerMessage::error("Join the stream before chatting"));
            return;
        }

        let chat = ServerMessage::ChatMessage {
            stream_id,
            sender_id: conn.clone(),
            message,
            timestamp: Utc::now(),
        };
        self.broadcast(&participants, &chat);
    }

    async fn end_stream(&self, conn: &ConnectionId, public_id: &str) {
        let followups = {
            let mut registry = self.registry.lock();
            let is_host = registry.host_of(public_id).map(|host| host == conn);
            match is_host {
                Some(true) => self.end_locked(&mut registry, public_id),
                Some(false) => {
                    drop(registry);
                    warn!(connection_id = %conn, stream_id = %public_id, "Non-host tried to end stream");
                    self.send(conn, ServerMessage::error("Only the host can end this stream"));
                    return;
                }
                None => {
                    drop(registry);
                    self.send(conn, ServerMessage::StreamNotFound { stream_id: Some(public_id.to_string()) });
                    return;
                }
            }
        };
        self.apply(followups).await;
    }

    fn end_locked(&self, registry: &mut StreamRegistry, public_id: &str) -> Followups {
        let mut followups = Followups::default();
        let Some(entry) = registry.begin_ending(public_id) else {
            return followups;
        };

        for viewer in &entry.viewers {
            self.send(viewer, ServerMessage::StreamEnded {});
        }
        info!(stream_id = %public_id, viewers = entry.viewers.len(), "Stream ended");

        followups.ended.push(public_id.to_string());
        followups.viewer_counts.push((public_id.to_string(), 0));
        followups
    }

    fn leave_locked(&self, registry: &mut StreamRegistry, public_id: &str, conn: &ConnectionId) -> Followups {
        let mut followups = Followups::default();
        let Some(count) = registry.remove_viewer(public_id, conn) else {
            return followups;
        };

        debug!(connection_id = %conn, stream_id = %public_id, count, "Viewer left");
        if let Some(host) = registry.host_of(public_id) {
            self.send(host, ServerMessage::ViewerLeft { viewer_id: conn.clone() });
        }
        self.broadcast(&registry.participants(public_id), &ServerMessage::ViewerCount { count });

        followups.viewer_counts.push((public_id.to_string(), count));
        followups
    }

    async fn apply(&self, followups: Followups) {
        for public_id in &followups.ended {
            if let Err(e) = self.sessions.end_by_public_id(public_id).await {
                warn!(stream_id = %public_id, error = %e, "Failed to persist stream end");
            }
            self.registry.lock().finish_ending(public_id);
        }
        for (public_id, count) in followups.viewer_counts {
            self.sessions.record_viewer_count(&public_id, count).await;
        }
    }

    /// Live session for `public_id`, or `stream-not-found` sent to `conn`
    async fn live_session(&self, conn: &ConnectionId, public_id: &str) -> Option<StreamSession> {
        match self.sessions.find_by_public_id(public_id).await {
            Ok(Some(session)) if session.is_live => Some(session),
            Ok(_) => {
                debug!(connection_id = %conn, stream_id = %public_id, "Stream not found");
                self.send(conn, ServerMessage::StreamNotFound { stream_id: Some(public_id.to_string()) });
                None
            }
            Err(e) => {
                warn!(connection_id = %conn, stream_id = %public_id, error = %e, "Session lookup failed");
                self.send(conn, ServerMessage::error("Stream lookup failed"));
                None
            }
        }
    }

    /// Anonymous hosts need the current key; an authenticated owner may also
    /// use an older key minted for them
    fn host_key_accepted(&self, conn: &ConnectionId, session: &StreamSession, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return false;
        };
        let user = self.peers.get(conn).and_then(|peer| peer.user.clone());
        match user {
            Some(user) => SessionService::key_matches(session, key, &user),
            None => !session.private_key.is_empty() && key == session.private_key,
        }
    }

    fn broadcast(&self, targets: &[ConnectionId], message: &ServerMessage) {
        for target in targets {
            self.send(target, message.clone());
        }
    }

    fn send(&self, target: &ConnectionId, message: ServerMessage) {
        let Some(peer) = self.peers.get(target) else {
            debug!(connection_id = %target, "Dropping message for unknown connection");
            return;
        };
        match peer.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(connection_id = %target, "Outbound queue full, dropping message");
            }
            Err(TrySendError::Closed(_)) => {
                debug!(connection_id = %target, "Outbound queue closed");
            }
        }
    }
}

impl Followups {
    fn merge(&mut self, other: Self) {
        self.viewer_counts.extend(other.viewer_counts);
        self.ended.extend(other.ended);
    }
}
