use dashmap::DashMap;
use parley_models::message::ServerMessage;
use std::sync::Arc;
use tokio::sync::mpsc;

/// One viewer's outbound lane within a stream group.
#[derive(Clone)]
struct Member {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
struct StreamGroup {
    title: String,
    members: DashMap<String, Member>,
}

/// Stream groups for observer fan-out: relayed video frames and WebRTC
/// signalling go to every other member of the same stream, or to one
/// targeted peer.
#[derive(Clone, Default)]
pub struct StreamHub {
    groups: Arc<DashMap<String, Arc<StreamGroup>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &self,
        stream_id: impl Into<String>,
        title: impl Into<String>,
        peer_id: impl Into<String>,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) {
        let group = Arc::new(StreamGroup {
            title: title.into(),
            members: DashMap::new(),
        });
        group.members.insert(peer_id.into(), Member { tx });
        self.groups.insert(stream_id.into(), group);
    }

    /// Join an existing stream; returns its title, or `None` when the
    /// stream does not exist.
    pub fn join(
        &self,
        stream_id: &str,
        peer_id: impl Into<String>,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Option<String> {
        let group = self.groups.get(stream_id)?;
        group.members.insert(peer_id.into(), Member { tx });
        Some(group.title.clone())
    }

    /// Remove a member; the group is dropped with its last member.
    pub fn leave(&self, stream_id: &str, peer_id: &str) {
        let emptied = if let Some(group) = self.groups.get(stream_id) {
            group.members.remove(peer_id);
            group.members.is_empty()
        } else {
            false
        };
        if emptied {
            self.groups.remove(stream_id);
        }
    }

    /// Fan a message out to every member except the sender.
    pub fn broadcast_except(&self, stream_id: &str, exclude_peer: &str, message: &ServerMessage) {
        let Some(group) = self.groups.get(stream_id) else {
            return;
        };
        for entry in group.members.iter() {
            if entry.key() != exclude_peer {
                let _ = entry.value().tx.send(message.clone());
            }
        }
    }

    /// Deliver a message to one targeted peer. Returns false when the peer
    /// is not a member.
    pub fn send_to_peer(&self, stream_id: &str, peer_id: &str, message: ServerMessage) -> bool {
        let Some(group) = self.groups.get(stream_id) else {
            return false;
        };
        let result = match group.members.get(peer_id) {
            Some(member) => member.tx.send(message).is_ok(),
            None => false,
        };
        result
    }
}
