use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use tessera_protocol::{ProtocolResult, ReplicaCodec, ReplicaMessage};

use crate::error::{SyncError, SyncResult};

/// Identity of one replica within a replication tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Last 8 hex digits, enough to tell replicas apart in logs.
    pub fn short_id(&self) -> String {
        let s = self.0.simple().to_string();
        s[s.len() - 8..].to_string()
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({})", self.short_id())
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_id())
    }
}

/// One framed message in flight, tagged with the replica that sent it.
///
/// The frame is kept encoded so hubs relay exactly the bytes they received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub from: ReplicaId,
    pub frame: Vec<u8>,
}

impl Envelope {
    /// Encode `message` into a frame sent by `from`.
    pub fn seal(from: ReplicaId, message: &ReplicaMessage) -> ProtocolResult<Self> {
        Ok(Self {
            from,
            frame: ReplicaCodec::encode(message)?,
        })
    }

    /// Decode the carried message.
    pub fn open(&self) -> ProtocolResult<ReplicaMessage> {
        ReplicaCodec::decode(&self.frame).map(|(message, _)| message)
    }

    /// The same frame, re-addressed as sent by `from`.
    pub fn relayed_by(&self, from: ReplicaId) -> Self {
        Self {
            from,
            frame: self.frame.clone(),
        }
    }
}

/// Fire-and-forget delivery to one peer replica.
///
/// `post` never waits for the peer; a failure only means the peer is gone.
pub trait PeerTransport: Send + Sync {
    /// Identity of the replica on the other end.
    fn peer_id(&self) -> ReplicaId;

    fn post(&self, envelope: Envelope) -> SyncResult<()>;
}

/// In-process transport over an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    peer: ReplicaId,
    sender: UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new(peer: ReplicaId, sender: UnboundedSender<Envelope>) -> Self {
        Self { peer, sender }
    }
}

impl PeerTransport for ChannelTransport {
    fn peer_id(&self) -> ReplicaId {
        self.peer
    }

    fn post(&self, envelope: Envelope) -> SyncResult<()> {
        self.sender
            .send(envelope)
            .map_err(|_| SyncError::PeerClosed(self.peer))
    }
}
