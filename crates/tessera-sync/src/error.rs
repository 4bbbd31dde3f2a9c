use tessera_types::ProjectId;
use thiserror::Error;

use crate::transport::ReplicaId;

/// Errors produced while handling replication traffic.
///
/// None of these reach the code that made the original write: the run loop
/// logs them and drops the offending message.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A change arrived for a project this replica does not hold.
    #[error("replication desync: no live project {0}")]
    ReplicationDesync(ProjectId),

    /// A peer asked for a snapshot before this replica loaded a project.
    #[error("no project loaded")]
    NotLoaded,

    #[error("peer {0} is closed")]
    PeerClosed(ReplicaId),

    #[error("unknown peer {0}")]
    UnknownPeer(ReplicaId),

    #[error("store error: {0}")]
    Store(#[from] tessera_store::StoreError),

    #[error("protocol error: {0}")]
    Protocol(#[from] tessera_protocol::ProtocolError),
}

pub type SyncResult<T> = Result<T, SyncError>;
