//! Replica-to-replica synchronization for Tessera.
//!
//! Each [`Replica`] holds one live project and exchanges
//! [`ReplicaMessage`](tessera_protocol::ReplicaMessage)s with its peers over
//! fire-and-forget [`PeerTransport`]s. A new replica announces `ready`, is
//! answered with a full snapshot, and from then on every locally originated
//! change is forwarded. Changes applied on behalf of a peer are flagged
//! external and never forwarded again, which is what keeps two or more
//! replicas from relaying the same change forever.
//!
//! Writes are applied in arrival order with no merge step: when two
//! replicas write the same path concurrently, the last one applied wins and
//! replicas may diverge.

pub mod config;
pub mod error;
pub mod replica;
pub mod transport;

pub use config::ReplicaConfig;
pub use error::{SyncError, SyncResult};
pub use replica::{Inbox, Replica};
pub use transport::{ChannelTransport, Envelope, PeerTransport, ReplicaId};
