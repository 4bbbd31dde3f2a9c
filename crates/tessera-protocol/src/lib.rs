//! Replication wire protocol for Tessera.
//!
//! Defines the messages replicas exchange during the `ready` / `loadProject`
//! handshake and steady-state forwarding, and the framing used when those
//! messages cross a byte-oriented channel.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::ReplicaCodec;
pub use error::{ProtocolError, ProtocolResult};
pub use message::{PanelDescriptor, ReplicaMessage, MAX_MESSAGE_SIZE};
