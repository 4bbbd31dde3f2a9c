//! Foundation types for Tessera.
//!
//! This crate provides the addressing, temporal, and identifier types shared
//! by every other Tessera crate.
//!
//! # Key Types
//!
//! - [`Path`]: Non-empty sequence of [`PathKey`]s addressing a tree location
//! - [`Timestamp`]: Millisecond wall-clock stamp carried by transactions
//! - [`ProjectId`]: UUID v7 document identifier
//! - [`KeyGenerator`]: Unique, roughly time-ordered key service

pub mod error;
pub mod identity;
pub mod key;
pub mod path;
pub mod temporal;

pub use error::TypeError;
pub use identity::ProjectId;
pub use key::{decode_key, key_timestamp_ms, KeyGenerator, KEY_ALPHABET, KEY_LEN};
pub use path::{Path, PathKey};
pub use temporal::Timestamp;
