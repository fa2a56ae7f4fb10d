#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Link Server Types
//!
//! This crate is the foundational library for the link server, containing
//! the container byte layout, the pub/sub wire protocol, the persisted
//! link record, and the shared error types.
//!
//! ## Architectural Role
//!
//! As the base crate, `link-types` has minimal dependencies and is itself a
//! dependency for every other crate in the workspace. It is the single
//! source of truth for byte offsets: both codecs here are pure functions
//! with no I/O, so the admission engine, the storage layer and the pub/sub
//! handler all agree on the same framing.

/// The container byte layout and its pack/unpack codec.
pub mod container;
/// A unified set of error types shared across the workspace.
pub mod error;
/// The binary pub/sub wire protocol: request parsing and response framing.
pub mod protocol;
/// The persisted link record keyed by editor public key.
pub mod record;

pub use container::{Container, ContainerError, ContainerMeta};
pub use error::ErrorCode;
pub use record::{EditorPublicKey, InfoHash, LinkRecord};
