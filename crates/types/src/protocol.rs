//! The binary pub/sub wire protocol, version 0.
//!
//! Request frames sent by clients:
//!
//! ```text
//! [ version u8 (=0) | request u8 | message_id 16 B ] [ info_hash 32 B ]+
//! ```
//!
//! Response frames sent by the server open with a single kind byte:
//! ANNOUNCE = 0, SUCCESS = 1, ERROR_WITH_ID = 2, ERROR_WITHOUT_ID = 3.
//! An ANNOUNCE with an empty container body signals that the link expired
//! or was removed.

use crate::error::ErrorCode;
use crate::record::{EditorPublicKey, InfoHash};
use thiserror::Error;

/// Length of the request frame header: version, request kind, message id.
pub const FRAME_HEADER_LEN: usize = 1 + 1 + 16;
/// Length of the client-chosen request correlation id.
pub const MESSAGE_ID_LEN: usize = 16;
/// Length of one info hash in the request body.
pub const INFO_HASH_LEN: usize = 32;
/// The only protocol version this server speaks.
pub const PROTOCOL_VERSION: u8 = 0;

/// A client-chosen correlation id echoed back in acks and errors.
pub type MessageId = [u8; MESSAGE_ID_LEN];

/// The operation requested by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Stop receiving announcements for the listed info hashes.
    Unsubscribe,
    /// Start receiving announcements for the listed info hashes.
    Subscribe,
}

impl RequestKind {
    /// The wire byte for this request kind.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::Unsubscribe => 0,
            Self::Subscribe => 1,
        }
    }

    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Unsubscribe),
            1 => Some(Self::Subscribe),
            _ => None,
        }
    }
}

/// The kind byte opening every server-to-client frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseKind {
    /// A link state: `editor_public_key ‖ container_signed`.
    Announce = 0,
    /// A request ack: `message_id`.
    Success = 1,
    /// A request-scoped error: `message_id ‖ utf8 message`.
    ErrorWithId = 2,
    /// A connection-scoped error: `utf8 message`.
    ErrorWithoutId = 3,
}

/// A parsed, well-formed subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    /// Subscribe or unsubscribe.
    pub kind: RequestKind,
    /// The client's correlation id, echoed in the ack.
    pub message_id: MessageId,
    /// The info hashes the request applies to; never empty.
    pub info_hashes: Vec<InfoHash>,
}

/// Everything that can be wrong with a request frame.
///
/// Each variant corresponds to one exact wire-level error message; only
/// [`FrameError::NotEnoughData`] closes the connection after being reported.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame is shorter than the fixed header.
    #[error("not enough data")]
    NotEnoughData,
    /// The version byte is not zero.
    #[error("this is version zero")]
    WrongVersion {
        /// Correlation id to echo in the error frame.
        message_id: MessageId,
    },
    /// The frame carries no info hashes at all.
    #[error("no info hash")]
    NoInfoHash {
        /// Correlation id to echo in the error frame.
        message_id: MessageId,
    },
    /// The info-hash section is not a multiple of 32 bytes.
    #[error("info hashes must each be exactly 32 bytes")]
    UnevenInfoHashes {
        /// Correlation id to echo in the error frame.
        message_id: MessageId,
    },
    /// The request byte is neither subscribe nor unsubscribe.
    #[error("invalid request")]
    InvalidRequest {
        /// Correlation id to echo in the error frame.
        message_id: MessageId,
    },
}

impl FrameError {
    /// Whether the connection must be closed after reporting this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotEnoughData)
    }

    /// The correlation id to echo, when the header parsed far enough to
    /// recover one.
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::NotEnoughData => None,
            Self::WrongVersion { message_id }
            | Self::NoInfoHash { message_id }
            | Self::UnevenInfoHashes { message_id }
            | Self::InvalidRequest { message_id } => Some(message_id),
        }
    }

    /// The error frame reporting this condition, bit-for-bit.
    pub fn to_frame(&self) -> Vec<u8> {
        match self.message_id() {
            Some(message_id) => error_with_id_frame(message_id, &self.to_string()),
            None => error_without_id_frame(&self.to_string()),
        }
    }
}

impl ErrorCode for FrameError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotEnoughData => "FRAME_TOO_SHORT",
            Self::WrongVersion { .. } => "FRAME_WRONG_VERSION",
            Self::NoInfoHash { .. } => "FRAME_NO_INFO_HASH",
            Self::UnevenInfoHashes { .. } => "FRAME_UNEVEN_INFO_HASHES",
            Self::InvalidRequest { .. } => "FRAME_INVALID_REQUEST",
        }
    }
}

/// Parses a client request frame.
///
/// The checks run in the order the errors are reported on the wire: header
/// length, version, info-hash section presence, section alignment, and only
/// then the request byte.
pub fn parse_request(frame: &[u8]) -> Result<SubscriptionRequest, FrameError> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(FrameError::NotEnoughData);
    }

    let version = frame[0];
    let request_byte = frame[1];
    let mut message_id = [0u8; MESSAGE_ID_LEN];
    message_id.copy_from_slice(&frame[2..FRAME_HEADER_LEN]);

    if version != PROTOCOL_VERSION {
        return Err(FrameError::WrongVersion { message_id });
    }

    let body = &frame[FRAME_HEADER_LEN..];
    if body.is_empty() {
        return Err(FrameError::NoInfoHash { message_id });
    }
    if body.len() % INFO_HASH_LEN != 0 {
        return Err(FrameError::UnevenInfoHashes { message_id });
    }

    let info_hashes = body
        .chunks_exact(INFO_HASH_LEN)
        .map(|chunk| {
            let mut hash = [0u8; INFO_HASH_LEN];
            hash.copy_from_slice(chunk);
            InfoHash(hash)
        })
        .collect();

    let kind =
        RequestKind::from_byte(request_byte).ok_or(FrameError::InvalidRequest { message_id })?;

    Ok(SubscriptionRequest {
        kind,
        message_id,
        info_hashes,
    })
}

/// Builds a client request frame; the inverse of [`parse_request`].
pub fn request_frame(kind: RequestKind, message_id: &MessageId, info_hashes: &[InfoHash]) -> Vec<u8> {
    let mut out = Vec::with_capacity(FRAME_HEADER_LEN + info_hashes.len() * INFO_HASH_LEN);
    out.push(PROTOCOL_VERSION);
    out.push(kind.as_byte());
    out.extend_from_slice(message_id);
    for hash in info_hashes {
        out.extend_from_slice(&hash.0);
    }
    out
}

/// Builds an ANNOUNCE frame carrying a link state.
///
/// An empty `container_signed` announces that the link expired or was
/// removed.
pub fn announce_frame(editor_public_key: &EditorPublicKey, container_signed: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 32 + container_signed.len());
    out.push(ResponseKind::Announce as u8);
    out.extend_from_slice(&editor_public_key.0);
    out.extend_from_slice(container_signed);
    out
}

/// Builds a SUCCESS ack echoing the request's correlation id.
pub fn success_frame(message_id: &MessageId) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + MESSAGE_ID_LEN);
    out.push(ResponseKind::Success as u8);
    out.extend_from_slice(message_id);
    out
}

/// Builds an ERROR_WITH_ID frame scoped to one request.
pub fn error_with_id_frame(message_id: &MessageId, message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + MESSAGE_ID_LEN + message.len());
    out.push(ResponseKind::ErrorWithId as u8);
    out.extend_from_slice(message_id);
    out.extend_from_slice(message.as_bytes());
    out
}

/// Builds an ERROR_WITHOUT_ID frame scoped to the connection.
pub fn error_without_id_frame(message: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + message.len());
    out.push(ResponseKind::ErrorWithoutId as u8);
    out.extend_from_slice(message.as_bytes());
    out
}
