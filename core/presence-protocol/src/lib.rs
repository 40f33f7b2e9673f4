//! Wire protocol for the local rich presence IPC channel.
//!
//! Shared by the transport layer and its tests so that framing, payload shape
//! and response classification live in one place. Nothing here performs I/O.
//!
//! Every message is an 8-byte header (little-endian `u32` opcode followed by a
//! little-endian `u32` body length) and a UTF-8 JSON body of exactly that many
//! bytes.

mod activity;
mod escape;
mod frame;
mod messages;
mod response;

pub use activity::{BoundedText, Presence, MAX_TEXT_CHARS};
pub use escape::escape_json_string;
pub use frame::{Frame, FrameHeader, Opcode, HEADER_LEN};
pub use messages::{
    build_clear_activity, build_handshake, build_set_activity, generate_nonce, HANDSHAKE_VERSION,
    SET_ACTIVITY,
};
pub use response::{classify_response, ResponseKind, UNRECOGNIZED_RESPONSE};

/// Largest JSON body accepted in either direction.
pub const MAX_MESSAGE_SIZE: usize = 16384;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("message body of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("unknown opcode {0}")]
    UnknownOpcode(u32),

    #[error("failed to serialize message body: {0}")]
    Serialize(#[from] serde_json::Error),
}
