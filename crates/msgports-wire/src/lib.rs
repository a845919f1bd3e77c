//! Length-prefixed wire frames for resolved port messages.
//!
//! Every message is framed with:
//! - A 2-byte magic number ("MP") for stream synchronization
//! - A 1-byte format version and 1 reserved byte
//! - A 4-byte little-endian payload length
//!
//! The payload is the JSON form of a [`ResolvedMessage`](msgports_sender::ResolvedMessage).

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_message, encode_message, WireConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, WIRE_VERSION,
};
pub use error::{Result, WireError};
pub use reader::WireReader;
pub use writer::WireWriter;
