//! Pure packet codec for the net-distribution wire protocol.
//!
//! This crate touches no sockets: it turns raw bytes into [`Frame`]s and
//! back. The actual non-blocking I/O loop lives in `relay-net`, which feeds
//! bytes read from a socket into a [`FrameAssembler`] and calls
//! [`encode_frame`] to build outgoing packets.

mod args;
mod error;
mod frame;
mod header;

pub use args::split_args;
pub use error::WireError;
pub use frame::{encode_frame, Frame, FrameAssembler};
pub use header::{Header, HEADER_SIZE, PROTOCOL_NUMBER, REQUEST_CODE};
