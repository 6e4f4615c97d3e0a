//! Non-blocking TCP connection primitives: framing, back-pressured sends,
//! and socket setup. The event loop, connection registry, and scene model
//! live one layer up in `relay-core`; this crate only knows about one
//! socket at a time.

mod connection;
mod counters;
mod error;

pub use connection::{set_socket_buf_size, Connection, ReadOutcome, SendOutcome};
pub use counters::RollingCounters;
pub use error::NetError;
