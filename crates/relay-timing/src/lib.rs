//! Small timing primitives used by the event loop and idle manager.
//!
//! This crate intentionally wraps `std::time` rather than a custom clock:
//! the relay has no need for cross-socket timestamp comparison, so the
//! heavier hardware-counter machinery used elsewhere is not warranted here.

mod repeater;

pub use repeater::Repeater;

pub use std::time::{Duration, Instant};
