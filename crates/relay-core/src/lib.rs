//! The relay's domain model and event loop: connections bound to scenes,
//! request handlers, the idle manager, and the `mio`-driven dispatcher that
//! ties them together.

mod error;
mod handlers;
mod idle;
mod record;
mod registry;
mod scene;
mod server;

pub use error::{ConnState, CoreError};
pub use idle::IDLE_TIMEOUT;
pub use record::ConnectionRecord;
pub use registry::ConnectionRegistry;
pub use scene::{Scene, SceneRegistry};
pub use server::EventLoop;
