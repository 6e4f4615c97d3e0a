#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Net(#[from] relay_net::NetError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of handling one frame: whether the connection it arrived on
/// should stay open. Mirrors the reference dispatcher's `rc` convention
/// (`0` continue, negative close) without conflating it with error
/// propagation — a malformed request is not a Rust-level error, it is a
/// policy decision to hang up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Alive,
    Closed,
}
