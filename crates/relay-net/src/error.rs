#[derive(thiserror::Error, Debug)]
pub enum NetError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("frame error: {0}")]
    Frame(#[from] relay_wire::WireError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
