#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    #[error("unsupported protocol number {0}")]
    BadProtocol(u8),
    #[error("unsupported request code {0}")]
    BadRequestCode(u8),
    #[error("frame length {0} out of bounds")]
    BadLength(usize),
    #[error("encoded frame would exceed the maximum frame size")]
    FrameTooLarge,
}
