use crate::args::split_args;
use crate::error::WireError;
use crate::header::{Header, HEADER_SIZE, LEN_PREFIX_SIZE, MAX_FRAME_SIZE, PROTOCOL_NUMBER, REQUEST_CODE};

/// One fully-assembled packet: the fixed header plus its null-terminated
/// argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub args: Vec<String>,
}

impl Frame {
    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        debug_assert!(bytes.len() >= HEADER_SIZE);
        let mut header_bytes = [0u8; HEADER_SIZE];
        header_bytes.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = Header::decode(&header_bytes);
        if header.protocol != PROTOCOL_NUMBER {
            return Err(WireError::BadProtocol(header.protocol));
        }
        if header.code != REQUEST_CODE {
            return Err(WireError::BadRequestCode(header.code));
        }
        let args = split_args(&bytes[HEADER_SIZE..]);
        Ok(Self { header, args })
    }
}

/// Incrementally assembles [`Frame`]s out of raw bytes read off a socket.
///
/// Callers push whatever bytes a non-blocking read happened to produce via
/// [`feed`](FrameAssembler::feed); zero, one, or several complete frames may
/// come back from a single call, and a partial frame is simply retained
/// until the next one.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends `data` and drains as many complete frames as are now
    /// available. Returns an error (and leaves the assembler unusable for
    /// further framing) the moment a header fails validation, matching the
    /// "close the connection" policy for protocol violations.
    pub fn feed(&mut self, data: &[u8]) -> Result<Vec<Frame>, WireError> {
        self.buf.extend_from_slice(data);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < LEN_PREFIX_SIZE {
                break;
            }
            let len = u16::from_be_bytes([self.buf[0], self.buf[1]]) as usize;
            let total = 2 + len;
            if total < HEADER_SIZE || total >= MAX_FRAME_SIZE - 1 {
                return Err(WireError::BadLength(total));
            }
            if self.buf.len() < total {
                break;
            }
            let frame_bytes: Vec<u8> = self.buf.drain(..total).collect();
            frames.push(Frame::decode(&frame_bytes)?);
        }
        Ok(frames)
    }
}

/// Serialises a frame with the given forward address and request arguments.
pub fn encode_frame(forward_ip: u32, forward_port: u16, args: &[&str]) -> Result<Vec<u8>, WireError> {
    let body_len: usize = args.iter().map(|a| a.len() + 1).sum();
    let payload_len = HEADER_SIZE - 2 + body_len;
    let total_len = u16::try_from(payload_len).map_err(|_| WireError::FrameTooLarge)?;
    if 2 + total_len as usize >= MAX_FRAME_SIZE - 1 {
        return Err(WireError::FrameTooLarge);
    }

    let mut out = Vec::with_capacity(2 + payload_len);
    let header = Header {
        protocol: PROTOCOL_NUMBER,
        code: REQUEST_CODE,
        forward_ip,
        forward_port,
    };
    header.encode_into(total_len, &mut out);
    for arg in args {
        out.extend_from_slice(arg.as_bytes());
        out.push(0);
    }
    Ok(out)
}
