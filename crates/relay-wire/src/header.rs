/// Bytes occupied by `len` + `proto` + `code`, the prefix needed before the
/// rest of the header (forward address) can even be located.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Full fixed header: `len(2) + proto(1) + code(1) + forwardIp(4) + forwardPort(2)`.
pub const HEADER_SIZE: usize = 10;

pub const PROTOCOL_NUMBER: u8 = 1;
pub const REQUEST_CODE: u8 = 10;

/// Size of the reference implementation's fixed receive buffer. The largest
/// valid total frame length (length prefix included) is `MAX_FRAME_SIZE - 1`
/// bytes: the original closes the connection once `bytesExpected >=
/// sizeof(receiveBuffer) - 1`, reserving the last byte of the buffer.
pub const MAX_FRAME_SIZE: usize = 8192;

/// The fixed portion of every frame, decoded once the header bytes have
/// fully arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub protocol: u8,
    pub code: u8,
    pub forward_ip: u32,
    pub forward_port: u16,
}

impl Header {
    pub(crate) fn decode(bytes: &[u8; HEADER_SIZE]) -> Self {
        Self {
            protocol: bytes[2],
            code: bytes[3],
            forward_ip: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            forward_port: u16::from_be_bytes([bytes[8], bytes[9]]),
        }
    }

    pub(crate) fn encode_into(&self, total_len: u16, out: &mut Vec<u8>) {
        out.extend_from_slice(&total_len.to_be_bytes());
        out.push(self.protocol);
        out.push(self.code);
        out.extend_from_slice(&self.forward_ip.to_be_bytes());
        out.extend_from_slice(&self.forward_port.to_be_bytes());
    }
}
