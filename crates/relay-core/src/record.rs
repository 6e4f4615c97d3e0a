use std::net::SocketAddr;

use mio::Token;
use relay_net::Connection;
use relay_timing::Instant;
use relay_utils::hex_id::HexIdCounter;
use relay_utils::HexId;

/// Per-connection request id counter, seeded away from zero the same way
/// the server's hex identifiers are (see `relay_utils::HexIdCounter`).
const FIRST_REQUEST_ID: u32 = 0x10000;

/// Everything the relay knows about one peer: the raw framing connection
/// plus the protocol-level identity, scene binding, and liveness timers
/// layered on top of it.
pub struct ConnectionRecord {
    pub conn: Connection,
    pub id: HexId,
    pub client_id: Option<HexId>,
    request_id: HexIdCounter,
    pub client_addr: SocketAddr,
    pub forward_ip: Option<u32>,
    pub forward_port: Option<u16>,
    pub nnm: Option<String>,
    pub scn: Option<String>,
    pub scu: Option<String>,
    pub start_time: Instant,
    pub last_receive_time: Instant,
    pub last_send_time: Instant,
    /// Whether WRITABLE interest is currently registered for this socket;
    /// tracked so the event loop only reregisters when it actually changes.
    pub writable_armed: bool,
}

impl ConnectionRecord {
    pub fn new(conn: Connection, client_addr: SocketAddr) -> Self {
        let id = HexId::from_u32(conn.token.0 as u32);
        let now = Instant::now();
        Self {
            conn,
            id,
            client_id: None,
            request_id: HexIdCounter::starting_at(FIRST_REQUEST_ID),
            client_addr,
            forward_ip: None,
            forward_port: None,
            nnm: None,
            scn: None,
            scu: None,
            start_time: now,
            last_receive_time: now,
            last_send_time: now,
            writable_armed: false,
        }
    }

    pub fn token(&self) -> Token {
        self.conn.token
    }

    pub fn next_request_id(&mut self) -> HexId {
        self.request_id.next_id()
    }

    pub fn is_bound(&self) -> bool {
        self.scu.is_some()
    }

    pub fn bound_scene_url(&self) -> Option<&str> {
        self.scu.as_deref()
    }

    /// Captures the forward address from the first packet's header; a
    /// no-op on every subsequent packet, matching the "resolved once"
    /// contract from the request dispatcher.
    pub fn capture_forward_address(&mut self, ip: u32, port: u16) {
        if self.forward_ip.is_none() {
            self.forward_ip = Some(ip);
            self.forward_port = Some(port);
        }
    }

    pub fn clear_scene_binding(&mut self) {
        self.scu = None;
        self.scn = None;
    }
}
