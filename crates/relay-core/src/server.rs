use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use relay_net::{Connection, ReadOutcome, RollingCounters, SendOutcome};
use relay_timing::{Instant, Repeater};

use crate::error::{ConnState, CoreError};
use crate::handlers::handle_frame;
use crate::idle;
use crate::record::ConnectionRecord;
use crate::registry::ConnectionRegistry;
use crate::scene::SceneRegistry;

const LISTENER_TOKEN: Token = Token(0);
const POLL_TIMEOUT: StdDuration = StdDuration::from_millis(100);
const PERIODIC_INTERVAL: StdDuration = StdDuration::from_secs(60);

/// Drives the non-blocking event loop: accept, readable/writable
/// connections, and periodic housekeeping, all on one thread.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    registry: ConnectionRegistry,
    scenes: SceneRegistry,
    counters: RollingCounters,
    next_token: usize,
    periodic: Repeater,
    second_tick: Repeater,
}

impl EventLoop {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let mut listener = TcpListener::bind(addr)?;
        let poll = Poll::new()?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(1024),
            listener,
            registry: ConnectionRegistry::new(),
            scenes: SceneRegistry::new(),
            counters: RollingCounters::new(),
            next_token: 1,
            periodic: Repeater::new(PERIODIC_INTERVAL),
            second_tick: Repeater::new(StdDuration::from_secs(1)),
        })
    }

    pub fn connection_count(&self) -> usize {
        self.registry.len()
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.scene_count()
    }

    /// Runs until `running` is cleared by a signal handler or other
    /// coordinator. Each iteration waits at most [`POLL_TIMEOUT`] so the
    /// shutdown flag and periodic work are never starved by a quiet socket.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), CoreError> {
        while running.load(Ordering::Relaxed) {
            self.tick(running)?;
        }
        self.shutdown();
        Ok(())
    }

    fn tick(&mut self, running: &AtomicBool) -> Result<(), CoreError> {
        if self.second_tick.maybe() {
            self.counters.tick();
        }
        if self.periodic.maybe() {
            self.run_periodic();
        }

        match self.poll.poll(&mut self.events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        }
        if !running.load(Ordering::Relaxed) {
            return Ok(());
        }

        let tokens: Vec<(Token, bool, bool)> = self
            .events
            .iter()
            .map(|e| (e.token(), e.is_readable(), e.is_writable()))
            .collect();

        for (token, readable, writable) in tokens {
            if token == LISTENER_TOKEN {
                if readable {
                    self.accept_all();
                }
                continue;
            }
            if writable {
                self.handle_writable(token);
            }
            if readable {
                self.handle_readable(token);
            }
        }

        self.sync_writable_interests();
        Ok(())
    }

    /// Reconciles each connection's registered WRITABLE interest with
    /// whether it actually has a pending tail, after a tick's sends
    /// (direct replies, SET fan-out, idle pings) may have buffered one.
    fn sync_writable_interests(&mut self) {
        let to_arm: Vec<Token> = self
            .registry
            .iter()
            .filter(|(_, r)| r.conn.has_pending_write() && !r.writable_armed)
            .map(|(t, _)| *t)
            .collect();
        let to_disarm: Vec<Token> = self
            .registry
            .iter()
            .filter(|(_, r)| !r.conn.has_pending_write() && r.writable_armed)
            .map(|(t, _)| *t)
            .collect();
        for token in to_arm {
            self.arm_writable(token);
        }
        for token in to_disarm {
            self.rearm_readable(token);
        }
    }

    fn run_periodic(&mut self) {
        tracing::info!(
            connections = self.registry.len(),
            scenes = self.scenes.scene_count(),
            packets_per_min = self.counters.packets_over(60),
            bytes_per_min = self.counters.bytes_over(60),
            "periodic status"
        );
        let result = idle::sweep(&self.registry, Instant::now());
        for token in result.pinged {
            self.send_idle_ping(token);
        }
        for token in result.timed_out {
            tracing::info!(?token, "closing idle connection");
            self.close_connection(token);
        }
    }

    fn send_idle_ping(&mut self, token: Token) {
        let Some(record) = self.registry.get_mut(token) else {
            return;
        };
        let request_id = record.next_request_id().to_string();
        let conn_id = record.id.to_string();
        let ip = record.forward_ip.unwrap_or(0);
        let port = record.forward_port.unwrap_or(0);
        let Ok(bytes) = relay_wire::encode_frame(ip, port, &["RQ", &request_id, &conn_id, "PING"]) else {
            return;
        };
        match record.conn.send(&bytes) {
            Ok(_) => record.last_send_time = Instant::now(),
            Err(err) => {
                tracing::warn!(?token, %err, "failed to send idle ping, closing");
                self.close_connection(token);
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    relay_net::set_socket_buf_size(&socket, 64 * 1024);
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(err) = self
                        .poll
                        .registry()
                        .register(&mut socket, token, Interest::READABLE)
                    {
                        tracing::warn!(%err, "failed to register accepted socket");
                        continue;
                    }
                    let record = ConnectionRecord::new(Connection::new(socket, token), addr);
                    self.registry.insert(record);
                    tracing::debug!(?token, %addr, "accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    tracing::warn!(%err, "accept failed");
                    break;
                }
            }
        }
    }

    fn handle_readable(&mut self, token: Token) {
        loop {
            let Some(record) = self.registry.get_mut(token) else {
                return;
            };
            let bytes_before = record.conn.bytes_read;
            let outcome = record.conn.read_frames();
            match outcome {
                Ok(ReadOutcome::WouldBlock) => return,
                Ok(ReadOutcome::Closed) => {
                    self.close_connection(token);
                    return;
                }
                Ok(ReadOutcome::Frames(frames)) => {
                    if frames.is_empty() {
                        return;
                    }
                    let record = self.registry.get_mut(token).expect("just read from this token");
                    record.last_receive_time = Instant::now();
                    let packets = frames.len() as u64;
                    let bytes = record.conn.bytes_read - bytes_before;
                    self.counters.record(packets, bytes);

                    for frame in frames {
                        let state = handle_frame(&mut self.registry, &mut self.scenes, token, frame);
                        if state == ConnState::Closed {
                            self.close_connection(token);
                            return;
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(?token, %err, "read error, closing connection");
                    self.close_connection(token);
                    return;
                }
            }
        }
    }

    fn handle_writable(&mut self, token: Token) {
        let Some(record) = self.registry.get_mut(token) else {
            return;
        };
        match record.conn.drain_pending() {
            Ok(SendOutcome::Sent) => self.rearm_readable(token),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(?token, %err, "write error, closing connection");
                self.close_connection(token);
            }
        }
    }

    /// Drops the WRITABLE interest once a connection's pending tail has
    /// fully drained, so idle sockets do not spin the loop on readiness.
    fn rearm_readable(&mut self, token: Token) {
        if let Some(record) = self.registry.get_mut(token) {
            if self
                .poll
                .registry()
                .reregister(record.conn.socket_mut(), token, Interest::READABLE)
                .is_ok()
            {
                record.writable_armed = false;
            }
        }
    }

    /// Arms WRITABLE interest in addition to READABLE after a partial write
    /// leaves a pending tail, so the loop is woken once the socket drains.
    fn arm_writable(&mut self, token: Token) {
        if let Some(record) = self.registry.get_mut(token) {
            if self
                .poll
                .registry()
                .reregister(record.conn.socket_mut(), token, Interest::READABLE | Interest::WRITABLE)
                .is_ok()
            {
                record.writable_armed = true;
            }
        }
    }

    fn close_connection(&mut self, token: Token) {
        if let Some(mut record) = self.registry.remove(token) {
            let _ = self.poll.registry().deregister(record.conn.socket_mut());
            if let Some(scene_url) = record.bound_scene_url().map(str::to_owned) {
                self.scenes.leave(&scene_url, token);
            }
        }
    }

    fn shutdown(&mut self) {
        let tokens: Vec<Token> = self.registry.tokens().collect();
        for token in tokens {
            self.close_connection(token);
        }
    }
}
