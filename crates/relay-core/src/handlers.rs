use mio::Token;
use relay_utils::HexId;
use relay_wire::Frame;

use crate::error::{ConnState, CoreError};
use crate::record::ConnectionRecord;
use crate::registry::ConnectionRegistry;
use crate::scene::SceneRegistry;

fn starts_with_letter(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
}

fn send_reply(record: &mut ConnectionRecord, args: &[&str]) -> Result<(), CoreError> {
    let ip = record.forward_ip.unwrap_or(0);
    let port = record.forward_port.unwrap_or(0);
    let bytes = relay_wire::encode_frame(ip, port, args).map_err(relay_net::NetError::from)?;
    record.conn.send(&bytes)?;
    Ok(())
}

/// Entry point for one fully-framed packet. Returns whether the connection
/// it arrived on should remain open.
pub fn handle_frame(
    registry: &mut ConnectionRegistry,
    scenes: &mut SceneRegistry,
    token: Token,
    frame: Frame,
) -> ConnState {
    let Some(record) = registry.get_mut(token) else {
        return ConnState::Closed;
    };
    record.capture_forward_address(frame.header.forward_ip, frame.header.forward_port);

    match frame.args.first().map(String::as_str) {
        Some("AN") => {
            tracing::trace!(?token, args = ?frame.args, "received announce, ignoring");
            ConnState::Alive
        }
        Some("RQ") => handle_request(registry, scenes, token, &frame.args),
        _ => {
            tracing::warn!(?token, "frame missing RQ/AN prefix, closing");
            ConnState::Closed
        }
    }
}

fn handle_request(
    registry: &mut ConnectionRegistry,
    scenes: &mut SceneRegistry,
    token: Token,
    args: &[String],
) -> ConnState {
    if args.len() < 4 {
        tracing::warn!(?token, "request too short, closing");
        return ConnState::Closed;
    }
    let (packet_id, connection_id, tag) = (args[1].as_str(), args[2].as_str(), args[3].as_str());
    if packet_id.is_empty() || connection_id.is_empty() || tag.is_empty() {
        tracing::warn!(?token, "request missing packetId/connectionId/tag, closing");
        return ConnState::Closed;
    }

    let outcome = match tag {
        "ENTER" => handle_enter(registry, scenes, token, args),
        "SET" => handle_set(registry, scenes, token, args),
        "PING" => handle_ping(registry, token, packet_id, connection_id),
        "BYE" => handle_bye(registry, scenes, token, args),
        _ => {
            tracing::debug!(?token, tag, "unknown request tag, ignoring");
            Ok(ConnState::Alive)
        }
    };

    match outcome {
        Ok(state) => state,
        Err(err) => {
            tracing::warn!(?token, %err, "closing connection after send failure");
            ConnState::Closed
        }
    }
}

fn handle_enter(
    registry: &mut ConnectionRegistry,
    scenes: &mut SceneRegistry,
    token: Token,
    args: &[String],
) -> Result<ConnState, CoreError> {
    let record = registry.get_mut(token).expect("token dispatched from live registry");
    if record.is_bound() {
        tracing::warn!(?token, "ENTER on an already-bound connection, closing");
        return Ok(ConnState::Closed);
    }

    let mut nnm = None;
    let mut scn = None;
    let mut scu = None;
    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "NNM" if i + 1 < args.len() => {
                nnm = Some(args[i + 1].clone());
                i += 2;
            }
            "SCU" if i + 1 < args.len() => {
                scu = Some(args[i + 1].clone());
                i += 2;
            }
            "SCN" if i + 1 < args.len() => {
                scn = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }

    let nnm = match nnm.filter(|s| starts_with_letter(s)) {
        Some(v) => v,
        None => {
            tracing::warn!(?token, "NNM missing or does not start with a letter in ENTER");
            return Ok(ConnState::Closed);
        }
    };
    let scn = match scn.filter(|s| starts_with_letter(s)) {
        Some(v) => v,
        None => {
            tracing::warn!(?token, "SCN missing or does not start with a letter in ENTER");
            return Ok(ConnState::Closed);
        }
    };
    let scu = match scu.filter(|s| starts_with_letter(s)) {
        Some(v) => v,
        None => {
            tracing::warn!(?token, "SCU missing or does not start with a letter in ENTER");
            return Ok(ConnState::Closed);
        }
    };

    let client_id = HexId::random();
    tracing::info!(?token, conn_id = %record.id, %client_id, "new connection entering scene");

    let scene_id = match scenes.find_by_url(&scu).map(|s| s.id) {
        Some(id) => {
            scenes.join(&scu, token);
            id
        }
        None => {
            let id = scenes.create(&scu, &scn, token);
            tracing::info!(scene_id = %id, %scu, %scn, "new scene created");
            id
        }
    };

    let record = registry.get_mut(token).expect("token dispatched from live registry");
    record.client_id = Some(client_id);
    record.nnm = Some(nnm.clone());
    record.scn = Some(scn);
    record.scu = Some(scu);

    let conn_id = record.id.to_string();
    let client_id_str = client_id.to_string();
    let scene_id_str = scene_id.to_string();
    // Echoes the request's own packetId (args[1]); only connectionId (args[2])
    // is replaced, with the server's own connection id.
    send_reply(
        record,
        &["AN", &args[1], &conn_id, "HI", "CLID", &client_id_str, "SCID", &scene_id_str, "NNM", &nnm],
    )?;
    Ok(ConnState::Alive)
}

fn handle_set(
    registry: &mut ConnectionRegistry,
    scenes: &mut SceneRegistry,
    token: Token,
    args: &[String],
) -> Result<ConnState, CoreError> {
    let record = registry.get(token).expect("token dispatched from live registry");
    let Some(scene_url) = record.bound_scene_url().map(str::to_owned) else {
        return Ok(ConnState::Alive);
    };
    let Some(scene) = scenes.find_by_url(&scene_url) else {
        return Ok(ConnState::Alive);
    };

    // Resolved policy: scan left to right, last occurrence of SCID / CHID /
    // the free-form key-value pair wins.
    let mut scid: Option<&str> = None;
    let mut key: Option<&str> = None;
    let mut value: Option<&str> = None;
    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "SCID" if i + 1 < args.len() => {
                scid = Some(&args[i + 1]);
                i += 2;
            }
            "CHID" if i + 1 < args.len() => {
                i += 2;
            }
            _ if i + 1 < args.len() => {
                key = Some(&args[i]);
                value = Some(&args[i + 1]);
                i += 2;
            }
            _ => i += 1,
        }
    }

    let Some(scid) = scid else {
        tracing::warn!(?token, "missing SCID in SET, ignoring");
        return Ok(ConnState::Alive);
    };
    if scid != scene.id.to_string() {
        tracing::warn!(?token, scid, "bad SCID in SET, ignoring");
        return Ok(ConnState::Alive);
    }
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        tracing::warn!(?token, "missing or empty key in SET, ignoring");
        return Ok(ConnState::Alive);
    };
    let Some(value) = value else {
        tracing::warn!(?token, "missing value in SET, ignoring");
        return Ok(ConnState::Alive);
    };

    let scid = scid.to_string();
    let key = key.to_string();
    let value = value.to_string();
    let members: Vec<Token> = scene.members().copied().collect();

    let record = registry.get_mut(token).expect("token dispatched from live registry");
    send_reply(record, &["AN", &args[1], &args[2], "OK"])?;

    for member in members {
        if member == token {
            continue;
        }
        let Some(recipient) = registry.get_mut(member) else {
            continue;
        };
        let request_id = recipient.next_request_id().to_string();
        let recipient_id = recipient.id.to_string();
        if let Err(err) = send_reply(
            recipient,
            &["RQ", &request_id, &recipient_id, "SET", "SCID", &scid, &key, &value],
        ) {
            tracing::warn!(?member, %err, "failed to fan out SET to scene member");
        }
    }

    Ok(ConnState::Alive)
}

fn handle_ping(
    registry: &mut ConnectionRegistry,
    token: Token,
    packet_id: &str,
    connection_id: &str,
) -> Result<ConnState, CoreError> {
    let record = registry.get_mut(token).expect("token dispatched from live registry");
    send_reply(record, &["AN", packet_id, connection_id, "PONG"])?;
    Ok(ConnState::Alive)
}

fn handle_bye(
    registry: &mut ConnectionRegistry,
    scenes: &mut SceneRegistry,
    token: Token,
    args: &[String],
) -> Result<ConnState, CoreError> {
    let record = registry.get(token).expect("token dispatched from live registry");
    let Some(scene_url) = record.bound_scene_url().map(str::to_owned) else {
        return Ok(ConnState::Alive);
    };

    let mut clid: Option<&str> = None;
    let mut i = 4;
    while i < args.len() {
        if args[i] == "CLID" && i + 1 < args.len() {
            clid = Some(&args[i + 1]);
            i += 2;
        } else {
            i += 1;
        }
    }

    let matches_client = clid.is_some_and(|c| record.client_id.is_some_and(|id| id.to_string() == c));
    if !matches_client {
        return Ok(ConnState::Alive);
    }

    let record = registry.get_mut(token).expect("token dispatched from live registry");
    send_reply(record, &["AN", &args[1], &args[2], &args[3]])?;
    record.clear_scene_binding();

    // Resolved open question: unlike the reference server, leaving a scene
    // also drops membership so a stale token never lingers in the set.
    scenes.leave(&scene_url, token);

    Ok(ConnState::Alive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_net::Connection;
    use relay_wire::encode_frame;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn new_loopback_record(registry: &mut ConnectionRegistry, token: Token) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        let conn = Connection::new(mio::net::TcpStream::from_std(server), token);
        let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let record = ConnectionRecord::new(conn, peer);
        registry.insert(record);
        std::mem::forget(client);
    }

    fn frame_for(args: &[&str]) -> Frame {
        let bytes = encode_frame(0, 0, args).unwrap();
        relay_wire::FrameAssembler::new().feed(&bytes).unwrap().remove(0)
    }

    #[test]
    fn enter_creates_a_scene_and_binds_the_connection() {
        let mut registry = ConnectionRegistry::new();
        let mut scenes = SceneRegistry::new();
        let token = Token(1);
        new_loopback_record(&mut registry, token);

        let frame = frame_for(&["RQ", "1", "c1", "ENTER", "NNM", "Alice", "SCN", "Room", "SCU", "https://scene"]);
        let state = handle_frame(&mut registry, &mut scenes, token, frame);

        assert_eq!(state, ConnState::Alive);
        assert!(registry.get(token).unwrap().is_bound());
        assert_eq!(scenes.scene_count(), 1);
    }

    #[test]
    fn enter_twice_on_same_connection_closes_it() {
        let mut registry = ConnectionRegistry::new();
        let mut scenes = SceneRegistry::new();
        let token = Token(1);
        new_loopback_record(&mut registry, token);

        let enter = || frame_for(&["RQ", "1", "c1", "ENTER", "NNM", "Alice", "SCN", "Room", "SCU", "https://scene"]);
        handle_frame(&mut registry, &mut scenes, token, enter());
        let state = handle_frame(&mut registry, &mut scenes, token, enter());
        assert_eq!(state, ConnState::Closed);
    }

    #[test]
    fn bye_unbinds_and_removes_membership_without_closing_socket() {
        let mut registry = ConnectionRegistry::new();
        let mut scenes = SceneRegistry::new();
        let token = Token(1);
        new_loopback_record(&mut registry, token);

        handle_frame(
            &mut registry,
            &mut scenes,
            token,
            frame_for(&["RQ", "1", "c1", "ENTER", "NNM", "Alice", "SCN", "Room", "SCU", "https://scene"]),
        );
        let client_id = registry.get(token).unwrap().client_id.unwrap().to_string();

        let state = handle_frame(
            &mut registry,
            &mut scenes,
            token,
            frame_for(&["RQ", "2", "c1", "BYE", "CLID", &client_id]),
        );

        assert_eq!(state, ConnState::Alive);
        assert!(!registry.get(token).unwrap().is_bound());
        assert_eq!(scenes.scene_count(), 0);
        assert!(registry.get(token).is_some());
    }

    #[test]
    fn set_with_stale_scid_is_ignored_not_closed() {
        let mut registry = ConnectionRegistry::new();
        let mut scenes = SceneRegistry::new();
        let token = Token(1);
        new_loopback_record(&mut registry, token);
        handle_frame(
            &mut registry,
            &mut scenes,
            token,
            frame_for(&["RQ", "1", "c1", "ENTER", "NNM", "Alice", "SCN", "Room", "SCU", "https://scene"]),
        );

        let state = handle_frame(
            &mut registry,
            &mut scenes,
            token,
            frame_for(&["RQ", "2", "c1", "SET", "SCID", "deadbeef", "x", "1"]),
        );
        assert_eq!(state, ConnState::Alive);
    }
}
