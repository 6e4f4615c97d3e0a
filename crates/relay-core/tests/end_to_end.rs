use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_core::EventLoop;
use relay_wire::{encode_frame, FrameAssembler};

// `EventLoop::bind` takes the address to listen on directly, so tests bind
// an ephemeral port up front and hand the same address to both the event
// loop and the client sockets.
fn bind_for_test() -> (std::net::SocketAddr, EventLoop) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let event_loop = EventLoop::bind(addr).unwrap();
    (addr, event_loop)
}

fn start() -> (std::net::SocketAddr, Arc<AtomicBool>, std::thread::JoinHandle<()>) {
    let (addr, mut event_loop) = bind_for_test();
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    let handle = std::thread::spawn(move || {
        event_loop.run(&running_clone).unwrap();
    });
    (addr, running, handle)
}

fn read_one_frame(stream: &mut TcpStream) -> relay_wire::Frame {
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 256];
    loop {
        let n = stream.read(&mut buf).expect("read reply");
        assert!(n > 0, "peer closed before a full frame arrived");
        let mut frames = assembler.feed(&buf[..n]).expect("valid frame");
        if !frames.is_empty() {
            return frames.remove(0);
        }
    }
}

fn enter(stream: &mut TcpStream, nnm: &str, scu: &str) -> relay_wire::Frame {
    let bytes = encode_frame(0, 0, &["RQ", "1", "c1", "ENTER", "NNM", nnm, "SCN", "Room", "SCU", scu]).unwrap();
    stream.write_all(&bytes).unwrap();
    read_one_frame(stream)
}

#[test]
fn enter_replies_with_hi_and_assigns_ids() {
    let (addr, running, handle) = start();
    let mut client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let reply = enter(&mut client, "Alice", "https://scene-a");
    assert_eq!(reply.args[0], "AN");
    assert_eq!(reply.args[3], "HI");
    assert_eq!(reply.args[4], "CLID");
    assert_eq!(reply.args[6], "SCID");

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn ping_is_answered_with_pong() {
    let (addr, running, handle) = start();
    let mut client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    enter(&mut client, "Alice", "https://scene-ping");

    let bytes = encode_frame(0, 0, &["RQ", "2", "c1", "PING"]).unwrap();
    client.write_all(&bytes).unwrap();
    let reply = read_one_frame(&mut client);
    assert_eq!(reply.args[3], "PONG");

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn set_fans_out_to_other_scene_members_but_not_the_sender() {
    let (addr, running, handle) = start();

    let mut alice = TcpStream::connect(addr).unwrap();
    alice.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let alice_hi = enter(&mut alice, "Alice", "https://scene-shared");
    let scene_id = alice_hi.args[7].clone();

    let mut bob = TcpStream::connect(addr).unwrap();
    bob.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    enter(&mut bob, "Bob", "https://scene-shared");

    let bytes = encode_frame(0, 0, &["RQ", "3", "c1", "SET", "SCID", &scene_id, "x", "42"]).unwrap();
    alice.write_all(&bytes).unwrap();

    let alice_ack = read_one_frame(&mut alice);
    assert_eq!(alice_ack.args[3], "OK");

    let bob_update = read_one_frame(&mut bob);
    assert_eq!(bob_update.args[0], "RQ");
    assert_eq!(bob_update.args[3], "SET");
    assert_eq!(bob_update.args[5], scene_id);
    assert_eq!(bob_update.args[6], "x");
    assert_eq!(bob_update.args[7], "42");

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn bye_unbinds_without_closing_the_socket() {
    let (addr, running, handle) = start();
    let mut client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let hi = enter(&mut client, "Alice", "https://scene-bye");
    let client_id = hi.args[5].clone();

    let bytes = encode_frame(0, 0, &["RQ", "2", "c1", "BYE", "CLID", &client_id]).unwrap();
    client.write_all(&bytes).unwrap();
    let reply = read_one_frame(&mut client);
    assert_eq!(reply.args[0], "AN");

    // The socket stays open: a follow-up PING still gets answered.
    let ping = encode_frame(0, 0, &["RQ", "3", "c1", "PING"]).unwrap();
    client.write_all(&ping).unwrap();
    let pong = read_one_frame(&mut client);
    assert_eq!(pong.args[3], "PONG");

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}

#[test]
fn malformed_frame_closes_the_connection() {
    let (addr, running, handle) = start();
    let mut client = TcpStream::connect(addr).unwrap();
    client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    // Valid length prefix, but an unsupported protocol number.
    let mut bytes = encode_frame(0, 0, &["RQ", "1", "c1", "PING"]).unwrap();
    bytes[2] = 9;
    client.write_all(&bytes).unwrap();

    let mut buf = [0u8; 16];
    let n = client.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "server should close the connection on a bad protocol number");

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}
