//! Drives a real `Server` instance over loopback TCP, covering the protocol's
//! end-to-end scenarios rather than just its individual components.

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::thread;
use std::time::Duration;

use kvnet::Server;

fn spawn_server() -> SocketAddr {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let log = kvcore::logging::discard();
    let mut server = Server::bind(addr, log).expect("server should bind to an ephemeral port");
    let bound = server.local_addr().unwrap();

    thread::spawn(move || {
        let _ = server.run();
    });

    // Give the background thread a moment to reach its first `poll` call.
    thread::sleep(Duration::from_millis(20));
    bound
}

fn encode_request(args: &[&[u8]]) -> Vec<u8> {
    let mut bytes = Vec::new();
    kvnet::net::wire::encode_request(&mut bytes, args);
    bytes
}

fn read_one_frame(client: &mut TcpStream) -> Vec<u8> {
    let mut len_bytes = [0u8; 4];
    client
        .read_exact(&mut len_bytes)
        .expect("expected a length prefix");
    let len = u32::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    client.read_exact(&mut payload).expect("expected a full payload");
    let mut framed = len_bytes.to_vec();
    framed.extend_from_slice(&payload);
    framed
}

#[test]
fn e1_set_then_get() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    client.write_all(&encode_request(&[b"set", b"k", b"v"])).unwrap();
    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 0, 0, 0, 0]);

    client.write_all(&encode_request(&[b"get", b"k"])).unwrap();
    assert_eq!(
        read_one_frame(&mut client),
        vec![5, 0, 0, 0, 0, 0, 0, 0, b'v']
    );
}

#[test]
fn e2_missing_key() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    client.write_all(&encode_request(&[b"get", b"missing"])).unwrap();
    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 2, 0, 0, 0]);
}

#[test]
fn e3_unknown_verb() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    client.write_all(&encode_request(&[b"ping"])).unwrap();
    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 1, 0, 0, 0]);
}

#[test]
fn e4_close_command_closes_without_a_response() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    client.write_all(&encode_request(&[b"close"])).unwrap();

    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).expect("read should observe EOF, not error");
    assert_eq!(n, 0, "close must not produce a response frame");
}

#[test]
fn e5_oversize_frame_closes_without_a_response() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    // Declares a payload just over 32 MiB; the server must never try to buffer it.
    let len: u32 = (32 << 20) + 1;
    client.write_all(&len.to_le_bytes()).unwrap();

    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).expect("read should observe EOF, not error");
    assert_eq!(n, 0);
}

#[test]
fn e6_pipelined_batch_gets_responses_in_order() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    let mut batch = Vec::new();
    batch.extend(encode_request(&[b"set", b"a", b"1"]));
    batch.extend(encode_request(&[b"set", b"b", b"2"]));
    batch.extend(encode_request(&[b"get", b"a"]));
    client.write_all(&batch).unwrap();

    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(
        read_one_frame(&mut client),
        vec![5, 0, 0, 0, 0, 0, 0, 0, b'1']
    );
}

#[test]
fn e7_chunked_delivery_is_assembled_before_responding() {
    let addr = spawn_server();
    let mut client = TcpStream::connect(addr).unwrap();

    let request = encode_request(&[b"set", b"chunked", b"value"]);
    for chunk in request.chunks(3) {
        client.write_all(chunk).unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(read_one_frame(&mut client), vec![4, 0, 0, 0, 0, 0, 0, 0]);
}

#[test]
fn independent_connections_do_not_interleave_responses() {
    let addr = spawn_server();
    let mut a = TcpStream::connect(addr).unwrap();
    let mut b = TcpStream::connect(addr).unwrap();

    a.write_all(&encode_request(&[b"set", b"x", b"from-a"])).unwrap();
    b.write_all(&encode_request(&[b"get", b"x"])).unwrap();

    assert_eq!(read_one_frame(&mut a), vec![4, 0, 0, 0, 0, 0, 0, 0]);
    // `b`'s get may race the set; either NO or OK+"from-a" is a valid outcome
    // of unordered cross-connection interleaving, but the frame must be whole.
    let response = read_one_frame(&mut b);
    assert!(response == vec![4, 0, 0, 0, 2, 0, 0, 0] || response[4] == 0);
}
