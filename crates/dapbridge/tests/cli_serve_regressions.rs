#![cfg(all(unix, feature = "cli"))]

mod common;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use common::{request, ServeProcess};

fn connect(server: &ServeProcess) -> TcpStream {
    let stream = TcpStream::connect(server.addr).expect("client should connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(3)))
        .expect("read timeout should apply");
    stream
}

fn read_response(stream: &mut TcpStream) -> Vec<u8> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).expect("response header");
    assert_eq!(&header[..4], &[0x44, 0x41, 0x50, 0x00]);
    assert_eq!(header[6], 2, "packet type should be RESPONSE");
    let len = u16::from_le_bytes([header[4], header[5]]) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).expect("response payload");
    payload
}

#[test]
fn pipelined_requests_are_answered_in_order() {
    let server = ServeProcess::spawn(&["--processor", "echo"]);
    let mut stream = connect(&server);

    let mut burst = request(b"first");
    burst.extend(request(b"second"));
    burst.extend(request(b"third"));
    stream.write_all(&burst).unwrap();

    assert_eq!(read_response(&mut stream), b"first");
    assert_eq!(read_response(&mut stream), b"second");
    assert_eq!(read_response(&mut stream), b"third");
}

#[test]
fn garbage_before_a_request_does_not_drop_the_client() {
    let server = ServeProcess::spawn(&[]);
    let mut stream = connect(&server);

    let mut bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
    bytes.extend(request(&[0x00, 0xFE]));
    stream.write_all(&bytes).unwrap();

    assert_eq!(read_response(&mut stream), vec![0x00, 0x01, 0x08]);
}

#[test]
fn oversized_length_closes_the_connection() {
    let server = ServeProcess::spawn(&[]);
    let mut stream = connect(&server);

    let mut header = request(&[]);
    header[4..6].copy_from_slice(&1025u16.to_le_bytes());
    stream.write_all(&header).unwrap();

    let mut buf = [0u8; 16];
    match stream.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0, "server should close, not answer"),
        Err(err) => assert_eq!(err.kind(), ErrorKind::ConnectionReset),
    }
}

#[test]
fn second_client_is_turned_away_and_first_keeps_working() {
    let server = ServeProcess::spawn(&[]);
    let mut first = connect(&server);
    first.write_all(&request(&[0x00, 0xFF])).unwrap();
    assert_eq!(read_response(&mut first), vec![0x00, 0x02, 0x00, 0x04]);

    let mut second = connect(&server);
    let mut buf = [0u8; 8];
    match second.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(err) => assert_eq!(err.kind(), ErrorKind::ConnectionReset),
    }

    first.write_all(&request(&[0x05])).unwrap();
    assert_eq!(read_response(&mut first), vec![0xFF]);
}

#[test]
fn server_accepts_again_after_client_leaves() {
    let server = ServeProcess::spawn(&[]);
    {
        let mut stream = connect(&server);
        stream.write_all(&request(&[0x00, 0xFF])).unwrap();
        assert_eq!(read_response(&mut stream).len(), 4);
    }

    let mut next = None;
    for _ in 0..100 {
        let mut stream = connect(&server);
        let _ = stream.write_all(&request(&[0x00, 0xFE]));
        let mut header = [0u8; 8];
        if stream.read_exact(&mut header).is_ok() {
            next = Some(header);
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    let header = next.expect("a new client should be served");
    assert_eq!(u16::from_le_bytes([header[4], header[5]]), 3);
}
