//! Tests for the proxy event loop
//!
//! These tests drive a `Proxy` end to end: a Unix socket pair stands in for
//! the kernel block-device binding and a fake node answers on loopback.

use std::io::{Read, Write};
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use sanblk::device::{DeviceReply, DeviceRequest, REPLY_LEN};
use sanblk::protocol::{DataResponse, Get, Header, Opcode, Put, PutResponse, WireMessage};
use sanblk::{Config, Proxy, Result, SanError, Sequencer};

// =============================================================================
// Helper Functions
// =============================================================================

/// Fake node; `respond` sees every request with its arrival count and
/// returns the datagrams to send back
fn spawn_node<F>(mut respond: F) -> SocketAddrV4
where
    F: FnMut(&[u8], usize) -> Vec<Vec<u8>> + Send + 'static,
{
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let addr = match socket.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => unreachable!(),
    };

    thread::spawn(move || {
        let mut buf = vec![0u8; 65536];
        let mut count = 0;
        while let Ok((n, from)) = socket.recv_from(&mut buf) {
            count += 1;
            for reply in respond(&buf[..n], count) {
                let _ = socket.send_to(&reply, from);
            }
        }
    });

    addr
}

/// Answers reads with sector-number-filled data and acknowledges writes
fn answer(request: &[u8]) -> Vec<u8> {
    let header = Header::parse(request).unwrap();
    if header.is(Opcode::Put) {
        let (_, put) = Put::decode(request).unwrap();
        return PutResponse { block: put.block }.encode(header.seq).to_vec();
    }
    let (_, get) = Get::decode(request).unwrap();
    let data = vec![get.block.sector as u8; get.length_exponent.bytes()];
    DataResponse::new(get.block.sector, data).unwrap().encode(header.seq).to_vec()
}

/// Start a proxy serving `node`; returns the device end and the loop thread
fn start_proxy(node: SocketAddrV4) -> (UnixStream, JoinHandle<Result<()>>) {
    let config = Config::builder()
        .retry_interval_ms(100)
        .min_poll_wait_ms(10)
        .build();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    let (device, proxy_end) = UnixStream::pair().unwrap();
    device.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let handle = thread::spawn(move || {
        let mut proxy = Proxy::new(socket, proxy_end, node, Sequencer::seeded(9), &config)?;
        proxy.run()
    });

    (device, handle)
}

fn read_reply(device: &mut UnixStream, payload_len: usize) -> (DeviceReply, Vec<u8>) {
    let mut header = [0u8; REPLY_LEN];
    device.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; payload_len];
    device.read_exact(&mut payload).unwrap();
    (DeviceReply::parse(&header).unwrap(), payload)
}

// =============================================================================
// Round Trip Tests
// =============================================================================

#[test]
fn test_read_round_trip() {
    let node = spawn_node(|request, _| vec![answer(request)]);
    let (mut device, proxy) = start_proxy(node);

    device
        .write_all(&DeviceRequest::read(*b"rd-00001", 3 * 512, 512).encode())
        .unwrap();

    let (reply, data) = read_reply(&mut device, 512);
    assert_eq!(reply.error, 0);
    assert_eq!(&reply.handle, b"rd-00001");
    assert_eq!(data, vec![3u8; 512]);

    drop(device);
    assert!(proxy.join().unwrap().is_ok());
}

#[test]
fn test_write_round_trip() {
    let node = spawn_node(|request, _| vec![answer(request)]);
    let (mut device, proxy) = start_proxy(node);

    let mut frame = DeviceRequest::write(*b"wr-00001", 0, 4096).encode().to_vec();
    frame.extend_from_slice(&[0x11; 4096]);
    device.write_all(&frame).unwrap();

    let (reply, _) = read_reply(&mut device, 0);
    assert_eq!(&reply.handle, b"wr-00001");

    drop(device);
    assert!(proxy.join().unwrap().is_ok());
}

#[test]
fn test_pipelined_requests_all_complete() {
    let node = spawn_node(|request, _| vec![answer(request)]);
    let (mut device, proxy) = start_proxy(node);

    let mut stream = Vec::new();
    for i in 0..8u64 {
        stream.extend_from_slice(&DeviceRequest::read([i as u8; 8], i * 512, 512).encode());
    }
    device.write_all(&stream).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let (reply, data) = read_reply(&mut device, 512);
        // Data for sector i is filled with i, and handle i is [i; 8]
        assert_eq!(data, vec![reply.handle[0]; 512]);
        handles.push(reply.handle[0]);
    }
    handles.sort_unstable();
    assert_eq!(handles, (0..8).collect::<Vec<u8>>());

    drop(device);
    assert!(proxy.join().unwrap().is_ok());
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_dropped_request_is_resubmitted() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let node = spawn_node(move |request, count| {
        counter.store(count, Ordering::SeqCst);
        // Lose the first datagram
        if count == 1 {
            Vec::new()
        } else {
            vec![answer(request)]
        }
    });
    let (mut device, proxy) = start_proxy(node);

    device
        .write_all(&DeviceRequest::read(*b"retry001", 512, 512).encode())
        .unwrap();

    let (reply, data) = read_reply(&mut device, 512);
    assert_eq!(&reply.handle, b"retry001");
    assert_eq!(data, vec![1u8; 512]);
    assert!(seen.load(Ordering::SeqCst) >= 2);

    drop(device);
    assert!(proxy.join().unwrap().is_ok());
}

#[test]
fn test_wrong_response_kind_is_retried() {
    let node = spawn_node(|request, count| {
        let seq = Header::parse(request).unwrap().seq;
        if count == 1 {
            // Stale data answer to a write
            vec![DataResponse::new(0, vec![0u8; 512]).unwrap().encode(seq).to_vec()]
        } else {
            vec![answer(request)]
        }
    });
    let (mut device, proxy) = start_proxy(node);

    let mut frame = DeviceRequest::write(*b"quirk001", 0, 512).encode().to_vec();
    frame.extend_from_slice(&[0x22; 512]);
    device.write_all(&frame).unwrap();

    let (reply, _) = read_reply(&mut device, 0);
    assert_eq!(&reply.handle, b"quirk001");

    drop(device);
    assert!(proxy.join().unwrap().is_ok());
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_disconnect_request_stops_loop() {
    let node = spawn_node(|request, _| vec![answer(request)]);
    let (mut device, proxy) = start_proxy(node);

    device.write_all(&DeviceRequest::disconnect([0; 8]).encode()).unwrap();

    assert!(proxy.join().unwrap().is_ok());
}

#[test]
fn test_bad_magic_ends_loop_with_error() {
    let node = spawn_node(|request, _| vec![answer(request)]);
    let (mut device, proxy) = start_proxy(node);

    device.write_all(&[0u8; 28]).unwrap();

    let result = proxy.join().unwrap();
    assert!(matches!(result, Err(SanError::BadMagic(0))));
}
