//! Proxy event loop
//!
//! Multiplexes the device channel and the protocol socket on one thread.
//! Readiness is edge triggered, so every source is drained until it would
//! block before the loop sleeps again.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::time::Instant;

use bytes::Buf;
use mio::net::{UdpSocket, UnixStream};
use mio::{Events, Interest, Poll, Token};

use crate::config::Config;
use crate::error::Result;
use crate::network::MAX_DATAGRAM;
use crate::sequence::Sequencer;
use super::dispatcher::{Completion, Dispatcher, Flow};
use super::ledger::WireSink;

const DEVICE: Token = Token(0);
const WIRE: Token = Token(1);

/// Sends datagrams to the serving node
///
/// A full socket buffer drops the datagram; the ledger resends it when its
/// deadline passes.
struct Wire<'a> {
    socket: &'a UdpSocket,
    target: SocketAddr,
}

impl WireSink for Wire<'_> {
    fn send(&mut self, datagram: &[u8]) -> io::Result<()> {
        match self.socket.send_to(datagram, self.target) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                tracing::debug!("Socket buffer full, datagram left for resubmission");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Serves one block device from one node
pub struct Proxy {
    poll: Poll,
    socket: UdpSocket,
    device: UnixStream,
    target: SocketAddr,
    dispatcher: Dispatcher,
}

impl Proxy {
    /// Take over the client socket and the proxy end of the device channel
    pub fn new(
        socket: std::net::UdpSocket,
        device: StdUnixStream,
        target: SocketAddrV4,
        sequencer: Sequencer,
        config: &Config,
    ) -> Result<Self> {
        socket.set_nonblocking(true)?;
        device.set_nonblocking(true)?;

        let mut socket = UdpSocket::from_std(socket);
        let mut device = UnixStream::from_std(device);

        let poll = Poll::new()?;
        poll.registry()
            .register(&mut device, DEVICE, Interest::READABLE | Interest::WRITABLE)?;
        poll.registry().register(&mut socket, WIRE, Interest::READABLE)?;

        Ok(Self {
            poll,
            socket,
            device,
            target: SocketAddr::V4(target),
            dispatcher: Dispatcher::new(sequencer, config),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run until the device disconnects or closes its end
    ///
    /// Malformed device requests and socket failures end the loop with an
    /// error.
    pub fn run(&mut self) -> Result<()> {
        let mut events = Events::with_capacity(64);
        let mut device_buf = vec![0u8; 64 * 1024];
        let mut wire_buf = vec![0u8; MAX_DATAGRAM];

        tracing::info!("Proxy serving {}", self.target);

        loop {
            let timeout = self.dispatcher.next_wakeup(Instant::now());
            if let Err(e) = self.poll.poll(&mut events, timeout) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                match event.token() {
                    DEVICE if event.is_readable() || event.is_read_closed() => {
                        if self.drain_device(&mut device_buf)? == Flow::Disconnect {
                            tracing::info!("Device channel closed, proxy stopping");
                            return Ok(());
                        }
                    }
                    WIRE => self.drain_wire(&mut wire_buf)?,
                    _ => {}
                }
            }

            self.flush_replies()?;

            let mut wire = Wire {
                socket: &self.socket,
                target: self.target,
            };
            self.dispatcher.resubmit(&mut wire, Instant::now())?;
        }
    }

    /// Read everything the device has sent; EOF counts as a disconnect
    fn drain_device(&mut self, buf: &mut [u8]) -> Result<Flow> {
        loop {
            let n = match self.device.read(buf) {
                Ok(0) => return Ok(Flow::Disconnect),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Flow::Continue),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let mut wire = Wire {
                socket: &self.socket,
                target: self.target,
            };
            if self.dispatcher.ingest(&buf[..n], &mut wire, Instant::now())? == Flow::Disconnect {
                return Ok(Flow::Disconnect);
            }
        }
    }

    fn drain_wire(&mut self, buf: &mut [u8]) -> Result<()> {
        loop {
            let (n, from) = match self.socket.recv_from(buf) {
                Ok(received) => received,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            if self.dispatcher.complete(&buf[..n], Instant::now()) == Completion::Ignored {
                tracing::trace!("Ignored {} byte datagram from {}", n, from);
            }
        }
    }

    /// Write queued replies until the device stops accepting bytes
    fn flush_replies(&mut self) -> Result<()> {
        let replies = self.dispatcher.replies_mut();
        while !replies.is_empty() {
            match self.device.write(&replies[..]) {
                Ok(0) => {
                    return Err(io::Error::from(io::ErrorKind::WriteZero).into());
                }
                Ok(n) => replies.advance(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}
