//! # Network Module
//!
//! This module provides the line-framed TCP transport used by control sessions. Each frame is one
//! line of UTF-8 text terminated by `\n` (a preceding `\r` is tolerated and removed).
//!
//! Receiving is deadline based: [`LineStream::recv_line`] returns `Ok(None)` if no complete line
//! arrives within the given timeout, which lets callers poll for `STOP` between other work without
//! blocking.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use serde::Deserialize;
use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs},
    time::{Duration, Instant},
};

use crate::frame::{Frame, FrameParseError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Longest line accepted before the stream is considered corrupt.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Timeout applied to every write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest read timeout handed to the socket, zero is not a valid socket timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A bidirectional frame link between the planner and the vehicle.
pub trait Link {
    /// Send a frame.
    fn send(&mut self, frame: &Frame) -> Result<(), NetError>;

    /// Receive a frame, waiting at most `timeout`. Returns `Ok(None)` if nothing arrived in time.
    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, NetError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters, loaded from `net.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetParams {
    /// Address the planner listens on.
    pub server_bind: String,

    /// Address the vehicle connects to.
    pub server_addr: String,

    /// Interval at which the planner's accept loop checks for shutdown.
    pub accept_poll_ms: u64,

    /// Timeout used when polling an established connection for frames.
    pub recv_timeout_ms: u64,

    /// Timeout for the vehicle's connection attempts.
    pub connect_timeout_ms: u64,

    /// Delay between vehicle reconnection attempts.
    pub reconnect_backoff_s: f64,
}

/// A TCP stream carrying newline terminated text frames.
pub struct LineStream {
    stream: TcpStream,
    peer: SocketAddr,

    /// Bytes received but not yet terminated by a newline
    pending: Vec<u8>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("Could not resolve address {0:?}")]
    AddrResolve(String),

    #[error("Could not connect to {0}: {1}")]
    ConnectFailed(String, io::Error),

    #[error("The connection was closed by the peer")]
    Closed,

    #[error("Socket error: {0}")]
    Io(io::Error),

    #[error("Received a line longer than {0} bytes")]
    FrameTooLong(usize),

    #[error("Received a line which is not valid UTF-8")]
    NonUtf8,

    #[error("Received an invalid frame: {0}")]
    BadFrame(FrameParseError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl NetParams {
    pub fn accept_poll(&self) -> Duration {
        Duration::from_millis(self.accept_poll_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        if self.reconnect_backoff_s.is_finite() && self.reconnect_backoff_s > 0.0 {
            Duration::from_secs_f64(self.reconnect_backoff_s)
        } else {
            Duration::from_secs(0)
        }
    }
}

impl Default for NetParams {
    fn default() -> Self {
        Self {
            server_bind: "0.0.0.0:5000".into(),
            server_addr: "127.0.0.1:5000".into(),
            accept_poll_ms: 100,
            recv_timeout_ms: 100,
            connect_timeout_ms: 2000,
            reconnect_backoff_s: 5.0,
        }
    }
}

impl NetError {
    /// Returns true if the stream can no longer be used after this error.
    ///
    /// Malformed lines and frames are rejected on their own, everything else ends the session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, NetError::NonUtf8 | NetError::BadFrame(_))
    }
}

impl LineStream {
    /// Wrap an already connected stream.
    pub fn new(stream: TcpStream) -> Result<Self, NetError> {
        let peer = stream.peer_addr().map_err(NetError::Io)?;

        // Streams accepted from a non-blocking listener may inherit its mode on some platforms
        stream.set_nonblocking(false).map_err(NetError::Io)?;
        stream.set_nodelay(true).map_err(NetError::Io)?;
        stream
            .set_write_timeout(Some(WRITE_TIMEOUT))
            .map_err(NetError::Io)?;

        Ok(Self {
            stream,
            peer,
            pending: Vec::new(),
        })
    }

    /// Connect to the given address, trying each resolved address in turn.
    pub fn connect(addr: &str, timeout: Duration) -> Result<Self, NetError> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|_| NetError::AddrResolve(addr.into()))?
            .collect();

        let mut last_err = None;

        for sock_addr in addrs {
            match TcpStream::connect_timeout(&sock_addr, timeout.max(MIN_READ_TIMEOUT)) {
                Ok(s) => return LineStream::new(s),
                Err(e) => last_err = Some(e),
            }
        }

        match last_err {
            Some(e) => Err(NetError::ConnectFailed(addr.into(), e)),
            None => Err(NetError::AddrResolve(addr.into())),
        }
    }

    /// Address of the remote end.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Send a frame.
    pub fn send(&mut self, frame: &Frame) -> Result<(), NetError> {
        let line = frame.to_string();
        debug!("-> {}: {}", self.peer, line);
        self.send_line(&line)
    }

    /// Send a raw line, the terminator is appended here.
    pub fn send_line(&mut self, line: &str) -> Result<(), NetError> {
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');

        self.stream.write_all(&bytes).map_err(map_io_err)?;
        self.stream.flush().map_err(map_io_err)
    }

    /// Receive a frame, waiting at most `timeout`.
    ///
    /// Lines which are not valid frames are returned as [`NetError::BadFrame`], which is not fatal.
    pub fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, NetError> {
        match self.recv_line(timeout)? {
            Some(line) => {
                debug!("<- {}: {}", self.peer, line);
                Frame::parse(&line).map(Some).map_err(NetError::BadFrame)
            }
            None => Ok(None),
        }
    }

    /// Receive a single line, waiting at most `timeout`.
    ///
    /// Empty lines are skipped. Returns `Ok(None)` if the deadline passes without a complete line.
    /// At least one read is attempted even for a zero timeout.
    pub fn recv_line(&mut self, timeout: Duration) -> Result<Option<String>, NetError> {
        let deadline = Instant::now() + timeout;
        let mut buf = [0u8; 1024];

        loop {
            // Drain any complete lines already buffered
            while let Some(line) = self.take_line()? {
                if !line.is_empty() {
                    return Ok(Some(line));
                }
            }

            if self.pending.len() > MAX_FRAME_LEN {
                self.pending.clear();
                return Err(NetError::FrameTooLong(MAX_FRAME_LEN));
            }

            let remaining = deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_READ_TIMEOUT);
            self.stream
                .set_read_timeout(Some(remaining))
                .map_err(NetError::Io)?;

            match self.stream.read(&mut buf) {
                Ok(0) => return Err(NetError::Closed),
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(e) => return Err(map_io_err(e)),
            }

            if Instant::now() >= deadline && !self.pending.contains(&b'\n') {
                return Ok(None);
            }
        }
    }

    /// Close both halves of the connection.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            if e.kind() != ErrorKind::NotConnected {
                warn!("Error shutting down connection to {}: {}", self.peer, e);
            }
        }
    }

    /// Remove the first complete line from the pending buffer.
    fn take_line(&mut self) -> Result<Option<String>, NetError> {
        let pos = match self.pending.iter().position(|b| *b == b'\n') {
            Some(p) => p,
            None => return Ok(None),
        };

        let mut raw: Vec<u8> = self.pending.drain(..=pos).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }

        String::from_utf8(raw)
            .map(Some)
            .map_err(|_| NetError::NonUtf8)
    }
}

impl Link for LineStream {
    fn send(&mut self, frame: &Frame) -> Result<(), NetError> {
        LineStream::send(self, frame)
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Frame>, NetError> {
        LineStream::recv(self, timeout)
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Connection resets and broken pipes all mean the peer has gone.
fn map_io_err(e: io::Error) -> NetError {
    match e.kind() {
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => NetError::Closed,
        _ => NetError::Io(e),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
