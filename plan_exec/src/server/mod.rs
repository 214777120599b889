//! # Plan server
//!
//! The planner's side of the link to the vehicle. A dedicated thread owns the listening socket and
//! the accepted connection, and is the only writer of the control session. Other threads interact
//! with it through:
//!
//! - [`OperatorCmd`]s sent over a channel,
//! - a [`SessionStatus`] snapshot which is replaced in full after every change,
//! - [`ServerEvent`]s received from a channel.
//!
//! Only one vehicle may be connected at a time. Any further connection is sent `BUSY` and closed
//! without affecting the active session.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

mod session;

pub use session::{Reaction, ServerSession};

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use comms_if::{
    cmd::CommandSequence,
    frame::{CalibSource, Frame},
    net::{LineStream, NetError, NetParams},
    session::SessionState,
};
use log::{debug, error, info, warn};
use std::{
    io::ErrorKind,
    net::{SocketAddr, TcpListener},
    sync::{
        mpsc::{self, Receiver, Sender, TryRecvError},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

// -----------------------------------------------------------------------------------------------
// STRUCTS
// -----------------------------------------------------------------------------------------------

/// Snapshot of the control session, published by the server thread.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,

    /// Address of the connected vehicle, if any.
    pub peer: Option<String>,

    /// Gyroscope offset from the last successful calibration.
    pub calib_offset: Option<f64>,

    /// Length of the sequence held for dispatch, `None` if no plan is held.
    pub num_commands: Option<usize>,
}

/// Handle to the server thread.
pub struct PlanServer {
    local_addr: SocketAddr,

    cmd_sender: Sender<OperatorCmd>,

    event_receiver: Receiver<ServerEvent>,

    status: Arc<Mutex<SessionStatus>>,

    join_handle: Option<thread::JoinHandle<Result<(), PlanServerError>>>,
}

// -----------------------------------------------------------------------------------------------
// ENUMS
// -----------------------------------------------------------------------------------------------

/// Commands from the operator to the server thread.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCmd {
    /// Hold a new sequence for the next drive, replacing any previous one.
    SetPlan(CommandSequence),

    /// Start a calibrate and drive cycle with the given calibration profile.
    Drive(CalibSource),

    /// Stop the vehicle.
    Stop,

    /// Notify the vehicle and stop the server thread.
    Shutdown,
}

/// Notifications from the server thread to the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    VehicleConnected(String),
    VehicleDisconnected(String),
    BusyRejected(String),
    StateChanged(SessionState),
    CalibrationDone(f64),
    CalibrationFailed(String),
    SequenceAccepted,
    SequenceRejected,
    SequenceDone,
    Stopped,
    ProtocolError(String),
    OperatorRejected(OperatorError),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum OperatorError {
    #[error("No vehicle is connected")]
    NotConnected,

    #[error("No commands are available, plan a route first")]
    NoCommands,

    #[error("The vehicle is busy ({0})")]
    Busy(SessionState),

    #[error("The server is not running")]
    ServerGone,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanServerError {
    #[error("Could not bind to {0}: {1}")]
    BindError(String, std::io::Error),

    #[error("Socket error: {0}")]
    SocketError(std::io::Error),

    #[error("The server thread panicked")]
    ThreadPanicked,
}

// -----------------------------------------------------------------------------------------------
// IMPLS
// -----------------------------------------------------------------------------------------------

impl SessionStatus {
    /// Check that a calibrate and drive cycle may be started.
    pub fn check_can_drive(&self) -> Result<(), OperatorError> {
        if self.peer.is_none() {
            return Err(OperatorError::NotConnected);
        }
        if !self.state.can_dispatch() {
            return Err(OperatorError::Busy(self.state));
        }
        match self.num_commands {
            Some(n) if n > 0 => Ok(()),
            _ => Err(OperatorError::NoCommands),
        }
    }
}

impl PlanServer {
    /// Bind the listener and start the server thread.
    pub fn start(params: &NetParams) -> Result<Self, PlanServerError> {
        let listener = TcpListener::bind(&params.server_bind)
            .map_err(|e| PlanServerError::BindError(params.server_bind.clone(), e))?;
        listener
            .set_nonblocking(true)
            .map_err(PlanServerError::SocketError)?;
        let local_addr = listener
            .local_addr()
            .map_err(PlanServerError::SocketError)?;

        let (cmd_sender, cmd_receiver) = mpsc::channel();
        let (event_sender, event_receiver) = mpsc::channel();
        let status = Arc::new(Mutex::new(SessionStatus::default()));

        let status_clone = status.clone();
        let accept_poll = params.accept_poll();
        let recv_timeout = params.recv_timeout();

        let join_handle = thread::Builder::new()
            .name("plan_server".into())
            .spawn(move || {
                server_thread(
                    listener,
                    accept_poll,
                    recv_timeout,
                    cmd_receiver,
                    event_sender,
                    status_clone,
                )
            })
            .map_err(PlanServerError::SocketError)?;

        info!("Plan server listening on {}", local_addr);

        Ok(Self {
            local_addr,
            cmd_sender,
            event_receiver,
            status,
            join_handle: Some(join_handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The latest published session status.
    pub fn status(&self) -> SessionStatus {
        match self.status.lock() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Hold a new sequence for the next drive.
    pub fn set_plan(&self, commands: CommandSequence) -> Result<(), OperatorError> {
        self.send(OperatorCmd::SetPlan(commands))
    }

    /// Start a calibrate and drive cycle.
    ///
    /// The request is checked against the current status first, the server thread checks it again
    /// when it arrives and reports any rejection as [`ServerEvent::OperatorRejected`].
    pub fn drive(&self, source: CalibSource) -> Result<(), OperatorError> {
        self.status().check_can_drive()?;
        self.send(OperatorCmd::Drive(source))
    }

    /// Stop the vehicle.
    pub fn stop(&self) -> Result<(), OperatorError> {
        if self.status().peer.is_none() {
            return Err(OperatorError::NotConnected);
        }
        self.send(OperatorCmd::Stop)
    }

    /// All events received since the last call.
    pub fn drain_events(&self) -> Vec<ServerEvent> {
        self.event_receiver.try_iter().collect()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_event(&self, timeout: Duration) -> Option<ServerEvent> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    /// Notify the vehicle, stop the server thread and wait for it to finish.
    pub fn shutdown(mut self) -> Result<(), PlanServerError> {
        self.stop_thread()
    }

    fn send(&self, cmd: OperatorCmd) -> Result<(), OperatorError> {
        self.cmd_sender
            .send(cmd)
            .map_err(|_| OperatorError::ServerGone)
    }

    fn stop_thread(&mut self) -> Result<(), PlanServerError> {
        let jh = match self.join_handle.take() {
            Some(jh) => jh,
            None => return Ok(()),
        };

        // The thread may already have exited, in which case the send fails harmlessly
        self.cmd_sender.send(OperatorCmd::Shutdown).ok();

        match jh.join() {
            Ok(r) => r,
            Err(_) => Err(PlanServerError::ThreadPanicked),
        }
    }
}

impl Drop for PlanServer {
    fn drop(&mut self) {
        if let Err(e) = self.stop_thread() {
            error!("Plan server stopped with an error: {}", e);
        }
    }
}

// -----------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn server_thread(
    listener: TcpListener,
    accept_poll: Duration,
    recv_timeout: Duration,
    cmd_receiver: Receiver<OperatorCmd>,
    event_sender: Sender<ServerEvent>,
    status: Arc<Mutex<SessionStatus>>,
) -> Result<(), PlanServerError> {
    let mut session = ServerSession::new();
    let mut conn: Option<LineStream> = None;

    publish(&status, &session);

    loop {
        // Operator commands
        loop {
            let cmd = match cmd_receiver.try_recv() {
                Ok(c) => c,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => OperatorCmd::Shutdown,
            };
            let is_shutdown = cmd == OperatorCmd::Shutdown;

            match session.on_operator(cmd) {
                Ok(reaction) => apply(reaction, &mut session, &mut conn, &event_sender),
                Err(e) => {
                    warn!("Operator command rejected: {}", e);
                    event_sender.send(ServerEvent::OperatorRejected(e)).ok();
                }
            }
            publish(&status, &session);

            if is_shutdown {
                if let Some(mut c) = conn.take() {
                    c.shutdown();
                }
                info!("Plan server shut down");
                return Ok(());
            }
        }

        // New connections
        match listener.accept() {
            Ok((stream, addr)) => {
                if conn.is_some() {
                    reject_busy(stream, addr, &event_sender);
                } else {
                    match LineStream::new(stream) {
                        Ok(c) => {
                            conn = Some(c);
                            let reaction = session.on_connect(addr.to_string());
                            apply(reaction, &mut session, &mut conn, &event_sender);
                        }
                        Err(e) => warn!("Could not set up connection from {}: {}", addr, e),
                    }
                }
                publish(&status, &session);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => (),
            Err(e) if e.kind() == ErrorKind::Interrupted => (),
            Err(e) => return Err(PlanServerError::SocketError(e)),
        }

        // Frames from the vehicle, or wait before polling again
        let result = match conn.as_mut() {
            Some(c) => c.recv(recv_timeout),
            None => {
                thread::sleep(accept_poll);
                continue;
            }
        };

        let reaction = match result {
            Ok(Some(frame)) => session.on_frame(frame),
            Ok(None) => continue,
            Err(e) if !e.is_fatal() => session.on_bad_frame(e.to_string()),
            Err(e) => {
                match e {
                    NetError::Closed => debug!("Vehicle closed the connection"),
                    e => warn!("Connection error: {}", e),
                }
                drop_connection(&mut conn);
                session.on_disconnect()
            }
        };

        apply(reaction, &mut session, &mut conn, &event_sender);
        publish(&status, &session);
    }
}

/// Send the replies and publish the events of a reaction.
///
/// A failure to send ends the connection.
fn apply(
    reaction: Reaction,
    session: &mut ServerSession,
    conn: &mut Option<LineStream>,
    event_sender: &Sender<ServerEvent>,
) {
    let mut events = reaction.events;

    if let Some(c) = conn.as_mut() {
        let mut send_failed = false;

        for frame in &reaction.replies {
            if let Err(e) = c.send(frame) {
                warn!("Failed to send {}: {}", frame, e);
                send_failed = true;
                break;
            }
        }

        if send_failed {
            drop_connection(conn);
            events.extend(session.on_disconnect().events);
        }
    }

    for e in events {
        // The operator may have gone, that is not a reason to stop serving the vehicle
        event_sender.send(e).ok();
    }
}

fn drop_connection(conn: &mut Option<LineStream>) {
    if let Some(mut c) = conn.take() {
        c.shutdown();
    }
}

/// Tell a second vehicle that the server is busy and close its connection.
fn reject_busy(stream: std::net::TcpStream, addr: SocketAddr, event_sender: &Sender<ServerEvent>) {
    warn!("Rejecting connection from {}, a vehicle is already connected", addr);

    match LineStream::new(stream) {
        Ok(mut c) => {
            if let Err(e) = c.send(&Frame::Busy) {
                debug!("Could not send BUSY to {}: {}", addr, e);
            }
            c.shutdown();
        }
        Err(e) => debug!("Could not set up rejected connection from {}: {}", addr, e),
    }

    event_sender.send(ServerEvent::BusyRejected(addr.to_string())).ok();
}

/// Replace the published status with the session's current one.
fn publish(status: &Arc<Mutex<SessionStatus>>, session: &ServerSession) {
    let new_status = session.status();

    match status.lock() {
        Ok(mut s) => *s = new_status,
        Err(poisoned) => *poisoned.into_inner() = new_status,
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::cmd::{Axis, Primitive};
    use std::time::Instant;

    fn params() -> NetParams {
        NetParams {
            server_bind: "127.0.0.1:0".into(),
            accept_poll_ms: 5,
            recv_timeout_ms: 5,
            ..Default::default()
        }
    }

    /// Wait until the status satisfies `f`.
    fn wait_for<F: Fn(&SessionStatus) -> bool>(server: &PlanServer, f: F) -> SessionStatus {
        let start = Instant::now();
        loop {
            let s = server.status();
            if f(&s) {
                return s;
            }
            assert!(start.elapsed() < Duration::from_secs(5), "Timed out, status {:?}", s);
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_busy_and_dispatch() {
        let server = PlanServer::start(&params()).unwrap();
        let addr = server.local_addr().to_string();
        let t = Duration::from_secs(2);

        let mut veh = LineStream::connect(&addr, t).unwrap();
        wait_for(&server, |s| s.peer.is_some());

        // A second vehicle is turned away
        let mut other = LineStream::connect(&addr, t).unwrap();
        assert_eq!(other.recv(t).unwrap(), Some(Frame::Busy));
        assert!(matches!(other.recv(t), Err(NetError::Closed)));

        // Drive is rejected without a plan
        assert_eq!(server.drive(CalibSource::Camera), Err(OperatorError::NoCommands));

        let seq = vec![Primitive::forward(Axis::B, 15)];
        server.set_plan(seq.clone()).unwrap();
        wait_for(&server, |s| s.num_commands == Some(1));

        server.drive(CalibSource::Gallery).unwrap();
        assert_eq!(veh.recv(t).unwrap(), Some(Frame::Calibrate(CalibSource::Gallery)));

        veh.send(&Frame::CalibrationDone(0.5)).unwrap();
        assert_eq!(veh.recv(t).unwrap(), Some(Frame::Commands(seq)));

        veh.send(&Frame::CommandsReceivedValid).unwrap();
        wait_for(&server, |s| s.state == SessionState::Driving);

        veh.send(&Frame::SequenceDone).unwrap();
        wait_for(&server, |s| s.state == SessionState::Idle);

        // Disconnecting discards the plan
        drop(veh);
        let s = wait_for(&server, |s| s.peer.is_none());
        assert_eq!(s.num_commands, None);

        let events = server.drain_events();
        assert!(events.iter().any(|e| matches!(e, ServerEvent::BusyRejected(_))));
        assert!(events.contains(&ServerEvent::SequenceDone));

        server.shutdown().unwrap();
    }

    #[test]
    fn test_shutdown_notifies_vehicle() {
        let server = PlanServer::start(&params()).unwrap();
        let t = Duration::from_secs(2);

        let mut veh = LineStream::connect(&server.local_addr().to_string(), t).unwrap();
        wait_for(&server, |s| s.peer.is_some());

        server.shutdown().unwrap();
        assert_eq!(veh.recv(t).unwrap(), Some(Frame::ServerShutdown));
    }
}
