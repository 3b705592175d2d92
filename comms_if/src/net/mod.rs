//! # Network Module
//!
//! This module provides the link to the CANopen daemon's command socket, a local stream socket
//! over which one text command is answered by one text response line.
//!
//! The link owns the reconnection policy: when an exchange fails at the transport level the link
//! drops its connection, reconnects and resends the command, up to a bounded number of times.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::{
    cell::RefCell,
    io::{self, BufRead, BufReader, Write},
    net::Shutdown,
    os::unix::net::UnixStream,
    path::PathBuf,
    rc::Rc,
    thread,
    time::Duration,
};

use crate::eqpt::co::{Command, Response};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default path of the daemon's command socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/CO_command_socket";

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can exchange a command for a response with the daemon.
pub trait Transport {
    /// Send a command and return the response to it.
    ///
    /// An `Err` means the exchange could not be completed at the transport level. A response
    /// carrying a daemon error is still an `Ok`, it is up to the caller to interpret it.
    fn request(&mut self, cmd: &Command) -> Result<Response, LinkError>;
}

/// Receives every completed exchange on a [`DeviceLink`].
pub trait JointUpdateHandler {
    /// Called after a response has been received for `cmd`, which was sent as `wire`.
    fn on_exchange(&mut self, cmd: &Command, wire: &str, response: &Response);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the link to the daemon.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    /// Path to the daemon's command socket.
    ///
    /// The default value is `/tmp/CO_command_socket`.
    pub socket_path: PathBuf,

    /// CAN bus tag prefixed to every command.
    ///
    /// The default value is `1`.
    pub bus: u8,

    /// Maximum number of reconnect-then-resend attempts for a single request.
    ///
    /// The default value is `10`.
    pub max_reconnects: u32,

    /// Time to wait for a response before treating the exchange as failed, in milliseconds.
    /// Zero disables the timeout.
    ///
    /// The default value is `1000`.
    pub read_timeout_ms: u64,

    /// Delay between a failed exchange and the next reconnect attempt, in milliseconds.
    ///
    /// The default value is `100`.
    pub reconnect_delay_ms: u64,

    /// Number of times each command of a move burst is retried after a protocol error.
    ///
    /// The default value is `3`.
    pub burst_retries: u32,
}

/// A connection to the daemon's command socket.
pub struct DeviceLink {
    params: LinkParams,

    stream: Option<BufReader<UnixStream>>,

    handler: Option<Box<dyn JointUpdateHandler>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum LinkError {
    #[error("Could not connect to the daemon socket at {0:?}: {1}")]
    ConnectError(PathBuf, io::Error),

    #[error("Could not complete \"{command}\" after {reconnects} reconnects: {source}")]
    RetriesExhausted {
        command: String,
        reconnects: u32,
        source: io::Error,
    },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            bus: 1,
            max_reconnects: 10,
            read_timeout_ms: 1000,
            reconnect_delay_ms: 100,
            burst_retries: 3,
        }
    }
}

impl DeviceLink {
    /// Connect to the daemon.
    ///
    /// The first connection is not retried, if the daemon isn't running there is nothing to
    /// reconnect to.
    pub fn connect(params: LinkParams) -> Result<Self, LinkError> {
        let stream = open_stream(&params)
            .map_err(|e| LinkError::ConnectError(params.socket_path.clone(), e))?;

        info!("Connected to daemon at {:?}", params.socket_path);

        Ok(Self {
            params,
            stream: Some(stream),
            handler: None,
        })
    }

    /// Set the handler which is notified of every completed exchange.
    pub fn set_update_handler(&mut self, handler: Box<dyn JointUpdateHandler>) {
        self.handler = Some(handler);
    }

    /// Returns true if the link currently holds an open connection.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Close the connection. Further requests will attempt to reconnect.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.get_ref().shutdown(Shutdown::Both).ok();
            info!("Link to daemon closed");
        }
    }

    /// Send the wire string and read one response line.
    fn exchange(&mut self, wire: &str) -> io::Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no open connection"))?;

        let inner = stream.get_mut();
        inner.write_all(wire.as_bytes())?;
        inner.write_all(b"\n")?;
        inner.flush()?;

        let mut line = String::new();
        if stream.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "daemon closed the connection",
            ));
        }

        Ok(line)
    }

    /// Drop the current connection and try to open a new one.
    fn reconnect(&mut self) {
        self.close();

        match open_stream(&self.params) {
            Ok(s) => {
                info!("Reconnected to daemon");
                self.stream = Some(s);
            }
            Err(e) => warn!("Reconnect to {:?} failed: {}", self.params.socket_path, e),
        }
    }
}

impl Transport for DeviceLink {
    fn request(&mut self, cmd: &Command) -> Result<Response, LinkError> {
        let wire = cmd.to_wire(self.params.bus);
        let mut num_reconnects = 0;

        loop {
            debug!("-> {}", wire);

            match self.exchange(&wire) {
                Ok(line) => {
                    let response = Response::parse(&line);
                    trace!("<- {}", response.raw());

                    if let Some(ref mut h) = self.handler {
                        h.on_exchange(cmd, &wire, &response);
                    }

                    return Ok(response);
                }
                Err(e) => {
                    warn!("Exchange \"{}\" with node {} failed: {}", wire, cmd.node, e);

                    if num_reconnects >= self.params.max_reconnects {
                        self.close();
                        return Err(LinkError::RetriesExhausted {
                            command: wire,
                            reconnects: num_reconnects,
                            source: e,
                        });
                    }

                    num_reconnects += 1;
                    thread::sleep(Duration::from_millis(self.params.reconnect_delay_ms));
                    self.reconnect();
                }
            }
        }
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&mut self, cmd: &Command) -> Result<Response, LinkError> {
        (**self).request(cmd)
    }
}

/// A link shared between the button reader and the joint driver.
impl<T: Transport> Transport for Rc<RefCell<T>> {
    fn request(&mut self, cmd: &Command) -> Result<Response, LinkError> {
        self.borrow_mut().request(cmd)
    }
}

impl Drop for DeviceLink {
    fn drop(&mut self) {
        self.close();
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn open_stream(params: &LinkParams) -> io::Result<BufReader<UnixStream>> {
    let stream = UnixStream::connect(&params.socket_path)?;

    let timeout = match params.read_timeout_ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    };
    stream.set_read_timeout(timeout)?;

    Ok(BufReader::new(stream))
}
