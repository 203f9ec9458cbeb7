//! Private request/response channel between the controller and one worker.
//!
//! Each direction is a bounded(1) crossbeam channel of encoded frames.
//! The controller endpoint enforces the no-pipelining rule: a second
//! request cannot be sent until the first one's response has been
//! received, so both capacities of 1 are never exceeded and sends never
//! block.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tandem_wire::{decode_command, decode_response, encode_command, encode_response};
use tandem_wire::{Command, Response, WireError};

/// Failure of a controller-side channel operation.
#[derive(Debug, PartialEq)]
pub(crate) enum ChannelError {
    /// A request is already outstanding.
    Busy,
    /// `recv` called with no request outstanding.
    Idle,
    /// The worker's end has been dropped.
    Disconnected,
    /// No response before the deadline.
    Timeout,
    /// The response frame could not be decoded.
    Wire(WireError),
}

/// Create a connected pair of endpoints.
pub(crate) fn pair() -> (ControllerEndpoint, WorkerEndpoint) {
    let (req_tx, req_rx) = crossbeam_channel::bounded(1);
    let (resp_tx, resp_rx) = crossbeam_channel::bounded(1);
    (
        ControllerEndpoint {
            tx: req_tx,
            rx: resp_rx,
            outstanding: None,
            sent: 0,
        },
        WorkerEndpoint {
            rx: req_rx,
            tx: resp_tx,
        },
    )
}

/// The controller's end of a worker channel.
pub(crate) struct ControllerEndpoint {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    /// Name of the command awaiting a response, if any.
    outstanding: Option<&'static str>,
    sent: u64,
}

impl ControllerEndpoint {
    /// Send one request. Fails if a request is already outstanding.
    pub fn send(&mut self, cmd: &Command) -> Result<(), ChannelError> {
        self.send_frame(encode_command(cmd), cmd.name())
    }

    fn send_frame(&mut self, frame: Vec<u8>, name: &'static str) -> Result<(), ChannelError> {
        if self.outstanding.is_some() {
            return Err(ChannelError::Busy);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::Busy,
            TrySendError::Disconnected(_) => ChannelError::Disconnected,
        })?;
        self.outstanding = Some(name);
        self.sent += 1;
        Ok(())
    }

    /// Send an arbitrary frame, bypassing command encoding.
    #[cfg(test)]
    pub fn send_raw(&mut self, frame: Vec<u8>) -> Result<(), ChannelError> {
        self.send_frame(frame, "raw")
    }

    /// Wait for the outstanding request's response.
    ///
    /// `deadline = None` blocks until the worker answers or disconnects.
    pub fn recv(&mut self, deadline: Option<Instant>) -> Result<Response, ChannelError> {
        if self.outstanding.is_none() {
            return Err(ChannelError::Idle);
        }
        let frame = match deadline {
            None => self.rx.recv().map_err(|_| ChannelError::Disconnected)?,
            Some(at) => {
                let wait = at.saturating_duration_since(Instant::now());
                self.rx.recv_timeout(wait).map_err(|e| match e {
                    RecvTimeoutError::Timeout => ChannelError::Timeout,
                    RecvTimeoutError::Disconnected => ChannelError::Disconnected,
                })?
            }
        };
        self.outstanding = None;
        decode_response(&frame).map_err(ChannelError::Wire)
    }

    /// Name of the command awaiting a response.
    pub fn outstanding(&self) -> Option<&'static str> {
        self.outstanding
    }

    /// Number of requests sent over this channel.
    pub fn messages_sent(&self) -> u64 {
        self.sent
    }
}

/// The worker's end of its channel.
pub(crate) struct WorkerEndpoint {
    rx: Receiver<Vec<u8>>,
    tx: Sender<Vec<u8>>,
}

/// Outcome of waiting for the next request.
pub(crate) enum Incoming {
    /// A well-formed command.
    Command(Command),
    /// A frame that failed to decode.
    Invalid(WireError),
    /// The controller dropped its endpoint.
    Hangup,
}

impl WorkerEndpoint {
    /// Block until the next request arrives.
    pub fn recv(&self) -> Incoming {
        match self.rx.recv() {
            Ok(frame) => match decode_command(&frame) {
                Ok(cmd) => Incoming::Command(cmd),
                Err(e) => Incoming::Invalid(e),
            },
            Err(_) => Incoming::Hangup,
        }
    }

    /// Send the response to the current request.
    ///
    /// Returns `false` if the controller has dropped its endpoint.
    pub fn send(&self, resp: &Response) -> bool {
        self.tx.send(encode_response(resp)).is_ok()
    }
}

/// Convert a relative timeout into an absolute barrier deadline.
pub(crate) fn deadline_after(timeout: Option<Duration>) -> Option<Instant> {
    timeout.map(|t| Instant::now() + t)
}
