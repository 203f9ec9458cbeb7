//! Controller-side bookkeeping for one worker.

use std::any::Any;
use std::thread::JoinHandle;
use std::time::Instant;

use tandem_core::WorkerId;
use tandem_wire::{Command, Response};
use tracing::warn;

use crate::channel::{ChannelError, ControllerEndpoint};
use crate::error::{BatchError, WorkerExit};

/// Lifecycle of a worker as seen by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Thread started, no response received yet.
    Spawned,
    /// At least one response received.
    Running,
    /// Closed, crashed, or timed out. Every further request is rejected
    /// locally with [`BatchError::ChannelClosed`].
    Closed,
}

pub(crate) type WorkerThread = JoinHandle<Result<(), WorkerExit>>;

pub(crate) struct WorkerHandle {
    id: WorkerId,
    endpoint: Option<ControllerEndpoint>,
    thread: Option<WorkerThread>,
    seed: u64,
    state: WorkerState,
    /// Fast-forward bound the worker last acknowledged.
    fast_forward_max: u64,
    /// Requests sent before the endpoint was dropped.
    retired_sent: u64,
}

impl WorkerHandle {
    pub fn new(id: WorkerId, endpoint: ControllerEndpoint, thread: WorkerThread, seed: u64) -> Self {
        Self {
            id,
            endpoint: Some(endpoint),
            thread: Some(thread),
            seed,
            state: WorkerState::Spawned,
            fast_forward_max: 0,
            retired_sent: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn fast_forward_max(&self) -> u64 {
        self.fast_forward_max
    }

    pub fn set_fast_forward_max(&mut self, max: u64) {
        self.fast_forward_max = max;
    }

    pub fn is_closed(&self) -> bool {
        self.state == WorkerState::Closed
    }

    pub fn messages_sent(&self) -> u64 {
        self.endpoint
            .as_ref()
            .map_or(self.retired_sent, ControllerEndpoint::messages_sent)
    }

    /// Send one request. A closed handle rejects without touching the
    /// channel; a disconnected channel means the thread is gone.
    pub fn send(&mut self, cmd: &Command) -> Result<(), BatchError> {
        let worker = self.id;
        if self.is_closed() {
            return Err(BatchError::ChannelClosed { worker });
        }
        let Some(endpoint) = self.endpoint.as_mut() else {
            return Err(BatchError::ChannelClosed { worker });
        };
        match endpoint.send(cmd) {
            Ok(()) => Ok(()),
            Err(ChannelError::Disconnected) => {
                self.mark_lost("channel disconnected on send");
                Err(BatchError::WorkerCrashed { worker })
            }
            // The previous request was never answered; the pairing of
            // requests and responses is lost.
            Err(_) => {
                let pending = endpoint.outstanding().unwrap_or("none");
                warn!(worker = %worker, pending, "request still outstanding");
                self.state = WorkerState::Closed;
                Err(BatchError::ChannelClosed { worker })
            }
        }
    }

    /// Receive the response to the outstanding request.
    pub fn recv(&mut self, deadline: Option<Instant>) -> Result<Response, BatchError> {
        let worker = self.id;
        let Some(endpoint) = self.endpoint.as_mut() else {
            return Err(BatchError::ChannelClosed { worker });
        };
        match endpoint.recv(deadline) {
            Ok(resp) => {
                if self.state == WorkerState::Spawned {
                    self.state = WorkerState::Running;
                }
                Ok(resp)
            }
            Err(ChannelError::Disconnected) => {
                self.mark_lost("channel disconnected");
                Err(BatchError::WorkerCrashed { worker })
            }
            Err(ChannelError::Timeout) => {
                self.mark_lost("response timed out");
                Err(BatchError::Timeout { worker })
            }
            Err(ChannelError::Wire(error)) => Err(BatchError::Protocol { worker, error }),
            Err(ChannelError::Busy | ChannelError::Idle) => {
                Err(BatchError::ChannelClosed { worker })
            }
        }
    }

    fn mark_lost(&mut self, why: &'static str) {
        warn!(worker = %self.id, why, "worker lost");
        self.state = WorkerState::Closed;
    }

    pub fn mark_closed(&mut self) {
        self.state = WorkerState::Closed;
    }

    /// Drop the controller's end of the channel. A worker blocked on its
    /// next request then sees a hangup and exits.
    pub fn hang_up(&mut self) {
        if let Some(endpoint) = self.endpoint.take() {
            self.retired_sent = endpoint.messages_sent();
        }
        self.state = WorkerState::Closed;
    }

    pub fn has_thread(&self) -> bool {
        self.thread.is_some()
    }

    /// Join the thread if it has already finished.
    pub fn try_join(&mut self) -> Option<Result<(), WorkerExit>> {
        if !self.thread.as_ref()?.is_finished() {
            return None;
        }
        self.join()
    }

    /// Block until the thread exits.
    pub fn join(&mut self) -> Option<Result<(), WorkerExit>> {
        let thread = self.thread.take()?;
        Some(thread.join().unwrap_or_else(|payload| {
            Err(WorkerExit::Panicked {
                message: panic_message(payload.as_ref()),
            })
        }))
    }

    /// Give up on the thread. Returns whether there was one to abandon.
    pub fn detach(&mut self) -> bool {
        self.thread.take().is_some()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, Incoming};
    use std::thread;
    use std::time::Duration;

    fn spawn_echo(reply: Option<Response>) -> WorkerHandle {
        let (ctl, wrk) = channel::pair();
        let thread = thread::spawn(move || {
            if let Incoming::Command(_) = wrk.recv() {
                if let Some(resp) = reply {
                    wrk.send(&resp);
                } else {
                    thread::sleep(Duration::from_millis(200));
                }
            }
            Ok(())
        });
        WorkerHandle::new(WorkerId(0), ctl, thread, 9)
    }

    #[test]
    fn first_response_moves_to_running() {
        let mut h = spawn_echo(Some(Response::Ack));
        assert_eq!(h.state(), WorkerState::Spawned);
        h.send(&Command::GetSeed).unwrap();
        assert_eq!(h.recv(None), Ok(Response::Ack));
        assert_eq!(h.state(), WorkerState::Running);
        assert_eq!(h.join(), Some(Ok(())));
    }

    #[test]
    fn timeout_closes_handle() {
        let mut h = spawn_echo(None);
        h.send(&Command::Reset).unwrap();
        let deadline = Some(Instant::now() + Duration::from_millis(10));
        assert_eq!(
            h.recv(deadline),
            Err(BatchError::Timeout { worker: WorkerId(0) })
        );
        assert!(h.is_closed());
        assert_eq!(
            h.send(&Command::Reset),
            Err(BatchError::ChannelClosed { worker: WorkerId(0) })
        );
        assert_eq!(h.messages_sent(), 1);
    }

    #[test]
    fn panicking_thread_reports_message() {
        let (ctl, wrk) = channel::pair();
        let thread = thread::spawn(move || -> Result<(), WorkerExit> {
            let _ = wrk.recv();
            panic!("boom")
        });
        let mut h = WorkerHandle::new(WorkerId(2), ctl, thread, 0);
        h.send(&Command::Reset).unwrap();
        assert_eq!(
            h.recv(None),
            Err(BatchError::WorkerCrashed { worker: WorkerId(2) })
        );
        assert_eq!(
            h.join(),
            Some(Err(WorkerExit::Panicked {
                message: "boom".into()
            }))
        );
    }

    #[test]
    fn hang_up_keeps_message_count() {
        let mut h = spawn_echo(Some(Response::Ack));
        h.send(&Command::GetSeed).unwrap();
        h.recv(None).unwrap();
        h.hang_up();
        assert_eq!(h.messages_sent(), 1);
        assert!(h.is_closed());
        assert!(h.join().is_some());
        assert!(!h.has_thread());
    }
}
