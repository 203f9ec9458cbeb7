//! Binary encode/decode for command and response frames.
//!
//! All integers are little-endian. Sequences are prefixed with a `u32`
//! element count. Encoding writes into a growable buffer and cannot fail;
//! decoding validates every length against the bytes actually remaining,
//! so a corrupt count never triggers a large allocation.

use smallvec::SmallVec;
use tandem_core::{Action, ActionSpace, FieldLayout, Info, ObsSchema, Spaces};

use crate::error::WireError;
use crate::types::{Command, Response, SeedReport, StepReply, WorkerFault};
use crate::*;

// ── Fault codes ─────────────────────────────────────────────────

const FAULT_SETUP: u8 = 1;
const FAULT_STEP_FAILED: u8 = 2;
const FAULT_RESET_EXHAUSTED: u8 = 3;
const FAULT_ENCODING: u8 = 4;
const FAULT_INVALID_ACTION: u8 = 5;

// ── Primitive writers ───────────────────────────────────────────

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    put_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn put_f64_vec(buf: &mut Vec<u8>, values: &[f64]) {
    put_u32(buf, values.len() as u32);
    for &v in values {
        put_f64(buf, v);
    }
}

fn put_map(buf: &mut Vec<u8>, map: &Info) {
    put_u32(buf, map.len() as u32);
    for (key, &value) in map {
        put_str(buf, key);
        put_f64(buf, value);
    }
}

// ── Primitive reader ────────────────────────────────────────────

/// Cursor over a frame's bytes.
struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.buf.len() < n {
            return Err(WireError::Truncated);
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn f64(&mut self) -> Result<f64, WireError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(b))
    }

    fn bool(&mut self) -> Result<bool, WireError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::MalformedFrame {
                detail: format!("invalid bool byte {other}"),
            }),
        }
    }

    /// Read a `u32` element count and check that `count * elem_size`
    /// bytes remain.
    fn count(&mut self, elem_size: usize) -> Result<usize, WireError> {
        let n = self.u32()? as usize;
        if n.saturating_mul(elem_size) > self.buf.len() {
            return Err(WireError::Truncated);
        }
        Ok(n)
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.count(1)?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| WireError::MalformedFrame {
            detail: format!("invalid UTF-8 string: {e}"),
        })
    }

    fn f64_vec(&mut self) -> Result<Vec<f64>, WireError> {
        let n = self.count(8)?;
        (0..n).map(|_| self.f64()).collect()
    }

    fn map(&mut self) -> Result<Info, WireError> {
        // Each entry is at least a 4-byte key length plus an 8-byte value.
        let n = self.count(12)?;
        let mut map = Info::with_capacity(n);
        for _ in 0..n {
            let key = self.string()?;
            let value = self.f64()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn finish(self) -> Result<(), WireError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(WireError::MalformedFrame {
                detail: format!("{} trailing bytes", self.buf.len()),
            })
        }
    }
}

// ── Commands ────────────────────────────────────────────────────

/// Encode a command into a new frame.
pub fn encode_command(cmd: &Command) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    match cmd {
        Command::GetSpaces => put_u8(&mut buf, CMD_GET_SPACES),
        Command::Step(action) => {
            put_u8(&mut buf, CMD_STEP);
            put_f64_vec(&mut buf, action.as_slice());
        }
        Command::Reset => put_u8(&mut buf, CMD_RESET),
        Command::Close => put_u8(&mut buf, CMD_CLOSE),
        Command::SetChunkSize(n) => {
            put_u8(&mut buf, CMD_SET_CHUNK_SIZE);
            put_u64(&mut buf, *n);
        }
        Command::SetFastForward(max) => {
            put_u8(&mut buf, CMD_SET_FAST_FORWARD);
            put_u64(&mut buf, *max);
        }
        Command::GetSeed => put_u8(&mut buf, CMD_GET_SEED),
        Command::GetParameters => put_u8(&mut buf, CMD_GET_PARAMETERS),
    }
    buf
}

/// Decode a command frame.
///
/// Returns [`WireError::UnknownTag`] for a tag outside the command set,
/// including response tags.
pub fn decode_command(frame: &[u8]) -> Result<Command, WireError> {
    let mut r = FrameReader::new(frame);
    let tag = r.u8().map_err(|_| WireError::EmptyFrame)?;
    let cmd = match tag {
        CMD_GET_SPACES => Command::GetSpaces,
        CMD_STEP => Command::Step(Action::new(r.f64_vec()?)),
        CMD_RESET => Command::Reset,
        CMD_CLOSE => Command::Close,
        CMD_SET_CHUNK_SIZE => Command::SetChunkSize(r.u64()?),
        CMD_SET_FAST_FORWARD => Command::SetFastForward(r.u64()?),
        CMD_GET_SEED => Command::GetSeed,
        CMD_GET_PARAMETERS => Command::GetParameters,
        tag => return Err(WireError::UnknownTag { tag }),
    };
    r.finish()?;
    Ok(cmd)
}

// ── Responses ───────────────────────────────────────────────────

fn put_spaces(buf: &mut Vec<u8>, spaces: &Spaces) {
    let fields = spaces.observation.fields();
    put_u32(buf, fields.len() as u32);
    for field in fields {
        put_str(buf, &field.name);
        put_u64(buf, field.len as u64);
    }
    put_u64(buf, spaces.action.dim() as u64);
    match spaces.action.bounds() {
        Some((low, high)) => {
            put_u8(buf, 1);
            put_f64(buf, low);
            put_f64(buf, high);
        }
        None => put_u8(buf, 0),
    }
}

fn read_usize(r: &mut FrameReader<'_>) -> Result<usize, WireError> {
    let v = r.u64()?;
    usize::try_from(v).map_err(|_| WireError::MalformedFrame {
        detail: format!("length {v} does not fit in usize"),
    })
}

fn read_spaces(r: &mut FrameReader<'_>) -> Result<Spaces, WireError> {
    // Each field is at least a 4-byte name length plus an 8-byte length.
    let n = r.count(12)?;
    let mut fields = Vec::with_capacity(n);
    for _ in 0..n {
        let name = r.string()?;
        let len = read_usize(r)?;
        fields.push(FieldLayout::new(name, len));
    }
    let observation = ObsSchema::new(fields).map_err(|e| WireError::MalformedFrame {
        detail: e.to_string(),
    })?;
    let dim = read_usize(r)?;
    let action = if r.bool()? {
        let low = r.f64()?;
        let high = r.f64()?;
        ActionSpace::bounded(dim, low, high)
    } else {
        ActionSpace::new(dim)
    };
    Ok(Spaces {
        observation,
        action,
    })
}

fn put_fault(buf: &mut Vec<u8>, fault: &WorkerFault) {
    match fault {
        WorkerFault::Setup { reason } => {
            put_u8(buf, FAULT_SETUP);
            put_str(buf, reason);
        }
        WorkerFault::StepFailed { reason } => {
            put_u8(buf, FAULT_STEP_FAILED);
            put_str(buf, reason);
        }
        WorkerFault::ResetExhausted { attempts } => {
            put_u8(buf, FAULT_RESET_EXHAUSTED);
            put_u32(buf, *attempts);
        }
        WorkerFault::Encoding { reason } => {
            put_u8(buf, FAULT_ENCODING);
            put_str(buf, reason);
        }
        WorkerFault::InvalidAction { reason } => {
            put_u8(buf, FAULT_INVALID_ACTION);
            put_str(buf, reason);
        }
    }
}

fn read_fault(r: &mut FrameReader<'_>) -> Result<WorkerFault, WireError> {
    match r.u8()? {
        FAULT_SETUP => Ok(WorkerFault::Setup { reason: r.string()? }),
        FAULT_STEP_FAILED => Ok(WorkerFault::StepFailed { reason: r.string()? }),
        FAULT_RESET_EXHAUSTED => Ok(WorkerFault::ResetExhausted { attempts: r.u32()? }),
        FAULT_ENCODING => Ok(WorkerFault::Encoding { reason: r.string()? }),
        FAULT_INVALID_ACTION => Ok(WorkerFault::InvalidAction { reason: r.string()? }),
        code => Err(WireError::UnknownFaultCode { code }),
    }
}

/// Encode a response into a new frame.
pub fn encode_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    match resp {
        Response::Spaces(spaces) => {
            put_u8(&mut buf, RESP_SPACES);
            put_spaces(&mut buf, spaces);
        }
        Response::Step(reply) => {
            put_u8(&mut buf, RESP_STEP);
            put_f64_vec(&mut buf, &reply.observation);
            put_f64(&mut buf, reply.reward);
            put_u8(&mut buf, u8::from(reply.done));
            put_map(&mut buf, &reply.info);
        }
        Response::Reset(observation) => {
            put_u8(&mut buf, RESP_RESET);
            put_f64_vec(&mut buf, observation);
        }
        Response::Closed => put_u8(&mut buf, RESP_CLOSED),
        Response::Ack => put_u8(&mut buf, RESP_ACK),
        Response::Seed(report) => {
            put_u8(&mut buf, RESP_SEED);
            put_u64(&mut buf, report.seed);
            put_u32(&mut buf, report.propagated.len() as u32);
            for &s in &report.propagated {
                put_u64(&mut buf, s);
            }
        }
        Response::Parameters(params) => {
            put_u8(&mut buf, RESP_PARAMETERS);
            put_map(&mut buf, params);
        }
        Response::Fault(fault) => {
            put_u8(&mut buf, RESP_FAULT);
            put_fault(&mut buf, fault);
        }
    }
    buf
}

/// Decode a response frame.
pub fn decode_response(frame: &[u8]) -> Result<Response, WireError> {
    let mut r = FrameReader::new(frame);
    let tag = r.u8().map_err(|_| WireError::EmptyFrame)?;
    let resp = match tag {
        RESP_SPACES => Response::Spaces(read_spaces(&mut r)?),
        RESP_STEP => {
            let observation = r.f64_vec()?;
            let reward = r.f64()?;
            let done = r.bool()?;
            let info = r.map()?;
            Response::Step(StepReply {
                observation,
                reward,
                done,
                info,
            })
        }
        RESP_RESET => Response::Reset(r.f64_vec()?),
        RESP_CLOSED => Response::Closed,
        RESP_ACK => Response::Ack,
        RESP_SEED => {
            let seed = r.u64()?;
            let n = r.count(8)?;
            let mut propagated = SmallVec::with_capacity(n);
            for _ in 0..n {
                propagated.push(r.u64()?);
            }
            Response::Seed(SeedReport { seed, propagated })
        }
        RESP_PARAMETERS => Response::Parameters(r.map()?),
        RESP_FAULT => Response::Fault(read_fault(&mut r)?),
        tag => return Err(WireError::UnknownTag { tag }),
    };
    r.finish()?;
    Ok(resp)
}
