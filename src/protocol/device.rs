//! Simulated peer firmware
//!
//! [`SimulatedDevice`] implements [`ByteChannel`] by running the target side
//! of the peek/poke protocol against an in-memory RAM image. It echoes each
//! request byte, range-checks requests the way the firmware does, and
//! answers with a status header plus data.
//!
//! # Faults
//!
//! One-shot [`Fault`]s can be queued to exercise error paths: corrupted or
//! missing echoes, forced status codes, truncated data, corrupted poke
//! read-back and a garbled response header. Each fault fires once and is
//! then discarded.
//!
//! # Example
//!
//! ```ignore
//! use destra_rs::protocol::{device::SimulatedDevice, session::TransportSession};
//!
//! let device = SimulatedDevice::new().with_banner("ECHO_TEST_READY");
//! let mut session = TransportSession::default();
//! session.attach(Box::new(device.clone()))?;
//! session.poke(0x0100, &PokeValue::int(42))?;
//! assert_eq!(device.read_memory(0x0100, 1), vec![42]);
//! ```

use super::channel::ByteChannel;
use super::frame::{
    Command, DecodeEvent, FrameDecoder, RawRequest, ResponseHeader, StatusCode, MAX_FRAME_SIZE,
};
use crate::error::{DestraError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Default simulated RAM size, the full 16-bit address space
pub const DEFAULT_MEMORY_SIZE: usize = 0x1_0000;

/// Injectable one-shot fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Echo the complement of the request byte at this position, then drop the frame
    CorruptEcho(usize),
    /// Do not echo the request byte at this position, then drop the frame
    DropEcho(usize),
    /// Answer the next complete request with this error status and no data
    ForceStatus(StatusCode),
    /// Send only this many data bytes for the next complete request
    TruncateData(usize),
    /// Flip the first read-back byte of the next poke without touching memory
    CorruptReadback,
    /// Send a response header with a broken magic word
    CorruptHeader,
}

#[derive(Debug)]
struct DeviceState {
    memory: Vec<u8>,
    decoder: FrameDecoder,
    frame_pos: usize,
    outbound: VecDeque<u8>,
    faults: Vec<Fault>,
    handled: Vec<RawRequest>,
    open: bool,
}

impl DeviceState {
    fn take_fault(&mut self, pred: impl Fn(&Fault) -> bool) -> Option<Fault> {
        let idx = self.faults.iter().position(pred)?;
        Some(self.faults.remove(idx))
    }

    fn drop_frame(&mut self) {
        self.decoder.reset();
        self.frame_pos = 0;
    }

    fn receive(&mut self, byte: u8) {
        let pos = self.frame_pos;
        self.frame_pos += 1;

        let echo_fault = self.take_fault(|f| {
            matches!(f, Fault::CorruptEcho(p) | Fault::DropEcho(p) if *p == pos)
        });
        match echo_fault {
            Some(Fault::CorruptEcho(_)) => {
                self.outbound.push_back(!byte);
                self.drop_frame();
                return;
            }
            Some(_) => {
                self.drop_frame();
                return;
            }
            None => self.outbound.push_back(byte),
        }

        match self.decoder.push(byte) {
            DecodeEvent::Pending => {}
            DecodeEvent::Rejected => self.frame_pos = 0,
            DecodeEvent::Complete(request) => {
                self.frame_pos = 0;
                self.respond(request);
            }
        }
    }

    fn check(&self, request: &RawRequest) -> StatusCode {
        let size = request.size as usize;
        if size == 0 || size > MAX_FRAME_SIZE {
            StatusCode::SizeError
        } else if request.address as usize + size > self.memory.len() {
            StatusCode::AddressRangeError
        } else {
            StatusCode::Success
        }
    }

    fn respond(&mut self, request: RawRequest) {
        let forced = self.take_fault(|f| matches!(f, Fault::ForceStatus(_)));
        let status = match forced {
            Some(Fault::ForceStatus(status)) if !status.is_success() => status,
            _ => self.check(&request),
        };

        let mut header = ResponseHeader {
            command: request.command,
            status,
        }
        .encode();
        if self
            .take_fault(|f| matches!(f, Fault::CorruptHeader))
            .is_some()
        {
            header[1] = 0x00;
        }
        self.outbound.extend(header);

        if status.is_success() {
            let start = request.address as usize;
            let end = start + request.size as usize;
            let mut data = match request.command {
                Command::Peek => self.memory[start..end].to_vec(),
                Command::Poke => {
                    self.memory[start..end].copy_from_slice(&request.payload);
                    let mut readback = self.memory[start..end].to_vec();
                    if self
                        .take_fault(|f| matches!(f, Fault::CorruptReadback))
                        .is_some()
                    {
                        readback[0] ^= 0xFF;
                    }
                    readback
                }
            };
            if let Some(Fault::TruncateData(n)) =
                self.take_fault(|f| matches!(f, Fault::TruncateData(_)))
            {
                data.truncate(n);
            }
            self.outbound.extend(data);
        }

        self.handled.push(request);
    }
}

/// In-memory stand-in for the target firmware
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDevice {
    /// Device with 64 KiB of zeroed RAM
    pub fn new() -> Self {
        Self::with_memory_size(DEFAULT_MEMORY_SIZE)
    }

    /// Device whose RAM ends at `size`; requests beyond it get ADDRESS_RANGE_ERROR
    pub fn with_memory_size(size: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                memory: vec![0; size],
                decoder: FrameDecoder::new(),
                frame_pos: 0,
                outbound: VecDeque::new(),
                faults: Vec::new(),
                handled: Vec::new(),
                open: true,
            })),
        }
    }

    /// Queue a ready banner line, as the firmware prints after reset
    pub fn with_banner(self, banner: &str) -> Self {
        {
            let mut state = self.lock();
            state.outbound.extend(banner.bytes());
            state.outbound.extend(b"\r\n");
        }
        self
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a one-shot fault
    pub fn inject(&self, fault: Fault) {
        self.lock().faults.push(fault);
    }

    /// Faults queued but not yet triggered
    pub fn pending_faults(&self) -> usize {
        self.lock().faults.len()
    }

    /// Preload RAM at `address`
    pub fn load(&self, address: usize, bytes: &[u8]) {
        let mut state = self.lock();
        state.memory[address..address + bytes.len()].copy_from_slice(bytes);
    }

    /// Copy `len` bytes of RAM starting at `address`
    pub fn read_memory(&self, address: usize, len: usize) -> Vec<u8> {
        self.lock().memory[address..address + len].to_vec()
    }

    /// Requests that reached the response stage, in order
    pub fn handled_requests(&self) -> Vec<RawRequest> {
        self.lock().handled.clone()
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

impl ByteChannel for SimulatedDevice {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(DestraError::NotConnected);
        }
        for &b in bytes {
            state.receive(b);
        }
        Ok(())
    }

    fn read(&mut self, n: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let mut state = self.lock();
        let count = n.min(state.outbound.len());
        Ok(state.outbound.drain(..count).collect())
    }

    fn clear_input(&mut self) -> Result<()> {
        self.lock().outbound.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.lock().open = false;
        Ok(())
    }
}
