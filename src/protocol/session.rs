//! Transport session
//!
//! [`TransportSession`] owns one [`ByteChannel`] and drives peek/poke
//! exchanges over it, one at a time. Each exchange walks an explicit state
//! machine:
//!
//! ```text
//! Disconnected --connect/attach--> Idle
//! Idle --> HandshakePending   (magic word, each byte echoed)
//!      --> FrameExchange      (command, address, size, payload echoed; response read)
//!      --> Idle               (always, on success or failure)
//! Idle --disconnect--> Disconnected
//! ```
//!
//! No retry happens here. A failed exchange leaves nothing behind: the next
//! one starts by flushing any stale input.

use super::channel::{ByteChannel, SerialChannel};
use super::codec::{PokeValue, TypeCodec, TypeTag, Value};
use super::frame::{HandshakeStep, RequestFrame, ResponseHeader};
use super::stats::ExchangeStats;
use crate::config::SerialConfig;
use crate::error::{DestraError, Result};
use crate::types::Variable;
use std::time::{Duration, Instant};

/// Longest banner line kept; the rest is discarded
const MAX_BANNER_LEN: usize = 256;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Idle,
    HandshakePending,
    FrameExchange,
}

/// Single-owner peek/poke session
pub struct TransportSession {
    config: SerialConfig,
    channel: Option<Box<dyn ByteChannel>>,
    state: SessionState,
    banner: Option<String>,
    stats: ExchangeStats,
}

impl Default for TransportSession {
    fn default() -> Self {
        Self::new(SerialConfig::default())
    }
}

impl TransportSession {
    pub fn new(config: SerialConfig) -> Self {
        Self {
            config,
            channel: None,
            state: SessionState::Disconnected,
            banner: None,
            stats: ExchangeStats::default(),
        }
    }

    pub fn config(&self) -> &SerialConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    /// Banner line read when the channel was attached, if any
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn stats(&self) -> &ExchangeStats {
        &self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    /// Open a serial port and wait for the target to come up
    ///
    /// Opening a port resets most boards, so the session waits
    /// `settle_ms` before reading the ready banner.
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }

        let channel = SerialChannel::open(port, baud_rate, &self.config)?;
        std::thread::sleep(self.config.settle());
        self.attach(Box::new(channel))
    }

    /// Take ownership of an already open channel
    pub fn attach(&mut self, mut channel: Box<dyn ByteChannel>) -> Result<()> {
        if self.is_connected() {
            self.disconnect();
        }

        let banner = read_line(channel.as_mut(), self.config.banner_timeout())?;
        match &banner {
            Some(line) if line.contains(&self.config.ready_banner) => {
                tracing::info!("Target ready: {}", line)
            }
            Some(line) => tracing::info!("Target banner: {}", line),
            None => tracing::debug!("No banner from target"),
        }
        channel.clear_input()?;

        self.banner = banner;
        self.channel = Some(channel);
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Close the channel; safe to call when already disconnected
    pub fn disconnect(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(e) = channel.close() {
                tracing::warn!("Error while closing channel: {}", e);
            }
            tracing::info!("Disconnected");
        }
        self.banner = None;
        self.state = SessionState::Disconnected;
    }

    /// Read `size` bytes (1..=8) at `address`
    pub fn peek(&mut self, address: u32, size: usize) -> Result<Vec<u8>> {
        if !self.is_connected() {
            return Err(DestraError::NotConnected);
        }
        let frame = RequestFrame::peek(address, size)?;
        let data = self.exchange(&frame)?;
        tracing::debug!("Peek 0x{:04X}: {:02X?}", frame.address(), data);
        Ok(data)
    }

    /// Write `value` at `address` and verify the peer's read-back
    pub fn poke(&mut self, address: u32, value: &PokeValue) -> Result<()> {
        if !self.is_connected() {
            return Err(DestraError::NotConnected);
        }
        let frame = RequestFrame::poke(address, value.encode()?)?;
        self.exchange(&frame)?;
        tracing::info!("Poke 0x{:04X}: {:02X?}", frame.address(), frame.payload());
        Ok(())
    }

    /// Decode bytes by tag name
    pub fn decode(&self, bytes: &[u8], tag: &str) -> Result<Value> {
        TypeCodec::decode(bytes, tag)
    }

    /// Peek a resolved variable and decode it by its base type
    ///
    /// Arrays and structs decode as hex.
    pub fn peek_variable(&mut self, variable: &Variable) -> Result<Value> {
        if !variable.status.is_readable() {
            tracing::debug!("Peeking {} with {} address", variable.name, variable.status);
        }
        let tag = if variable.is_scalar() {
            variable.base_type.parse::<TypeTag>()?
        } else {
            TypeTag::Hex
        };
        let bytes = self.peek(variable.address as u32, variable.size as usize)?;
        TypeCodec::decode_tag(&bytes, tag)
    }

    /// Encode `value` by the variable's base type and poke it
    pub fn poke_variable(&mut self, variable: &Variable, value: &Value) -> Result<()> {
        let tag: TypeTag = variable.base_type.parse()?;
        let bytes = TypeCodec::encode(value, tag)?;
        if bytes.len() as u64 != variable.size {
            return Err(DestraError::InvalidValue(format!(
                "{} encodes to {} byte(s) but {} is {} byte(s)",
                value,
                bytes.len(),
                variable.name,
                variable.size
            )));
        }
        self.poke(variable.address as u32, &PokeValue::Raw(bytes))
    }

    /// Peek each variable in turn; one result per variable, in order
    pub fn sample(&mut self, variables: &[Variable]) -> Vec<Result<Value>> {
        variables.iter().map(|v| self.peek_variable(v)).collect()
    }

    fn exchange(&mut self, frame: &RequestFrame) -> Result<Vec<u8>> {
        let mut channel = self.channel.take().ok_or(DestraError::NotConnected)?;
        let started = Instant::now();

        // Protocol errors carry their own context; link errors get it here
        let result = self.run_exchange(channel.as_mut(), frame).map_err(|e| {
            if e.is_protocol_error() {
                e
            } else {
                e.with_context(frame.context().to_string())
            }
        });

        self.channel = Some(channel);
        self.state = SessionState::Idle;

        match &result {
            Ok(data) => self
                .stats
                .record_success(started.elapsed().as_micros() as u64, data.len() as u64),
            Err(e) => {
                self.stats.record_failure();
                tracing::warn!("{} failed: {}", frame.context(), e);
            }
        }
        result
    }

    fn run_exchange(
        &mut self,
        channel: &mut dyn ByteChannel,
        frame: &RequestFrame,
    ) -> Result<Vec<u8>> {
        let ctx = frame.context();
        let timeout = self.config.read_timeout();

        channel.clear_input()?;

        self.state = SessionState::HandshakePending;
        for (step, byte) in frame.steps() {
            if step == HandshakeStep::Command {
                self.state = SessionState::FrameExchange;
            }
            let got = send_echoed(channel, byte, timeout)?;
            if got != Some(byte) {
                return Err(if step.is_magic() {
                    DestraError::HandshakeFailure {
                        ctx,
                        step,
                        expected: byte,
                        got,
                    }
                } else {
                    DestraError::EchoMismatch {
                        ctx,
                        step,
                        expected: byte,
                        got,
                    }
                });
            }
        }

        let header = channel.read(ResponseHeader::LEN, timeout)?;
        let header = ResponseHeader::parse(&header, ctx)?;
        if !header.status.is_success() {
            return Err(DestraError::DeviceStatus {
                ctx,
                status: header.status,
            });
        }

        let data = channel.read(frame.size(), timeout)?;
        if data.len() < frame.size() {
            return Err(DestraError::ShortRead {
                ctx,
                received: data.len(),
            });
        }

        if !frame.payload().is_empty() && data != frame.payload() {
            return Err(DestraError::VerifyMismatch {
                ctx,
                sent: frame.payload().to_vec(),
                received: data,
            });
        }

        Ok(data)
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Send one byte and wait for its echo; `None` on timeout
fn send_echoed(channel: &mut dyn ByteChannel, byte: u8, timeout: Duration) -> Result<Option<u8>> {
    channel.write(&[byte])?;
    Ok(channel.read(1, timeout)?.first().copied())
}

/// Read one text line, or `None` if nothing arrives within `timeout`
fn read_line(channel: &mut dyn ByteChannel, timeout: Duration) -> Result<Option<String>> {
    let mut line = Vec::new();
    while line.len() < MAX_BANNER_LEN {
        match channel.read(1, timeout)?.first() {
            Some(b'\n') | None => break,
            Some(&b) => line.push(b),
        }
    }
    let text = String::from_utf8_lossy(&line).trim().to_string();
    Ok((!text.is_empty()).then_some(text))
}
