//! Peek/poke frame layout
//!
//! Request on the wire:
//!
//! ```text
//! CA FE <CMD> <ADDR_LO> <ADDR_HI> <SIZE> [PAYLOAD; SIZE]   (payload on POKE only)
//! ```
//!
//! Every request byte is echoed back by the peer before the next one is
//! sent. The response is `CA FE <CMD> <STATUS>` followed by SIZE data bytes
//! when STATUS is success.

use crate::error::{DestraError, Result};
use std::fmt;

/// Two-byte preamble opening every request and response
pub const MAGIC: [u8; 2] = [0xCA, 0xFE];

/// Largest transfer a single frame can carry
pub const MAX_FRAME_SIZE: usize = 8;

/// Highest addressable byte on the target
pub const MAX_ADDRESS: u32 = 0xFFFF;

/// Request command byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Peek,
    Poke,
}

impl Command {
    pub fn code(self) -> u8 {
        match self {
            Command::Peek => 0xF1,
            Command::Poke => 0xF2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0xF1 => Some(Command::Peek),
            0xF2 => Some(Command::Poke),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Peek => write!(f, "PEEK"),
            Command::Poke => write!(f, "POKE"),
        }
    }
}

/// Response status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Success,
    AddressRangeError,
    SizeError,
    Unknown(u8),
}

impl StatusCode {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => StatusCode::Success,
            1 => StatusCode::AddressRangeError,
            2 => StatusCode::SizeError,
            other => StatusCode::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            StatusCode::Success => 0,
            StatusCode::AddressRangeError => 1,
            StatusCode::SizeError => 2,
            StatusCode::Unknown(other) => other,
        }
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Success => write!(f, "success"),
            StatusCode::AddressRangeError => write!(f, "address range error"),
            StatusCode::SizeError => write!(f, "size error"),
            StatusCode::Unknown(code) => write!(f, "unknown status 0x{:02X}", code),
        }
    }
}

/// Position of a byte within the echoed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeStep {
    MagicHigh,
    MagicLow,
    Command,
    AddressLow,
    AddressHigh,
    Size,
    Payload(usize),
}

impl HandshakeStep {
    /// Magic-word steps fail as handshake failures rather than echo mismatches
    pub fn is_magic(self) -> bool {
        matches!(self, HandshakeStep::MagicHigh | HandshakeStep::MagicLow)
    }
}

impl fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeStep::MagicHigh => write!(f, "magic high"),
            HandshakeStep::MagicLow => write!(f, "magic low"),
            HandshakeStep::Command => write!(f, "command"),
            HandshakeStep::AddressLow => write!(f, "address low"),
            HandshakeStep::AddressHigh => write!(f, "address high"),
            HandshakeStep::Size => write!(f, "size"),
            HandshakeStep::Payload(i) => write!(f, "payload[{}]", i),
        }
    }
}

/// Identifies one exchange in error reports and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExchangeContext {
    pub command: Command,
    pub address: u16,
    pub size: u8,
}

impl fmt::Display for ExchangeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} @0x{:04X} size {}",
            self.command, self.address, self.size
        )
    }
}

/// Validate an address against the 16-bit target space
pub fn check_address(address: u32) -> Result<u16> {
    if address > MAX_ADDRESS {
        return Err(DestraError::AddressOutOfRange { address });
    }
    Ok(address as u16)
}

/// Validate a transfer size against 1..=8
pub fn check_size(size: usize) -> Result<u8> {
    if size == 0 || size > MAX_FRAME_SIZE {
        return Err(DestraError::SizeOutOfRange { size });
    }
    Ok(size as u8)
}

/// A validated peek or poke request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    command: Command,
    address: u16,
    size: u8,
    payload: Vec<u8>,
}

impl RequestFrame {
    /// Build a PEEK request for `size` bytes at `address`
    pub fn peek(address: u32, size: usize) -> Result<Self> {
        let address = check_address(address)?;
        let size = check_size(size)?;
        Ok(Self {
            command: Command::Peek,
            address,
            size,
            payload: Vec::new(),
        })
    }

    /// Build a POKE request writing `payload` at `address`
    pub fn poke(address: u32, payload: Vec<u8>) -> Result<Self> {
        let address = check_address(address)?;
        let size = check_size(payload.len())?;
        Ok(Self {
            command: Command::Poke,
            address,
            size,
            payload,
        })
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn context(&self) -> ExchangeContext {
        ExchangeContext {
            command: self.command,
            address: self.address,
            size: self.size,
        }
    }

    /// The request as the ordered byte schedule the initiator transmits
    pub fn steps(&self) -> Vec<(HandshakeStep, u8)> {
        let [lo, hi] = self.address.to_le_bytes();
        let mut steps = vec![
            (HandshakeStep::MagicHigh, MAGIC[0]),
            (HandshakeStep::MagicLow, MAGIC[1]),
            (HandshakeStep::Command, self.command.code()),
            (HandshakeStep::AddressLow, lo),
            (HandshakeStep::AddressHigh, hi),
            (HandshakeStep::Size, self.size),
        ];
        steps.extend(
            self.payload
                .iter()
                .enumerate()
                .map(|(i, b)| (HandshakeStep::Payload(i), *b)),
        );
        steps
    }

    /// Encode the full request
    pub fn encode(&self) -> Vec<u8> {
        self.steps().into_iter().map(|(_, b)| b).collect()
    }
}

/// Parsed `CA FE <CMD> <STATUS>` response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub command: Command,
    pub status: StatusCode,
}

impl ResponseHeader {
    pub const LEN: usize = 4;

    pub fn encode(&self) -> [u8; Self::LEN] {
        [MAGIC[0], MAGIC[1], self.command.code(), self.status.code()]
    }

    /// Parse a header received for the exchange described by `ctx`
    ///
    /// Fails when fewer than four bytes arrived, the magic word is wrong,
    /// or the command byte does not answer the request.
    pub fn parse(bytes: &[u8], ctx: ExchangeContext) -> Result<Self> {
        let malformed = || DestraError::MalformedResponse {
            ctx,
            header: bytes.to_vec(),
        };

        if bytes.len() < Self::LEN || bytes[..2] != MAGIC {
            return Err(malformed());
        }
        match Command::from_code(bytes[2]) {
            Some(command) if command == ctx.command => Ok(Self {
                command,
                status: StatusCode::from_byte(bytes[3]),
            }),
            _ => Err(malformed()),
        }
    }
}

/// What the peer should do after consuming one request byte
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Byte accepted, more to come
    Pending,
    /// Byte rejected, parser reset to wait for a fresh magic word
    Rejected,
    /// Request complete
    Complete(RawRequest),
}

/// A request as seen by the peer, before any range checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub command: Command,
    pub address: u16,
    pub size: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    MagicHigh,
    MagicLow,
    Command,
    AddressLow(Command),
    AddressHigh(Command, u8),
    Size(Command, u16),
    Payload(Command, u16, u8),
}

/// Byte-at-a-time request decoder for the peer side of the link
///
/// Sizes are not range-checked here; the peer answers an out-of-range size
/// with a SIZE_ERROR status instead.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    state: DecodeState,
    payload: Vec<u8>,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::MagicHigh,
            payload: Vec::new(),
        }
    }

    /// Discard any partially received request
    pub fn reset(&mut self) {
        self.state = DecodeState::MagicHigh;
        self.payload.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::MagicHigh
    }

    pub fn push(&mut self, byte: u8) -> DecodeEvent {
        let next = match self.state {
            DecodeState::MagicHigh if byte == MAGIC[0] => DecodeState::MagicLow,
            DecodeState::MagicLow if byte == MAGIC[1] => DecodeState::Command,
            DecodeState::Command => match Command::from_code(byte) {
                Some(cmd) => DecodeState::AddressLow(cmd),
                None => {
                    self.reset();
                    return DecodeEvent::Rejected;
                }
            },
            DecodeState::AddressLow(cmd) => DecodeState::AddressHigh(cmd, byte),
            DecodeState::AddressHigh(cmd, lo) => {
                DecodeState::Size(cmd, u16::from_le_bytes([lo, byte]))
            }
            DecodeState::Size(cmd, address) => {
                if cmd == Command::Poke && byte != 0 && byte as usize <= MAX_FRAME_SIZE {
                    self.payload.clear();
                    DecodeState::Payload(cmd, address, byte)
                } else {
                    self.reset();
                    return DecodeEvent::Complete(RawRequest {
                        command: cmd,
                        address,
                        size: byte,
                        payload: Vec::new(),
                    });
                }
            }
            DecodeState::Payload(cmd, address, size) => {
                self.payload.push(byte);
                if self.payload.len() < size as usize {
                    DecodeState::Payload(cmd, address, size)
                } else {
                    let payload = std::mem::take(&mut self.payload);
                    self.reset();
                    return DecodeEvent::Complete(RawRequest {
                        command: cmd,
                        address,
                        size,
                        payload,
                    });
                }
            }
            DecodeState::MagicHigh | DecodeState::MagicLow => {
                self.reset();
                return DecodeEvent::Rejected;
            }
        };
        self.state = next;
        DecodeEvent::Pending
    }
}
