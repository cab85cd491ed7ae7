//! Byte channel abstraction
//!
//! [`ByteChannel`] is the seam between the transport session and the
//! physical link. [`SerialChannel`] drives a real serial port; tests and
//! demos use the simulated device in [`super::device`].

use crate::config::SerialConfig;
use crate::error::{DestraError, Result};
use serialport::{ClearBuffer, DataBits, Parity, SerialPort, SerialPortType, StopBits};
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

/// USB description fragments of common target boards and bridges
pub const TARGET_PORT_HINTS: [&str; 4] = ["arduino", "ch340", "ft232", "cp210"];

/// Blocking byte channel owned by one session at a time
#[cfg_attr(test, mockall::automock)]
pub trait ByteChannel: Send {
    /// Write all bytes
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read up to `n` bytes, returning fewer if `timeout` elapses first
    fn read(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Discard any bytes received but not yet read
    fn clear_input(&mut self) -> Result<()>;

    /// Release the underlying link
    fn close(&mut self) -> Result<()>;
}

/// 8N1 serial port channel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialChannel {
    /// Open `port` at `baud_rate` with the configured write timeout
    pub fn open(port: &str, baud_rate: u32, config: &SerialConfig) -> Result<Self> {
        let handle = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.write_timeout())
            .open()?;

        tracing::info!("Opened serial port {} at {} baud", port, baud_rate);

        Ok(Self {
            port: handle,
            name: port.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl ByteChannel for SerialChannel {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn read(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        let deadline = Instant::now() + timeout;
        let mut out = vec![0u8; n];
        let mut filled = 0;

        while filled < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.port.set_timeout(remaining)?;
            match self.port.read(&mut out[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        out.truncate(filled);
        Ok(out)
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        tracing::info!("Closed serial port {}", self.name);
        Ok(())
    }
}

/// A serial port found on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

impl PortInfo {
    /// True when the USB description names a known target board or bridge
    pub fn looks_like_target(&self) -> bool {
        let desc = self.description.to_lowercase();
        TARGET_PORT_HINTS.iter().any(|hint| desc.contains(hint))
    }
}

/// Host ports split into likely targets and everything else
#[derive(Debug, Clone, Default)]
pub struct DetectedPorts {
    pub candidates: Vec<PortInfo>,
    pub others: Vec<PortInfo>,
}

impl DetectedPorts {
    pub fn classify(ports: impl IntoIterator<Item = PortInfo>) -> Self {
        let (candidates, others) = ports.into_iter().partition(PortInfo::looks_like_target);
        Self { candidates, others }
    }

    /// First likely target, if any
    pub fn best(&self) -> Option<&PortInfo> {
        self.candidates.first()
    }
}

/// Enumerate serial ports and pick out likely targets
pub fn detect_ports() -> Result<DetectedPorts> {
    let ports = serialport::available_ports()?;
    let infos = ports.into_iter().map(|p| {
        let description = match p.port_type {
            SerialPortType::UsbPort(usb) => [usb.manufacturer, usb.product]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" "),
            SerialPortType::BluetoothPort => "Bluetooth".to_string(),
            SerialPortType::PciPort => "PCI".to_string(),
            SerialPortType::Unknown => String::new(),
        };
        PortInfo {
            name: p.port_name,
            description,
        }
    });

    let detected = DetectedPorts::classify(infos);
    tracing::debug!(
        "Detected {} candidate port(s), {} other(s)",
        detected.candidates.len(),
        detected.others.len()
    );
    Ok(detected)
}

/// Convenience for callers that only need a port name
pub fn auto_detect_port() -> Result<String> {
    detect_ports()?
        .best()
        .map(|p| p.name.clone())
        .ok_or_else(|| DestraError::Config("no likely target serial port found".to_string()))
}
