//! Serial transport abstraction for the command channel
//!
//! The channel writes complete frames through a [`Transport`] trait object,
//! and the session opens endpoints through a [`TransportFactory`]. The
//! production implementations wrap the `serialport` crate; tests substitute
//! the scripted transport from [`crate::link::fake`].

use std::io::Write;
use std::time::Duration;

use tracing::{debug, info};

use crate::link::error::ChannelError;

/// Write timeout applied to the underlying serial port.
///
/// Sends are synchronous and fire-and-forget; the timeout only bounds how
/// long a wedged device can stall the session loop.
const WRITE_TIMEOUT: Duration = Duration::from_millis(50);

/// Byte sink for complete command frames
pub trait Transport: Send {
    /// Writes one complete frame to the device
    fn send_frame(&mut self, frame: &[u8]) -> std::io::Result<()>;
}

/// Opens transports for session endpoints
///
/// The session holds a factory rather than a concrete port so the same
/// lifecycle code runs against real hardware and against scripted fakes.
pub trait TransportFactory: Send + 'static {
    /// Opens the named endpoint and returns a ready transport
    fn open(&self, port: &str) -> Result<Box<dyn Transport>, ChannelError>;
}

/// Transport backed by a system serial port
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    /// Opens `port` at the given baud rate
    pub fn open(port: &str, baud_rate: u32) -> Result<Self, ChannelError> {
        let serial = serialport::new(port, baud_rate)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|source| ChannelError::OpenFailure {
                port: port.to_string(),
                source,
            })?;

        info!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(Self { port: serial })
    }
}

impl Transport for SerialTransport {
    fn send_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }
}

/// Factory producing [`SerialTransport`] instances at a fixed baud rate
pub struct SerialTransportFactory {
    baud_rate: u32,
}

impl SerialTransportFactory {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

impl TransportFactory for SerialTransportFactory {
    fn open(&self, port: &str) -> Result<Box<dyn Transport>, ChannelError> {
        let transport = SerialTransport::open(port, self.baud_rate)?;
        Ok(Box::new(transport))
    }
}

/// Returns the names of the serial ports currently present on the system
///
/// Presentation layers use this to populate their endpoint selection; the
/// session state machine itself never calls it.
pub fn available_ports() -> Result<Vec<String>, ChannelError> {
    let ports = serialport::available_ports().map_err(ChannelError::Enumeration)?;
    let names: Vec<String> = ports.into_iter().map(|info| info.port_name).collect();
    debug!("Enumerated {} serial ports", names.len());
    Ok(names)
}
