//! Error definitions for the link module

use thiserror::Error;

/// Errors raised by the command channel and its transports
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The endpoint could not be opened (invalid or unavailable port)
    #[error("failed to open serial port {port}: {source}")]
    OpenFailure {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// An I/O error occurred while writing a frame mid-session
    #[error("serial write failed: {0}")]
    WriteFailure(#[from] std::io::Error),

    /// A transmission was attempted with no transport attached
    #[error("command channel is not connected")]
    NotConnected,

    /// The system's serial ports could not be enumerated
    #[error("failed to enumerate serial ports: {0}")]
    Enumeration(#[source] serialport::Error),
}
