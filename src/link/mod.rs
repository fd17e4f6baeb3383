//! Serial link handling: command framing, de-duplication and transports

pub mod command_channel;
pub mod error;
pub mod fake;
pub mod transport;

pub use command_channel::{CommandChannel, MotionToken};
pub use error::ChannelError;
pub use transport::{
    available_ports, SerialTransport, SerialTransportFactory, Transport, TransportFactory,
};
