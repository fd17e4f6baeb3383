//! De-duplicated motion-token transmission over a serial link
//!
//! Every command is framed as its ASCII token followed by a newline
//! (`"U\n"`, `"X\n"`, `"S120\n"`). The attached controller parses
//! newline-terminated tokens; directions and the speed command share the
//! same framing.

use std::fmt;

use tracing::{info, warn};

use crate::link::error::ChannelError;
use crate::link::transport::Transport;
use crate::mapping::speed::SpeedCommand;

/// Directive transmitted to the motor controller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MotionToken {
    Up,
    Down,
    Left,
    Right,
    Stop,
}

impl MotionToken {
    /// Single-character wire form of this token
    pub fn wire_char(self) -> char {
        match self {
            MotionToken::Up => 'U',
            MotionToken::Down => 'D',
            MotionToken::Left => 'L',
            MotionToken::Right => 'R',
            MotionToken::Stop => 'X',
        }
    }

    /// True for the four direction tokens, false for Stop
    pub fn is_motion(self) -> bool {
        !matches!(self, MotionToken::Stop)
    }
}

impl fmt::Display for MotionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_char())
    }
}

/// Owns the open/closed state of the link and suppresses redundant sends
///
/// The current token is the last motion token transmitted. Stop is never
/// stored: a successful Stop resets the current token to `None`, so a stop
/// goes out at most once per motion episode and a fresh motion token is
/// always transmitted after a stop.
pub struct CommandChannel {
    transport: Option<Box<dyn Transport>>,
    port_name: Option<String>,
    current: Option<MotionToken>,
}

impl CommandChannel {
    pub fn new() -> Self {
        Self {
            transport: None,
            port_name: None,
            current: None,
        }
    }

    /// Attaches a freshly opened transport, resetting the current token
    pub fn open(&mut self, transport: Box<dyn Transport>, port_name: String) {
        info!("Command channel open on {}", port_name);
        self.transport = Some(transport);
        self.port_name = Some(port_name);
        self.current = None;
    }

    /// Sends the safety stop if a motion is commanded, then releases the
    /// transport regardless of whether that send succeeded
    ///
    /// Returns true when the safety stop was actually transmitted.
    pub fn close(&mut self) -> bool {
        let mut stop_sent = false;
        if self.transport.is_some() && self.current.is_some() {
            match self.send(MotionToken::Stop) {
                Ok(sent) => stop_sent = sent,
                Err(e) => warn!("Safety stop failed during close: {}", e),
            }
        }
        if let Some(port) = self.port_name.take() {
            info!("Command channel closed on {}", port);
        }
        self.transport = None;
        self.current = None;
        stop_sent
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    /// Last motion token transmitted, `None` after a stop
    pub fn current_token(&self) -> Option<MotionToken> {
        self.current
    }

    /// Transmits `token` unless it matches the current one
    ///
    /// Returns `Ok(true)` when a frame actually went out, `Ok(false)` when
    /// the send was suppressed by de-duplication. On a write failure the
    /// current token is left unchanged; the next differing token is the
    /// only retry path.
    pub fn send(&mut self, token: MotionToken) -> Result<bool, ChannelError> {
        let transport = self.transport.as_mut().ok_or(ChannelError::NotConnected)?;

        let transmit = match token {
            MotionToken::Stop => self.current.is_some(),
            motion => self.current != Some(motion),
        };
        if !transmit {
            return Ok(false);
        }

        let frame = [token.wire_char() as u8, b'\n'];
        transport.send_frame(&frame)?;
        info!("Sent command: {}", token);

        self.current = match token {
            MotionToken::Stop => None,
            motion => Some(motion),
        };
        Ok(true)
    }

    /// Transmits a validated speed setting
    ///
    /// Speed frames are not de-duplicated and do not touch the current
    /// motion token; every valid submission goes out.
    pub fn send_speed(&mut self, cmd: &SpeedCommand) -> Result<(), ChannelError> {
        let transport = self.transport.as_mut().ok_or(ChannelError::NotConnected)?;
        transport.send_frame(cmd.wire().as_bytes())?;
        info!("Speed set to: {}", cmd.value());
        Ok(())
    }
}

impl Default for CommandChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::fake::FakeTransport;

    fn open_channel() -> (CommandChannel, FakeTransport) {
        let fake = FakeTransport::new();
        let mut channel = CommandChannel::new();
        channel.open(Box::new(fake.clone()), "COM7".to_string());
        (channel, fake)
    }

    #[test]
    fn duplicate_token_transmits_once() {
        let (mut channel, fake) = open_channel();
        assert!(channel.send(MotionToken::Left).unwrap());
        assert!(!channel.send(MotionToken::Left).unwrap());
        assert_eq!(fake.frames(), vec!["L\n"]);
    }

    #[test]
    fn stop_only_goes_out_while_motion_is_commanded() {
        let (mut channel, fake) = open_channel();
        assert!(!channel.send(MotionToken::Stop).unwrap());
        channel.send(MotionToken::Up).unwrap();
        assert!(channel.send(MotionToken::Stop).unwrap());
        assert!(!channel.send(MotionToken::Stop).unwrap());
        assert_eq!(fake.frames(), vec!["U\n", "X\n"]);
    }

    #[test]
    fn motion_after_stop_is_transmitted_again() {
        let (mut channel, fake) = open_channel();
        channel.send(MotionToken::Up).unwrap();
        channel.send(MotionToken::Stop).unwrap();
        channel.send(MotionToken::Up).unwrap();
        assert_eq!(fake.frames(), vec!["U\n", "X\n", "U\n"]);
    }

    #[test]
    fn write_failure_leaves_current_token_unchanged() {
        let (mut channel, fake) = open_channel();
        channel.send(MotionToken::Right).unwrap();
        fake.fail_next_write();
        assert!(channel.send(MotionToken::Down).is_err());
        assert_eq!(channel.current_token(), Some(MotionToken::Right));
        // The failed token stays distinct from the current one, so the
        // next identical classification transmits again.
        assert!(channel.send(MotionToken::Down).unwrap());
        assert_eq!(fake.frames(), vec!["R\n", "D\n"]);
    }

    #[test]
    fn close_sends_safety_stop_when_motion_commanded() {
        let (mut channel, fake) = open_channel();
        channel.send(MotionToken::Left).unwrap();
        assert!(channel.close());
        assert!(!channel.is_connected());
        assert_eq!(fake.frames(), vec!["L\n", "X\n"]);
    }

    #[test]
    fn close_without_motion_sends_nothing() {
        let (mut channel, fake) = open_channel();
        assert!(!channel.close());
        assert!(fake.frames().is_empty());
    }

    #[test]
    fn close_releases_transport_even_when_safety_stop_fails() {
        let (mut channel, fake) = open_channel();
        channel.send(MotionToken::Up).unwrap();
        fake.fail_next_write();
        assert!(!channel.close());
        assert!(!channel.is_connected());
        assert_eq!(fake.frames(), vec!["U\n"]);
    }

    #[test]
    fn send_without_transport_is_rejected() {
        let mut channel = CommandChannel::new();
        assert!(matches!(
            channel.send(MotionToken::Up),
            Err(ChannelError::NotConnected)
        ));
    }

    #[test]
    fn speed_frames_are_not_deduplicated() {
        let (mut channel, fake) = open_channel();
        let cmd = SpeedCommand::parse("120").unwrap();
        channel.send_speed(&cmd).unwrap();
        channel.send_speed(&cmd).unwrap();
        assert_eq!(fake.frames(), vec!["S120\n", "S120\n"]);
    }

    #[test]
    fn speed_does_not_touch_current_token() {
        let (mut channel, fake) = open_channel();
        channel.send(MotionToken::Up).unwrap();
        channel.send_speed(&SpeedCommand::parse("60").unwrap()).unwrap();
        assert_eq!(channel.current_token(), Some(MotionToken::Up));
        assert!(!channel.send(MotionToken::Up).unwrap());
        assert_eq!(fake.frames(), vec!["U\n", "S60\n"]);
    }
}
