//! Scripted fake transport used in tests to capture frames and inject faults

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::link::error::ChannelError;
use crate::link::transport::{Transport, TransportFactory};

/// Records every frame written and can be told to fail the next write.
///
/// Clones share the same recording, so a test can keep one handle while
/// the session owns the other.
#[derive(Clone, Default)]
pub struct FakeTransport {
    frames: Arc<Mutex<Vec<String>>>,
    fail_next: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every frame written so far, in order
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().expect("frame log poisoned").clone()
    }

    /// Makes the next write fail with a broken-pipe error
    pub fn fail_next_write(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Transport for FakeTransport {
    fn send_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "scripted write failure"));
        }
        let text = String::from_utf8_lossy(frame).into_owned();
        self.frames.lock().expect("frame log poisoned").push(text);
        Ok(())
    }
}

/// Factory handing out clones of one shared [`FakeTransport`]
///
/// `open_count` tracks how many endpoints were opened; `fail_open` scripts
/// an open failure for connect-error tests.
#[derive(Clone, Default)]
pub struct FakeTransportFactory {
    transport: FakeTransport,
    open_count: Arc<AtomicUsize>,
    fail_open: Arc<AtomicBool>,
}

impl FakeTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared transport for inspecting written frames
    pub fn transport(&self) -> FakeTransport {
        self.transport.clone()
    }

    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Makes every subsequent open fail until cleared
    pub fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

impl TransportFactory for FakeTransportFactory {
    fn open(&self, port: &str) -> Result<Box<dyn Transport>, ChannelError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(ChannelError::OpenFailure {
                port: port.to_string(),
                source: serialport::Error::new(
                    serialport::ErrorKind::NoDevice,
                    "scripted open failure",
                ),
            });
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.transport.clone()))
    }
}
