use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::serial::LineParameters;

/// An open native serial port
///
/// Owned exclusively by a connection, which is the only party allowed to
/// call [`PortHandle::close`].
pub trait PortHandle: Send + 'static {
    /// Readable stream handed to the framing engine
    type Input: InputStream + 'static;

    /// System name of the port
    fn name(&self) -> &str;

    /// Apply line parameters
    fn configure(&mut self, params: &LineParameters) -> io::Result<()>;

    /// Push bytes into the outbound buffer of the port
    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()>;

    /// Create a readable stream bound to this port
    ///
    /// A blocking read on the stream must return `Ok(0)` soon after `signal`
    /// is raised.
    fn input_stream(&mut self, signal: CloseSignal) -> io::Result<Self::Input>;

    /// Release the native port
    fn close(&mut self) -> io::Result<()>;
}

/// Flag raised when the reader of a port is closed
///
/// Shared between the reader and its input stream so that a pending read can
/// be ended without taking the reader's lock.
#[derive(Debug, Clone, Default)]
pub struct CloseSignal(Arc<AtomicBool>);

impl CloseSignal {
    /// A signal that has not been raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Returns whether it was already raised.
    pub fn raise(&self) -> bool {
        self.0.swap(true, Ordering::AcqRel)
    }

    /// Whether the signal has been raised
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Byte stream read from a port
pub trait InputStream: Read + Send {
    /// Release the stream
    fn close(&mut self) -> io::Result<()>;
}

/// [`PortHandle`] backed by the `serialport` crate
pub struct SystemPort {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SystemPort {
    /// Wrap an already opened `serialport` handle
    pub fn new(name: impl Into<String>, port: Box<dyn SerialPort>) -> Self {
        Self {
            port: Some(port),
            name: name.into(),
        }
    }

    fn port_mut(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port is closed"))
    }
}

impl PortHandle for SystemPort {
    type Input = SystemPortInput;

    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, params: &LineParameters) -> io::Result<()> {
        let port = self.port_mut()?;
        port.set_baud_rate(params.baud_rate)?;
        port.set_data_bits(params.data_bits)?;
        port.set_stop_bits(params.stop_bits)?;
        port.set_parity(params.parity)?;
        port.set_flow_control(params.flow_control)?;
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> io::Result<()> {
        // write_all hands the bytes to the kernel tty buffer. No flush here,
        // tcdrain would block until the bytes are on the wire.
        self.port_mut()?.write_all(data)
    }

    fn input_stream(&mut self, signal: CloseSignal) -> io::Result<SystemPortInput> {
        let clone = self.port_mut()?.try_clone()?;
        Ok(SystemPortInput {
            port: Some(clone),
            signal,
        })
    }

    fn close(&mut self) -> io::Result<()> {
        // The descriptor is released when the box is dropped
        self.port.take();
        Ok(())
    }
}

/// Input side of a [`SystemPort`]
///
/// Native read timeouts are treated as "no data yet", so reads block until
/// at least one byte arrives or the [`CloseSignal`] is raised. The signal is
/// checked once per native timeout.
pub struct SystemPortInput {
    port: Option<Box<dyn SerialPort>>,
    signal: CloseSignal,
}

impl Read for SystemPortInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(port) = self.port.as_mut() else {
            return Ok(0);
        };
        loop {
            if self.signal.is_raised() {
                return Ok(0);
            }
            match port.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

impl InputStream for SystemPortInput {
    fn close(&mut self) -> io::Result<()> {
        self.port.take();
        Ok(())
    }
}
