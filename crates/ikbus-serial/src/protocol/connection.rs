//! Connection management
//!
//! Owns the serial port for the lifetime of an I/K-bus link, hands out the
//! packet reader and writers bound to it, and sequences their release.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{
    framing::{FrameDecoder, PacketStreamElement, StreamElementReader},
    serial::{configure_port, port_names, SerialTransport, SystemTransport},
    stream::{CloseSignal, PortHandle, SystemPort},
    ConnectionError, IkBusPacket,
};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Port open, reader and writers usable
    Open,
    /// Port released
    Closed,
}

/// Source of I/K-bus packets
pub trait PacketReader {
    /// Next stream element, or `None` at end of stream or once closed
    fn read(&mut self) -> Result<Option<PacketStreamElement>, ConnectionError>;

    /// Close the reader. Idempotent.
    fn close(&mut self) -> Result<(), ConnectionError>;
}

/// Sink for I/K-bus packets
pub trait PacketWriter {
    /// Write one packet
    fn write(&mut self, packet: &IkBusPacket) -> Result<(), ConnectionError>;

    /// Close the writer. Idempotent.
    fn close(&mut self);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Port handle shared between the connection and its writers
struct SharedPort<H> {
    handle: H,
    closed: bool,
}

struct ReaderInner {
    engine: Box<dyn StreamElementReader>,
    port_name: String,
}

/// The packet reader of a [`SerialPortConnection`]
///
/// Clones share the same underlying reader. The closed flag lives outside
/// the engine lock, so closing never waits for a pending read to find data.
#[derive(Clone)]
pub struct SerialPacketReader {
    inner: Arc<Mutex<ReaderInner>>,
    signal: CloseSignal,
}

impl SerialPacketReader {
    fn new(engine: Box<dyn StreamElementReader>, signal: CloseSignal, port_name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReaderInner {
                engine,
                port_name: port_name.to_string(),
            })),
            signal,
        }
    }
}

impl PacketReader for SerialPacketReader {
    /// A closed reader reports end of stream instead of failing, so that a
    /// read loop ends cleanly when the connection is closed, including while
    /// the read is pending.
    fn read(&mut self) -> Result<Option<PacketStreamElement>, ConnectionError> {
        if self.signal.is_raised() {
            return Ok(None);
        }

        let mut inner = lock(&self.inner);
        if self.signal.is_raised() {
            return Ok(None);
        }

        let ReaderInner { engine, port_name } = &mut *inner;
        let result = engine.read();
        if self.signal.is_raised() {
            // Closed while waiting on the input stream
            return Ok(None);
        }
        result.map_err(|source| ConnectionError::Read {
            port: port_name.clone(),
            source,
        })
    }

    fn close(&mut self) -> Result<(), ConnectionError> {
        if self.signal.raise() {
            return Ok(());
        }

        // Waits only until a pending read has seen the signal
        let mut inner = lock(&self.inner);
        let ReaderInner { engine, port_name } = &mut *inner;
        engine.close().map_err(|source| ConnectionError::CloseReader {
            port: port_name.clone(),
            source,
        })
    }
}

impl Iterator for SerialPacketReader {
    type Item = Result<PacketStreamElement, ConnectionError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// A packet writer bound to the port of a [`SerialPortConnection`]
///
/// `write` returns once the native layer has accepted the bytes into its
/// outbound buffer, not once they are on the wire. Allow time for
/// transmission before closing the connection.
pub struct SerialPacketWriter<H> {
    port: Option<Arc<Mutex<SharedPort<H>>>>,
    port_name: String,
}

impl<H: PortHandle> PacketWriter for SerialPacketWriter<H> {
    fn write(&mut self, packet: &IkBusPacket) -> Result<(), ConnectionError> {
        let Some(port) = &self.port else {
            return Err(ConnectionError::Closed(
                "Cannot write I/K-bus packet to closed writer",
            ));
        };

        let raw = packet.to_raw();
        let mut shared = lock(port);
        if shared.closed {
            return Err(ConnectionError::Closed(
                "Cannot write I/K-bus packet to a closed connection",
            ));
        }

        shared
            .handle
            .write_bytes(&raw)
            .map_err(|source| ConnectionError::Write {
                port: self.port_name.clone(),
                source,
            })?;
        tracing::trace!(port = %self.port_name, bytes = raw.len(), "wrote packet");
        Ok(())
    }

    fn close(&mut self) {
        self.port = None;
    }
}

/// I/K-bus link over a serial port
///
/// The port is opened and configured on construction, so a value of this
/// type is always a live link until [`close`](Self::close) is called. A
/// connection dropped while still open is closed by `Drop`.
pub struct SerialPortConnection<H: PortHandle = SystemPort> {
    port: Arc<Mutex<SharedPort<H>>>,
    reader: SerialPacketReader,
    port_name: String,
    state: ConnectionState,
}

impl SerialPortConnection<SystemPort> {
    /// Open the named system serial port with the I/K-bus line parameters
    pub fn open(port_name: &str) -> Result<Self, ConnectionError> {
        Self::open_with(&SystemTransport::default(), port_name)
    }

    /// Names of the serial ports available on the system
    pub fn available_ports() -> Vec<String> {
        list_available_ports(&SystemTransport::default())
    }
}

impl<H: PortHandle> SerialPortConnection<H> {
    /// Open `port_name` through `transport`, reading with the default frame decoder
    pub fn open_with<T>(transport: &T, port_name: &str) -> Result<Self, ConnectionError>
    where
        T: SerialTransport<Handle = H>,
    {
        Self::open_with_framing(transport, port_name, |input| {
            Box::new(FrameDecoder::new(input))
        })
    }

    /// Open `port_name` through `transport`, reading with the framing engine built by `framing`
    pub fn open_with_framing<T, F>(
        transport: &T,
        port_name: &str,
        framing: F,
    ) -> Result<Self, ConnectionError>
    where
        T: SerialTransport<Handle = H>,
        F: FnOnce(H::Input) -> Box<dyn StreamElementReader>,
    {
        let mut handle = transport
            .open(port_name)
            .map_err(|source| ConnectionError::Open {
                port: port_name.to_string(),
                source,
            })?;

        let reader = match Self::prepare(&mut handle, port_name, framing) {
            Ok(reader) => reader,
            Err(e) => {
                // Never leave a half-initialised port open
                if let Err(close_err) = handle.close() {
                    tracing::warn!(port = %port_name, "failed to release port after {e}: {close_err}");
                }
                return Err(e);
            }
        };

        tracing::info!(port = %port_name, "opened I/K-bus connection");
        Ok(Self {
            port: Arc::new(Mutex::new(SharedPort {
                handle,
                closed: false,
            })),
            reader,
            port_name: port_name.to_string(),
            state: ConnectionState::Open,
        })
    }

    fn prepare<F>(
        handle: &mut H,
        port_name: &str,
        framing: F,
    ) -> Result<SerialPacketReader, ConnectionError>
    where
        F: FnOnce(H::Input) -> Box<dyn StreamElementReader>,
    {
        configure_port(handle).map_err(|source| ConnectionError::Configure {
            port: port_name.to_string(),
            source,
        })?;

        let signal = CloseSignal::new();
        let input = handle
            .input_stream(signal.clone())
            .map_err(|source| ConnectionError::ReaderInit {
                port: port_name.to_string(),
                source,
            })?;

        Ok(SerialPacketReader::new(framing(input), signal, port_name))
    }

    /// System name of the serial port
    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Get the current state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The packet reader of this connection
    pub fn reader(&self) -> Result<SerialPacketReader, ConnectionError> {
        match self.state {
            ConnectionState::Open => Ok(self.reader.clone()),
            ConnectionState::Closed => Err(ConnectionError::Closed(
                "Cannot obtain reader for a closed connection",
            )),
        }
    }

    /// A new packet writer for this connection
    pub fn writer(&self) -> Result<SerialPacketWriter<H>, ConnectionError> {
        match self.state {
            ConnectionState::Open => Ok(SerialPacketWriter {
                port: Some(Arc::clone(&self.port)),
                port_name: self.port_name.clone(),
            }),
            ConnectionState::Closed => Err(ConnectionError::Closed(
                "Cannot obtain writer for a closed connection",
            )),
        }
    }

    /// Close the reader, then the port. Idempotent.
    ///
    /// The port is released even when closing the reader fails. If both fail,
    /// the port error is returned and the reader error is only logged.
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        self.state = ConnectionState::Closed;

        let reader_result = self.reader.close();

        let port_result = {
            let mut shared = lock(&self.port);
            shared.closed = true;
            shared.handle.close()
        };

        if let Err(source) = port_result {
            if let Err(reader_err) = reader_result {
                tracing::warn!(port = %self.port_name, "discarding reader close error: {reader_err}");
            }
            return Err(ConnectionError::ClosePort {
                port: self.port_name.clone(),
                source,
            });
        }
        reader_result?;

        tracing::info!(port = %self.port_name, "closed I/K-bus connection");
        Ok(())
    }
}

impl<H: PortHandle> Drop for SerialPortConnection<H> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(port = %self.port_name, "error closing dropped connection: {e}");
        }
    }
}

/// Names of the serial ports `transport` can see
pub fn list_available_ports<T: SerialTransport>(transport: &T) -> Vec<String> {
    port_names(transport.list_ports())
}

/// Open a connection, run `f` with it, and close it on every exit path
///
/// An error from `f` takes precedence over an error from closing.
pub fn with_connection<T, F, R, E>(transport: &T, port_name: &str, f: F) -> Result<R, E>
where
    T: SerialTransport,
    F: FnOnce(&mut SerialPortConnection<T::Handle>) -> Result<R, E>,
    E: From<ConnectionError>,
{
    let mut connection = SerialPortConnection::open_with(transport, port_name)?;
    let result = f(&mut connection);
    let closed = connection.close();

    match result {
        Ok(value) => {
            closed?;
            Ok(value)
        }
        Err(e) => {
            if let Err(close_err) = closed {
                tracing::warn!(port = %port_name, "error closing connection: {close_err}");
            }
            Err(e)
        }
    }
}
