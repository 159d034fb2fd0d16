//! I/K-bus Serial Link
//!
//! Exposes a serial port as a packet connection to the BMW I/K-bus.
//!
//! The bus runs at 9600 baud, 8 data bits, even parity, 1 stop bit. Most
//! bus interfaces signal collisions through CTS, so RTS/CTS hardware flow
//! control is always enabled.

mod connection;
mod error;
pub mod framing;
mod packet;
pub mod serial;
pub mod stream;

pub use connection::{
    list_available_ports, with_connection, ConnectionState, PacketReader, PacketWriter,
    SerialPacketReader, SerialPacketWriter, SerialPortConnection,
};
pub use error::{ConnectionError, ErrorKind, PacketError};
pub use framing::{FrameDecoder, PacketStreamElement, StreamElementReader};
pub use packet::{IkBusPacket, PacketBuilder};
pub use serial::{configure_port, list_ports, LineParameters, PortInfo, SerialTransport, SystemTransport};
pub use stream::{CloseSignal, InputStream, PortHandle, SystemPort, SystemPortInput};

/// I/K-bus baud rate
pub const IKBUS_BAUD_RATE: u32 = 9600;

/// Default timeout of a single native read or write call in milliseconds
pub const NATIVE_TIMEOUT_MS: u64 = 100;

/// Maximum data bytes in one packet (the length byte also counts destination and checksum)
pub const MAX_DATA_SIZE: usize = 253;
