//! # ikbus-serial
//!
//! Serial port transport for the BMW I/K-bus.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Opening a serial port with the fixed I/K-bus line discipline (9600 8E1, RTS/CTS)
//! - A packet reader and packet writers bound to the open port
//! - A close sequence that releases both reader and port even if one of them fails
//! - I/K-bus packet encoding and a default framing engine
//!
//! ## Example
//!
//! ```rust,no_run
//! use ikbus_serial::protocol::{PacketReader, PacketWriter, IkBusPacket, SerialPortConnection};
//!
//! let mut conn = SerialPortConnection::open("/dev/ttyUSB0")?;
//!
//! let mut writer = conn.writer()?;
//! writer.write(&IkBusPacket::new(0x50, 0x68, vec![0x32, 0x11])?)?;
//!
//! let mut reader = conn.reader()?;
//! while let Some(element) = reader.read()? {
//!     println!("{:02X?}", element.raw());
//! }
//!
//! conn.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        ConnectionError, ConnectionState, IkBusPacket, PacketReader, PacketStreamElement,
        PacketWriter, SerialPortConnection,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
