//! Connection and packet errors

use std::io;
use thiserror::Error;

/// Coarse classification of a [`ConnectionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The port could not be opened or configured, or the reader could not be set up
    Construction,
    /// The connection or writer was already closed
    Closed,
    /// I/O fault while reading a packet
    Read,
    /// I/O fault while writing a packet
    Write,
    /// Failure while releasing the reader or the port
    Close,
}

/// Errors that can occur on an I/K-bus serial connection
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The native port could not be opened
    #[error("Failed to open port: \"{port}\"")]
    Open {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// The native port rejected the I/K-bus line parameters
    #[error("Failed to configure port: \"{port}\"")]
    Configure {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// The input stream for the packet reader could not be created
    #[error("Failed to create input stream for serial port \"{port}\"")]
    ReaderInit {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// The connection or writer was used after being closed
    #[error("{0}")]
    Closed(&'static str),

    /// Reading from the input stream failed
    #[error("Failed to read packet from port: \"{port}\"")]
    Read {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// The native layer did not accept the packet bytes
    #[error("Failed to write packet to port: \"{port}\"")]
    Write {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// Releasing the native port failed
    #[error("Failed to close port: \"{port}\"")]
    ClosePort {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },

    /// Releasing the input stream of the packet reader failed
    #[error("Failed to close packet reader for port: \"{port}\"")]
    CloseReader {
        /// Port the operation was attempted on
        port: String,
        /// Native cause
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Open { .. } | Self::Configure { .. } | Self::ReaderInit { .. } => {
                ErrorKind::Construction
            }
            Self::Closed(_) => ErrorKind::Closed,
            Self::Read { .. } => ErrorKind::Read,
            Self::Write { .. } => ErrorKind::Write,
            Self::ClosePort { .. } | Self::CloseReader { .. } => ErrorKind::Close,
        }
    }

    /// The native I/O error behind this failure, if any
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::Open { source, .. }
            | Self::Configure { source, .. }
            | Self::ReaderInit { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::ClosePort { source, .. }
            | Self::CloseReader { source, .. } => Some(source),
            Self::Closed(_) => None,
        }
    }
}

/// Errors that can occur while decoding an I/K-bus packet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the smallest packet (source, length, destination, checksum)
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    /// The length byte disagrees with the number of bytes present
    #[error("Invalid length byte {length} for {available} bytes")]
    InvalidLength {
        /// Length byte as received
        length: u8,
        /// Bytes actually present
        available: usize,
    },

    /// The trailing XOR byte does not match the packet contents
    #[error("Checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    ChecksumMismatch {
        /// XOR of every byte before the checksum
        expected: u8,
        /// Checksum byte as received
        actual: u8,
    },

    /// More data bytes than fit behind one length byte
    #[error("Packet data too long: {0} bytes")]
    DataTooLong(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_construction_kinds() {
        let err = ConnectionError::Configure {
            port: "COM3".into(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "parity"),
        };
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert_eq!(err.to_string(), "Failed to configure port: \"COM3\"");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_closed_has_no_cause() {
        let err = ConnectionError::Closed("Cannot obtain writer for a closed connection");
        assert_eq!(err.kind(), ErrorKind::Closed);
        assert!(err.io_error().is_none());
        assert!(err.source().is_none());
    }

    #[test]
    fn test_packet_error_messages() {
        let err = PacketError::InvalidLength {
            length: 4,
            available: 3,
        };
        assert_eq!(err.to_string(), "Invalid length byte 4 for 3 bytes");

        let err = PacketError::ChecksumMismatch {
            expected: 0x1F,
            actual: 0x00,
        };
        assert_eq!(err.to_string(), "Checksum mismatch: expected 0x1f, got 0x00");
    }
}
