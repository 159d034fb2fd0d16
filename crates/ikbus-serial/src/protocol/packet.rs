//! Packet encoding/decoding
//!
//! Implements the I/K-bus wire format.
//!
//! Packet format:
//! - 1 byte: Source device address
//! - 1 byte: Length of everything that follows (destination + data + checksum)
//! - 1 byte: Destination device address
//! - N bytes: Data
//! - 1 byte: Checksum (XOR of all preceding bytes)

use super::{PacketError, MAX_DATA_SIZE};

/// An I/K-bus packet
///
/// Fields are private so that every packet holds at most [`MAX_DATA_SIZE`]
/// data bytes and its length byte always matches its size on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkBusPacket {
    source: u8,
    destination: u8,
    data: Vec<u8>,
}

impl IkBusPacket {
    /// Create a new packet
    pub fn new(source: u8, destination: u8, data: Vec<u8>) -> Result<Self, PacketError> {
        if data.len() > MAX_DATA_SIZE {
            return Err(PacketError::DataTooLong(data.len()));
        }
        Ok(Self {
            source,
            destination,
            data,
        })
    }

    /// Decode a packet from its raw wire bytes
    pub fn from_raw(raw: &[u8]) -> Result<Self, PacketError> {
        if raw.len() < 4 {
            return Err(PacketError::TooShort(raw.len()));
        }

        let length = raw[1];
        if length < 2 || raw.len() != length as usize + 2 {
            return Err(PacketError::InvalidLength {
                length,
                available: raw.len(),
            });
        }

        let (body, received) = raw.split_at(raw.len() - 1);
        let expected = xor_checksum(body);
        if received[0] != expected {
            return Err(PacketError::ChecksumMismatch {
                expected,
                actual: received[0],
            });
        }

        Ok(Self {
            source: raw[0],
            destination: raw[2],
            data: raw[3..raw.len() - 1].to_vec(),
        })
    }

    /// Address of the sending device
    pub fn source(&self) -> u8 {
        self.source
    }

    /// Address of the receiving device
    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Message data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Take the message data
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Encode the packet to raw wire bytes
    pub fn to_raw(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.encoded_size());
        bytes.push(self.source);
        bytes.push(self.length());
        bytes.push(self.destination);
        bytes.extend_from_slice(&self.data);
        bytes.push(xor_checksum(&bytes));
        bytes
    }

    /// Value of the length byte
    pub fn length(&self) -> u8 {
        (self.data.len() + 2) as u8
    }

    /// Checksum byte of the encoded packet
    pub fn checksum(&self) -> u8 {
        let head = [self.source, self.length(), self.destination];
        xor_checksum(&head) ^ xor_checksum(&self.data)
    }

    /// Get the total encoded size
    pub fn encoded_size(&self) -> usize {
        self.data.len() + 4
    }
}

/// Builder for constructing packets
pub struct PacketBuilder {
    source: u8,
    destination: u8,
    data: Vec<u8>,
}

impl PacketBuilder {
    /// Start a packet from `source` to `destination`
    pub fn new(source: u8, destination: u8) -> Self {
        Self {
            source,
            destination,
            data: Vec::new(),
        }
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.data.push(b);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.data.extend_from_slice(data);
        self
    }

    /// Build the packet
    pub fn build(self) -> Result<IkBusPacket, PacketError> {
        IkBusPacket::new(self.source, self.destination, self.data)
    }
}

/// XOR of all bytes
pub(crate) fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_packet() {
        // Volume-up press from the steering wheel (0x50) to the radio (0x68)
        let packet = IkBusPacket::new(0x50, 0x68, vec![0x32, 0x11]).unwrap();
        assert_eq!(packet.to_raw(), vec![0x50, 0x04, 0x68, 0x32, 0x11, 0x1F]);
        assert_eq!(packet.checksum(), 0x1F);
        assert_eq!(packet.encoded_size(), 6);
    }

    #[test]
    fn test_decode_known_packet() {
        let packet = IkBusPacket::from_raw(&[0x50, 0x04, 0x68, 0x32, 0x11, 0x1F]).unwrap();
        assert_eq!(packet.source(), 0x50);
        assert_eq!(packet.destination(), 0x68);
        assert_eq!(packet.data(), &[0x32u8, 0x11]);
    }

    #[test]
    fn test_packet_builder() {
        let packet = PacketBuilder::new(0x3F, 0x00)
            .byte(0x0C)
            .bytes(&[0x00, 0x01])
            .build()
            .unwrap();

        assert_eq!(packet.length(), 5);
        assert_eq!(packet.into_data(), vec![0x0C, 0x00, 0x01]);
    }

    #[test]
    fn test_checksum_verification() {
        let mut raw = IkBusPacket::new(0x18, 0x68, vec![1, 2, 3]).unwrap().to_raw();

        // Corrupt a data byte
        raw[3] ^= 0xFF;

        assert!(matches!(
            IkBusPacket::from_raw(&raw),
            Err(PacketError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_length() {
        assert_eq!(
            IkBusPacket::from_raw(&[0x50, 0x09, 0x68, 0x38]),
            Err(PacketError::InvalidLength {
                length: 0x09,
                available: 4
            })
        );
        assert_eq!(IkBusPacket::from_raw(&[0x50]), Err(PacketError::TooShort(1)));
    }

    #[test]
    fn test_data_too_long() {
        let result = IkBusPacket::new(0x00, 0xBF, vec![0; MAX_DATA_SIZE + 1]);
        assert_eq!(result, Err(PacketError::DataTooLong(MAX_DATA_SIZE + 1)));

        let built = PacketBuilder::new(0x50, 0x68).bytes(&[0; 300]).build();
        assert_eq!(built, Err(PacketError::DataTooLong(300)));
    }

    #[test]
    fn test_largest_packet_length_byte() {
        let packet = IkBusPacket::new(0x50, 0x68, vec![0xA5; MAX_DATA_SIZE]).unwrap();
        let raw = packet.to_raw();

        assert_eq!(raw[1], 0xFF);
        assert_eq!(raw.len(), raw[1] as usize + 2);
        assert_eq!(IkBusPacket::from_raw(&raw).unwrap(), packet);
    }
}
