//! Packet framing
//!
//! Delimits I/K-bus packets in a continuous byte stream. The bus has no
//! start-of-frame marker, so a frame is recognised by its length byte and
//! XOR checksum. Bytes that cannot start a valid frame are reported as
//! invalid elements until the decoder is back in sync.

use std::io;

use super::packet::IkBusPacket;
use super::stream::InputStream;

/// One decoded unit of the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketStreamElement {
    /// A well-formed packet and the bytes it was decoded from
    Valid {
        /// Decoded packet
        packet: IkBusPacket,
        /// Bytes as received
        raw: Vec<u8>,
    },
    /// Bytes that do not form a packet
    Invalid {
        /// Bytes as received
        raw: Vec<u8>,
    },
}

impl PacketStreamElement {
    /// Whether this element holds a decoded packet
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Raw bytes of this element as received
    pub fn raw(&self) -> &[u8] {
        match self {
            Self::Valid { raw, .. } | Self::Invalid { raw } => raw,
        }
    }

    /// The decoded packet, if valid
    pub fn packet(&self) -> Option<&IkBusPacket> {
        match self {
            Self::Valid { packet, .. } => Some(packet),
            Self::Invalid { .. } => None,
        }
    }
}

/// Framing engine producing stream elements from an input stream
pub trait StreamElementReader: Send {
    /// Next element, or `None` at end of stream
    fn read(&mut self) -> io::Result<Option<PacketStreamElement>>;

    /// Release the underlying input stream
    fn close(&mut self) -> io::Result<()>;
}

/// Default I/K-bus framing engine
pub struct FrameDecoder<R> {
    input: R,
    buf: Vec<u8>,
    eof: bool,
    closed: bool,
}

impl<R: InputStream> FrameDecoder<R> {
    /// Decode frames read from `input`
    pub fn new(input: R) -> Self {
        Self {
            input,
            buf: Vec::new(),
            eof: false,
            closed: false,
        }
    }

    fn next_buffered(&mut self) -> Option<PacketStreamElement> {
        if self.buf.len() < 2 {
            return None;
        }

        let length = self.buf[1] as usize;
        if length < 2 {
            return Some(self.discard(1));
        }

        let frame_len = length + 2;
        if self.buf.len() >= frame_len {
            return match IkBusPacket::from_raw(&self.buf[..frame_len]) {
                Ok(packet) => {
                    let raw: Vec<u8> = self.buf.drain(..frame_len).collect();
                    Some(PacketStreamElement::Valid { packet, raw })
                }
                Err(e) => {
                    tracing::trace!("resynchronising after {e}");
                    Some(self.discard(1))
                }
            };
        }

        // The candidate at the front is still incomplete. A complete frame
        // further in means the front bytes were noise.
        (1..self.buf.len())
            .find(|&start| complete_frame(&self.buf[start..]))
            .map(|start| self.discard(start))
    }

    fn discard(&mut self, count: usize) -> PacketStreamElement {
        let raw = self.buf.drain(..count).collect();
        PacketStreamElement::Invalid { raw }
    }

    fn fill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; 64];
        let n = loop {
            match self.input.read(&mut chunk) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

impl<R: InputStream> StreamElementReader for FrameDecoder<R> {
    fn read(&mut self) -> io::Result<Option<PacketStreamElement>> {
        loop {
            if let Some(element) = self.next_buffered() {
                return Ok(Some(element));
            }
            if self.eof {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let raw = std::mem::take(&mut self.buf);
                return Ok(Some(PacketStreamElement::Invalid { raw }));
            }
            self.fill()?;
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.input.close()
    }
}

/// Whether `bytes` starts with a complete frame carrying a valid checksum
fn complete_frame(bytes: &[u8]) -> bool {
    match bytes.get(1) {
        Some(&length) if length >= 2 => bytes
            .get(..length as usize + 2)
            .is_some_and(|frame| IkBusPacket::from_raw(frame).is_ok()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    struct TestInput {
        data: Cursor<Vec<u8>>,
        closes: usize,
    }

    impl TestInput {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data: Cursor::new(data),
                closes: 0,
            }
        }
    }

    impl Read for TestInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            // One byte at a time, like a slow serial line
            let len = buf.len().min(1);
            self.data.read(&mut buf[..len])
        }
    }

    impl InputStream for TestInput {
        fn close(&mut self) -> io::Result<()> {
            self.closes += 1;
            Ok(())
        }
    }

    const VOLUME_UP: [u8; 6] = [0x50, 0x04, 0x68, 0x32, 0x11, 0x1F];

    #[test]
    fn test_decodes_consecutive_packets() {
        let mut data = VOLUME_UP.to_vec();
        data.extend_from_slice(&VOLUME_UP);
        let mut decoder = FrameDecoder::new(TestInput::new(data));

        for _ in 0..2 {
            let element = decoder.read().unwrap().unwrap();
            assert!(element.is_valid());
            assert_eq!(element.raw(), &VOLUME_UP);
            assert_eq!(element.packet().unwrap().destination(), 0x68);
        }
        assert_eq!(decoder.read().unwrap(), None);
        assert_eq!(decoder.read().unwrap(), None);
    }

    #[test]
    fn test_resynchronises_after_garbage() {
        let mut data = vec![0xAA];
        data.extend_from_slice(&VOLUME_UP);
        let mut decoder = FrameDecoder::new(TestInput::new(data));

        let first = decoder.read().unwrap().unwrap();
        assert_eq!(first, PacketStreamElement::Invalid { raw: vec![0xAA] });

        let second = decoder.read().unwrap().unwrap();
        assert!(second.is_valid());
    }

    #[test]
    fn test_length_below_minimum_is_invalid() {
        let mut decoder = FrameDecoder::new(TestInput::new(vec![0x50, 0x01]));

        let first = decoder.read().unwrap().unwrap();
        assert_eq!(first.raw(), &[0x50]);
        // The stray length byte is left over at end of stream
        let second = decoder.read().unwrap().unwrap();
        assert_eq!(second, PacketStreamElement::Invalid { raw: vec![0x01] });
        assert_eq!(decoder.read().unwrap(), None);
    }

    #[test]
    fn test_truncated_tail_is_invalid() {
        let mut decoder = FrameDecoder::new(TestInput::new(VOLUME_UP[..4].to_vec()));

        let element = decoder.read().unwrap().unwrap();
        assert!(!element.is_valid());
        assert!(element.packet().is_none());
        assert_eq!(element.raw(), &VOLUME_UP[..4]);
    }

    #[test]
    fn test_close_delegates_once() {
        let mut decoder = FrameDecoder::new(TestInput::new(Vec::new()));
        decoder.close().unwrap();
        decoder.close().unwrap();
        assert_eq!(decoder.input.closes, 1);
    }
}
