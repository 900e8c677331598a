//! Frame Codec
//!
//! Wire format for the socket bridge: length-prefixed JSON with a CRC32
//! checksum over the payload.
//!
//! ```text
//! +----------------+----------------+---------------------------+
//! | Length (4)     | Checksum (4)   | JSON payload (variable)   |
//! | big-endian u32 | CRC32          |                           |
//! +----------------+----------------+---------------------------+
//! ```
//!
//! The length field covers the payload only. The length is validated against
//! [`MAX_FRAME_SIZE`] before any buffer is grown, and the checksum is
//! verified before the payload is parsed.

use serde::{de::DeserializeOwned, Serialize};

use super::traits::TransportError;

/// Maximum frame size (1 MB). Switchboard traffic is chat-sized; anything
/// larger indicates corruption or a misbehaving peer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame header size: 4 bytes length + 4 bytes checksum.
const HEADER_SIZE: usize = 8;

/// Encode a message into one frame.
///
/// # Errors
///
/// Returns [`TransportError::Serialization`] if JSON encoding fails and
/// [`TransportError::FrameTooLarge`] if the payload exceeds
/// [`MAX_FRAME_SIZE`].
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let payload =
        serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Streaming frame parser.
///
/// Feed bytes with [`FrameDecoder::push`]; [`FrameDecoder::decode`] yields
/// complete messages as they become available.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    read_pos: usize,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        // Reclaim consumed space once it dominates the buffer.
        if self.read_pos > self.buffer.len() / 2 {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::FrameTooLarge`] for an oversized length
    /// field, [`TransportError::ChecksumMismatch`] for a corrupt payload, and
    /// [`TransportError::Serialization`] for undecodable JSON.
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.buffer.len() - self.read_pos;
        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }
        let expected = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);

        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let start = self.read_pos + HEADER_SIZE;
        let payload = &self.buffer[start..start + len];

        let actual = crc32fast::hash(payload);
        if actual != expected {
            return Err(TransportError::ChecksumMismatch { expected, actual });
        }

        let msg = serde_json::from_slice(payload)
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        self.read_pos = start + len;
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Probe {
        queue: String,
        seq: u32,
    }

    fn probe(seq: u32) -> Probe {
        Probe {
            queue: "q".to_string(),
            seq,
        }
    }

    #[test]
    fn test_roundtrip() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode(&probe(7)).unwrap());
        let decoded: Probe = decoder.decode().unwrap().unwrap();
        assert_eq!(decoded, probe(7));
    }

    #[test]
    fn test_partial_input_yields_none() {
        let bytes = encode(&probe(1)).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes[..3]);
        assert!(decoder.decode::<Probe>().unwrap().is_none());

        decoder.push(&bytes[3..bytes.len() - 1]);
        assert!(decoder.decode::<Probe>().unwrap().is_none());

        decoder.push(&bytes[bytes.len() - 1..]);
        assert_eq!(decoder.decode::<Probe>().unwrap().unwrap(), probe(1));
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut bytes = encode(&probe(1)).unwrap();
        bytes.extend(encode(&probe(2)).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert_eq!(decoder.decode::<Probe>().unwrap().unwrap(), probe(1));
        assert_eq!(decoder.decode::<Probe>().unwrap().unwrap(), probe(2));
        assert!(decoder.decode::<Probe>().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let mut bytes = encode(&probe(3)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);
        assert!(matches!(
            decoder.decode::<Probe>(),
            Err(TransportError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_length_rejected_before_buffering() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes());
        decoder.push(&[0u8; 4]);
        assert!(matches!(
            decoder.decode::<Probe>(),
            Err(TransportError::FrameTooLarge { .. })
        ));
    }
}
