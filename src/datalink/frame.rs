//! Link-Layer Frame Structure
//!
//! A [`Frame`] is the transient unit of reception: destination and source
//! addresses plus a payload. The length field and the FCS are derived when
//! the frame is put on the wire.
//!
//! # Frame Format
//!
//! Wire image (one byte per clock):
//! - Strobe byte (1 byte): 0xAA, carried on the `start` tick
//! - Preamble (`preamble_len` bytes): 0xAA
//! - SFD (1 byte): 0xAB
//! - Destination MAC (6 bytes)
//! - Source MAC (6 bytes)
//! - Length (2 bytes, big-endian)
//! - Payload (0-65535 bytes)
//! - FCS (4 bytes): the LRC of destination..payload, repeated

use bytes::{BufMut, Bytes, BytesMut};

use crate::datalink::{
    FrameError, MacAddress, ReceiveError, Result, TickInput, FCS_LEN, HEADER_LEN, MAC_LEN,
    PREAMBLE_BYTE, SFD_BYTE,
};
use crate::util::{compute_lrc, Lrc};

/// Maximum payload expressible in the 16-bit length field
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Link-layer frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination MAC address
    pub destination: MacAddress,
    /// Source MAC address
    pub source: MacAddress,
    /// Payload bytes
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame
    pub fn new(
        destination: MacAddress,
        source: MacAddress,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(FrameError::PayloadTooLong {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self {
            destination,
            source,
            payload,
        })
    }

    /// Value of the length field
    pub fn length(&self) -> u16 {
        self.payload.len() as u16
    }

    /// The LRC-covered region: destination, source, length and payload
    pub fn body(&self) -> Bytes {
        let mut body = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        body.put_slice(self.destination.as_bytes());
        body.put_slice(self.source.as_bytes());
        body.put_u16(self.length());
        body.put_slice(&self.payload);
        body.freeze()
    }

    /// Check byte carried in every FCS slot
    pub fn lrc(&self) -> u8 {
        compute_lrc(&self.body())
    }

    /// Encode the full wire image, strobe byte included
    pub fn encode(&self, preamble_len: usize) -> Bytes {
        let body = self.body();
        let lrc = compute_lrc(&body);

        let mut wire = BytesMut::with_capacity(1 + preamble_len + 1 + body.len() + FCS_LEN);

        // Strobe byte and preamble
        wire.put_bytes(PREAMBLE_BYTE, 1 + preamble_len);
        wire.put_u8(SFD_BYTE);

        wire.put_slice(&body);
        wire.put_bytes(lrc, FCS_LEN);

        wire.freeze()
    }

    /// Clock-by-clock input stream for this frame, `start` on the first tick
    pub fn to_ticks(&self, preamble_len: usize) -> Vec<TickInput> {
        wire_to_ticks(&self.encode(preamble_len))
    }

    /// Decode and verify a wire image produced by [`Frame::encode`]
    ///
    /// Checks run in wire order and the first violation wins, mirroring what
    /// the clocked receiver reports. The strobe byte is not checked and no
    /// address filtering is applied.
    pub fn decode(wire: &[u8], preamble_len: usize) -> Result<Self> {
        let header_end = 1 + preamble_len + 1 + HEADER_LEN;
        if wire.len() < header_end {
            return Err(FrameError::Truncated {
                needed: header_end + FCS_LEN,
                actual: wire.len(),
            });
        }

        if let Some((i, &found)) = wire[1..=preamble_len]
            .iter()
            .enumerate()
            .find(|(_, &b)| b != PREAMBLE_BYTE)
        {
            return Err(ReceiveError::Preamble { position: i, found }.into());
        }

        let sfd = wire[preamble_len + 1];
        if sfd != SFD_BYTE {
            return Err(ReceiveError::Sfd { found: sfd }.into());
        }

        let body_start = preamble_len + 2;
        let header = &wire[body_start..header_end];
        let mut destination = [0u8; MAC_LEN];
        destination.copy_from_slice(&header[..MAC_LEN]);
        let mut source = [0u8; MAC_LEN];
        source.copy_from_slice(&header[MAC_LEN..2 * MAC_LEN]);
        let length = u16::from_be_bytes([header[2 * MAC_LEN], header[2 * MAC_LEN + 1]]) as usize;

        let expected_size = header_end + length + FCS_LEN;
        if wire.len() < expected_size {
            return Err(FrameError::Truncated {
                needed: expected_size,
                actual: wire.len(),
            });
        }
        if wire.len() > expected_size {
            return Err(FrameError::TrailingBytes(wire.len() - expected_size));
        }

        let payload_end = header_end + length;
        let mut lrc = Lrc::new();
        lrc.update(&wire[body_start..payload_end]);
        let expected = lrc.value();

        if let Some((position, &found)) = wire[payload_end..]
            .iter()
            .enumerate()
            .find(|(_, &b)| b != expected)
        {
            return Err(ReceiveError::Checksum {
                position,
                expected,
                found,
            }
            .into());
        }

        Ok(Self {
            destination: MacAddress(destination),
            source: MacAddress(source),
            payload: Bytes::copy_from_slice(&wire[header_end..payload_end]),
        })
    }
}

/// Turn raw wire bytes into ticks, asserting `start` on the first one
pub fn wire_to_ticks(wire: &[u8]) -> Vec<TickInput> {
    wire.iter()
        .enumerate()
        .map(|(i, &data)| {
            if i == 0 {
                TickInput::start(data)
            } else {
                TickInput::data(data)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::DEFAULT_PREAMBLE_LEN;

    fn hello_frame() -> Frame {
        Frame::new(
            MacAddress([0x00, 0x0a, 0x95, 0x9d, 0x68, 0x16]),
            MacAddress([0x00, 0x14, 0x22, 0x01, 0x23, 0x45]),
            &b"Hello World!"[..],
        )
        .unwrap()
    }

    #[test]
    fn test_wire_layout() {
        let frame = hello_frame();
        let wire = frame.encode(DEFAULT_PREAMBLE_LEN);

        assert_eq!(wire.len(), 1 + 6 + 1 + 14 + 12 + 4);
        assert!(wire[..7].iter().all(|&b| b == 0xAA));
        assert_eq!(wire[7], 0xAB);
        assert_eq!(&wire[8..14], &[0x00, 0x0a, 0x95, 0x9d, 0x68, 0x16]);
        assert_eq!(&wire[14..20], &[0x00, 0x14, 0x22, 0x01, 0x23, 0x45]);
        assert_eq!(&wire[20..22], &[0x00, 0x0C]);
        assert_eq!(&wire[22..34], b"Hello World!");
        assert_eq!(&wire[34..], &[0x5E; 4]);
        assert_eq!(frame.lrc(), 0x5E);
    }

    #[test]
    fn test_ticks_strobe_first() {
        let ticks = hello_frame().to_ticks(DEFAULT_PREAMBLE_LEN);
        assert_eq!(ticks.len(), 38);
        assert!(ticks[0].start);
        assert_eq!(ticks[0].data, 0xAA);
        assert!(ticks[1..].iter().all(|t| !t.start && !t.reset));
    }

    #[test]
    fn test_decode_good_frame() {
        let frame = hello_frame();
        let decoded = Frame::decode(&frame.encode(7), 7).unwrap();
        assert_eq!(decoded, frame);

        let empty = Frame::new(MacAddress::BROADCAST, frame.source, Bytes::new()).unwrap();
        let decoded = Frame::decode(&empty.encode(0), 0).unwrap();
        assert_eq!(decoded.length(), 0);
    }

    #[test]
    fn test_decode_faults_in_wire_order() {
        let wire = hello_frame().encode(DEFAULT_PREAMBLE_LEN).to_vec();

        let mut bad = wire.clone();
        bad[3] = 0x00;
        bad[7] = 0x00;
        assert_eq!(
            Frame::decode(&bad, DEFAULT_PREAMBLE_LEN),
            Err(FrameError::Receive(ReceiveError::Preamble {
                position: 2,
                found: 0x00
            }))
        );

        let mut bad = wire.clone();
        bad[7] = 0xAA;
        assert_eq!(
            Frame::decode(&bad, DEFAULT_PREAMBLE_LEN),
            Err(FrameError::Receive(ReceiveError::Sfd { found: 0xAA }))
        );

        let mut bad = wire.clone();
        bad[36] = 0x00;
        assert_eq!(
            Frame::decode(&bad, DEFAULT_PREAMBLE_LEN),
            Err(FrameError::Receive(ReceiveError::Checksum {
                position: 2,
                expected: 0x5E,
                found: 0x00
            }))
        );
    }

    #[test]
    fn test_decode_size_errors() {
        let wire = hello_frame().encode(DEFAULT_PREAMBLE_LEN).to_vec();

        assert!(matches!(
            Frame::decode(&wire[..10], DEFAULT_PREAMBLE_LEN),
            Err(FrameError::Truncated { .. })
        ));
        assert!(matches!(
            Frame::decode(&wire[..wire.len() - 1], DEFAULT_PREAMBLE_LEN),
            Err(FrameError::Truncated { .. })
        ));

        let mut long = wire.clone();
        long.push(0x5E);
        assert_eq!(
            Frame::decode(&long, DEFAULT_PREAMBLE_LEN),
            Err(FrameError::TrailingBytes(1))
        );
    }

    #[test]
    fn test_payload_limit() {
        let too_long = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let result = Frame::new(MacAddress::BROADCAST, MacAddress::default(), too_long);
        assert!(matches!(result, Err(FrameError::PayloadTooLong { .. })));
    }
}
