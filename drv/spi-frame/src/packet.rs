// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The [`Packet`] value type: the header+payload blob carried inside an SPI
//! frame, and also the unit the router hands between transports.

use thiserror::Error;

/// Bytes in a packet header: `uid(4) + length(1) + function(1) + seq_and_flags(1) + flags(1)`.
pub const HEADER_SIZE: usize = 8;

/// Largest legal total packet length (header included), per the wire contract.
pub const MAX_PACKET_LEN: usize = 80;

/// Largest legal payload a packet can carry.
pub const MAX_PAYLOAD_LEN: usize = MAX_PACKET_LEN - HEADER_SIZE;

/// `uid` value reserved to mean "every slave", never assigned to a real device.
pub const BROADCAST_UID: u32 = 0;

/// Failures constructing or parsing a [`Packet`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PacketError {
    /// The requested payload would push the packet past [`MAX_PACKET_LEN`].
    #[error("packet payload would exceed the {MAX_PACKET_LEN}-byte wire maximum")]
    Oversize,
    /// A buffer being parsed was shorter than a header.
    #[error("buffer of {0} bytes is shorter than an {HEADER_SIZE}-byte packet header")]
    Truncated(usize),
    /// The header's own `length` field disagreed with the bytes available.
    #[error("header claims length {declared} but buffer holds {available} bytes")]
    LengthMismatch { declared: u8, available: usize },
}

/// A request or response packet: 8-byte header plus up to 72 bytes of
/// payload, always carried by value.
///
/// `Packet` never allocates: the payload lives in a fixed-size array sized
/// to the wire maximum, and `length` tracks how much of it is in use. This
/// is what lets the router and the SPI engine copy packets across the
/// outbound queue and the event bridge by plain `Copy`, never by reference
/// into a pool.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct Packet {
    uid: u32,
    length: u8,
    function: u8,
    seq_and_flags: u8,
    flags: u8,
    payload: [u8; MAX_PAYLOAD_LEN],
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("uid", &format_args!("0x{:08x}", self.uid))
            .field("length", &self.length)
            .field("function", &self.function)
            .field("sequence_number", &self.sequence_number())
            .field("response_expected", &self.response_expected())
            .field("flags", &self.flags)
            .field("payload", &self.payload())
            .finish()
    }
}

impl Packet {
    /// Builds a packet from its logical fields.
    ///
    /// `sequence_number` is truncated to its low 4 bits; `response_expected`
    /// occupies bit 4 of the combined `seq_and_flags` byte.
    pub fn new(
        uid: u32,
        function: u8,
        sequence_number: u8,
        response_expected: bool,
        flags: u8,
        payload: &[u8],
    ) -> Result<Self, PacketError> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(PacketError::Oversize);
        }
        let mut buf = [0u8; MAX_PAYLOAD_LEN];
        buf[..payload.len()].copy_from_slice(payload);
        let seq_and_flags =
            (sequence_number & 0x0f) | if response_expected { 0x10 } else { 0 };
        Ok(Packet {
            uid,
            length: (HEADER_SIZE + payload.len()) as u8,
            function,
            seq_and_flags,
            flags,
            payload: buf,
        })
    }

    /// Parses a packet out of its serialized header+payload bytes.
    ///
    /// `bytes` must be exactly as long as the header's own `length` field
    /// declares; this is how the SPI frame decoder hands over the payload
    /// region it has already size-checked.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < HEADER_SIZE {
            return Err(PacketError::Truncated(bytes.len()));
        }
        let declared = bytes[4];
        if declared as usize != bytes.len() {
            return Err(PacketError::LengthMismatch {
                declared,
                available: bytes.len(),
            });
        }
        let uid = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let function = bytes[5];
        let seq_and_flags = bytes[6];
        let flags = bytes[7];
        Self::new(
            uid,
            function,
            seq_and_flags & 0x0f,
            seq_and_flags & 0x10 != 0,
            flags,
            &bytes[HEADER_SIZE..],
        )
    }

    /// Serializes the header and payload into a fixed wire-sized buffer.
    ///
    /// Only the first [`Packet::length`] bytes of the result are meaningful;
    /// the rest is zero padding so callers can copy a fixed-size array.
    pub fn to_bytes(&self) -> [u8; MAX_PACKET_LEN] {
        let mut buf = [0u8; MAX_PACKET_LEN];
        buf[0..4].copy_from_slice(&self.uid.to_le_bytes());
        buf[4] = self.length;
        buf[5] = self.function;
        buf[6] = self.seq_and_flags;
        buf[7] = self.flags;
        let payload_len = self.length as usize - HEADER_SIZE;
        buf[HEADER_SIZE..HEADER_SIZE + payload_len]
            .copy_from_slice(&self.payload[..payload_len]);
        buf
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Whether this packet's UID is the broadcast sentinel.
    pub fn is_broadcast(&self) -> bool {
        self.uid == BROADCAST_UID
    }

    /// Total length including the 8-byte header.
    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn function(&self) -> u8 {
        self.function
    }

    pub fn sequence_number(&self) -> u8 {
        self.seq_and_flags & 0x0f
    }

    pub fn response_expected(&self) -> bool {
        self.seq_and_flags & 0x10 != 0
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length as usize - HEADER_SIZE]
    }

    /// Returns a copy of this packet with a new UID, otherwise identical.
    ///
    /// Used when fanning a broadcast packet out to each owning slave: the
    /// broadcast packet itself keeps UID 0 on the wire (slaves don't filter
    /// on it), but callers that need a per-slave routing key reach for this.
    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let packet = Packet::new(42, 7, 3, true, 0xAB, &[1, 2, 3]).unwrap();
        let bytes = packet.to_bytes();
        let parsed = Packet::from_bytes(&bytes[..packet.length() as usize]).unwrap();
        assert_eq!(parsed, packet);
    }

    #[test]
    fn sequence_number_is_masked_to_four_bits() {
        let packet = Packet::new(1, 0, 0xFF, false, 0, &[]).unwrap();
        assert_eq!(packet.sequence_number(), 0x0f);
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        assert_eq!(Packet::from_bytes(&[1, 2, 3]), Err(PacketError::Truncated(3)));
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut bytes = Packet::new(1, 0, 0, false, 0, &[9, 9]).unwrap().to_bytes();
        bytes[4] = 200; // lie about the declared length
        assert!(matches!(
            Packet::from_bytes(&bytes[..10]),
            Err(PacketError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn broadcast_uid_is_recognized() {
        let packet = Packet::new(BROADCAST_UID, 0, 0, false, 0, &[]).unwrap();
        assert!(packet.is_broadcast());
    }
}
