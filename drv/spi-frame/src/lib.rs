// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level framing for the SPI stack: the [`Packet`] value type carried
//! between transports, the fixed 84-byte [`SpiFrame`], and the Pearson
//! hash used for frame integrity.
//!
//! This crate has no knowledge of slaves, threads, or the outbound queue; it
//! is pure codec, exercised directly by `drv-spi-engine`.

mod hash;
mod packet;

pub use hash::pearson_hash;
pub use packet::{Packet, PacketError, HEADER_SIZE, MAX_PACKET_LEN, MAX_PAYLOAD_LEN};

use thiserror::Error;

/// Size in bytes of one SPI transaction, fixed by the wire contract.
pub const FRAME_SIZE: usize = 84;

/// The byte that begins every non-empty frame.
pub const PREAMBLE: u8 = 0xAA;

/// `length` field of the smallest legal frame: preamble, length, info, hash.
pub const EMPTY_FRAME_LEN: u8 = 4;

/// Smallest legal `length` for a frame that carries a [`Packet`]: the frame's
/// own four bytes of overhead plus the packet's own header.
const MIN_PACKET_FRAME_LEN: u8 = EMPTY_FRAME_LEN + HEADER_SIZE as u8;

/// Failures building an 84-byte frame from a [`Packet`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum EncodeError {
    /// The packet's declared length exceeds [`MAX_PACKET_LEN`].
    #[error("packet length {0} exceeds the {MAX_PACKET_LEN}-byte wire maximum")]
    Oversize(u8),
}

/// Failures parsing a received 84-byte buffer into a frame.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum DecodeError {
    /// The first byte was neither the preamble nor zero.
    #[error("bad preamble byte 0x{0:02x}")]
    BadPreamble(u8),
    /// `length` fell outside the legal range for a non-empty frame.
    #[error("bad frame length {0}")]
    BadLength(u8),
    /// The trailing byte did not match the Pearson hash of the rest of the
    /// frame.
    #[error("hash mismatch: frame says 0x{frame:02x}, computed 0x{computed:02x}")]
    HashMismatch { frame: u8, computed: u8 },
    /// The bytes inside `length` did not parse as a well-formed [`Packet`].
    #[error("malformed packet in frame: {0}")]
    BadPacket(#[from] PacketError),
}

/// The result of successfully decoding an 84-byte buffer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Decoded {
    /// No packet was present: either the frame was a deliberate empty
    /// poll/keep-alive (`length == 4`), or the slave was electrically quiet
    /// (preamble byte read back as zero). Both are normal operation, not
    /// errors (see `ReadNone` in the design).
    None {
        /// Whether the slave's busy bit was set. Always `false` for the
        /// electrically-quiet case, since no info byte was actually read.
        busy: bool,
    },
    /// A packet was present and its integrity hash checked out.
    Packet {
        packet: Packet,
        /// The slave's busy bit from this frame's info byte.
        busy: bool,
    },
}

impl Decoded {
    /// The slave's busy bit, if one could be determined.
    pub fn busy(&self) -> bool {
        match self {
            Decoded::None { busy } | Decoded::Packet { busy, .. } => *busy,
        }
    }

    /// The carried packet, if any.
    pub fn into_packet(self) -> Option<Packet> {
        match self {
            Decoded::None { .. } => None,
            Decoded::Packet { packet, .. } => Some(packet),
        }
    }
}

/// One 84-byte SPI transaction buffer: `[preamble][length][payload][info][hash]`.
pub type SpiFrame = [u8; FRAME_SIZE];

/// Builds an 84-byte frame.
///
/// If `packet` is `None`, or `busy_known` is `true` (the slave reported busy
/// on the previous exchange, so there is no point re-sending), this produces
/// the empty 4-byte keep-alive frame. Otherwise it serializes `packet` into
/// the frame's payload region.
///
/// The master always sends `info == 0`; only slaves set the busy bit.
pub fn encode(packet: Option<&Packet>, busy_known: bool) -> Result<SpiFrame, EncodeError> {
    let mut frame = [0u8; FRAME_SIZE];

    let total_len = match packet {
        Some(packet) if !busy_known => {
            if packet.length() as usize > MAX_PACKET_LEN {
                return Err(EncodeError::Oversize(packet.length()));
            }
            let total_len = packet.length() + EMPTY_FRAME_LEN;
            let payload_len = packet.length() as usize;
            frame[2..2 + payload_len].copy_from_slice(&packet.to_bytes()[..payload_len]);
            total_len
        }
        _ => EMPTY_FRAME_LEN,
    };

    frame[0] = PREAMBLE;
    frame[1] = total_len;
    // info byte sits immediately before the hash; master always sends 0,
    // which frame[..] already is thanks to the zero-initialized buffer.
    let hash = pearson_hash(&frame[..total_len as usize - 1]);
    frame[total_len as usize - 1] = hash;

    Ok(frame)
}

/// Parses an 84-byte buffer received from the bus.
///
/// Validation order matters: an all-zero preamble byte (the slave not
/// driving MISO at all) must be distinguished from a preamble byte that is
/// simply wrong, which in turn must be distinguished from a length or hash
/// problem. See the module invariants in the design notes.
pub fn decode(buffer: &SpiFrame) -> Result<Decoded, DecodeError> {
    if buffer[0] == 0 {
        return Ok(Decoded::None { busy: false });
    }
    if buffer[0] != PREAMBLE {
        return Err(DecodeError::BadPreamble(buffer[0]));
    }

    let length = buffer[1];
    if length != EMPTY_FRAME_LEN && (length < MIN_PACKET_FRAME_LEN || length as usize > FRAME_SIZE)
    {
        return Err(DecodeError::BadLength(length));
    }

    let computed = pearson_hash(&buffer[..length as usize - 1]);
    let carried = buffer[length as usize - 1];
    if computed != carried {
        return Err(DecodeError::HashMismatch {
            frame: carried,
            computed,
        });
    }

    let info = buffer[length as usize - 2];
    let busy = info & 1 != 0;

    if length == EMPTY_FRAME_LEN {
        return Ok(Decoded::None { busy });
    }

    let payload_len = length as usize - EMPTY_FRAME_LEN as usize;
    let packet = Packet::from_bytes(&buffer[2..2 + payload_len])?;
    Ok(Decoded::Packet { packet, busy })
}
