use core::fmt::Debug;

use thiserror::Error;

use crate::{interfaces::MeshAddr, mesh::PacketType, ota::OtaCommand};

/// Error that possible during stream decoding
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Declared frame length exceeds the bytes currently available.
    #[error("incomplete message, expect {needed} bytes, got {available}")]
    IncompleteMessage { needed: usize, available: usize },
    #[error("not valid packet's checksum, expect {expect:x}, got {got:x}")]
    ChecksumMismatch { expect: u16, got: u16 },
    #[error("not valid correction frame CRC, expect {expect:06x}, got {got:06x}")]
    CorrectionCrcMismatch { expect: u32, got: u32 },
    #[error("unknown discriminator byte 0x{0:02x}")]
    UnknownDiscriminator(u8),
    #[error("invalid packet({packet}) length, expect {expect}, got {got}")]
    InvalidPacketLen {
        packet: &'static str,
        expect: usize,
        got: usize,
    },
    /// The correction output buffer cannot hold the next frame.
    #[error("correction output full, {required} more bytes required")]
    OutputFull { required: usize },
}

impl DecodeError {
    /// Errors caused by corrupted bytes, as opposed to missing ones.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::ChecksumMismatch { .. }
                | Self::CorrectionCrcMismatch { .. }
                | Self::UnknownDiscriminator(_)
                | Self::InvalidPacketLen { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DateTimeError {
    #[error("invalid date")]
    InvalidDate,
    #[error("invalid time")]
    InvalidTime,
    #[error("invalid nanoseconds")]
    InvalidNanoseconds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TimeSyncError {
    /// Expected while the receiver is still cold-starting.
    #[error("time not yet resolved, validity flags 0x{valid:02x}")]
    NotResolved { valid: u8 },
}

/// Malformed OTA packet, rejected before it reaches the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OtaPacketError {
    #[error("OTA packet too short: {got} bytes")]
    TooShort { got: usize },
    #[error("unknown OTA command {0}")]
    UnknownCommand(u32),
    #[error("OTA chunk of {size} bytes exceeds the {max} byte limit")]
    ChunkTooLarge { size: u32, max: usize },
    #[error("OTA chunk declares {declared} bytes, {available} present")]
    Truncated { declared: u32, available: usize },
    #[error("firmware image of {size} bytes does not fit a 32-bit offset")]
    ImageTooLarge { size: usize },
}

/// Errors raised by the over-the-air update state machine.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum OtaError<E: Debug> {
    /// Command received in a phase where it is not allowed.
    #[error("{command:?} not allowed while {phase}")]
    SequencingViolation {
        command: OtaCommand,
        phase: &'static str,
    },
    #[error("unexpected offset: got {got}, expected {expected}")]
    UnexpectedOffset { expected: u32, got: u32 },
    /// No update partition could be acquired.
    #[error("no update partition available: {0:?}")]
    ResourceUnavailable(E),
    #[error("partition write failed: {0:?}")]
    Write(E),
    /// END arrived before every byte announced by START was written.
    #[error("image incomplete: {received} of {total_size} bytes received")]
    IncompleteImage { received: u32, total_size: u32 },
    #[error("partition finalize failed: {0:?}")]
    Finalize(E),
}

/// Malformed or oversized mesh envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("mesh packet needs {expect} bytes, got {got}")]
    Truncated { expect: usize, got: usize },
    #[error("unknown packet type {0}")]
    UnknownType(u16),
    /// Envelope length field exceeds the bytes received.
    #[error("declared length {declared}, {available} bytes received")]
    LengthMismatch { declared: usize, available: usize },
    #[error("payload of {len} bytes exceeds the {max} byte envelope limit")]
    PayloadTooLarge { len: usize, max: usize },
    #[error("scratch buffer too small: need {required}, have {available}")]
    ScratchTooSmall { required: usize, available: usize },
}

/// Errors reported while routing an inbound mesh packet.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum DispatchError<E: Debug> {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error("{packet_type:?} payload too small: expect {expect}, got {got}")]
    PayloadTooSmall {
        packet_type: PacketType,
        expect: usize,
        got: usize,
    },
    #[error("{0:?} packets are not handled by this node")]
    Unsupported(PacketType),
    #[error(transparent)]
    OtaPacket(#[from] OtaPacketError),
    #[error("{0}")]
    Ota(OtaError<E>),
}

impl<E: Debug> From<OtaError<E>> for DispatchError<E> {
    fn from(err: OtaError<E>) -> Self {
        Self::Ota(err)
    }
}

/// Transport refused an outbound packet. Not retried here.
#[derive(Debug, PartialEq, Eq, Error)]
#[error("send to {dest} failed: {cause:?}")]
pub struct SendError<E: Debug> {
    pub dest: MeshAddr,
    pub cause: E,
}
