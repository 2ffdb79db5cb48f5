//! Chunked over-the-air firmware transfer.
//!
//! Receivers run one [OtaTransfer] per node, fed serially by the mesh
//! dispatcher. The root side slices an image with [OtaUpload].

use core::fmt::Debug;

use log::{error, info, warn};

use crate::{
    constants::{OTA_HEADER_LEN, OTA_MAX_CHUNK_LEN, OTA_RESTART_DELAY_MS},
    error::{OtaError, OtaPacketError},
    interfaces::UpdatePartitionManager,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u32)]
pub enum OtaCommand {
    /// Begin a transfer, `size` is the whole image
    Start = 1,
    /// One chunk at `offset`
    Data = 2,
    End = 3,
    /// Receiver feedback, `offset` is the next offset it expects
    Ack = 4,
}

impl TryFrom<u32> for OtaCommand {
    type Error = OtaPacketError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Start),
            2 => Ok(Self::Data),
            3 => Ok(Self::End),
            4 => Ok(Self::Ack),
            other => Err(OtaPacketError::UnknownCommand(other)),
        }
    }
}

/// OTA packet: `cmd:u32, offset:u32, size:u32` (little endian), followed by
/// `size` data bytes for DATA packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OtaPacket<'a> {
    pub command: OtaCommand,
    pub offset: u32,
    pub size: u32,
    pub data: &'a [u8],
}

impl<'a> OtaPacket<'a> {
    pub const fn start(total_size: u32) -> Self {
        Self {
            command: OtaCommand::Start,
            offset: 0,
            size: total_size,
            data: &[],
        }
    }

    /// DATA packet; `chunk` must not exceed [OTA_MAX_CHUNK_LEN].
    pub const fn data(offset: u32, chunk: &'a [u8]) -> Self {
        Self {
            command: OtaCommand::Data,
            offset,
            size: chunk.len() as u32,
            data: chunk,
        }
    }

    pub const fn end() -> Self {
        Self {
            command: OtaCommand::End,
            offset: 0,
            size: 0,
            data: &[],
        }
    }

    pub const fn ack(next_offset: u32) -> Self {
        Self {
            command: OtaCommand::Ack,
            offset: next_offset,
            size: 0,
            data: &[],
        }
    }

    pub fn parse(bytes: &'a [u8]) -> Result<Self, OtaPacketError> {
        if bytes.len() < OTA_HEADER_LEN {
            return Err(OtaPacketError::TooShort { got: bytes.len() });
        }
        let word = |at: usize| {
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let command = OtaCommand::try_from(word(0))?;
        let offset = word(4);
        let size = word(8);
        let data = match command {
            OtaCommand::Data => {
                let len = size as usize;
                if len > OTA_MAX_CHUNK_LEN {
                    return Err(OtaPacketError::ChunkTooLarge {
                        size,
                        max: OTA_MAX_CHUNK_LEN,
                    });
                }
                let available = bytes.len() - OTA_HEADER_LEN;
                if len > available {
                    return Err(OtaPacketError::Truncated {
                        declared: size,
                        available,
                    });
                }
                &bytes[OTA_HEADER_LEN..OTA_HEADER_LEN + len]
            },
            OtaCommand::Start | OtaCommand::End | OtaCommand::Ack => &[],
        };
        Ok(Self {
            command,
            offset,
            size,
            data,
        })
    }

    pub fn encoded_len(&self) -> usize {
        OTA_HEADER_LEN + self.data.len()
    }

    /// Writes the packet into `out`. Returns `None` if `out` is too small.
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        let len = self.encoded_len();
        self.write_exact(out.get_mut(..len)?);
        Some(len)
    }

    /// `out` must be exactly [OtaPacket::encoded_len] bytes.
    pub(crate) fn write_exact(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&(self.command as u32).to_le_bytes());
        out[4..8].copy_from_slice(&self.offset.to_le_bytes());
        out[8..12].copy_from_slice(&self.size.to_le_bytes());
        out[OTA_HEADER_LEN..].copy_from_slice(self.data);
    }
}

/// Transfer phase. `InProgress` owns the open partition handle.
#[derive(Debug)]
pub enum OtaPhase<H> {
    Idle,
    InProgress {
        handle: H,
        expected_next_offset: u32,
        total_size: u32,
    },
    /// Image accepted and marked bootable; only a restart is left.
    Complete,
}

impl<H> OtaPhase<H> {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InProgress { .. } => "in progress",
            Self::Complete => "complete",
        }
    }
}

/// Successful outcome of one OTA command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaProgress {
    Started { total_size: u32 },
    ChunkAccepted { next_offset: u32 },
    /// The image is bootable; the device must restart after the delay.
    Completed { restart_after_ms: u32 },
    /// ACKs are meant for the sender and are dropped by receivers.
    AckIgnored,
}

/// Receiver-side state machine: `Idle -> InProgress -> Complete`, back to
/// `Idle` when finalizing fails.
///
/// Chunks are written strictly in order. Anything but the expected offset
/// is rejected and the sender must retransmit.
#[derive(Debug)]
pub struct OtaTransfer<H> {
    phase: OtaPhase<H>,
}

impl<H> Default for OtaTransfer<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> OtaTransfer<H> {
    pub const fn new() -> Self {
        Self {
            phase: OtaPhase::Idle,
        }
    }

    pub fn phase(&self) -> &OtaPhase<H> {
        &self.phase
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, OtaPhase::Complete)
    }

    /// Offset the next DATA chunk must carry, `None` unless in progress.
    pub fn expected_next_offset(&self) -> Option<u32> {
        match self.phase {
            OtaPhase::InProgress {
                expected_next_offset,
                ..
            } => Some(expected_next_offset),
            _ => None,
        }
    }

    /// Applies one command. Errors never leave a partition marked bootable.
    pub fn handle<P>(
        &mut self,
        packet: &OtaPacket<'_>,
        partitions: &mut P,
    ) -> Result<OtaProgress, OtaError<P::Error>>
    where
        P: UpdatePartitionManager<Handle = H>,
    {
        match packet.command {
            OtaCommand::Start => self.start(packet.size, partitions),
            OtaCommand::Data => self.write_chunk(packet, partitions),
            OtaCommand::End => self.finish(partitions),
            OtaCommand::Ack => Ok(OtaProgress::AckIgnored),
        }
    }

    fn violation<E: Debug>(&self, command: OtaCommand) -> OtaError<E> {
        let phase = self.phase.name();
        warn!("OTA {command:?} ignored while {phase}");
        OtaError::SequencingViolation { command, phase }
    }

    fn start<P>(
        &mut self,
        total_size: u32,
        partitions: &mut P,
    ) -> Result<OtaProgress, OtaError<P::Error>>
    where
        P: UpdatePartitionManager<Handle = H>,
    {
        if !matches!(self.phase, OtaPhase::Idle) {
            return Err(self.violation(OtaCommand::Start));
        }
        info!("OTA START received, size={total_size}");
        let handle = partitions.begin(total_size).map_err(|e| {
            error!("no update partition: {e:?}");
            OtaError::ResourceUnavailable(e)
        })?;
        self.phase = OtaPhase::InProgress {
            handle,
            expected_next_offset: 0,
            total_size,
        };
        Ok(OtaProgress::Started { total_size })
    }

    fn write_chunk<P>(
        &mut self,
        packet: &OtaPacket<'_>,
        partitions: &mut P,
    ) -> Result<OtaProgress, OtaError<P::Error>>
    where
        P: UpdatePartitionManager<Handle = H>,
    {
        let OtaPhase::InProgress {
            handle,
            expected_next_offset,
            ..
        } = &mut self.phase
        else {
            return Err(self.violation(OtaCommand::Data));
        };
        if packet.offset != *expected_next_offset {
            let expected = *expected_next_offset;
            warn!("Unexpected offset: got {}, expected {expected}", packet.offset);
            return Err(OtaError::UnexpectedOffset {
                expected,
                got: packet.offset,
            });
        }
        if let Err(e) = partitions.write(handle, packet.offset, packet.data) {
            error!("OTA write at {} failed: {e:?}", packet.offset);
            return Err(OtaError::Write(e));
        }
        *expected_next_offset = expected_next_offset.saturating_add(packet.data.len() as u32);
        Ok(OtaProgress::ChunkAccepted {
            next_offset: *expected_next_offset,
        })
    }

    fn finish<P>(&mut self, partitions: &mut P) -> Result<OtaProgress, OtaError<P::Error>>
    where
        P: UpdatePartitionManager<Handle = H>,
    {
        let (mut handle, expected_next_offset, total_size) =
            match core::mem::replace(&mut self.phase, OtaPhase::Idle) {
                OtaPhase::InProgress {
                    handle,
                    expected_next_offset,
                    total_size,
                } => (handle, expected_next_offset, total_size),
                other => {
                    self.phase = other;
                    return Err(self.violation(OtaCommand::End));
                },
            };
        if expected_next_offset != total_size {
            error!("OTA END after {expected_next_offset} of {total_size} bytes");
            return Err(OtaError::IncompleteImage {
                received: expected_next_offset,
                total_size,
            });
        }
        let finalized = partitions
            .finalize(&mut handle)
            .and_then(|()| partitions.mark_bootable(&handle));
        if let Err(e) = finalized {
            error!("OTA finalize failed: {e:?}");
            return Err(OtaError::Finalize(e));
        }
        self.phase = OtaPhase::Complete;
        info!("OTA update complete, rebooting in {OTA_RESTART_DELAY_MS} ms");
        Ok(OtaProgress::Completed {
            restart_after_ms: OTA_RESTART_DELAY_MS,
        })
    }
}

/// Sender-side slicer for one firmware image.
///
/// Yields START, the DATA chunks in order, then END. An ACK whose offset is
/// behind the chunks already sent rewinds to it.
#[derive(Debug, Clone)]
pub struct OtaUpload<'a> {
    image: &'a [u8],
    chunk_len: usize,
    next_offset: usize,
    stage: UploadStage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadStage {
    Start,
    Data,
    Done,
}

impl<'a> OtaUpload<'a> {
    pub fn new(image: &'a [u8]) -> Result<Self, OtaPacketError> {
        if u32::try_from(image.len()).is_err() {
            return Err(OtaPacketError::ImageTooLarge { size: image.len() });
        }
        Ok(Self {
            image,
            chunk_len: OTA_MAX_CHUNK_LEN,
            next_offset: 0,
            stage: UploadStage::Start,
        })
    }

    /// Chunk size, clamped to `1..=OTA_MAX_CHUNK_LEN`.
    pub fn with_chunk_len(mut self, len: usize) -> Self {
        self.chunk_len = len.clamp(1, OTA_MAX_CHUNK_LEN);
        self
    }

    pub fn is_done(&self) -> bool {
        self.stage == UploadStage::Done
    }

    /// Offset of the next DATA chunk to send.
    pub fn next_offset(&self) -> u32 {
        self.next_offset as u32
    }

    /// Next packet to transmit, `None` once END was produced.
    pub fn next_packet(&mut self) -> Option<OtaPacket<'a>> {
        match self.stage {
            UploadStage::Start => {
                self.stage = UploadStage::Data;
                Some(OtaPacket::start(self.image.len() as u32))
            },
            UploadStage::Data if self.next_offset < self.image.len() => {
                let end = (self.next_offset + self.chunk_len).min(self.image.len());
                let chunk = &self.image[self.next_offset..end];
                let packet = OtaPacket::data(self.next_offset as u32, chunk);
                self.next_offset = end;
                Some(packet)
            },
            UploadStage::Data => {
                self.stage = UploadStage::Done;
                Some(OtaPacket::end())
            },
            UploadStage::Done => None,
        }
    }

    /// Handles receiver feedback. Returns `true` if the upload rewound.
    pub fn on_ack(&mut self, next_offset: u32) -> bool {
        let acked = next_offset as usize;
        if matches!(self.stage, UploadStage::Start | UploadStage::Done) || acked >= self.next_offset {
            return false;
        }
        self.next_offset = acked;
        self.stage = UploadStage::Data;
        true
    }
}
