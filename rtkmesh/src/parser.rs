//! Stream decoder for one receiver read holding UBX navigation messages and
//! RTCM 3 correction frames back to back.

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use log::{debug, info, warn};

mod buffer;
pub(crate) mod checksum;
mod frame;

pub use buffer::{FixedBuffer, FixedLinearBuffer, RawFrame, UnderlyingBuffer};
pub use checksum::{rtcm_crc24q, ubx_checksum, ubx_frame_len};
pub use frame::{FrameHeader, FrameKind, HeaderError};

use crate::{
    config::{CorrectionCheck, DecoderConfig, SyncPolicy},
    constants::{RTCM_HEADER_SIZE, UBX_CLASS_NAV, UBX_HEADER_LEN, UBX_NAV_PVT_ID, UBX_NAV_SVIN_ID},
    error::DecodeError,
    interfaces::MonotonicClock,
    shared::{NavState, SharedTime},
    time_sync::TimeSynchronizer,
    ubx_packets::{NavPositionFix, SurveyInStatus},
};
use checksum::verify_ubx_frame;

/// What a single decode step consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// NAV-PVT stored; `time_updated` tells whether it also refreshed the
    /// shared time record.
    PositionFix { time_updated: bool },
    /// NAV-SVIN stored.
    SurveyIn,
    /// Valid UBX message that is not tracked, skipped.
    OtherNavigation { class: u8, id: u8 },
    /// Correction frame of `len` bytes appended to the output.
    Correction { len: usize },
}

/// Counters for one [StreamDecoder::decode] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecodeSummary {
    /// Messages consumed, rejected ones included
    pub messages: usize,
    pub navigation: usize,
    pub corrections: usize,
    pub correction_bytes: usize,
    /// Corrupted messages skipped under [SyncPolicy::Resync]
    pub rejected: usize,
    pub time_updated: bool,
}

impl DecodeSummary {
    /// Adds the counters of a later pass.
    pub fn merge(&mut self, pass: &DecodeSummary) {
        self.messages += pass.messages;
        self.navigation += pass.navigation;
        self.corrections += pass.corrections;
        self.correction_bytes += pass.correction_bytes;
        self.rejected += pass.rejected;
        self.time_updated |= pass.time_updated;
    }
}

/// Decodes receiver reads into the shared navigation state and a correction
/// output buffer.
///
/// ```
/// use rtkmesh::{NavState, SharedTime, StreamDecoder, RawFrame, FixedBuffer, StdClock};
///
/// static NAV: NavState = NavState::new();
/// static TIME: SharedTime = SharedTime::new(None);
///
/// let mut decoder = StreamDecoder::new(&NAV, &TIME, StdClock::new());
/// let read = [0xd3, 0x00, 0x00, 0x47, 0xea, 0x4b];
/// let mut frame = RawFrame::new(&read);
/// let mut corrections = FixedBuffer::<1024>::new();
/// let summary = decoder.decode(&mut frame, &mut corrections).unwrap();
/// assert_eq!(summary.corrections, 1);
/// assert!(frame.is_empty());
/// ```
pub struct StreamDecoder<'s, C> {
    nav: &'s NavState,
    time: &'s SharedTime,
    clock: C,
    config: DecoderConfig,
}

impl<'s, C: MonotonicClock> StreamDecoder<'s, C> {
    pub fn new(nav: &'s NavState, time: &'s SharedTime, clock: C) -> Self {
        Self {
            nav,
            time,
            clock,
            config: DecoderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DecoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decodes messages from the head of `frame` until it is empty or the
    /// per-pass message cap is reached. Bytes left over by the cap stay in
    /// `frame` for the next call.
    ///
    /// An incomplete message discards the rest of `frame`. A corrupted one
    /// either discards the rest ([SyncPolicy::Strict]) or skips to the next
    /// lead byte ([SyncPolicy::Resync]). On [DecodeError::OutputFull] the
    /// offending frame is left unconsumed. Correction frames appended before
    /// an error stay in `corrections`.
    pub fn decode<B>(
        &mut self,
        frame: &mut RawFrame<'_>,
        corrections: &mut B,
    ) -> Result<DecodeSummary, DecodeError>
    where
        B: UnderlyingBuffer + ?Sized,
    {
        let mut summary = DecodeSummary::default();
        let cap = self.config.max_messages_per_pass.max(1);
        while !frame.is_empty() && summary.messages < cap {
            match self.decode_one(frame, corrections) {
                Ok(decoded) => {
                    summary.messages += 1;
                    match decoded {
                        Decoded::PositionFix { time_updated } => {
                            summary.navigation += 1;
                            summary.time_updated |= time_updated;
                        },
                        Decoded::SurveyIn | Decoded::OtherNavigation { .. } => {
                            summary.navigation += 1;
                        },
                        Decoded::Correction { len } => {
                            summary.corrections += 1;
                            summary.correction_bytes += len;
                        },
                    }
                },
                Err(err @ DecodeError::IncompleteMessage { .. }) => {
                    let lost = frame.discard();
                    warn!("{err}, dropping {lost} pending bytes");
                    return Err(err);
                },
                Err(err) if err.is_integrity_failure() => match self.config.sync_policy {
                    SyncPolicy::Strict => {
                        let lost = frame.discard();
                        warn!("{err}, dropping {lost} pending bytes");
                        return Err(err);
                    },
                    SyncPolicy::Resync => {
                        let skipped = frame.skip_to_next(FrameKind::is_sync);
                        warn!("{err}, skipped {skipped} bytes");
                        summary.messages += 1;
                        summary.rejected += 1;
                    },
                },
                Err(err) => return Err(err),
            }
        }
        if !frame.is_empty() {
            debug!(
                "message cap reached, {} bytes left for the next pass",
                frame.len()
            );
        }
        Ok(summary)
    }

    /// Decodes the single message at the head of `frame`.
    ///
    /// On success the message is consumed. On error `frame` is left as it
    /// was; dropping or resynchronizing is up to the caller.
    pub fn decode_one<B>(
        &mut self,
        frame: &mut RawFrame<'_>,
        corrections: &mut B,
    ) -> Result<Decoded, DecodeError>
    where
        B: UnderlyingBuffer + ?Sized,
    {
        let bytes = frame.remaining();
        let header = match FrameHeader::parse(bytes) {
            Ok(header) => header,
            Err(HeaderError::Short { needed }) => {
                return Err(DecodeError::IncompleteMessage {
                    needed,
                    available: bytes.len(),
                })
            },
            Err(HeaderError::Unknown(byte)) => return Err(DecodeError::UnknownDiscriminator(byte)),
        };
        let total = header.total_len();
        if bytes.len() < total {
            return Err(DecodeError::IncompleteMessage {
                needed: total,
                available: bytes.len(),
            });
        }
        let message = &bytes[..total];

        let decoded = match header {
            FrameHeader::Navigation {
                class,
                id,
                payload_len,
            } => {
                verify_ubx_frame(message, payload_len)?;
                let payload = &message[UBX_HEADER_LEN..UBX_HEADER_LEN + payload_len];
                self.store_navigation(class, id, payload)?
            },
            FrameHeader::Correction { payload_len } => {
                if self.config.correction_check == CorrectionCheck::Crc24q {
                    verify_correction_crc(message, payload_len)?;
                }
                if corrections.spare_capacity() < total {
                    return Err(DecodeError::OutputFull { required: total });
                }
                corrections.extend_from_slice(message);
                debug!("correction frame, {total} bytes");
                Decoded::Correction { len: total }
            },
        };
        frame.advance(total);
        Ok(decoded)
    }

    /// Decodes a whole read, running as many capped passes as it takes.
    /// Returns the merged counters and the correction bytes found, if any.
    #[cfg(feature = "alloc")]
    pub fn decode_bytes(
        &mut self,
        data: &[u8],
    ) -> Result<(DecodeSummary, Option<Vec<u8>>), DecodeError> {
        let mut frame = RawFrame::new(data);
        let mut corrections = Vec::new();
        let mut total = DecodeSummary::default();
        while !frame.is_empty() {
            let pass = self.decode(&mut frame, &mut corrections)?;
            total.merge(&pass);
        }
        Ok((total, (!corrections.is_empty()).then_some(corrections)))
    }

    fn store_navigation(&mut self, class: u8, id: u8, payload: &[u8]) -> Result<Decoded, DecodeError> {
        match (class, id) {
            (UBX_CLASS_NAV, UBX_NAV_PVT_ID) => {
                let fix = NavPositionFix::from_payload(payload)?;
                self.nav.store_fix(fix);
                info!(
                    "NAV-PVT iTOW {} fix {:?} sats {}",
                    fix.itow,
                    fix.fix_type(),
                    fix.num_satellites
                );
                let time_updated =
                    TimeSynchronizer::synchronize(&fix, &self.clock, self.time).is_ok();
                Ok(Decoded::PositionFix { time_updated })
            },
            (UBX_CLASS_NAV, UBX_NAV_SVIN_ID) => {
                let svin = SurveyInStatus::from_payload(payload)?;
                self.nav.store_survey_in(svin);
                info!(
                    "NAV-SVIN dur {} s obs {} valid {} active {}",
                    svin.dur, svin.obs, svin.valid, svin.active
                );
                Ok(Decoded::SurveyIn)
            },
            _ => {
                debug!("skipping UBX 0x{class:02x}/0x{id:02x}, {} bytes", payload.len());
                Ok(Decoded::OtherNavigation { class, id })
            },
        }
    }
}

fn verify_correction_crc(message: &[u8], payload_len: usize) -> Result<(), DecodeError> {
    let crc_offset = RTCM_HEADER_SIZE + payload_len;
    let got = rtcm_crc24q(&message[..crc_offset]);
    let expect = u32::from_be_bytes([
        0,
        message[crc_offset],
        message[crc_offset + 1],
        message[crc_offset + 2],
    ]);
    if got == expect {
        Ok(())
    } else {
        Err(DecodeError::CorrectionCrcMismatch { expect, got })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::NAV_SVIN_PAYLOAD_LEN, time_sync::SharedTimeRecord, ubx_packets::ubx_frame,
    };

    struct FixedClock(u64);

    impl MonotonicClock for FixedClock {
        fn now_us(&self) -> u64 {
            self.0
        }
    }

    fn rtcm(payload: &[u8], out: &mut [u8]) -> usize {
        let len = payload.len();
        out[0] = 0xd3;
        out[1] = (len >> 8) as u8 & 0x03;
        out[2] = len as u8;
        out[3..3 + len].copy_from_slice(payload);
        let crc = rtcm_crc24q(&out[..3 + len]).to_be_bytes();
        out[3 + len..6 + len].copy_from_slice(&crc[1..]);
        len + 6
    }

    fn svin_frame(obs: u32, out: &mut [u8]) -> usize {
        let mut payload = [0u8; NAV_SVIN_PAYLOAD_LEN];
        SurveyInStatus {
            obs,
            ..Default::default()
        }
        .write_payload(&mut payload);
        ubx_frame(UBX_CLASS_NAV, UBX_NAV_SVIN_ID, &payload, out).unwrap()
    }

    #[test]
    fn empty_correction_frame_crc() {
        let mut out = [0u8; 6];
        rtcm(&[], &mut out);
        assert_eq!(out, [0xd3, 0x00, 0x00, 0x47, 0xea, 0x4b]);
    }

    #[test]
    fn svin_then_correction() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(7));

        let mut data = [0u8; 128];
        let mut n = svin_frame(12, &mut data);
        n += rtcm(&[1, 2, 3, 4], &mut data[n..]);

        let mut frame = RawFrame::new(&data[..n]);
        let mut out = FixedBuffer::<64>::new();
        let summary = decoder.decode(&mut frame, &mut out).unwrap();
        assert_eq!(summary.messages, 2);
        assert_eq!(summary.navigation, 1);
        assert_eq!(summary.correction_bytes, 10);
        assert_eq!(out.as_bytes(), &data[n - 10..n]);
        assert_eq!(nav.survey_in().map(|s| s.obs), Some(12));
        assert!(time.get().is_none());
    }

    #[test]
    fn output_full_leaves_frame() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(0));
        let mut data = [0u8; 16];
        let n = rtcm(&[9; 8], &mut data);
        let mut frame = RawFrame::new(&data[..n]);
        let mut out = FixedBuffer::<8>::new();
        assert_eq!(
            decoder.decode(&mut frame, &mut out),
            Err(DecodeError::OutputFull { required: 14 })
        );
        assert_eq!(frame.len(), 14);
        assert!(out.is_empty());
    }

    #[test]
    fn corrupted_correction_crc() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut data = [0u8; 16];
        let n = rtcm(&[5; 4], &mut data);
        data[4] ^= 0x01;

        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(0));
        let mut frame = RawFrame::new(&data[..n]);
        let mut out = FixedBuffer::<32>::new();
        assert!(matches!(
            decoder.decode(&mut frame, &mut out),
            Err(DecodeError::CorrectionCrcMismatch { .. })
        ));
        assert!(frame.is_empty());

        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(0))
            .with_config(DecoderConfig::new().with_correction_check(CorrectionCheck::Trust));
        let mut frame = RawFrame::new(&data[..n]);
        let summary = decoder.decode(&mut frame, &mut out).unwrap();
        assert_eq!(summary.corrections, 1);
    }

    #[test]
    fn fix_updates_time() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(99));
        let mut payload = [0u8; NavPositionFix::PAYLOAD_LEN];
        NavPositionFix {
            itow: 100_000,
            nanosec: 500_000,
            time_accuracy: 1500,
            valid: 0x07,
            ..Default::default()
        }
        .write_payload(&mut payload);
        let mut data = [0u8; 100];
        let n = ubx_frame(UBX_CLASS_NAV, UBX_NAV_PVT_ID, &payload, &mut data).unwrap();
        let mut frame = RawFrame::new(&data[..n]);
        let decoded = decoder
            .decode_one(&mut frame, &mut FixedBuffer::<0>::new())
            .unwrap();
        assert_eq!(decoded, Decoded::PositionFix { time_updated: true });
        assert_eq!(
            time.get(),
            Some(SharedTimeRecord {
                gnss_time_of_week_us: 100_000_500,
                local_time_at_update_us: 99,
                time_accuracy_us: 2,
            })
        );
    }

    #[test]
    fn decode_one_keeps_frame_on_error() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut decoder = StreamDecoder::new(&nav, &time, FixedClock(0));
        let data = [0x24, 0x47, 0x50];
        let mut frame = RawFrame::new(&data);
        assert_eq!(
            decoder.decode_one(&mut frame, &mut FixedBuffer::<4>::new()),
            Err(DecodeError::UnknownDiscriminator(0x24))
        );
        assert_eq!(frame.len(), 3);
    }
}
