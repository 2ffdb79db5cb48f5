//! # rtkmesh
//!
//! Core of a mesh-networked RTK relay node: decodes the byte stream of a
//! GNSS receiver into UBX navigation records and RTCM correction frames,
//! keeps a shared local-to-GNSS time mapping, and dispatches packets
//! received over the mesh (echo diagnostics, firmware identity, over-the-air
//! updates).
//!
//! Hardware is reached only through the traits in [interfaces].
//!
//! Decoding receiver output
//! ========================
//!
//! One UART read is wrapped in a [RawFrame] and handed to a [StreamDecoder].
//! Navigation records land in a [NavState], valid fixes refresh a
//! [SharedTime], and correction frames are appended to any
//! [UnderlyingBuffer]:
//! ```
//! use rtkmesh::{
//!     ubx_frame, FixedBuffer, NavPositionFix, NavState, RawFrame, SharedTime, StdClock,
//!     StreamDecoder,
//! };
//!
//! static NAV: NavState = NavState::new();
//! static TIME: SharedTime = SharedTime::new(None);
//!
//! let fix = NavPositionFix {
//!     itow: 100_000,
//!     nanosec: 500_000,
//!     time_accuracy: 1500,
//!     valid: 0x07,
//!     ..Default::default()
//! };
//! let mut payload = [0u8; NavPositionFix::PAYLOAD_LEN];
//! fix.write_payload(&mut payload);
//! let mut read = [0u8; 128];
//! let len = ubx_frame(0x01, 0x07, &payload, &mut read).unwrap();
//!
//! let mut decoder = StreamDecoder::new(&NAV, &TIME, StdClock::new());
//! let mut corrections = FixedBuffer::<1024>::new();
//! let summary = decoder
//!     .decode(&mut RawFrame::new(&read[..len]), &mut corrections)
//!     .unwrap();
//! assert!(summary.time_updated);
//! assert_eq!(TIME.get().unwrap().gnss_time_of_week_us, 100_000_500);
//! ```
//!
//! Mesh dispatch
//! =============
//!
//! Inbound packets go through a [Dispatcher], which writes any reply into a
//! caller-provided scratch buffer; [send_reply] hands it to the transport.
//!
//! no_std Support
//! ==============
//!
//! Without the default `std` feature the crate is `no_std`. The shared state
//! uses a critical-section mutex, so the target must provide a
//! `critical-section` implementation.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;
extern crate core;
#[cfg(feature = "serde")]
extern crate serde;

pub use crate::{
    config::{CorrectionCheck, DecoderConfig, DeviceConfig, SyncPolicy},
    error::{
        DateTimeError, DecodeError, DispatchError, EnvelopeError, OtaError, OtaPacketError,
        SendError, TimeSyncError,
    },
    interfaces::MeshAddr,
    mesh::{
        send_reply, DispatchOutcome, Dispatcher, Inbound, MeshEnvelope, NetworkData, PacketType,
    },
    ota::{OtaCommand, OtaPacket, OtaPhase, OtaProgress, OtaTransfer, OtaUpload},
    parser::{
        rtcm_crc24q, ubx_checksum, ubx_frame_len, DecodeSummary, Decoded, FixedBuffer,
        FixedLinearBuffer, FrameHeader, FrameKind, HeaderError, RawFrame, StreamDecoder,
        UnderlyingBuffer,
    },
    shared::{NavRecords, NavState, SharedCell, SharedTime},
    time_sync::{SharedTimeRecord, TimeSynchronizer},
    ubx_packets::*,
};

#[cfg(feature = "std")]
pub use crate::interfaces::StdClock;

pub mod config;
pub mod constants;
mod error;
pub mod interfaces;
pub mod mesh;
pub mod ota;
mod parser;
mod shared;
mod time_sync;
mod ubx_packets;
