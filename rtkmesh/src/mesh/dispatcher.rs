use log::{debug, warn};

use super::{
    envelope::{MeshEnvelope, NetworkData, PacketType},
    handlers,
};
use crate::{
    constants::FW_DIGEST_LEN,
    error::DispatchError,
    interfaces::{FirmwareIdentity, MeshAddr, UpdatePartitionManager},
    ota::{OtaPacket, OtaProgress, OtaTransfer},
};

/// One packet as delivered by the mesh stack.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub from: MeshAddr,
    /// Raw mesh packet, envelope header included
    pub payload: &'a [u8],
    /// Whether this node is currently the mesh root
    pub is_root: bool,
    /// This node's own echo counter
    pub send_count: u32,
}

/// What the caller has to do after a packet was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome<'a> {
    /// Nothing left to do.
    Handled,
    /// Send the first `len` bytes of the scratch buffer to `dest`.
    Reply { dest: MeshAddr, len: usize },
    FirmwareReported {
        peer: MeshAddr,
        digest: [u8; FW_DIGEST_LEN],
    },
    /// RTCM bytes to forward to the local receiver.
    Corrections(&'a [u8]),
    Heartbeat { peer: MeshAddr, data: NetworkData },
    /// Firmware update finished; call [Dispatcher::restart_if_complete]
    /// once the delay has passed.
    RestartScheduled { delay_ms: u32 },
}

/// Routes inbound mesh packets to their handlers.
///
/// Owns the node's single [OtaTransfer], so packets must be dispatched from
/// one task only.
pub struct Dispatcher<F, P: UpdatePartitionManager> {
    identity: F,
    partitions: P,
    ota: OtaTransfer<P::Handle>,
}

impl<F: FirmwareIdentity, P: UpdatePartitionManager> Dispatcher<F, P> {
    pub fn new(identity: F, partitions: P) -> Self {
        Self {
            identity,
            partitions,
            ota: OtaTransfer::new(),
        }
    }

    pub fn ota(&self) -> &OtaTransfer<P::Handle> {
        &self.ota
    }

    pub fn partitions(&self) -> &P {
        &self.partitions
    }

    pub fn identity(&self) -> &F {
        &self.identity
    }

    /// Validates the envelope and runs the handler for its type. Replies are
    /// written to `scratch`; nothing is sent from here.
    ///
    /// A payload below the minimum for its type is rejected before any
    /// handler runs.
    pub fn dispatch<'a>(
        &mut self,
        inbound: &Inbound<'a>,
        scratch: &mut [u8],
    ) -> Result<DispatchOutcome<'a>, DispatchError<P::Error>> {
        let envelope = MeshEnvelope::parse(inbound.payload)?;
        let packet_type = envelope.packet_type;
        let payload = envelope.payload;
        let expect = packet_type.min_payload_len();
        if payload.len() < expect {
            warn!(
                "{packet_type:?} payload too small from {}: {} < {expect}",
                inbound.from,
                payload.len()
            );
            return Err(DispatchError::PayloadTooSmall {
                packet_type,
                expect,
                got: payload.len(),
            });
        }

        match packet_type {
            PacketType::Echo => Ok(handlers::handle_echo(inbound, payload, scratch)?),
            PacketType::FirmwareQuery => Ok(handlers::handle_firmware_query(
                inbound,
                &self.identity,
                scratch,
            )?),
            PacketType::FirmwareReport => Ok(handlers::handle_firmware_report(inbound, payload)?),
            PacketType::NetworkData => Ok(handlers::handle_network_data(inbound, payload)),
            PacketType::RtkData => {
                debug!("{} correction bytes from {}", payload.len(), inbound.from);
                Ok(DispatchOutcome::Corrections(payload))
            },
            PacketType::Ota => self.dispatch_ota(inbound, payload, scratch),
            PacketType::RobotData | PacketType::PtpData | PacketType::MasterClockData => {
                debug!("dropping {packet_type:?} from {}", inbound.from);
                Err(DispatchError::Unsupported(packet_type))
            },
        }
    }

    /// Restarts the device if a firmware update completed. Returns whether
    /// it did; a real device does not come back from this call.
    pub fn restart_if_complete(&mut self) -> bool {
        if self.ota.is_complete() {
            self.partitions.restart_device();
            true
        } else {
            false
        }
    }

    /// START and DATA are answered with an ACK carrying the next expected
    /// offset.
    fn dispatch_ota<'a>(
        &mut self,
        inbound: &Inbound<'a>,
        payload: &[u8],
        scratch: &mut [u8],
    ) -> Result<DispatchOutcome<'a>, DispatchError<P::Error>> {
        let packet = OtaPacket::parse(payload)?;
        match self.ota.handle(&packet, &mut self.partitions)? {
            OtaProgress::Started { .. } => self.ack(inbound.from, 0, scratch),
            OtaProgress::ChunkAccepted { next_offset } => self.ack(inbound.from, next_offset, scratch),
            OtaProgress::Completed { restart_after_ms } => Ok(DispatchOutcome::RestartScheduled {
                delay_ms: restart_after_ms,
            }),
            OtaProgress::AckIgnored => Ok(DispatchOutcome::Handled),
        }
    }

    fn ack<'a>(
        &self,
        dest: MeshAddr,
        next_offset: u32,
        scratch: &mut [u8],
    ) -> Result<DispatchOutcome<'a>, DispatchError<P::Error>> {
        let len = MeshEnvelope::encode_ota(&OtaPacket::ack(next_offset), scratch)?;
        Ok(DispatchOutcome::Reply { dest, len })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[derive(Default)]
    struct NoFlash;

    impl UpdatePartitionManager for NoFlash {
        type Handle = ();
        type Error = ();

        fn begin(&mut self, _size: u32) -> Result<(), ()> {
            Err(())
        }

        fn write(&mut self, _: &mut (), _: u32, _: &[u8]) -> Result<(), ()> {
            Err(())
        }

        fn finalize(&mut self, _: &mut ()) -> Result<(), ()> {
            Err(())
        }

        fn mark_bootable(&mut self, _: &()) -> Result<(), ()> {
            Err(())
        }

        fn restart_device(&mut self) {}
    }

    const PEER: MeshAddr = MeshAddr([2, 0, 0, 0, 0, 9]);

    fn inbound(payload: &[u8]) -> Inbound<'_> {
        Inbound {
            from: PEER,
            payload,
            is_root: false,
            send_count: 77,
        }
    }

    #[test]
    fn rtk_data_is_forwarded() {
        let mut dispatcher = Dispatcher::new(DeviceConfig::default(), NoFlash);
        let packet = [1, 0, 6, 0, 0xd3, 0x00, 0x00, 0x47, 0xea, 0x4b];
        let outcome = dispatcher
            .dispatch(&inbound(&packet), &mut [0u8; 8])
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Corrections(&packet[4..]));
    }

    #[test]
    fn start_without_partition() {
        let mut dispatcher = Dispatcher::new(DeviceConfig::default(), NoFlash);
        let mut packet = [0u8; 16];
        let len = MeshEnvelope::encode_ota(&OtaPacket::start(4096), &mut packet).unwrap();
        let mut scratch = [0u8; 32];
        let err = dispatcher
            .dispatch(&inbound(&packet[..len]), &mut scratch)
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Ota(crate::OtaError::ResourceUnavailable(()))
        ));
        assert!(dispatcher.ota().expected_next_offset().is_none());
        assert!(!dispatcher.restart_if_complete());
    }

    #[test]
    fn unsupported_types() {
        let mut dispatcher = Dispatcher::new(DeviceConfig::default(), NoFlash);
        let err = dispatcher
            .dispatch(&inbound(&[3, 0, 0, 0]), &mut [])
            .unwrap_err();
        assert_eq!(err, DispatchError::Unsupported(PacketType::PtpData));
    }
}
