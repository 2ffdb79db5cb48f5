use rtkmesh::{
    interfaces::UpdatePartitionManager, DeviceConfig, DispatchError, DispatchOutcome, Dispatcher,
    Inbound, MeshAddr, MeshEnvelope, OtaCommand, OtaError, OtaPacket, OtaPhase, OtaProgress,
    OtaTransfer, OtaUpload, PacketType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlashError {
    NoFreePartition,
    VerifyFailed,
}

/// Two update slots held in memory.
#[derive(Default)]
struct RamPartitions {
    slots: [Vec<u8>; 2],
    next_slot: usize,
    boot_slot: Option<usize>,
    writes: Vec<(u32, usize)>,
    restarts: usize,
    fail_begin: bool,
    fail_finalize: bool,
}

struct SlotHandle {
    slot: usize,
    size: u32,
}

impl UpdatePartitionManager for RamPartitions {
    type Handle = SlotHandle;
    type Error = FlashError;

    fn begin(&mut self, size: u32) -> Result<SlotHandle, FlashError> {
        if self.fail_begin {
            return Err(FlashError::NoFreePartition);
        }
        let slot = self.next_slot;
        self.next_slot = (slot + 1) % 2;
        self.slots[slot] = vec![0xff; size as usize];
        Ok(SlotHandle { slot, size })
    }

    fn write(&mut self, handle: &mut SlotHandle, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        let start = offset as usize;
        self.slots[handle.slot][start..start + bytes.len()].copy_from_slice(bytes);
        self.writes.push((offset, bytes.len()));
        Ok(())
    }

    fn finalize(&mut self, handle: &mut SlotHandle) -> Result<(), FlashError> {
        if self.fail_finalize || self.slots[handle.slot].len() != handle.size as usize {
            return Err(FlashError::VerifyFailed);
        }
        Ok(())
    }

    fn mark_bootable(&mut self, handle: &SlotHandle) -> Result<(), FlashError> {
        self.boot_slot = Some(handle.slot);
        Ok(())
    }

    fn restart_device(&mut self) {
        self.restarts += 1;
    }
}

fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

#[test]
fn test_out_of_order_chunk_stalls_transfer() {
    let firmware = image(4096);
    let mut flash = RamPartitions::default();
    let mut ota = OtaTransfer::new();

    assert_eq!(
        ota.handle(&OtaPacket::start(4096), &mut flash),
        Ok(OtaProgress::Started { total_size: 4096 })
    );
    assert_eq!(
        ota.handle(&OtaPacket::data(0, &firmware[..1024]), &mut flash),
        Ok(OtaProgress::ChunkAccepted { next_offset: 1024 })
    );
    assert_eq!(
        ota.handle(&OtaPacket::data(2048, &firmware[2048..3072]), &mut flash),
        Err(OtaError::UnexpectedOffset {
            expected: 1024,
            got: 2048
        })
    );
    assert_eq!(ota.expected_next_offset(), Some(1024));
    assert_eq!(flash.writes, vec![(0, 1024)]);

    assert_eq!(
        ota.handle(&OtaPacket::data(1024, &firmware[1024..2048]), &mut flash),
        Ok(OtaProgress::ChunkAccepted { next_offset: 2048 })
    );
    // Duplicate of an already written chunk
    assert!(ota
        .handle(&OtaPacket::data(1024, &firmware[1024..2048]), &mut flash)
        .is_err());
    assert_eq!(ota.expected_next_offset(), Some(2048));
}

#[test]
fn test_full_transfer_marks_bootable() {
    let firmware = image(3000);
    let mut flash = RamPartitions::default();
    let mut ota = OtaTransfer::new();

    let mut upload = OtaUpload::new(&firmware).unwrap();
    let mut last = None;
    while let Some(packet) = upload.next_packet() {
        last = Some(ota.handle(&packet, &mut flash).unwrap());
    }
    assert_eq!(
        last,
        Some(OtaProgress::Completed {
            restart_after_ms: 1000
        })
    );
    assert!(ota.is_complete());
    assert_eq!(flash.boot_slot, Some(0));
    assert_eq!(flash.slots[0], firmware);
    assert_eq!(flash.writes, vec![(0, 1024), (1024, 1024), (2048, 952)]);
}

#[test]
fn test_commands_outside_their_phase() {
    let mut flash = RamPartitions::default();
    let mut ota = OtaTransfer::<SlotHandle>::new();

    assert_eq!(
        ota.handle(&OtaPacket::data(0, &[1, 2, 3]), &mut flash),
        Err(OtaError::SequencingViolation {
            command: OtaCommand::Data,
            phase: "idle"
        })
    );
    assert_eq!(
        ota.handle(&OtaPacket::end(), &mut flash),
        Err(OtaError::SequencingViolation {
            command: OtaCommand::End,
            phase: "idle"
        })
    );
    assert!(matches!(ota.phase(), OtaPhase::Idle));

    ota.handle(&OtaPacket::start(16), &mut flash).unwrap();
    assert_eq!(
        ota.handle(&OtaPacket::start(16), &mut flash),
        Err(OtaError::SequencingViolation {
            command: OtaCommand::Start,
            phase: "in progress"
        })
    );
    // The original session survives the stray START
    assert_eq!(ota.expected_next_offset(), Some(0));
    assert_eq!(flash.next_slot, 1);

    assert_eq!(
        ota.handle(&OtaPacket::ack(0), &mut flash),
        Ok(OtaProgress::AckIgnored)
    );
}

#[test]
fn test_no_partition_stays_idle() {
    let mut flash = RamPartitions {
        fail_begin: true,
        ..Default::default()
    };
    let mut ota = OtaTransfer::new();
    assert_eq!(
        ota.handle(&OtaPacket::start(4096), &mut flash),
        Err(OtaError::ResourceUnavailable(FlashError::NoFreePartition))
    );
    assert!(matches!(ota.phase(), OtaPhase::Idle));
}

#[test]
fn test_finalize_failure_returns_to_idle() {
    let firmware = image(100);
    let mut flash = RamPartitions {
        fail_finalize: true,
        ..Default::default()
    };
    let mut ota = OtaTransfer::new();
    ota.handle(&OtaPacket::start(100), &mut flash).unwrap();
    ota.handle(&OtaPacket::data(0, &firmware), &mut flash).unwrap();
    assert_eq!(
        ota.handle(&OtaPacket::end(), &mut flash),
        Err(OtaError::Finalize(FlashError::VerifyFailed))
    );
    assert!(matches!(ota.phase(), OtaPhase::Idle));
    assert_eq!(flash.boot_slot, None);

    // A fresh transfer can start afterwards
    assert!(ota.handle(&OtaPacket::start(100), &mut flash).is_ok());
}

#[test]
fn test_upload_rewinds_on_stale_ack() {
    let firmware = image(4096);
    let mut upload = OtaUpload::new(&firmware).unwrap();

    assert_eq!(upload.next_packet(), Some(OtaPacket::start(4096)));
    assert_eq!(upload.next_packet().map(|p| p.offset), Some(0));
    assert_eq!(upload.next_packet().map(|p| p.offset), Some(1024));
    assert_eq!(upload.next_packet().map(|p| p.offset), Some(2048));

    // Receiver only has the first chunk
    assert!(upload.on_ack(1024));
    assert_eq!(upload.next_offset(), 1024);
    assert_eq!(upload.next_packet().map(|p| p.offset), Some(1024));
    // An ACK that is not behind changes nothing
    assert!(!upload.on_ack(2048));
}

#[test]
fn test_ota_over_dispatcher() {
    const ROOT: MeshAddr = MeshAddr([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01]);

    let firmware = image(2500);
    let mut child = Dispatcher::new(DeviceConfig::default(), RamPartitions::default());
    let mut upload = OtaUpload::new(&firmware).unwrap().with_chunk_len(1000);
    let mut packet_buf = [0u8; 1100];
    let mut scratch = [0u8; 64];
    let mut acks = Vec::new();
    let mut restart_delay = None;

    while let Some(packet) = upload.next_packet() {
        let len = MeshEnvelope::encode_ota(&packet, &mut packet_buf).unwrap();
        let inbound = Inbound {
            from: ROOT,
            payload: &packet_buf[..len],
            is_root: false,
            send_count: 0,
        };
        match child.dispatch(&inbound, &mut scratch).unwrap() {
            DispatchOutcome::Reply { dest, len } => {
                assert_eq!(dest, ROOT);
                let reply = MeshEnvelope::parse(&scratch[..len]).unwrap();
                assert_eq!(reply.packet_type, PacketType::Ota);
                let ack = OtaPacket::parse(reply.payload).unwrap();
                assert_eq!(ack.command, OtaCommand::Ack);
                acks.push(ack.offset);
            },
            DispatchOutcome::RestartScheduled { delay_ms } => restart_delay = Some(delay_ms),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(acks, vec![0, 1000, 2000, 2500]);
    assert_eq!(restart_delay, Some(1000));
    assert!(child.restart_if_complete());
    assert_eq!(child.partitions().restarts, 1);
    assert_eq!(child.partitions().slots[0], firmware);
}

#[test]
fn test_oversized_chunk_is_rejected_before_flash() {
    let mut child = Dispatcher::new(DeviceConfig::default(), RamPartitions::default());
    let mut raw = Vec::new();
    raw.extend_from_slice(&(OtaCommand::Data as u32).to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&1025u32.to_le_bytes());
    raw.resize(12 + 1025, 0);
    let mut packet = vec![0u8; raw.len() + 4];
    MeshEnvelope::encode(PacketType::Ota, &raw, &mut packet).unwrap();

    let inbound = Inbound {
        from: MeshAddr::BROADCAST,
        payload: &packet,
        is_root: false,
        send_count: 0,
    };
    assert!(matches!(
        child.dispatch(&inbound, &mut [0u8; 64]),
        Err(DispatchError::OtaPacket(_))
    ));
    assert!(child.partitions().writes.is_empty());
}

#[test]
fn test_end_before_last_chunk_is_rejected() {
    let firmware = image(4096);
    let mut flash = RamPartitions::default();
    let mut ota = OtaTransfer::new();

    ota.handle(&OtaPacket::start(4096), &mut flash).unwrap();
    ota.handle(&OtaPacket::data(0, &firmware[..1024]), &mut flash)
        .unwrap();
    assert_eq!(
        ota.handle(&OtaPacket::end(), &mut flash),
        Err(OtaError::IncompleteImage {
            received: 1024,
            total_size: 4096
        })
    );
    assert!(matches!(ota.phase(), OtaPhase::Idle));
    assert!(!ota.is_complete());
    assert_eq!(flash.boot_slot, None);

    // The next START opens a fresh session
    assert_eq!(
        ota.handle(&OtaPacket::start(4096), &mut flash),
        Ok(OtaProgress::Started { total_size: 4096 })
    );
}
