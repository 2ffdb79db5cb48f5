//! In-process mesh of host nodes, used to exercise dispatch and OTA without
//! radios or flash.

use std::{
    collections::HashMap,
    fs,
    io::{self, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::mpsc::{self, Receiver, Sender},
    thread,
    time::Duration,
};

use log::{debug, error, info, warn};
use rtkmesh::{
    interfaces::{
        CorrectionSink, FirmwareIdentity, MeshTransport, MonotonicClock, UpdatePartitionManager,
    },
    send_reply, DeviceConfig, DispatchOutcome, Dispatcher, Inbound, MeshAddr,
    MeshEnvelope, NetworkData, OtaCommand, OtaPacket, OtaUpload, PacketType, StdClock,
};
use serde::Serialize;

/// Largest mesh packet exchanged between simulated nodes.
pub const MESH_MTU: usize = 1456;

type Packet = (MeshAddr, Vec<u8>);

/// Delivers packets to the inbox of the destination node.
#[derive(Clone)]
pub struct ChannelTransport {
    from: MeshAddr,
    peers: HashMap<MeshAddr, Sender<Packet>>,
}

impl ChannelTransport {
    pub fn new(from: MeshAddr) -> Self {
        Self {
            from,
            peers: HashMap::new(),
        }
    }

    pub fn connect(&mut self, peer: MeshAddr, inbox: Sender<Packet>) {
        self.peers.insert(peer, inbox);
    }
}

impl MeshTransport for ChannelTransport {
    type Error = io::Error;

    fn send(&mut self, dest: MeshAddr, bytes: &[u8]) -> io::Result<()> {
        let inbox = self
            .peers
            .get(&dest)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, format!("no route to {dest}")))?;
        inbox
            .send((self.from, bytes.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, format!("{dest} is gone")))
    }
}

/// Update partitions backed by files in one directory.
pub struct FilePartitions {
    dir: PathBuf,
    next_slot: usize,
    boot_slot: Option<PathBuf>,
    restarted: bool,
}

/// Open write session on one partition file.
pub struct PartitionFile {
    path: PathBuf,
    file: fs::File,
    size: u32,
    written: u64,
}

impl FilePartitions {
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            next_slot: 0,
            boot_slot: None,
            restarted: false,
        })
    }

    /// Partition selected for the next boot.
    pub fn boot_slot(&self) -> Option<&PathBuf> {
        self.boot_slot.as_ref()
    }

    pub fn restarted(&self) -> bool {
        self.restarted
    }
}

impl UpdatePartitionManager for FilePartitions {
    type Handle = PartitionFile;
    type Error = io::Error;

    fn begin(&mut self, size: u32) -> io::Result<PartitionFile> {
        let path = self.dir.join(format!("ota_{}.bin", self.next_slot));
        self.next_slot = (self.next_slot + 1) % 2;
        let file = fs::File::create(&path)?;
        file.set_len(u64::from(size))?;
        debug!("writing update to {}", path.display());
        Ok(PartitionFile {
            path,
            file,
            size,
            written: 0,
        })
    }

    fn write(&mut self, handle: &mut PartitionFile, offset: u32, bytes: &[u8]) -> io::Result<()> {
        if u64::from(offset) + bytes.len() as u64 > u64::from(handle.size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("chunk at {offset} overruns the {} byte partition", handle.size),
            ));
        }
        handle.file.seek(SeekFrom::Start(u64::from(offset)))?;
        handle.file.write_all(bytes)?;
        handle.written = handle.written.max(u64::from(offset) + bytes.len() as u64);
        Ok(())
    }

    fn finalize(&mut self, handle: &mut PartitionFile) -> io::Result<()> {
        if handle.written != u64::from(handle.size) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "{} holds {} of {} bytes",
                    handle.path.display(),
                    handle.written,
                    handle.size
                ),
            ));
        }
        handle.file.sync_all()
    }

    fn mark_bootable(&mut self, handle: &PartitionFile) -> io::Result<()> {
        self.boot_slot = Some(handle.path.clone());
        Ok(())
    }

    fn restart_device(&mut self) {
        info!("restarting into {:?}", self.boot_slot);
        self.restarted = true;
    }
}

/// Corrections received over the mesh, kept in memory.
#[derive(Debug, Default)]
pub struct CorrectionLog(pub Vec<u8>);

impl CorrectionSink for CorrectionLog {
    type Error = io::Error;

    fn write_corrections(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.extend_from_slice(bytes);
        Ok(())
    }
}

/// One simulated node: mailbox, transport and dispatcher.
pub struct SimNode {
    pub addr: MeshAddr,
    pub is_root: bool,
    pub send_count: u32,
    inbox: Receiver<Packet>,
    transport: ChannelTransport,
    dispatcher: Dispatcher<DeviceConfig, FilePartitions>,
    corrections: CorrectionLog,
    scratch: Vec<u8>,
    clock: StdClock,
    /// Clock reading after which a completed update reboots the node.
    restart_at_us: Option<u64>,
}

impl SimNode {
    pub fn new(
        addr: MeshAddr,
        is_root: bool,
        config: DeviceConfig,
        partitions: FilePartitions,
    ) -> (Self, Sender<Packet>) {
        let (tx, inbox) = mpsc::channel();
        let node = Self {
            addr,
            is_root,
            send_count: 0,
            inbox,
            transport: ChannelTransport::new(addr),
            dispatcher: Dispatcher::new(config, partitions),
            corrections: CorrectionLog::default(),
            scratch: vec![0; MESH_MTU],
            clock: StdClock::new(),
            restart_at_us: None,
        };
        (node, tx)
    }

    pub fn connect(&mut self, peer: MeshAddr, inbox: Sender<Packet>) {
        self.transport.connect(peer, inbox);
    }

    pub fn send(&mut self, dest: MeshAddr, packet_type: PacketType, payload: &[u8]) -> anyhow::Result<()> {
        let len = MeshEnvelope::encode(packet_type, payload, &mut self.scratch)?;
        self.transport.send(dest, &self.scratch[..len])?;
        Ok(())
    }

    pub fn send_ota(&mut self, dest: MeshAddr, packet: &OtaPacket<'_>) -> anyhow::Result<()> {
        let len = MeshEnvelope::encode_ota(packet, &mut self.scratch)?;
        self.transport.send(dest, &self.scratch[..len])?;
        Ok(())
    }

    pub fn send_echo(&mut self, dest: MeshAddr) -> anyhow::Result<()> {
        self.send_count += 1;
        let count = self.send_count.to_le_bytes();
        self.send(dest, PacketType::Echo, &count)
    }

    pub fn dispatcher(&self) -> &Dispatcher<DeviceConfig, FilePartitions> {
        &self.dispatcher
    }

    pub fn corrections(&self) -> &[u8] {
        &self.corrections.0
    }

    /// Dispatches everything queued in the inbox. Packets the node does not
    /// answer are handed to `observe`.
    pub fn poll<F>(&mut self, mut observe: F) -> usize
    where
        F: FnMut(MeshAddr, &DispatchOutcome<'_>, &[u8]),
    {
        let mut handled = 0;
        while let Ok((from, packet)) = self.inbox.try_recv() {
            handled += 1;
            let inbound = Inbound {
                from,
                payload: &packet,
                is_root: self.is_root,
                send_count: self.send_count,
            };
            let outcome = match self.dispatcher.dispatch(&inbound, &mut self.scratch) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("{} dropped packet from {from}: {e}", self.addr);
                    continue;
                },
            };
            match outcome {
                DispatchOutcome::Reply { .. } => {
                    if let Err(e) = send_reply(&mut self.transport, &outcome, &self.scratch) {
                        error!("{} could not answer {from}: {:?}", self.addr, e.cause);
                    }
                },
                DispatchOutcome::Corrections(bytes) => {
                    if let Err(e) = self.corrections.write_corrections(bytes) {
                        error!("correction write failed: {e}");
                    }
                },
                DispatchOutcome::RestartScheduled { delay_ms } => {
                    info!("{} restarting in {delay_ms} ms", self.addr);
                    self.restart_at_us = Some(self.clock.now_us() + u64::from(delay_ms) * 1000);
                },
                other => observe(from, &other, &packet),
            }
        }
        self.restart_due(self.clock.now_us());
        handled
    }

    pub fn restart_deadline_us(&self) -> Option<u64> {
        self.restart_at_us
    }

    /// Restarts the node once `now_us` has reached the scheduled deadline.
    pub fn restart_due(&mut self, now_us: u64) -> bool {
        match self.restart_at_us {
            Some(at) if now_us >= at => {
                self.restart_at_us = None;
                self.dispatcher.restart_if_complete()
            },
            _ => false,
        }
    }

    /// Sleeps until a scheduled restart is due, then performs it.
    pub fn wait_for_restart(&mut self) -> bool {
        let Some(at) = self.restart_at_us else {
            return false;
        };
        let now = self.clock.now_us();
        if at > now {
            thread::sleep(Duration::from_micros(at - now));
        }
        self.restart_due(self.clock.now_us().max(at))
    }
}

/// Result of one simulated firmware rollout.
#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub firmware_size: usize,
    pub packets_sent: usize,
    pub rewinds: usize,
    pub child_firmware_md5: Option<String>,
    pub echo_round_trips: usize,
    pub heartbeat_battery_mv: Option<u16>,
    pub correction_bytes_relayed: usize,
    pub image_matches: bool,
    pub restarted: bool,
}

const ROOT: MeshAddr = MeshAddr([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x01]);
const CHILD: MeshAddr = MeshAddr([0x24, 0x0a, 0xc4, 0x00, 0x00, 0x02]);

/// Empty RTCM3 frame, relayed once to show correction forwarding.
const EMPTY_RTCM: [u8; 6] = [0xd3, 0x00, 0x00, 0x47, 0xea, 0x4b];

/// Runs a root and one child through identity query, echo, heartbeat,
/// correction relay and an OTA rollout of `firmware`.
pub fn simulate(
    firmware: &[u8],
    chunk_len: usize,
    out_dir: &Path,
    child_config: DeviceConfig,
) -> anyhow::Result<SimulationReport> {
    let (mut root, root_tx) = SimNode::new(
        ROOT,
        true,
        DeviceConfig::default(),
        FilePartitions::new(out_dir.join("root"))?,
    );
    let (mut child, child_tx) =
        SimNode::new(CHILD, false, child_config, FilePartitions::new(out_dir.join("child"))?);
    root.connect(CHILD, child_tx);
    child.connect(ROOT, root_tx);

    let mut report = SimulationReport {
        firmware_size: firmware.len(),
        packets_sent: 0,
        rewinds: 0,
        child_firmware_md5: None,
        echo_round_trips: 0,
        heartbeat_battery_mv: None,
        correction_bytes_relayed: 0,
        image_matches: false,
        restarted: false,
    };

    root.send(CHILD, PacketType::FirmwareQuery, &[])?;
    root.send_echo(CHILD)?;
    root.send(CHILD, PacketType::RtkData, &EMPTY_RTCM)?;
    let heartbeat = NetworkData {
        send_count: child.send_count,
        battery_mv: 3900,
    };
    child.send(ROOT, PacketType::NetworkData, &heartbeat.to_bytes())?;
    child.poll(|_, _, _| {});
    root.poll(|from, outcome, raw| match outcome {
        DispatchOutcome::FirmwareReported { digest, .. } => {
            report.child_firmware_md5 = Some(String::from_utf8_lossy(digest).into_owned());
        },
        DispatchOutcome::Heartbeat { data, .. } => {
            report.heartbeat_battery_mv = Some(data.battery_mv);
        },
        DispatchOutcome::Handled if packet_type(raw) == Some(PacketType::Echo) => {
            debug!("echo answered by {from}");
            report.echo_round_trips += 1;
        },
        _ => {},
    });
    report.correction_bytes_relayed = child.corrections().len();

    let mut upload = OtaUpload::new(firmware)?.with_chunk_len(chunk_len);
    while let Some(packet) = upload.next_packet() {
        root.send_ota(CHILD, &packet)?;
        report.packets_sent += 1;
        child.poll(|_, _, _| {});

        let mut rewound = false;
        root.poll(|_, _, raw| {
            if let Some(next_offset) = ack_offset(raw) {
                rewound |= upload.on_ack(next_offset);
            }
        });
        if rewound {
            warn!("child asked to resume at {}", upload.next_offset());
            report.rewinds += 1;
        }
    }

    child.wait_for_restart();
    let partitions = child.dispatcher().partitions();
    report.restarted = partitions.restarted();
    if let Some(slot) = partitions.boot_slot() {
        report.image_matches = fs::read(slot)? == firmware;
    }
    info!(
        "rollout finished: {} packets, child firmware {}",
        report.packets_sent,
        child.dispatcher().identity().fw_md5_str().unwrap_or("?")
    );
    Ok(report)
}

fn packet_type(raw: &[u8]) -> Option<PacketType> {
    MeshEnvelope::parse(raw).ok().map(|envelope| envelope.packet_type)
}

/// Next offset carried by an OTA ACK packet, if `raw` is one.
fn ack_offset(raw: &[u8]) -> Option<u32> {
    let envelope = MeshEnvelope::parse(raw).ok()?;
    if envelope.packet_type != PacketType::Ota {
        return None;
    }
    let packet = OtaPacket::parse(envelope.payload).ok()?;
    (packet.command == OtaCommand::Ack).then_some(packet.offset)
}

/// Digest of the running image, as reported by the node config.
pub fn firmware_digest<F: FirmwareIdentity>(identity: &F) -> String {
    String::from_utf8_lossy(&identity.running_firmware_digest_hex()).into_owned()
}
