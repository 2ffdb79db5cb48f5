use std::{
    fs,
    io::{self, Read},
    path::{Path, PathBuf},
};

use log::{info, warn};
use rtkmesh::{
    interfaces::{ByteSource, ConfigStore, CorrectionSink},
    DecodeSummary, DecoderConfig, DeviceConfig, NavState, RawFrame, SharedTime, StdClock,
    StreamDecoder,
};

/// Largest chunk pulled from the receiver in one read.
const MAX_READ_LEN: usize = 1240;

/// Receiver UART on the host.
pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialSource {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }
}

impl ByteSource for SerialSource {
    type Error = io::Error;

    /// Converts timeouts into "no data received".
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.port.read(buf) {
            Ok(b) => Ok(b),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }
}

/// Replays a capture file, one read at a time.
pub struct FileSource {
    file: fs::File,
}

impl FileSource {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: fs::File::open(path)?,
        })
    }
}

impl ByteSource for FileSource {
    type Error = io::Error;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

/// Counts the corrections that would be written back to the receiver.
#[derive(Debug, Default)]
pub struct CorrectionCounter {
    pub frames: usize,
    pub bytes: usize,
}

impl CorrectionSink for CorrectionCounter {
    type Error = io::Error;

    fn write_corrections(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.frames += 1;
        self.bytes += bytes.len();
        Ok(())
    }
}

/// Ingestion loop for one receiver: every read becomes one [RawFrame].
pub struct Receiver<'s, S> {
    source: S,
    decoder: StreamDecoder<'s, StdClock>,
    nav: &'s NavState,
}

impl<'s, S: ByteSource> Receiver<'s, S> {
    pub fn new(source: S, nav: &'s NavState, time: &'s SharedTime, config: DecoderConfig) -> Self {
        Self {
            source,
            decoder: StreamDecoder::new(nav, time, StdClock::new()).with_config(config),
            nav,
        }
    }

    /// Reads and decodes until the source runs dry. Fixes are handed to
    /// `on_fix` as they land in the shared state.
    pub fn run<K, F>(&mut self, sink: &mut K, mut on_fix: F) -> anyhow::Result<DecodeSummary>
    where
        K: CorrectionSink,
        F: FnMut(&rtkmesh::NavPositionFix),
    {
        let mut total = DecodeSummary::default();
        let mut local_buf = [0; MAX_READ_LEN];
        let mut corrections = Vec::with_capacity(MAX_READ_LEN);
        loop {
            let nbytes = self
                .source
                .read(&mut local_buf)
                .map_err(|e| anyhow::anyhow!("receiver read failed: {e:?}"))?;
            if nbytes == 0 {
                break;
            }

            let mut frame = RawFrame::new(&local_buf[..nbytes]);
            while !frame.is_empty() {
                corrections.clear();
                let pending = frame.len();
                match self.decoder.decode(&mut frame, &mut corrections) {
                    Ok(summary) => {
                        if summary.navigation > 0 {
                            if let Some(fix) = self.nav.position_fix() {
                                on_fix(&fix);
                            }
                        }
                        total.merge(&summary);
                    },
                    Err(e) => {
                        warn!("Malformed data, ignore it; cause {e}");
                        total.rejected += 1;
                        if frame.len() == pending {
                            frame.discard();
                        }
                    },
                }
                if !corrections.is_empty() {
                    sink.write_corrections(&corrections)
                        .map_err(|e| anyhow::anyhow!("correction write failed: {e:?}"))?;
                }
            }
        }
        Ok(total)
    }
}

/// [DeviceConfig] persisted as a JSON file.
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads the stored config, writing the defaults out if there is none
    /// yet or the stored layout is outdated.
    pub fn load_or_init(&mut self) -> anyhow::Result<DeviceConfig> {
        match self.load() {
            Ok(config) if config.version == DeviceConfig::CURRENT_VERSION => Ok(config),
            Ok(config) => {
                warn!(
                    "config version {} is outdated, resetting to defaults",
                    config.version
                );
                self.init()
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.init(),
            Err(e) => Err(anyhow::Error::new(e).context(format!(
                "Failed to load config from {}",
                self.path.display()
            ))),
        }
    }

    fn init(&mut self) -> anyhow::Result<DeviceConfig> {
        let config = DeviceConfig::default();
        self.save(&config)?;
        info!("wrote default config to {}", self.path.display());
        Ok(config)
    }
}

impl ConfigStore for JsonConfigStore {
    type Error = io::Error;

    fn load(&mut self) -> io::Result<DeviceConfig> {
        let text = fs::read_to_string(&self.path)?;
        serde_json::from_str(&text).map_err(io::Error::from)
    }

    fn save(&mut self, config: &DeviceConfig) -> io::Result<()> {
        let text = serde_json::to_string_pretty(config).map_err(io::Error::from)?;
        fs::write(&self.path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtkmesh::{ubx_frame, NavPositionFix};

    struct Chunks(Vec<Vec<u8>>);

    impl ByteSource for Chunks {
        type Error = io::Error;

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0.is_empty() {
                return Ok(0);
            }
            let chunk = self.0.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    fn nav_pvt(itow: u32) -> Vec<u8> {
        let fix = NavPositionFix {
            itow,
            valid: 0x07,
            ..Default::default()
        };
        let mut payload = [0u8; NavPositionFix::PAYLOAD_LEN];
        fix.write_payload(&mut payload);
        let mut out = vec![0u8; 100];
        let len = ubx_frame(0x01, 0x07, &payload, &mut out).unwrap();
        out.truncate(len);
        out
    }

    #[test]
    fn receiver_decodes_every_read() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut first = nav_pvt(1000);
        first.extend_from_slice(&[0xd3, 0x00, 0x00, 0x47, 0xea, 0x4b]);
        let source = Chunks(vec![first, nav_pvt(2000)]);

        let mut receiver = Receiver::new(source, &nav, &time, DecoderConfig::default());
        let mut sink = CorrectionCounter::default();
        let mut seen = Vec::new();
        let total = receiver.run(&mut sink, |fix| seen.push(fix.itow)).unwrap();

        assert_eq!(seen, vec![1000, 2000]);
        assert_eq!(total.navigation, 2);
        assert_eq!(total.corrections, 1);
        assert_eq!(sink.frames, 1);
        assert_eq!(sink.bytes, 6);
        assert_eq!(time.get().unwrap().gnss_time_of_week_us, 2_000_000);
    }

    #[test]
    fn bad_read_is_dropped() {
        let nav = NavState::new();
        let time = SharedTime::new(None);
        let mut corrupted = nav_pvt(1000);
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        let source = Chunks(vec![corrupted, nav_pvt(3000)]);

        let mut receiver = Receiver::new(source, &nav, &time, DecoderConfig::default());
        let total = receiver
            .run(&mut CorrectionCounter::default(), |_| {})
            .unwrap();
        assert_eq!(total.rejected, 1);
        assert_eq!(nav.position_fix().map(|f| f.itow), Some(3000));
    }

    #[test]
    fn config_store_initializes_defaults() {
        let path = std::env::temp_dir().join(format!("rtkmesh-config-{}.json", std::process::id()));
        let _ = fs::remove_file(&path);
        let mut store = JsonConfigStore::new(&path);

        let config = store.load_or_init().unwrap();
        assert_eq!(config, DeviceConfig::default());

        let custom = DeviceConfig {
            battery_analog_pin: 4,
            ext_antenna: true,
            ..config
        };
        store.save(&custom).unwrap();
        assert_eq!(store.load_or_init().unwrap(), custom);
        fs::remove_file(&path).unwrap();
    }
}
