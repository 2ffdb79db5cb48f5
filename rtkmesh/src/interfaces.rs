//! Collaborators the core talks to. Board support code implements these for
//! the UART, flash partitions, mesh stack and persisted settings.

use core::fmt;

use crate::{config::DeviceConfig, constants::FW_DIGEST_LEN};

/// Non-blocking byte source, typically the GNSS receiver UART.
pub trait ByteSource {
    type Error: fmt::Debug;
    /// Copies whatever is currently buffered into `buf` and returns the count.
    /// Zero means nothing was pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// Monotonic local clock in microseconds.
pub trait MonotonicClock {
    fn now_us(&self) -> u64;
}

impl<C: MonotonicClock + ?Sized> MonotonicClock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Identity of the running firmware image.
pub trait FirmwareIdentity {
    /// MD5 of the running image as 32 lowercase ASCII hex characters.
    fn running_firmware_digest_hex(&self) -> [u8; FW_DIGEST_LEN];
}

/// Flash partition manager used by the OTA state machine.
pub trait UpdatePartitionManager {
    /// Open write session on one update partition.
    type Handle;
    type Error: fmt::Debug;

    /// Acquires a free update partition able to hold `size` bytes.
    fn begin(&mut self, size: u32) -> Result<Self::Handle, Self::Error>;
    fn write(&mut self, handle: &mut Self::Handle, offset: u32, bytes: &[u8]) -> Result<(), Self::Error>;
    /// Closes the write session and verifies the image.
    fn finalize(&mut self, handle: &mut Self::Handle) -> Result<(), Self::Error>;
    /// Selects the partition as the next boot target.
    fn mark_bootable(&mut self, handle: &Self::Handle) -> Result<(), Self::Error>;
    fn restart_device(&mut self);
}

/// Outbound side of the mesh stack.
pub trait MeshTransport {
    type Error: fmt::Debug;
    fn send(&mut self, dest: MeshAddr, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Where RTK corrections received over the mesh are written, usually the
/// local receiver UART.
pub trait CorrectionSink {
    type Error: fmt::Debug;
    fn write_corrections(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Persistent storage of [DeviceConfig].
pub trait ConfigStore {
    type Error: fmt::Debug;
    fn load(&mut self) -> Result<DeviceConfig, Self::Error>;
    fn save(&mut self, config: &DeviceConfig) -> Result<(), Self::Error>;
}

/// Six byte station address of a mesh node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshAddr(pub [u8; 6]);

impl MeshAddr {
    pub const BROADCAST: Self = Self([0xff; 6]);
}

impl fmt::Display for MeshAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl From<[u8; 6]> for MeshAddr {
    fn from(value: [u8; 6]) -> Self {
        Self(value)
    }
}

/// [MonotonicClock] backed by [std::time::Instant], counting from creation.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl MonotonicClock for StdClock {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}
