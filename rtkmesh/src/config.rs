use crate::{
    constants::{DEFAULT_MAX_MESSAGES_PER_PASS, FW_DIGEST_LEN},
    interfaces::FirmwareIdentity,
};

/// What the decoder does with the rest of a read after a corrupted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncPolicy {
    /// Drop everything still pending in the read.
    #[default]
    Strict,
    /// Skip ahead to the next UBX or RTCM lead byte and keep decoding.
    Resync,
}

/// Integrity handling for RTCM correction frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CorrectionCheck {
    /// Verify the CRC-24Q trailer before forwarding.
    #[default]
    Crc24q,
    /// Forward frames as received.
    Trust,
}

/// Stream decoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    /// Messages handled per `decode` call before returning to the caller.
    /// Zero is treated as one.
    pub max_messages_per_pass: usize,
    pub sync_policy: SyncPolicy,
    pub correction_check: CorrectionCheck,
}

impl DecoderConfig {
    pub const fn new() -> Self {
        Self {
            max_messages_per_pass: DEFAULT_MAX_MESSAGES_PER_PASS,
            sync_policy: SyncPolicy::Strict,
            correction_check: CorrectionCheck::Crc24q,
        }
    }

    /// Zero is treated as one.
    pub const fn with_max_messages_per_pass(mut self, max: usize) -> Self {
        self.max_messages_per_pass = if max == 0 { 1 } else { max };
        self
    }

    pub const fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }

    pub const fn with_correction_check(mut self, check: CorrectionCheck) -> Self {
        self.correction_check = check;
        self
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-node hardware settings kept in persistent storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceConfig {
    /// Layout version, bumped when fields change
    pub version: u32,
    pub node_type: u8,
    /// Analog pin wired to the battery divider, negative when absent
    pub battery_analog_pin: i8,
    pub ext_antenna: bool,
    /// MD5 of the running image, ASCII hex
    pub fw_md5: [u8; FW_DIGEST_LEN],
}

impl DeviceConfig {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn has_battery_sense(&self) -> bool {
        self.battery_analog_pin >= 0
    }

    /// Digest as text, `None` if the stored bytes are not ASCII.
    pub fn fw_md5_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.fw_md5).ok()
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            node_type: 0,
            battery_analog_pin: -1,
            ext_antenna: false,
            fw_md5: [b'0'; FW_DIGEST_LEN],
        }
    }
}

impl FirmwareIdentity for DeviceConfig {
    fn running_firmware_digest_hex(&self) -> [u8; FW_DIGEST_LEN] {
        self.fw_md5
    }
}
