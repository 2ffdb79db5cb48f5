pub const UBX_SYNC_CHAR_1: u8 = 0xb5;
pub const UBX_SYNC_CHAR_2: u8 = 0x62;
pub(crate) const UBX_SYNC_SIZE: usize = 2;
pub(crate) const UBX_PAYLOAD_SIZE_LEN: usize = 2;
pub(crate) const UBX_CLASS_LEN: usize = 1;
pub(crate) const UBX_ID_LEN: usize = 1;
pub const UBX_HEADER_LEN: usize =
    UBX_SYNC_SIZE + UBX_PAYLOAD_SIZE_LEN + UBX_CLASS_LEN + UBX_ID_LEN;
pub const UBX_CHECKSUM_LEN: usize = 2;

pub(crate) const UBX_CLASS_OFFSET: usize = 2; // After SYNC_CHAR_1, SYNC_CHAR_2
pub(crate) const UBX_MSG_ID_OFFSET: usize = 3; // After CLASS
pub(crate) const UBX_LENGTH_OFFSET: usize = 4; // After MSG_ID

pub const UBX_CLASS_NAV: u8 = 0x01;
pub const UBX_NAV_PVT_ID: u8 = 0x07;
pub const UBX_NAV_SVIN_ID: u8 = 0x3b;
pub const NAV_PVT_PAYLOAD_LEN: usize = 92;
pub const NAV_SVIN_PAYLOAD_LEN: usize = 40;

pub const RTCM_SYNC_CHAR: u8 = 0xd3;
pub const RTCM_HEADER_SIZE: usize = 3; // sync char (1) + length field (2)
pub const RTCM_CRC_SIZE: usize = 3;
pub(crate) const RTCM_LENGTH_MASK: u16 = 0x03ff; // 10 bits for length (6 bits reserved)
pub const RTCM_MAX_PAYLOAD_LEN: usize = RTCM_LENGTH_MASK as usize;

/// Upper bound on NAV messages processed by one decode pass.
pub const DEFAULT_MAX_MESSAGES_PER_PASS: usize = 5;

pub const MESH_HEADER_LEN: usize = 4; // type (u16) + length (u16)
/// Largest payload a single mesh envelope may carry.
pub const MESH_MAX_PAYLOAD_LEN: usize = 1456 - MESH_HEADER_LEN;
pub const FW_DIGEST_LEN: usize = 32;

pub const OTA_HEADER_LEN: usize = 12; // cmd (u32) + offset (u32) + size (u32)
pub const OTA_MAX_CHUNK_LEN: usize = 1024;
pub const OTA_RESTART_DELAY_MS: u32 = 1000;

/// Microseconds in one GNSS week, used to wrap extrapolated time of week.
pub const GNSS_WEEK_US: u64 = 604_800 * 1_000_000;
