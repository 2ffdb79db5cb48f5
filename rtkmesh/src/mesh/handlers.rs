//! Per-type handlers. Payload lengths are checked by the dispatcher before
//! any of these run; replies are written into the caller's scratch buffer.

use log::{info, warn};

use super::{
    dispatcher::{DispatchOutcome, Inbound},
    envelope::{MeshEnvelope, NetworkData, PacketType},
};
use crate::{
    constants::FW_DIGEST_LEN,
    error::EnvelopeError,
    interfaces::FirmwareIdentity,
};

/// Echo diagnostic. The root only logs the counters; other nodes answer the
/// sender with their own counter.
pub fn handle_echo<'a>(
    inbound: &Inbound<'a>,
    payload: &[u8],
    scratch: &mut [u8],
) -> Result<DispatchOutcome<'a>, EnvelopeError> {
    let rx_send_count = u32::from_le_bytes(*leading::<4>(payload)?);
    if inbound.is_root {
        info!(
            "[ECHO RX] from: {}, my_send_count: {}, rx_send_count: {rx_send_count}",
            inbound.from, inbound.send_count
        );
        return Ok(DispatchOutcome::Handled);
    }
    let len = MeshEnvelope::encode(PacketType::Echo, &inbound.send_count.to_le_bytes(), scratch)?;
    Ok(DispatchOutcome::Reply {
        dest: inbound.from,
        len,
    })
}

/// Answers with a FIRMWARE_REPORT carrying the running image digest. The
/// query payload is ignored.
pub fn handle_firmware_query<'a, F: FirmwareIdentity>(
    inbound: &Inbound<'a>,
    identity: &F,
    scratch: &mut [u8],
) -> Result<DispatchOutcome<'a>, EnvelopeError> {
    let digest = identity.running_firmware_digest_hex();
    let len = MeshEnvelope::encode(PacketType::FirmwareReport, &digest, scratch)?;
    Ok(DispatchOutcome::Reply {
        dest: inbound.from,
        len,
    })
}

pub fn handle_firmware_report<'a>(
    inbound: &Inbound<'a>,
    payload: &[u8],
) -> Result<DispatchOutcome<'a>, EnvelopeError> {
    let digest = *leading::<FW_DIGEST_LEN>(payload)?;
    match core::str::from_utf8(&digest) {
        Ok(md5) => info!("Node {} reports firmware MD5: {md5}", inbound.from),
        Err(_) => warn!("Node {} reports a non-ASCII firmware digest", inbound.from),
    }
    Ok(DispatchOutcome::FirmwareReported {
        peer: inbound.from,
        digest,
    })
}

pub fn handle_network_data<'a>(inbound: &Inbound<'a>, payload: &[u8]) -> DispatchOutcome<'a> {
    match NetworkData::parse(payload) {
        Some(data) => {
            info!(
                "heartbeat from {}: send_count {}, battery {} mV",
                inbound.from, data.send_count, data.battery_mv
            );
            DispatchOutcome::Heartbeat {
                peer: inbound.from,
                data,
            }
        },
        None => DispatchOutcome::Handled,
    }
}

fn leading<const N: usize>(payload: &[u8]) -> Result<&[u8; N], EnvelopeError> {
    payload.first_chunk::<N>().ok_or(EnvelopeError::Truncated {
        expect: N,
        got: payload.len(),
    })
}
