//! Mesh packet envelope and inbound dispatch.

mod dispatcher;
mod envelope;
pub mod handlers;

pub use dispatcher::{DispatchOutcome, Dispatcher, Inbound};
pub use envelope::{MeshEnvelope, NetworkData, PacketType};

use log::error;

use crate::{error::SendError, interfaces::MeshTransport};

/// Sends the reply of `outcome`, if it has one, from `scratch`. Returns
/// whether something was sent. Failures are reported, never retried.
pub fn send_reply<T: MeshTransport>(
    transport: &mut T,
    outcome: &DispatchOutcome<'_>,
    scratch: &[u8],
) -> Result<bool, SendError<T::Error>> {
    let DispatchOutcome::Reply { dest, len } = *outcome else {
        return Ok(false);
    };
    transport.send(dest, &scratch[..len]).map_err(|cause| {
        error!("Failed to send reply to {dest}: {cause:?}");
        SendError { dest, cause }
    })?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::MeshAddr;

    struct Refusing;

    impl MeshTransport for Refusing {
        type Error = &'static str;

        fn send(&mut self, _dest: MeshAddr, _bytes: &[u8]) -> Result<(), Self::Error> {
            Err("no route")
        }
    }

    #[test]
    fn send_failure_is_reported() {
        let dest = MeshAddr([1; 6]);
        let outcome = DispatchOutcome::Reply { dest, len: 2 };
        assert_eq!(
            send_reply(&mut Refusing, &outcome, &[0, 1, 2]),
            Err(SendError {
                dest,
                cause: "no route"
            })
        );
        assert_eq!(
            send_reply(&mut Refusing, &DispatchOutcome::Handled, &[]),
            Ok(false)
        );
    }
}
