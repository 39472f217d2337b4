//! Notification endpoint handling (spec section 4.4): decodes
//! `NETWORK_CONNECTION` and `CONNECTION_SPEED_CHANGE` on the interrupt-IN
//! endpoint.

use crate::error::Error;
use crate::hal::{EndpointHandle, HostPort};

const NOTIFY_NETWORK_CONNECTION: u8 = 0x00;
const NOTIFY_CONNECTION_SPEED_CHANGE: u8 = 0x2A;

/// A decoded interrupt-IN notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Notification {
    LinkChanged(bool),
    SpeedChanged([u8; 8]),
    Unknown,
}

/// Submit one interrupt-IN transfer into `scratch` and decode it. Callers
/// are expected to call this repeatedly from the RX task's notification
/// poll (spec section 4.4); a single call is reentrant and does not block
/// on anything but the one transfer.
pub fn poll_once<H: HostPort>(
    host: &mut H,
    interrupt_in: EndpointHandle,
    scratch: &mut [u8; 16],
) -> Result<Notification, Error> {
    let n = host
        .interrupt_in(interrupt_in, scratch)
        .map_err(Error::from)?;
    if n < 8 {
        return Ok(Notification::Unknown);
    }

    let notification_type = scratch[1];
    let value = u16::from_le_bytes([scratch[2], scratch[3]]);

    match notification_type {
        NOTIFY_NETWORK_CONNECTION => Ok(Notification::LinkChanged(value != 0)),
        NOTIFY_CONNECTION_SPEED_CHANGE if n >= 16 => {
            let mut speed = [0u8; 8];
            speed.copy_from_slice(&scratch[8..16]);
            Ok(Notification::SpeedChanged(speed))
        }
        _ => Ok(Notification::Unknown),
    }
}
