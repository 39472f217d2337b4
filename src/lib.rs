#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

mod control;
mod descriptor;
mod error;
mod hal;
mod instance;
mod notify;
mod ntb;
mod rx;
mod sequencer;
mod tx;
mod wire;

pub use error::Error;
pub use hal::{Clock, ControlData, EndpointHandle, HostPort, SetupPacket, TransportError, UpstreamHooks};
pub use instance::{Instance, NtbParameters, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_RX_MAX, DEFAULT_TX_MAX};
pub use notify::Notification;
pub use rx::RxEvent;
pub use sequencer::connect;
pub use tx::{eth_output, eth_txbuf};

/// `bDeviceClass`/`bInterfaceClass` value for the Communications Device
/// Class, used when matching the control interface during enumeration.
pub const USB_CLASS_CDC: u8 = 0x02;
/// `bInterfaceSubClass` for Network Control Model.
pub const CDC_SUBCLASS_NCM: u8 = 0x0D;
/// `bInterfaceProtocol` for NCM's control interface (no class-specific
/// protocol).
pub const CDC_PROTOCOL_NONE: u8 = 0x00;

/// The class-driver registration name (spec section 6): matched against
/// `InterfaceClass=CDC`, `SubClass=NCM`, `Protocol=NONE`.
pub const DRIVER_NAME: &str = "cdc_ncm";

/// Poll the notification endpoint once and deliver the result to the RX
/// engine's link-state bookkeeping. Exposed for callers that want to pump
/// notifications outside of [`rx::rx_step`]'s own link-up wait (spec
/// section 4.4: the poller is reentrant, not tied to a single call site).
pub fn poll_notification<H: HostPort, const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
    host: &mut H,
) -> Result<Notification, Error> {
    use core::sync::atomic::Ordering;

    let interrupt_in = instance
        .interrupt_in_endpoint()
        .ok_or(Error::TransportFatal)?;
    let mut scratch = [0u8; 16];
    let notification = notify::poll_once(host, interrupt_in, &mut scratch)?;
    match notification {
        Notification::LinkChanged(up) => instance.connect_status.store(up, Ordering::SeqCst),
        Notification::SpeedChanged(speed) => instance.speed = speed,
        Notification::Unknown => {}
    }
    Ok(notification)
}

/// Perform one iteration of the RX engine's main loop (spec section 4.5).
pub fn rx_step<H: HostPort, C: Clock, U: UpstreamHooks, const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
    host: &mut H,
    clock: &mut C,
    hooks: &mut U,
) -> Result<RxEvent, Error> {
    rx::rx_step(instance, host, clock, hooks)
}

/// Wait for link-up and perform the settle/clear-halt handshake before the
/// RX loop starts submitting bulk-IN transfers (spec section 4.5, "On
/// entry").
pub fn wait_for_link_up<H: HostPort, C: Clock, const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
    host: &mut H,
    clock: &mut C,
) {
    rx::wait_for_link_up(instance, host, clock)
}

/// Kill in-flight URBs and invoke the `stop` hook (spec section 4.7).
pub fn disconnect<H: HostPort, U: UpstreamHooks, const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
    host: &mut H,
    hooks: &mut U,
) {
    instance.disconnect(host, hooks)
}
