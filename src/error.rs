//! Error kinds from spec section 7, shared by every module.

/// Errors the driver can report. Most are recoverable locally (see the
/// module that raises them for what "recovered" means); `BadDescriptor`,
/// `MissingMac`, and `BadMac` are fatal at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The raw configuration descriptor is truncated or malformed.
    BadDescriptor,
    /// No CDC Ethernet Networking Functional Descriptor was found for the
    /// control interface.
    MissingMac,
    /// The MAC address string descriptor wasn't 12 ASCII hex characters.
    BadMac,
    /// A class-specific control request failed in a way the caller must
    /// react to (as opposed to the optional-setter downgrades handled
    /// internally by the control plane).
    ControlTransferFailure,
    /// Bulk-IN endpoint reported STALL.
    EndpointStall,
    /// Bulk-IN endpoint reported a babble condition.
    Babble,
    /// NTH16/NDP16 signature, length, or block-length mismatch.
    FramingError,
    /// The RX assembly buffer filled up without a terminating short packet.
    BufferOverflow,
    /// `eth_output` was called while the link is down.
    NotConnected,
    /// A non-recoverable transport error; the RX engine must restart.
    TransportFatal,
}

impl From<crate::hal::TransportError> for Error {
    fn from(e: crate::hal::TransportError) -> Self {
        use crate::hal::TransportError::*;
        match e {
            Stall => Error::EndpointStall,
            Babble => Error::Babble,
            Io | Other => Error::TransportFatal,
        }
    }
}
