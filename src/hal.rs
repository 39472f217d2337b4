//! The narrow interfaces this driver consumes from its external
//! collaborators (spec section 6): the USB host controller, and the
//! upstream network stack's `run`/`stop`/`eth_input` hooks. These traits
//! are the boundary the core protocol engine is tested against — a real
//! firmware image implements `HostPort`/`Clock` against its host controller
//! driver and RTOS; the test suite implements them in memory.

/// Transport-level result of a USB transfer, as reported by the host
/// controller. Distinct from [`Error`] because a transport error doesn't
/// always map to the same driver-level error (a stalled bulk-IN during
/// steady-state RX is recovered locally; a stalled GET_NTB_PARAMETERS
/// during connect is not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    Stall,
    Babble,
    Io,
    Other,
}

/// A bound endpoint: its address (bit 7 set for IN) and negotiated max
/// packet size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointHandle {
    pub address: u8,
    pub max_packet_size: u16,
}

/// A USB control transfer's setup stage, matching `usb_setup_packet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// Data stage of a control transfer.
pub enum ControlData<'a> {
    None,
    In(&'a mut [u8]),
    Out(&'a [u8]),
}

/// The USB host controller collaborator (out of scope per spec section 1):
/// endpoint I/O primitives, URB submission, and control transfers. All
/// operations are blocking — this driver's concurrency model is dedicated
/// preemptive tasks making blocking calls, not an async executor.
pub trait HostPort {
    /// Issue a control transfer to `ctrl_intf`, recipient INTERFACE, type
    /// CLASS or STANDARD as encoded in `setup.request_type`. Returns the
    /// number of bytes transferred in the data stage.
    fn control_transfer(
        &mut self,
        setup: SetupPacket,
        data: ControlData<'_>,
    ) -> Result<usize, TransportError>;

    /// `SET_INTERFACE(interface, alt_setting)`.
    fn set_interface(&mut self, interface: u8, alt_setting: u8) -> Result<(), TransportError>;

    /// Fetch the string descriptor at `index` into `buf`, returning the
    /// number of bytes written.
    fn get_string_descriptor(&mut self, index: u8, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Submit a blocking bulk-IN transfer, returning the actual transfer
    /// length (which may be less than `buf.len()` on a short packet).
    fn bulk_in(&mut self, ep: EndpointHandle, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Submit a blocking bulk-OUT transfer of exactly `buf.len()` bytes.
    fn bulk_out(&mut self, ep: EndpointHandle, buf: &[u8]) -> Result<usize, TransportError>;

    /// Submit a blocking interrupt-IN transfer.
    fn interrupt_in(&mut self, ep: EndpointHandle, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Abort any in-flight URB on `ep`. Used by disconnect teardown.
    fn kill_urb(&mut self, ep: EndpointHandle);
}

/// The OS abstraction layer's sleep primitive (out of scope per spec
/// section 1), dependency-injected so the connect sequencer's delays can
/// be skipped in tests.
pub trait Clock {
    fn sleep_ms(&mut self, ms: u32);
}

/// The upstream network stack's weakly-linked hooks (spec section 6):
/// `run`/`stop` bring a netif up or down, `eth_input` is the sink for
/// received frames. Default implementations are no-ops, mirroring the
/// source's `__WEAK` stubs.
pub trait UpstreamHooks {
    fn run(&mut self) {}
    fn stop(&mut self) {}
    fn eth_input(&mut self, frame: &[u8]) {
        let _ = frame;
    }
}
