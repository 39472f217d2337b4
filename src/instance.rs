//! Per-device state (spec section 3): endpoints, URB-owning buffers, MAC,
//! NTB parameters, sequence counter, link status.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::error::Error;
use crate::hal::{EndpointHandle, HostPort, UpstreamHooks};

/// RX assembly buffer size. Configurable via the const generic on
/// [`Instance`]; 4 KiB is a reasonable default for a single in-flight NTB.
pub const DEFAULT_RX_MAX: usize = 4096;
/// TX buffer size; must be at least `max_segment_size + 48` (spec section
/// 3). 1600 covers the default 1514-byte max segment size plus the two-NDP
/// overhead with room to spare.
pub const DEFAULT_TX_MAX: usize = 1600;
/// Fallback/clamp value for `wMaxSegmentSize` when the device reports zero
/// or something implausibly large.
pub const DEFAULT_MAX_SEGMENT_SIZE: u16 = 1514;

const NTB_PARAMETERS_LEN: usize = 28;

/// Decoded GET_NTB_PARAMETERS response (28 bytes on the wire). Only
/// `in_max_size` and `out_max_datagrams` affect the core logic; the rest is
/// logged at connect time (mirroring the original driver's parameter dump).
#[derive(Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(any(feature = "std", feature = "log", test), derive(Debug))]
pub struct NtbParameters {
    pub formats_supported: u16,
    pub in_max_size: u32,
    pub in_divisor: u16,
    pub in_payload_remainder: u16,
    pub in_alignment: u16,
    pub out_max_size: u32,
    pub out_divisor: u16,
    pub out_payload_remainder: u16,
    pub out_alignment: u16,
    pub out_max_datagrams: u16,
}

impl Default for NtbParameters {
    fn default() -> Self {
        Self {
            formats_supported: 1,
            in_max_size: 0,
            in_divisor: 1,
            in_payload_remainder: 0,
            in_alignment: 4,
            out_max_size: 0,
            out_divisor: 1,
            out_payload_remainder: 0,
            out_alignment: 4,
            out_max_datagrams: 0,
        }
    }
}

impl NtbParameters {
    /// Parse a GET_NTB_PARAMETERS response. `wLength` (bytes 0..2) and the
    /// reserved word (bytes 14..16) are not surfaced.
    pub fn parse(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < NTB_PARAMETERS_LEN {
            return Err(Error::ControlTransferFailure);
        }
        Ok(Self {
            formats_supported: u16::from_le_bytes([buf[2], buf[3]]),
            in_max_size: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            in_divisor: u16::from_le_bytes([buf[8], buf[9]]),
            in_payload_remainder: u16::from_le_bytes([buf[10], buf[11]]),
            in_alignment: u16::from_le_bytes([buf[12], buf[13]]),
            out_max_size: u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]),
            out_divisor: u16::from_le_bytes([buf[20], buf[21]]),
            out_payload_remainder: u16::from_le_bytes([buf[22], buf[23]]),
            out_alignment: u16::from_le_bytes([buf[24], buf[25]]),
            out_max_datagrams: u16::from_le_bytes([buf[26], buf[27]]),
        })
    }
}

/// One attached CDC-NCM function. `RX_MAX`/`TX_MAX` size the DMA-visible
/// assembly buffers; both default to values sized for a 1514-byte Ethernet
/// MTU.
pub struct Instance<const RX_MAX: usize = DEFAULT_RX_MAX, const TX_MAX: usize = DEFAULT_TX_MAX> {
    pub ctrl_intf: u8,
    pub data_intf: u8,
    pub(crate) interrupt_in: Option<EndpointHandle>,
    pub(crate) bulk_in: Option<EndpointHandle>,
    pub(crate) bulk_out: Option<EndpointHandle>,
    pub mac: [u8; 6],
    pub max_segment_size: u16,
    pub ntb_params: NtbParameters,
    pub(crate) bulkout_sequence: u16,
    pub connect_status: AtomicBool,
    pub speed: [u8; 8],
    pub(crate) rx_buffer: [u8; RX_MAX],
    pub(crate) rx_length: usize,
    pub(crate) tx_buffer: [u8; TX_MAX],
}

impl<const RX_MAX: usize, const TX_MAX: usize> Instance<RX_MAX, TX_MAX> {
    pub fn new(
        ctrl_intf: u8,
        interrupt_in: Option<EndpointHandle>,
        bulk_in: EndpointHandle,
        bulk_out: EndpointHandle,
        mac: [u8; 6],
        max_segment_size: u16,
    ) -> Self {
        Self {
            ctrl_intf,
            data_intf: ctrl_intf + 1,
            interrupt_in,
            bulk_in: Some(bulk_in),
            bulk_out: Some(bulk_out),
            mac,
            max_segment_size,
            ntb_params: NtbParameters::default(),
            bulkout_sequence: 0,
            connect_status: AtomicBool::new(false),
            speed: [0; 8],
            rx_buffer: [0; RX_MAX],
            rx_length: 0,
            tx_buffer: [0; TX_MAX],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connect_status.load(Ordering::SeqCst)
    }

    pub fn bulk_in_endpoint(&self) -> Option<EndpointHandle> {
        self.bulk_in
    }

    pub fn bulk_out_endpoint(&self) -> Option<EndpointHandle> {
        self.bulk_out
    }

    pub fn interrupt_in_endpoint(&self) -> Option<EndpointHandle> {
        self.interrupt_in
    }

    /// Clamp `dwNtbInMaxSize` to `RX_MAX` and `max_segment_size` to
    /// [`DEFAULT_MAX_SEGMENT_SIZE`] when the device reports zero or
    /// something larger than this instance can hold (spec section 4.3
    /// step 3).
    pub(crate) fn clamp_ntb_parameters(&mut self) {
        if self.ntb_params.in_max_size == 0 || self.ntb_params.in_max_size as usize > RX_MAX {
            self.ntb_params.in_max_size = RX_MAX as u32;
        }
        if self.max_segment_size == 0 || self.max_segment_size > DEFAULT_MAX_SEGMENT_SIZE {
            self.max_segment_size = DEFAULT_MAX_SEGMENT_SIZE;
        }
    }

    /// Kill in-flight URBs, invoke the `stop` hook if the instance was
    /// registered, and zero the runtime state (spec section 4.7).
    pub fn disconnect<H: HostPort, U: UpstreamHooks>(&mut self, host: &mut H, hooks: &mut U) {
        if let Some(ep) = self.interrupt_in.take() {
            host.kill_urb(ep);
        }
        if let Some(ep) = self.bulk_in.take() {
            host.kill_urb(ep);
        }
        if let Some(ep) = self.bulk_out.take() {
            host.kill_urb(ep);
        }
        hooks.stop();
        self.connect_status.store(false, Ordering::SeqCst);
        self.rx_length = 0;
        self.bulkout_sequence = 0;
        self.speed = [0; 8];
    }
}
