//! Class-specific control requests (spec section 4.2): GET_NTB_PARAMETERS,
//! SET_CRC_MODE, SET_NTB_FORMAT, SET_ETHERNET_PACKET_FILTER.

use crate::error::Error;
use crate::hal::{Clock, ControlData, HostPort, SetupPacket, TransportError};
use crate::instance::NtbParameters;

const REQ_GET_NTB_PARAMETERS: u8 = 0x80;
const REQ_SET_NTB_FORMAT: u8 = 0x84;
const REQ_SET_ETHERNET_PACKET_FILTER: u8 = 0x43;
const REQ_SET_CRC_MODE: u8 = 0x8A;

const DIR_HOST_TO_DEVICE: u8 = 0x00;
const DIR_DEVICE_TO_HOST: u8 = 0x80;
const TYPE_CLASS: u8 = 0x20;
const TYPE_STANDARD: u8 = 0x00;
const RECIPIENT_INTERFACE: u8 = 0x01;
const RECIPIENT_ENDPOINT: u8 = 0x02;

/// `bmRequestType`: device-to-host, class, interface.
const REQUEST_TYPE_CLASS_IN: u8 = DIR_DEVICE_TO_HOST | TYPE_CLASS | RECIPIENT_INTERFACE;
/// `bmRequestType`: host-to-device, class, interface.
const REQUEST_TYPE_CLASS_OUT: u8 = DIR_HOST_TO_DEVICE | TYPE_CLASS | RECIPIENT_INTERFACE;
/// `bmRequestType`: host-to-device, standard, endpoint (for CLEAR_FEATURE).
const REQUEST_TYPE_STANDARD_ENDPOINT_OUT: u8 = DIR_HOST_TO_DEVICE | TYPE_STANDARD | RECIPIENT_ENDPOINT;

const STD_REQUEST_CLEAR_FEATURE: u8 = 0x01;
const FEATURE_ENDPOINT_HALT: u16 = 0x00;

pub const CRC_MODE_CRC16: u16 = 0;
#[allow(dead_code)]
pub const CRC_MODE_NO_CRC: u16 = 1;
pub const NTB_FORMAT_16: u16 = 0;
#[allow(dead_code)]
pub const NTB_FORMAT_32: u16 = 1;

/// DIRECTED | MULTICAST | BROADCAST.
pub const PACKET_FILTER_DEFAULT: u16 = 0x000E;

const NTB_PARAMETERS_LEN: usize = 28;

pub fn get_ntb_parameters<H: HostPort>(host: &mut H, ctrl_intf: u8) -> Result<NtbParameters, Error> {
    let mut buf = [0u8; NTB_PARAMETERS_LEN];
    let setup = SetupPacket {
        request_type: REQUEST_TYPE_CLASS_IN,
        request: REQ_GET_NTB_PARAMETERS,
        value: 0,
        index: ctrl_intf as u16,
        length: NTB_PARAMETERS_LEN as u16,
    };
    let n = host
        .control_transfer(setup, ControlData::In(&mut buf))
        .map_err(|_| Error::ControlTransferFailure)?;
    NtbParameters::parse(&buf[..n.min(NTB_PARAMETERS_LEN)])
}

pub fn set_crc_mode<H: HostPort>(host: &mut H, ctrl_intf: u8, mode: u16) -> Result<(), TransportError> {
    class_out(host, ctrl_intf, REQ_SET_CRC_MODE, mode)
}

pub fn set_ntb_format<H: HostPort>(host: &mut H, ctrl_intf: u8, format: u16) -> Result<(), TransportError> {
    class_out(host, ctrl_intf, REQ_SET_NTB_FORMAT, format)
}

fn set_packet_filter<H: HostPort>(host: &mut H, ctrl_intf: u8, filter: u16) -> Result<(), TransportError> {
    class_out(host, ctrl_intf, REQ_SET_ETHERNET_PACKET_FILTER, filter)
}

fn class_out<H: HostPort>(host: &mut H, ctrl_intf: u8, request: u8, value: u16) -> Result<(), TransportError> {
    let setup = SetupPacket {
        request_type: REQUEST_TYPE_CLASS_OUT,
        request,
        value,
        index: ctrl_intf as u16,
        length: 0,
    };
    host.control_transfer(setup, ControlData::None).map(|_| ())
}

/// Send SET_ETHERNET_PACKET_FILTER with the retry/redundancy policy of
/// spec section 4.2: on failure, retry once after a 10 ms pause; on
/// success, send two more redundant copies at 10 ms intervals (a
/// gadget-compatibility behavior of unconfirmed necessity, kept as
/// specified).
pub fn set_packet_filter_with_retry<H: HostPort, C: Clock>(
    host: &mut H,
    clock: &mut C,
    ctrl_intf: u8,
    filter: u16,
) {
    let mut result = set_packet_filter(host, ctrl_intf, filter);
    if result.is_err() {
        clock.sleep_ms(10);
        result = set_packet_filter(host, ctrl_intf, filter);
    }

    match result {
        Ok(()) => {
            for _ in 0..2 {
                clock.sleep_ms(10);
                let _ = set_packet_filter(host, ctrl_intf, filter);
            }
        }
        Err(_) => {
            warn!("SET_ETHERNET_PACKET_FILTER failed after retry, continuing");
        }
    }
}

/// `CLEAR_FEATURE(ENDPOINT_HALT)` on the given endpoint address. Errors are
/// intentionally swallowed by callers (spec section 4.5: "ignore
/// STALL/IO").
pub fn clear_endpoint_halt<H: HostPort>(host: &mut H, endpoint_address: u8) -> Result<(), TransportError> {
    let setup = SetupPacket {
        request_type: REQUEST_TYPE_STANDARD_ENDPOINT_OUT,
        request: STD_REQUEST_CLEAR_FEATURE,
        value: FEATURE_ENDPOINT_HALT,
        index: endpoint_address as u16,
        length: 0,
    };
    host.control_transfer(setup, ControlData::None).map(|_| ())
}
