//! Connect/configure sequencer (spec section 4.3): the exact ordering that
//! takes a freshly enumerated CDC-NCM function from raw descriptor bytes to
//! a running [`Instance`].

use core::sync::atomic::Ordering;

use crate::control;
use crate::descriptor;
use crate::error::Error;
use crate::hal::{Clock, HostPort, UpstreamHooks};
use crate::instance::Instance;

const ALT_SETTING_DISABLED: u8 = 0;

/// Run the connect sequence against `raw_config_descriptor` and return a
/// running [`Instance`]. `ctrl_intf` is the control interface number
/// assigned by enumeration; `data_intf` is assumed to be `ctrl_intf + 1`
/// per spec section 3.
pub fn connect<H: HostPort, C: Clock, U: UpstreamHooks, const RX_MAX: usize, const TX_MAX: usize>(
    raw_config_descriptor: &[u8],
    ctrl_intf: u8,
    host: &mut H,
    clock: &mut C,
    hooks: &mut U,
) -> Result<Instance<RX_MAX, TX_MAX>, Error> {
    let data_intf = ctrl_intf + 1;

    // 1. Parse descriptors, resolve MAC, bind endpoints.
    let parsed = descriptor::parse(raw_config_descriptor, ctrl_intf, data_intf)?;
    let bulk_in = parsed.bulk_in.ok_or(Error::BadDescriptor)?;
    let bulk_out = parsed.bulk_out.ok_or(Error::BadDescriptor)?;

    let mut mac_ascii = [0u8; 12];
    host.get_string_descriptor(parsed.mac_string_index, &mut mac_ascii)
        .map_err(|_| Error::BadMac)?;
    let mac = descriptor::parse_mac(&mac_ascii)?;

    let mut instance: Instance<RX_MAX, TX_MAX> =
        Instance::new(ctrl_intf, parsed.interrupt_in, bulk_in, bulk_out, mac, parsed.max_segment_size);

    // 2. Alt-setting toggle choreography, only meaningful with >1 altsetting.
    let multi_altsetting = parsed.data_altsetting_count > 1;
    if multi_altsetting {
        let alt_n = parsed.data_altsetting_count - 1;
        let _ = host.set_interface(data_intf, alt_n);
        let _ = host.set_interface(data_intf, ALT_SETTING_DISABLED);
    }

    // 3. GET_NTB_PARAMETERS, then clamp to this instance's buffer sizes.
    match control::get_ntb_parameters(host, ctrl_intf) {
        Ok(params) => instance.ntb_params = params,
        Err(_) => warn!("GET_NTB_PARAMETERS failed, continuing with defaults"),
    }
    instance.clamp_ntb_parameters();
    info!("ntb parameters: {:?}", instance.ntb_params);

    // 4. SET_CRC_MODE(CRC16) — optional setter, downgrade failures.
    if control::set_crc_mode(host, ctrl_intf, control::CRC_MODE_CRC16).is_err() {
        warn!("SET_CRC_MODE failed, continuing");
    }

    // 5. SET_NTB_FORMAT(NTB16) — optional setter, downgrade failures.
    if control::set_ntb_format(host, ctrl_intf, control::NTB_FORMAT_16).is_err() {
        warn!("SET_NTB_FORMAT failed, continuing");
    }

    // 6. Settle, then re-enable the data altsetting if it was toggled off.
    clock.sleep_ms(21);
    if multi_altsetting {
        let alt_n = parsed.data_altsetting_count - 1;
        let _ = host.set_interface(data_intf, alt_n);
    }

    // 7. SET_ETHERNET_PACKET_FILTER with retry/redundancy policy.
    control::set_packet_filter_with_retry(host, clock, ctrl_intf, control::PACKET_FILTER_DEFAULT);

    // 8. Mark connected and announce to the upstream stack.
    instance.connect_status.store(true, Ordering::SeqCst);
    hooks.run();
    info!("cdc-ncm instance connected");

    Ok(instance)
}
