//! TX engine (spec section 4.6): wraps a single Ethernet frame already
//! written into the instance's TX buffer in a minimal two-NDP NTB16 and
//! submits it on bulk-OUT.

use crate::error::Error;
use crate::hal::HostPort;
use crate::instance::Instance;
use crate::ntb::build_single_datagram_block;

const DATA_OFFSET: usize = 16;

/// Return the writable region of the TX buffer the upstream stack should
/// fill before calling [`eth_output`] — equivalent to the source's
/// `get_eth_txbuf()`.
pub fn eth_txbuf<const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
) -> &mut [u8] {
    &mut instance.tx_buffer[DATA_OFFSET..]
}

/// Frame the `buflen` bytes already written at `eth_txbuf()[..buflen]` and
/// submit them on bulk-OUT. Fails with [`Error::NotConnected`] without
/// touching the endpoint if the link is down.
pub fn eth_output<H: HostPort, const RX_MAX: usize, const TX_MAX: usize>(
    instance: &mut Instance<RX_MAX, TX_MAX>,
    host: &mut H,
    buflen: usize,
) -> Result<(), Error> {
    if !instance.is_connected() {
        return Err(Error::NotConnected);
    }

    let bulk_out = instance.bulk_out_endpoint().ok_or(Error::NotConnected)?;

    let sequence = instance.bulkout_sequence;
    instance.bulkout_sequence = instance.bulkout_sequence.wrapping_add(1);

    let block_length = build_single_datagram_block(&mut instance.tx_buffer, sequence, buflen);

    host.bulk_out(bulk_out, &instance.tx_buffer[..block_length])
        .map(|_| ())
        .map_err(Error::from)
}
