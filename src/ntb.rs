//! NTB assembly and parsing, shared by the RX and TX engines. This is the
//! part of the driver that is pure byte-buffer logic with no HAL
//! dependency, and so carries the bulk of the unit tests in spec section 8.

use crate::error::Error;
use crate::wire::{DatagramEntry, Ndp16Header, Nth16, NDP16_ENTRY_LEN, NDP16_HEADER_LEN, NTH16_LEN};

/// Walk a complete NTB in `buf` (whose logical length is `block_length`)
/// and invoke `sink` once per datagram entry with a nonzero index and
/// length, in index order. Returns the number of datagrams delivered.
///
/// This validates the NTH16 signature/header length/block length and the
/// NDP16 signature before touching any datagram entries; any mismatch is a
/// [`Error::FramingError`] and the caller is expected to discard the block
/// and reset its assembly length, per spec section 7.
pub fn for_each_datagram<'a>(
    buf: &'a [u8],
    block_length: usize,
    mut sink: impl FnMut(&'a [u8]),
) -> Result<usize, Error> {
    let nth = Nth16::parse(buf).ok_or(Error::FramingError)?;
    if nth.signature() != crate::wire::NTH16_SIGNATURE
        || nth.header_length() as usize != NTH16_LEN
        || nth.block_length() as usize != block_length
    {
        return Err(Error::FramingError);
    }

    let ndp_index = nth.ndp_index() as usize;
    let ndp_header_bytes = buf.get(ndp_index..).ok_or(Error::FramingError)?;
    let ndp = Ndp16Header::parse(ndp_header_bytes).ok_or(Error::FramingError)?;
    if !Ndp16Header::is_recognized_signature(ndp.signature()) {
        return Err(Error::FramingError);
    }

    let ndp_len = ndp.length() as usize;
    if ndp_len < NDP16_HEADER_LEN {
        return Err(Error::FramingError);
    }
    let datagram_count = (ndp_len - NDP16_HEADER_LEN) / NDP16_ENTRY_LEN;

    let mut delivered = 0;
    for i in 0..datagram_count {
        let offset = ndp_index + NDP16_HEADER_LEN + i * NDP16_ENTRY_LEN;
        let entry_bytes = buf.get(offset..).ok_or(Error::FramingError)?;
        let entry = DatagramEntry::parse(entry_bytes).ok_or(Error::FramingError)?;
        let index = entry.index() as usize;
        let length = entry.length() as usize;
        if index != 0 && length != 0 {
            let data = buf.get(index..index + length).ok_or(Error::FramingError)?;
            sink(data);
            delivered += 1;
        }
    }

    Ok(delivered)
}

fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Build a minimal two-NDP NTB16 around a single outgoing datagram already
/// written at `buf[16..16 + data_len]`, per spec section 4.6. Returns the
/// total block length to submit on bulk-OUT.
///
/// The two-NDP layout (a second, duplicate NDP pointing at the same
/// datagram) is a deliberate compatibility gesture for gadgets that inspect
/// more than one NDP; a single NDP is protocol-sufficient but not always
/// interoperable.
pub fn build_single_datagram_block(buf: &mut [u8], sequence: u16, data_len: usize) -> usize {
    const DATA_OFFSET: usize = 16;

    let data_aligned = align_up(data_len, 4);
    let first_ndp = DATA_OFFSET + data_aligned;
    let second_ndp = first_ndp + 16;
    let block_length = second_ndp + 16;

    let nth = Nth16::new(sequence, block_length as u16, first_ndp as u16);
    buf[..NTH16_LEN].copy_from_slice(nth.as_bytes());

    for b in &mut buf[DATA_OFFSET + data_len..first_ndp] {
        *b = 0;
    }
    for b in &mut buf[first_ndp..block_length] {
        *b = 0;
    }

    write_ndp(&mut buf[first_ndp..first_ndp + 16], second_ndp as u16, DATA_OFFSET as u16, data_len as u16);
    write_ndp(&mut buf[second_ndp..second_ndp + 16], 0, DATA_OFFSET as u16, data_len as u16);

    block_length
}

fn write_ndp(buf: &mut [u8], next_ndp_index: u16, datagram_index: u16, datagram_length: u16) {
    let header = Ndp16Header::new(next_ndp_index);
    buf[..NDP16_HEADER_LEN].copy_from_slice(header.as_bytes());
    let entry = DatagramEntry::new(datagram_index, datagram_length);
    buf[NDP16_HEADER_LEN..NDP16_HEADER_LEN + NDP16_ENTRY_LEN].copy_from_slice(entry.as_bytes());
    // The remaining 4 bytes are the zero terminator entry; `buf` was
    // zeroed by the caller before this is called.
}
