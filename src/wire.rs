//! On-the-wire byte layouts for NTB16 framing: the NTH16 block header, the
//! NDP16 datagram pointer table, and its fixed-size entries.
//!
//! All multi-byte fields are stored as byte arrays rather than native
//! integers so that casting an unaligned slice with `bytemuck` is always
//! sound regardless of host endianness; accessors convert explicitly via
//! `from_le_bytes`/`to_le_bytes`.

use bytemuck::{Pod, Zeroable};

/// `"NCMH"` read as a little-endian `u32`.
pub const NTH16_SIGNATURE: u32 = 0x484d_434e;
/// `"NCM0"` read as a little-endian `u32`; used both for the signature NDPs
/// are built with and as one of the two signatures accepted on receive.
pub const NDP16_SIGNATURE_NCM0: u32 = 0x304d_434e;
/// `"NCM1"`, the other NDP16 signature variant accepted on receive.
pub const NDP16_SIGNATURE_NCM1: u32 = 0x314d_434e;

pub const NTH16_LEN: usize = 12;
pub const NDP16_HEADER_LEN: usize = 8;
pub const NDP16_ENTRY_LEN: usize = 4;

/// 12-byte NTB block header.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Nth16 {
    signature: [u8; 4],
    header_length: [u8; 2],
    sequence: [u8; 2],
    block_length: [u8; 2],
    ndp_index: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<Nth16>() == NTH16_LEN);

impl Nth16 {
    pub fn new(sequence: u16, block_length: u16, ndp_index: u16) -> Self {
        Self {
            signature: NTH16_SIGNATURE.to_le_bytes(),
            header_length: (NTH16_LEN as u16).to_le_bytes(),
            sequence: sequence.to_le_bytes(),
            block_length: block_length.to_le_bytes(),
            ndp_index: ndp_index.to_le_bytes(),
        }
    }

    pub fn signature(&self) -> u32 {
        u32::from_le_bytes(self.signature)
    }

    pub fn header_length(&self) -> u16 {
        u16::from_le_bytes(self.header_length)
    }

    pub fn sequence(&self) -> u16 {
        u16::from_le_bytes(self.sequence)
    }

    pub fn block_length(&self) -> u16 {
        u16::from_le_bytes(self.block_length)
    }

    pub fn ndp_index(&self) -> u16 {
        u16::from_le_bytes(self.ndp_index)
    }

    pub fn parse(buf: &[u8]) -> Option<&Nth16> {
        bytemuck::try_from_bytes(buf.get(..NTH16_LEN)?).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// 8-byte NDP16 header, immediately followed by `{index, length}` entries.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Ndp16Header {
    signature: [u8; 4],
    length: [u8; 2],
    next_ndp_index: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<Ndp16Header>() == NDP16_HEADER_LEN);

impl Ndp16Header {
    pub fn new(next_ndp_index: u16) -> Self {
        Self {
            signature: NDP16_SIGNATURE_NCM0.to_le_bytes(),
            length: 16u16.to_le_bytes(),
            next_ndp_index: next_ndp_index.to_le_bytes(),
        }
    }

    pub fn signature(&self) -> u32 {
        u32::from_le_bytes(self.signature)
    }

    pub fn length(&self) -> u16 {
        u16::from_le_bytes(self.length)
    }

    /// Chained-NDP walking is out of scope (the driver's RX path reads a
    /// single NDP table per block, matching the reference driver); kept for
    /// callers that need to inspect the field directly.
    #[allow(dead_code)]
    pub fn next_ndp_index(&self) -> u16 {
        u16::from_le_bytes(self.next_ndp_index)
    }

    pub fn parse(buf: &[u8]) -> Option<&Ndp16Header> {
        bytemuck::try_from_bytes(buf.get(..NDP16_HEADER_LEN)?).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn is_recognized_signature(sig: u32) -> bool {
        sig == NDP16_SIGNATURE_NCM0 || sig == NDP16_SIGNATURE_NCM1
    }
}

/// One `{wDatagramIndex, wDatagramLength}` entry in an NDP16 table.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct DatagramEntry {
    index: [u8; 2],
    length: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<DatagramEntry>() == NDP16_ENTRY_LEN);

impl DatagramEntry {
    pub fn new(index: u16, length: u16) -> Self {
        Self {
            index: index.to_le_bytes(),
            length: length.to_le_bytes(),
        }
    }

    pub fn index(&self) -> u16 {
        u16::from_le_bytes(self.index)
    }

    pub fn length(&self) -> u16 {
        u16::from_le_bytes(self.length)
    }

    pub fn parse(buf: &[u8]) -> Option<&DatagramEntry> {
        bytemuck::try_from_bytes(buf.get(..NDP16_ENTRY_LEN)?).ok()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
