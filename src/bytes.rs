//! Little-endian field access for on-disk structures.
//!
//! The `_at` readers take fixed-size records whose offsets are constants, the
//! `read_*` variants take variable buffers and return `None` past the end.

pub(crate) fn u16_at<const N: usize>(record: &[u8; N], offset: usize) -> u16 {
    u16::from_le_bytes([record[offset], record[offset + 1]])
}

pub(crate) fn u32_at<const N: usize>(record: &[u8; N], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&record[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

pub(crate) fn u64_at<const N: usize>(record: &[u8; N], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&record[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

pub(crate) fn read_u32_le(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset.checked_add(4)?)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u32::from_le_bytes)
}

pub(crate) fn all_zero(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}
