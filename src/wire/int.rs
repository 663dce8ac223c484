// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::vec::Vec;
use deku::{
    DekuError, DekuReader,
    ctx::{ByteSize, Endian},
    deku_error,
    no_std_io::Cursor,
    reader::Reader,
};

/// Reads a little-endian unsigned integer occupying all of `bytes`
pub fn read_le(bytes: &[u8]) -> Result<u64, DekuError> {
    if bytes.is_empty() || bytes.len() > size_of::<u64>() {
        return Err(deku_error!(
            DekuError::InvalidParam,
            "Unsupported integer width",
            "{}",
            bytes.len()
        ));
    }

    let mut cursor = Cursor::new(bytes);
    let mut reader = Reader::new(&mut cursor);
    u64::from_reader_with_ctx(&mut reader, (Endian::Little, ByteSize(bytes.len())))
}

/// Reads `count` little-endian elements of `width` bytes, each starting
/// `stride` bytes after the previous one
pub fn read_le_list(
    bytes: &[u8],
    width: usize,
    stride: usize,
    count: usize,
) -> Result<Vec<u64>, DekuError> {
    let mut res = Vec::with_capacity(count.min(bytes.len()));

    for i in 0..count {
        let elem = i
            .checked_mul(stride)
            .and_then(|start| Some(start..start.checked_add(width)?))
            .and_then(|range| bytes.get(range));
        let Some(elem) = elem else {
            return Err(deku_error!(
                DekuError::Parse,
                "List element out of range",
                "{}",
                i
            ));
        };
        res.push(read_le(elem)?);
    }

    Ok(res)
}
