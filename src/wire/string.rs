// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::string::{String, ToString};
use deku::{DekuError, deku_error};
use log::debug;

/// Decodes a fixed-width text field.
///
/// The field ends at the first NUL; surrounding space padding is removed.
pub fn read_string(bytes: &[u8]) -> Result<String, DekuError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let Ok(s) = core::str::from_utf8(&bytes[..end]) else {
        debug!("Invalid UTF-8 in string field: {bytes:02x?}");
        return Err(deku_error!(
            DekuError::Parse,
            "Invalid UTF-8 in string field"
        ));
    };
    Ok(s.trim().to_string())
}
