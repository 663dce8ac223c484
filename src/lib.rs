// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
#![no_std]

//! Host-side NVMe-MI over MCTP/SMBus
//!
//! Encodes NVMe-MI management commands into MCTP-over-SMBus packets,
//! exchanges them through a caller-supplied [`Transport`], and decodes the
//! responses into named, typed fields.

extern crate alloc;
extern crate deku;
extern crate num_derive;

pub mod client;
pub mod mctp;
pub mod nvme;
pub mod smbus;
pub mod transport;
mod wire;

pub use client::{Client, ClientConfig};
pub use transport::Transport;

use alloc::string::String;
use deku::{DekuError, DekuWriter, no_std_io::Cursor, writer::Writer};

/// # Safety
///
/// Must only be implemented for `#[repr(T)]` enums, where the discriminant
/// occupies the leading bytes of every variant.
unsafe trait Discriminant<T: Copy> {
    fn id(&self) -> T {
        let ptr = core::ptr::from_ref(self).cast::<T>();
        // SAFETY: Guaranteed by the implementor's #[repr(T)]
        unsafe { *ptr }
    }
}

/// Serialises a wire structure into a buffer of at most `S` bytes
trait Encode<const S: usize>: DekuWriter {
    fn encode(&self) -> core::result::Result<([u8; S], usize), DekuError> {
        let mut buf = [0u8; S];
        let mut cursor = Cursor::new(buf.as_mut_slice());
        {
            let mut writer = Writer::new(&mut cursor);
            self.to_writer(&mut writer, ())?;
            writer.finalize()?;
        }
        let len = cursor.position() as usize;
        Ok((buf, len))
    }
}

/// Reasons a run of fragments could not be reassembled
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SequenceError {
    /// A fragment arrived with a packet sequence number other than the one
    /// expected for its message
    Unexpected { expected: u8, found: u8 },
    /// A continuation fragment arrived with no message in progress
    NoMessage,
}

/// Error type for packet, fragment and transport operations
///
/// Field-level decode problems are not errors; they are reported through
/// [`nvme::mi::decode::DecodedResponse::decode_errors`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Malformed or truncated packet or message
    Format(String),
    /// Well-framed packet whose Packet Error Code does not match
    Pec { expected: u8, found: u8 },
    /// Fragment ordering violation
    Sequence(SequenceError),
    /// NVMe-MI Message Integrity Check mismatch
    Integrity { expected: u32, found: u32 },
    /// The transport gave up waiting for the remote endpoint
    Timeout,
    /// The transport failed to exchange a packet
    Communication(String),
    /// Caller supplied an unusable value
    InvalidArgument(String),
}

impl core::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Format(why) => write!(fmt, "Malformed packet: {why}"),
            Self::Pec { expected, found } => {
                write!(fmt, "PEC mismatch: expected {expected:#04x}, found {found:#04x}")
            }
            Self::Sequence(SequenceError::Unexpected { expected, found }) => {
                write!(fmt, "Fragment out of sequence: expected {expected}, found {found}")
            }
            Self::Sequence(SequenceError::NoMessage) => {
                write!(fmt, "Continuation fragment without start of message")
            }
            Self::Integrity { expected, found } => {
                write!(fmt, "MIC mismatch: expected {expected:#010x}, found {found:#010x}")
            }
            Self::Timeout => write!(fmt, "Timed out waiting for response"),
            Self::Communication(why) => write!(fmt, "Communication failure: {why}"),
            Self::InvalidArgument(why) => write!(fmt, "Invalid argument: {why}"),
        }
    }
}

impl From<DekuError> for Error {
    fn from(err: DekuError) -> Self {
        log::debug!("Codec operation failed: {err}");
        Self::Format(alloc::format!("{err}"))
    }
}

impl From<SequenceError> for Error {
    fn from(err: SequenceError) -> Self {
        Self::Sequence(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;
