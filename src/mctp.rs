// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
pub mod fragment;

use alloc::format;
use log::trace;

use crate::{Error, Result};

/// SMBus command code carrying MCTP, DSP0237, 6.2
pub const MCTP_SMBUS_COMMAND_CODE: u8 = 0x0f;

/// MCTP transport header version emitted by [`Header::new`]
pub const MCTP_HEADER_VERSION: u8 = ::mctp::MCTP_HEADER_VERSION_1;

/// Integrity Check bit of the message type byte, DSP0236, 8.4
pub const MSG_TYPE_IC: u8 = 0x80;

/// MCTP message type for NVMe-MI, DSP0239
pub const MSG_TYPE_NVME_MI: u8 = ::mctp::MCTP_TYPE_NVME.0;

/// MCTP message type for the MCTP control protocol, DSP0239
pub const MSG_TYPE_CONTROL: u8 = ::mctp::MCTP_TYPE_CONTROL.0;

/// Request bit of the MCTP control message header, DSP0236, 11.5
pub const CONTROL_RQ: u8 = 0x80;

const SOM: u8 = 1 << 7;
const EOM: u8 = 1 << 6;
const SEQ_SHIFT: u8 = 4;
const TAG_OWNER: u8 = 1 << 3;

/// Splits a message type byte into its type and Integrity Check flag
pub fn split_msg_type(msg_type: u8) -> (u8, bool) {
    (msg_type & !MSG_TYPE_IC, msg_type & MSG_TYPE_IC != 0)
}

// DSP0236, 8.1, Figure 4
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Header {
    pub version: u8,
    pub dest_eid: u8,
    pub src_eid: u8,
    pub som: bool,
    pub eom: bool,
    pub pkt_seq: u8,
    pub tag_owner: bool,
    pub msg_tag: u8,
}

impl Header {
    pub const LEN: usize = 4;

    /// Creates a single-packet request header. Sequence and tag values are
    /// reduced modulo 4 and 8 respectively.
    pub fn new(dest_eid: u8, src_eid: u8, pkt_seq: u8, msg_tag: u8) -> Self {
        Self {
            version: MCTP_HEADER_VERSION,
            dest_eid,
            src_eid,
            som: true,
            eom: true,
            pkt_seq: pkt_seq & ::mctp::MCTP_SEQ_MASK,
            tag_owner: true,
            msg_tag: msg_tag & ::mctp::MCTP_TAG_MAX,
        }
    }

    pub fn flags(&self) -> u8 {
        (self.som as u8) << 7
            | (self.eom as u8) << 6
            | (self.pkt_seq & ::mctp::MCTP_SEQ_MASK) << SEQ_SHIFT
            | (self.tag_owner as u8) << 3
            | (self.msg_tag & ::mctp::MCTP_TAG_MAX)
    }

    pub fn pack(&self) -> [u8; Self::LEN] {
        [self.version, self.dest_eid, self.src_eid, self.flags()]
    }

    pub fn unpack(buf: &[u8]) -> Result<Self> {
        let Some(hdr) = buf.get(..Self::LEN) else {
            trace!("Short header: {buf:02x?}");
            return Err(Error::Format(format!(
                "MCTP header requires {} bytes, found {}",
                Self::LEN,
                buf.len()
            )));
        };

        Ok(Self {
            version: hdr[0],
            dest_eid: hdr[1],
            src_eid: hdr[2],
            som: hdr[3] & SOM != 0,
            eom: hdr[3] & EOM != 0,
            pkt_seq: (hdr[3] >> SEQ_SHIFT) & ::mctp::MCTP_SEQ_MASK,
            tag_owner: hdr[3] & TAG_OWNER != 0,
            msg_tag: hdr[3] & ::mctp::MCTP_TAG_MAX,
        })
    }
}
