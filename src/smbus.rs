// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */

//! MCTP over SMBus/I2C framing, DSP0237

use alloc::format;
use alloc::vec::Vec;
use log::{debug, trace};

use crate::mctp::fragment;
use crate::mctp::{
    CONTROL_RQ, Header, MCTP_SMBUS_COMMAND_CODE, MSG_TYPE_CONTROL, MSG_TYPE_IC, MSG_TYPE_NVME_MI,
};
use crate::{Error, Result};

const SMBUS_PEC: crc::Crc<u8> = crc::Crc::<u8>::new(&crc::CRC_8_SMBUS);

/// Default target address for NVMe-MI endpoints
pub const DEFAULT_SMBUS_ADDRESS: u8 = 0x3a;
/// Default source EID for the host
pub const DEFAULT_SOURCE_EID: u8 = 0x00;

/// Address, command code and byte count
pub const SMBUS_HEADER_LEN: usize = 3;
pub const PEC_LEN: usize = 1;
/// Message type byte leading the first packet body of a message
pub const MSG_TYPE_LEN: usize = 1;
/// Bytes of framing around a packet body when a PEC is appended
pub const PACKET_OVERHEAD: usize = SMBUS_HEADER_LEN + Header::LEN + PEC_LEN;
/// Smallest parseable packet: SMBus header, MCTP header and message type
pub const MIN_PACKET_LEN: usize = SMBUS_HEADER_LEN + Header::LEN + MSG_TYPE_LEN;

const MAX_BODY_LEN: usize = u8::MAX as usize - Header::LEN;

/// CRC-8 Packet Error Code over `data`
pub fn calculate_pec(data: &[u8]) -> u8 {
    SMBUS_PEC.checksum(data)
}

/// Per-packet overrides for [`PacketBuilder::build_raw`]
///
/// Fields left as `None` fall back to the builder's defaults.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketOptions {
    pub src_eid: Option<u8>,
    pub som: bool,
    pub eom: bool,
    pub pkt_seq: u8,
    pub msg_tag: Option<u8>,
    pub tag_owner: bool,
    pub smbus_addr: Option<u8>,
    pub include_pec: Option<bool>,
}

impl Default for PacketOptions {
    fn default() -> Self {
        Self {
            src_eid: None,
            som: true,
            eom: true,
            pkt_seq: 0,
            msg_tag: None,
            tag_owner: true,
            smbus_addr: None,
            include_pec: None,
        }
    }
}

/// Builds MCTP-over-SMBus packets.
///
/// The builder owns the message tag counter. Each build without an explicit
/// tag consumes the current value and advances it modulo 8, so concurrent
/// users of one builder need to serialise access themselves.
#[derive(Clone, Debug)]
pub struct PacketBuilder {
    pub smbus_addr: u8,
    pub src_eid: u8,
    pub auto_pec: bool,
    msg_tag: u8,
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketBuilder {
    pub fn new() -> Self {
        Self {
            smbus_addr: DEFAULT_SMBUS_ADDRESS,
            src_eid: DEFAULT_SOURCE_EID,
            auto_pec: true,
            msg_tag: 0,
        }
    }

    /// The tag the next untagged build will use
    pub fn current_tag(&self) -> u8 {
        self.msg_tag
    }

    pub fn set_tag(&mut self, tag: u8) {
        self.msg_tag = tag & ::mctp::MCTP_TAG_MAX;
    }

    pub fn reset_tag(&mut self) {
        self.msg_tag = 0;
    }

    fn take_tag(&mut self, requested: Option<u8>) -> u8 {
        requested.unwrap_or_else(|| {
            let tag = self.msg_tag;
            self.msg_tag = (self.msg_tag + 1) & ::mctp::MCTP_TAG_MAX;
            tag
        })
    }

    fn frame(&self, header: &Header, body: &[&[u8]], opts: &PacketOptions) -> Result<Vec<u8>> {
        let body_len: usize = body.iter().map(|b| b.len()).sum();
        if body_len > MAX_BODY_LEN {
            return Err(Error::InvalidArgument(format!(
                "Packet body of {body_len} bytes exceeds SMBus byte count"
            )));
        }

        let mut packet = Vec::with_capacity(PACKET_OVERHEAD + body_len);
        packet.push(opts.smbus_addr.unwrap_or(self.smbus_addr));
        packet.push(MCTP_SMBUS_COMMAND_CODE);
        packet.push((Header::LEN + body_len) as u8);
        packet.extend_from_slice(&header.pack());
        for b in body {
            packet.extend_from_slice(b);
        }

        if opts.include_pec.unwrap_or(self.auto_pec) {
            packet.push(calculate_pec(&packet));
        }

        trace!("Built packet: {packet:02x?}");
        Ok(packet)
    }

    fn header(&mut self, dest_eid: u8, opts: &PacketOptions) -> Header {
        let msg_tag = self.take_tag(opts.msg_tag);
        let mut header = Header::new(
            dest_eid,
            opts.src_eid.unwrap_or(self.src_eid),
            opts.pkt_seq,
            msg_tag,
        );
        header.som = opts.som;
        header.eom = opts.eom;
        header.tag_owner = opts.tag_owner;
        header
    }

    /// Frames one packet: `[addr][0x0f][count][header][msg_type][payload][pec?]`
    pub fn build_raw(
        &mut self,
        dest_eid: u8,
        msg_type: u8,
        payload: &[u8],
        opts: &PacketOptions,
    ) -> Result<Vec<u8>> {
        let header = self.header(dest_eid, opts);
        self.frame(&header, &[&[msg_type], payload], opts)
    }

    pub fn build_nvme_mi_request(
        &mut self,
        dest_eid: u8,
        payload: &[u8],
        integrity_check: bool,
        opts: &PacketOptions,
    ) -> Result<Vec<u8>> {
        let mut msg_type = MSG_TYPE_NVME_MI;
        if integrity_check {
            msg_type |= MSG_TYPE_IC;
        }
        self.build_raw(dest_eid, msg_type, payload, opts)
    }

    pub fn build_mctp_control(
        &mut self,
        dest_eid: u8,
        command: u8,
        payload: &[u8],
        opts: &PacketOptions,
    ) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(2 + payload.len());
        body.push(CONTROL_RQ);
        body.push(command);
        body.extend_from_slice(payload);
        self.build_raw(dest_eid, MSG_TYPE_CONTROL, &body, opts)
    }

    /// Frames a message that may exceed one packet.
    ///
    /// The message body (`msg_type` followed by `payload`) is split into
    /// chunks of at most `max_body` bytes. All packets share one tag; the
    /// SOM, EOM and sequence fields of `opts` are ignored.
    pub fn build_fragments(
        &mut self,
        dest_eid: u8,
        msg_type: u8,
        payload: &[u8],
        max_body: usize,
        opts: &PacketOptions,
    ) -> Result<Vec<Vec<u8>>> {
        let mut message = Vec::with_capacity(1 + payload.len());
        message.push(msg_type);
        message.extend_from_slice(payload);

        let chunks = fragment::split(&message, max_body.min(MAX_BODY_LEN))?;
        let tag = self.take_tag(opts.msg_tag);

        chunks
            .iter()
            .map(|c| {
                let o = PacketOptions {
                    som: c.som,
                    eom: c.eom,
                    pkt_seq: c.pkt_seq,
                    msg_tag: Some(tag),
                    ..*opts
                };
                let header = self.header(dest_eid, &o);
                self.frame(&header, &[c.data], &o)
            })
            .collect()
    }
}

/// A parsed MCTP-over-SMBus packet
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Packet {
    pub smbus_addr: u8,
    pub command_code: u8,
    pub byte_count: u8,
    pub header: Header,
    pub msg_type: u8,
    pub payload: Vec<u8>,
    pub pec: Option<u8>,
}

impl Packet {
    /// The MCTP packet payload: message type byte followed by the payload.
    ///
    /// For continuation packets of a fragmented message the "message type"
    /// is simply the first byte of the fragment.
    pub fn body(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(1 + self.payload.len());
        body.push(self.msg_type);
        body.extend_from_slice(&self.payload);
        body
    }

    pub fn fragment(&self) -> fragment::Fragment {
        fragment::Fragment::new(&self.header, &self.body())
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(PACKET_OVERHEAD + self.payload.len());
        packet.extend_from_slice(&[self.smbus_addr, self.command_code, self.byte_count]);
        packet.extend_from_slice(&self.header.pack());
        packet.push(self.msg_type);
        packet.extend_from_slice(&self.payload);
        if let Some(pec) = self.pec {
            packet.push(pec);
        }
        packet
    }
}

/// Parses and validates MCTP-over-SMBus packets
#[derive(Clone, Copy, Debug)]
pub struct PacketParser {
    pub expect_pec: bool,
}

impl Default for PacketParser {
    fn default() -> Self {
        Self { expect_pec: true }
    }
}

impl PacketParser {
    pub fn new(expect_pec: bool) -> Self {
        Self { expect_pec }
    }

    pub fn parse(&self, data: &[u8]) -> Result<Packet> {
        if data.len() < MIN_PACKET_LEN {
            debug!("Packet too short: {data:02x?}");
            return Err(Error::Format(format!(
                "Packet requires at least {MIN_PACKET_LEN} bytes, found {}",
                data.len()
            )));
        }

        let byte_count = data[2];
        let count = byte_count as usize;
        if count < Header::LEN + MSG_TYPE_LEN {
            debug!("Byte count {byte_count} too small for MCTP header and message type");
            return Err(Error::Format(format!("Invalid byte count {byte_count}")));
        }

        let end = SMBUS_HEADER_LEN + count;
        let required = end + if self.expect_pec { PEC_LEN } else { 0 };
        if data.len() < required {
            debug!("Truncated packet: {data:02x?}");
            return Err(Error::Format(format!(
                "Byte count {byte_count} requires {required} bytes, found {}",
                data.len()
            )));
        }
        if data.len() > required {
            trace!("Ignoring {} trailing bytes", data.len() - required);
        }

        let pec = if self.expect_pec {
            let found = data[end];
            let expected = calculate_pec(&data[..end]);
            if found != expected {
                debug!("PEC mismatch: expected {expected:#04x}, found {found:#04x}");
                return Err(Error::Pec { expected, found });
            }
            Some(found)
        } else {
            None
        };

        let command_code = data[1];
        if command_code != MCTP_SMBUS_COMMAND_CODE {
            debug!("Unexpected SMBus command code {command_code:#04x}");
            return Err(Error::Format(format!(
                "Unexpected command code {command_code:#04x}"
            )));
        }

        let hdr_start = SMBUS_HEADER_LEN;
        let header = Header::unpack(&data[hdr_start..hdr_start + Header::LEN])?;
        let msg_type = data[hdr_start + Header::LEN];
        let payload = data[hdr_start + Header::LEN + MSG_TYPE_LEN..end].to_vec();

        Ok(Packet {
            smbus_addr: data[0],
            command_code,
            byte_count,
            header,
            msg_type,
            payload,
            pec,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{
        MIN_PACKET_LEN, MSG_TYPE_LEN, PACKET_OVERHEAD, PacketBuilder, PacketOptions, PacketParser,
        calculate_pec,
    };

    #[test]
    fn pec_check_value() {
        // CRC-8/SMBUS catalogue check value
        assert_eq!(calculate_pec(b"123456789"), 0xf4);
    }

    #[test]
    fn pec_empty() {
        assert_eq!(calculate_pec(&[]), 0x00);
    }

    #[test]
    fn framing_lengths() {
        let mut builder = PacketBuilder::new();
        let packet = builder
            .build_raw(0x01, 0x04, &[], &PacketOptions::default())
            .unwrap();
        assert_eq!(packet.len(), PACKET_OVERHEAD + MSG_TYPE_LEN);

        let unchecked = &packet[..packet.len() - 1];
        assert_eq!(unchecked.len(), MIN_PACKET_LEN);
        PacketParser::new(false).parse(unchecked).unwrap();
        PacketParser::new(false)
            .parse(&unchecked[..MIN_PACKET_LEN - 1])
            .unwrap_err();
    }

    #[test]
    fn pec_deterministic() {
        let data = [0x3a, 0x0f, 0x09, 0x01, 0x01, 0x00, 0xc8, 0x04];
        assert_eq!(calculate_pec(&data), calculate_pec(&data));
    }
}
