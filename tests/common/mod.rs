// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
#![allow(dead_code)]

extern crate simplelog;

use std::collections::VecDeque;

use log::LevelFilter;
use nvme_mi_host::smbus::{PacketBuilder, PacketOptions};
use nvme_mi_host::{Error, Result, Transport};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

pub const HOST_SMBUS_ADDRESS: u8 = 0x20;
pub const ENDPOINT_EID: u8 = 0x01;

pub fn setup() {
    let _ = TermLogger::init(
        LevelFilter::Debug,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

/// Frames a response message the way an endpoint would: tag owner clear,
/// addressed back to the host
pub fn response_packets(msg_tag: u8, msg_type: u8, payload: &[u8], max_body: usize) -> Vec<Vec<u8>> {
    let mut builder = PacketBuilder::new();
    builder.smbus_addr = HOST_SMBUS_ADDRESS;
    let opts = PacketOptions {
        src_eid: Some(ENDPOINT_EID),
        msg_tag: Some(msg_tag),
        tag_owner: false,
        ..Default::default()
    };
    builder
        .build_fragments(0x00, msg_type, payload, max_body, &opts)
        .unwrap()
}

/// Replays scripted response packets and records what the client sends.
///
/// `send_packet` and `recv_packet` both take the next scripted reply.
/// Packets queued with [`ScriptedTransport::expect`] must be sent in order.
pub struct ScriptedTransport {
    expected: VecDeque<Vec<u8>>,
    replies: VecDeque<Result<Vec<u8>>>,
    pub sent: Vec<Vec<u8>>,
    pub targets: Vec<(Option<u8>, Option<u8>)>,
    pub continuation: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            expected: VecDeque::new(),
            replies: VecDeque::new(),
            sent: Vec::new(),
            targets: Vec::new(),
            continuation: true,
        }
    }

    pub fn expect(&mut self, packet: &[u8]) -> &mut Self {
        self.expected.push_back(packet.to_vec());
        self
    }

    pub fn reply(&mut self, packet: &[u8]) -> &mut Self {
        self.replies.push_back(Ok(packet.to_vec()));
        self
    }

    pub fn reply_all(&mut self, packets: &[Vec<u8>]) -> &mut Self {
        for p in packets {
            self.reply(p);
        }
        self
    }

    pub fn fail(&mut self, err: Error) -> &mut Self {
        self.replies.push_back(Err(err));
        self
    }

    fn record(&mut self, packet: &[u8]) {
        if let Some(expected) = self.expected.pop_front() {
            assert_eq!(
                expected, packet,
                "Expected: {expected:02x?}, found: {packet:02x?}"
            );
        }
        self.sent.push(packet.to_vec());
    }

    fn next_reply(&mut self) -> Result<Vec<u8>> {
        self.replies.pop_front().unwrap_or(Err(Error::Timeout))
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        assert!(
            self.expected.is_empty(),
            "Packets never sent - expected {:02x?}",
            self.expected
        );
    }
}

impl Transport for ScriptedTransport {
    fn send_packet(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        self.record(packet);
        self.next_reply()
    }

    fn set_target(&mut self, slot: Option<u8>, address: Option<u8>) -> Result<()> {
        self.targets.push((slot, address));
        Ok(())
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.record(packet);
        Ok(())
    }

    fn recv_packet(&mut self) -> Result<Vec<u8>> {
        if !self.continuation {
            return Err(Error::Communication("No continuation support".into()));
        }
        self.next_reply()
    }
}
