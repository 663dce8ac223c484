// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use log::{debug, trace, warn};

use crate::mctp::fragment::{Reassembler, Reassembly};
use crate::mctp::{CONTROL_RQ, MSG_TYPE_CONTROL, MSG_TYPE_IC, MSG_TYPE_NVME_MI, split_msg_type};
use crate::nvme::mi::decode::{DecodedResponse, DecoderRegistry};
use crate::nvme::mi::{ConfigurationIdentifier, DataStructureType, Request};
use crate::smbus::{
    DEFAULT_SMBUS_ADDRESS, DEFAULT_SOURCE_EID, PACKET_OVERHEAD, PacketBuilder, PacketOptions,
    PacketParser,
};
use crate::transport::Transport;
use crate::{Error, Result};

const ISCSI: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI);

const MIC_LEN: usize = size_of::<u32>();

/// CRC-32C Message Integrity Check over the message type byte and body
pub fn message_integrity_check(msg_type: u8, body: &[u8]) -> u32 {
    let mut digest = ISCSI.digest();
    digest.update(&[msg_type]);
    digest.update(body);
    digest.finalize()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// SMBus address of the endpoint
    pub smbus_addr: u8,
    pub src_eid: u8,
    /// Append and expect a PEC on every packet
    pub auto_pec: bool,
    /// Protect NVMe-MI messages with a MIC
    pub integrity_check: bool,
    /// Largest packet to transmit, SMBus framing and PEC included
    pub max_tx_packet: usize,
    /// Largest response message to reassemble
    pub max_rx_message: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            smbus_addr: DEFAULT_SMBUS_ADDRESS,
            src_eid: DEFAULT_SOURCE_EID,
            auto_pec: true,
            integrity_check: false,
            max_tx_packet: 128,
            max_rx_message: 4096,
        }
    }
}

/// Issues NVMe-MI commands to endpoints reachable through a [`Transport`].
///
/// One command is in flight at a time. Errors from the transport are
/// returned as they are; nothing is retried.
#[derive(Debug)]
pub struct Client<T: Transport> {
    transport: T,
    builder: PacketBuilder,
    parser: PacketParser,
    reassembler: Reassembler,
    registry: DecoderRegistry,
    config: ClientConfig,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default())
    }

    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        let mut builder = PacketBuilder::new();
        builder.smbus_addr = config.smbus_addr;
        builder.src_eid = config.src_eid;
        builder.auto_pec = config.auto_pec;

        Self {
            transport,
            builder,
            parser: PacketParser::new(config.auto_pec),
            reassembler: Reassembler::with_limit(config.max_rx_message),
            registry: DecoderRegistry::with_defaults(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &DecoderRegistry {
        &self.registry
    }

    /// For installing decoders for vendor-specific commands
    pub fn registry_mut(&mut self) -> &mut DecoderRegistry {
        &mut self.registry
    }

    pub fn builder_mut(&mut self) -> &mut PacketBuilder {
        &mut self.builder
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Routes subsequent commands. A new address also becomes the SMBus
    /// destination written into each packet.
    pub fn set_target(&mut self, slot: Option<u8>, address: Option<u8>) -> Result<()> {
        self.transport.set_target(slot, address)?;
        if let Some(addr) = address {
            self.builder.smbus_addr = addr;
            self.config.smbus_addr = addr;
        }
        Ok(())
    }

    /// Sends `request` to `eid` and decodes the response
    pub fn execute(&mut self, eid: u8, request: &Request) -> Result<DecodedResponse> {
        debug!("Executing {request} on EID {eid}");

        let payload = self.exchange(
            eid,
            MSG_TYPE_NVME_MI,
            &request.pack()?,
            self.config.integrity_check,
        )?;
        let resp = self.registry.decode(request.decoder_key(), &payload)?;

        if !resp.success {
            debug!("{} failed with status {}", request.opcode(), resp.status);
        }
        if !resp.is_complete() {
            debug!("Partially decoded response: {:?}", resp.decode_errors);
        }
        Ok(resp)
    }

    /// Exchanges an MCTP control message. The returned bytes follow the
    /// message type: instance ID, command code, completion code, data.
    pub fn mctp_control(&mut self, eid: u8, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(2 + payload.len());
        body.extend_from_slice(&[CONTROL_RQ, command]);
        body.extend_from_slice(payload);
        self.exchange(eid, MSG_TYPE_CONTROL, &body, false)
    }

    pub fn health_status_poll(&mut self, eid: u8) -> Result<DecodedResponse> {
        self.execute(eid, &Request::health_status_poll())
    }

    pub fn controller_health_status(
        &mut self,
        eid: u8,
        controller_id: u16,
    ) -> Result<DecodedResponse> {
        self.execute(eid, &Request::controller_health_status(controller_id)?)
    }

    pub fn read_data_structure(
        &mut self,
        eid: u8,
        dtyp: DataStructureType,
        port_id: u8,
        controller_id: u8,
    ) -> Result<DecodedResponse> {
        self.execute(
            eid,
            &Request::read_data_structure(dtyp, port_id, controller_id)?,
        )
    }

    pub fn get_subsystem_info(&mut self, eid: u8) -> Result<DecodedResponse> {
        self.read_data_structure(eid, DataStructureType::NvmSubsystemInformation, 0, 0)
    }

    pub fn get_port_info(&mut self, eid: u8, port_id: u8) -> Result<DecodedResponse> {
        self.read_data_structure(eid, DataStructureType::PortInformation, port_id, 0)
    }

    pub fn get_controller_list(&mut self, eid: u8) -> Result<DecodedResponse> {
        self.read_data_structure(eid, DataStructureType::ControllerList, 0, 0)
    }

    pub fn get_controller_info(&mut self, eid: u8, controller_id: u8) -> Result<DecodedResponse> {
        self.read_data_structure(
            eid,
            DataStructureType::ControllerInformation,
            0,
            controller_id,
        )
    }

    pub fn get_supported_commands(&mut self, eid: u8) -> Result<DecodedResponse> {
        self.read_data_structure(eid, DataStructureType::OptionallySupportedCommandList, 0, 0)
    }

    pub fn configuration_get(
        &mut self,
        eid: u8,
        config_id: ConfigurationIdentifier,
        port_id: u8,
    ) -> Result<DecodedResponse> {
        self.execute(eid, &Request::configuration_get(config_id, port_id)?)
    }

    pub fn configuration_set(
        &mut self,
        eid: u8,
        config_id: ConfigurationIdentifier,
        port_id: u8,
        data: &[u8],
    ) -> Result<DecodedResponse> {
        self.execute(eid, &Request::configuration_set(config_id, port_id, data)?)
    }

    pub fn vpd_read(&mut self, eid: u8, offset: u16, length: u16) -> Result<DecodedResponse> {
        self.execute(eid, &Request::vpd_read(offset, length)?)
    }

    pub fn mi_reset(&mut self, eid: u8) -> Result<DecodedResponse> {
        self.execute(eid, &Request::reset())
    }

    pub fn vendor_specific(
        &mut self,
        eid: u8,
        opcode: u8,
        data: &[u8],
    ) -> Result<DecodedResponse> {
        let request = Request::vendor_specific(opcode, data)?;
        self.execute(eid, &request)
    }

    fn exchange(
        &mut self,
        eid: u8,
        msg_type: u8,
        payload: &[u8],
        integrity_check: bool,
    ) -> Result<Vec<u8>> {
        let mut msg_type = msg_type;
        let mut body = payload.to_vec();
        if integrity_check {
            msg_type |= MSG_TYPE_IC;
            let mic = message_integrity_check(msg_type, payload);
            body.extend_from_slice(&mic.to_le_bytes());
        }

        let max_body = match self.config.max_tx_packet.checked_sub(PACKET_OVERHEAD) {
            Some(n) if n > 0 => n,
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Transmit packet limit {} leaves no room for a body",
                    self.config.max_tx_packet
                )));
            }
        };

        let tag = self.builder.current_tag();
        let packets = self.builder.build_fragments(
            eid,
            msg_type,
            &body,
            max_body,
            &PacketOptions::default(),
        )?;
        let Some((last, init)) = packets.split_last() else {
            return Err(Error::Format("No packets to send".to_string()));
        };

        for packet in init {
            trace!("TX {packet:02x?}");
            self.transport.write_packet(packet)?;
        }
        trace!("TX {last:02x?}");
        let reply = self.transport.send_packet(last)?;

        let message = match self.receive(eid, tag, reply) {
            Ok(m) => m,
            Err(e) => {
                self.reassembler.clear();
                return Err(e);
            }
        };

        let (expected, _) = split_msg_type(msg_type);
        Self::unwrap_message(expected, message)
    }

    fn receive(&mut self, eid: u8, tag: u8, mut reply: Vec<u8>) -> Result<Vec<u8>> {
        loop {
            trace!("RX {reply:02x?}");
            let packet = self.parser.parse(&reply)?;

            let hdr = &packet.header;
            if hdr.msg_tag != tag {
                warn!("Response tag {} does not match request tag {tag}", hdr.msg_tag);
            }
            if hdr.src_eid != eid {
                debug!("Response from EID {} for request to EID {eid}", hdr.src_eid);
            }

            match self.reassembler.accept(packet.fragment())? {
                Reassembly::Complete(message) => return Ok(message),
                Reassembly::Incomplete => reply = self.transport.recv_packet()?,
            }
        }
    }

    // Checks the message type, verifies and strips any MIC
    fn unwrap_message(expected: u8, message: Vec<u8>) -> Result<Vec<u8>> {
        let Some((&msg_type, body)) = message.split_first() else {
            return Err(Error::Format("Empty response message".to_string()));
        };

        let (typ, ic) = split_msg_type(msg_type);
        if typ != expected {
            debug!("Expected message type {expected:#04x}, found {typ:#04x}");
            return Err(Error::Format(format!(
                "Unexpected message type {typ:#04x}"
            )));
        }

        if !ic {
            return Ok(body.to_vec());
        }

        let split = body.len().checked_sub(MIC_LEN);
        let Some((body, icv)) = split.and_then(|n| body.split_at_checked(n)) else {
            debug!("Message too short to extract integrity check");
            return Err(Error::Format(
                "Response too short for integrity check".to_string(),
            ));
        };

        let mut found = [0u8; MIC_LEN];
        found.copy_from_slice(icv);
        let found = u32::from_le_bytes(found);
        let expected = message_integrity_check(msg_type, body);
        if found != expected {
            debug!("checksum mismatch: {found:#010x}, {expected:#010x}");
            return Err(Error::Integrity { expected, found });
        }

        Ok(body.to_vec())
    }
}
