// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */

//! Field tables for the standard NVMe-MI command responses
//!
//! Offsets are relative to the start of the response payload, where byte 0
//! is the status and bytes 1-3 the NVMe Management Response.

use alloc::string::String;
use num_traits::FromPrimitive;

use super::decode::{
    Count, DecodedResponse, DecoderKey, DecoderRegistry, FieldSpec, Interpretation,
    ResponseDecoder, TableDecoder,
};
use super::{ConfigurationIdentifier, DataStructureType, NvmeMiOpcode, SmbusFrequency};
use crate::Discriminant;
use crate::nvme::{ShutdownStatus, critical_warning_summary};

use Interpretation::{Bit, Flags, KelvinToCelsius, Label, List, Uint};

fn active_high_warnings(v: u64) -> String {
    critical_warning_summary(v as u8)
}

// SMART Warnings in the subsystem health data structure are active-low
fn active_low_warnings(v: u64) -> String {
    critical_warning_summary(!(v as u8))
}

// CSTS.SHST, bits 3:2
fn shutdown_status(csts: u64) -> &'static str {
    ShutdownStatus::from((csts >> 2) as u8).label()
}

fn smbus_frequency(v: u64) -> &'static str {
    match SmbusFrequency::from_u64(v & 0x0f) {
        Some(SmbusFrequency::FreqNotSupported) => "Not supported",
        Some(SmbusFrequency::Freq100Khz) => "100 kHz",
        Some(SmbusFrequency::Freq400Khz) => "400 kHz",
        Some(SmbusFrequency::Freq1Mhz) => "1 MHz",
        None => "Reserved",
    }
}

// MI v2.0, 5.7.2, Figure 111, PRTTYP
const PORT_TYPE_PCIE: u8 = 0x01;
const PORT_TYPE_TWO_WIRE: u8 = 0x02;

fn port_type(v: u64) -> &'static str {
    match v as u8 {
        0x00 => "Inactive",
        PORT_TYPE_PCIE => "PCIe",
        PORT_TYPE_TWO_WIRE => "Two-Wire",
        _ => "Reserved",
    }
}

// MI v2.0, Figure 111, PCIEMPS
fn pcie_payload_size(v: u64) -> &'static str {
    match v {
        0 => "128 bytes",
        1 => "256 bytes",
        2 => "512 bytes",
        3 => "1024 bytes",
        4 => "2048 bytes",
        5 => "4096 bytes",
        _ => "Reserved",
    }
}

// MI v2.0, Figure 111, PCIECLS
fn pcie_link_speed(v: u64) -> &'static str {
    match v {
        0 => "Link not active",
        1 => "2.5 GT/s",
        2 => "5 GT/s",
        3 => "8 GT/s",
        4 => "16 GT/s",
        5 => "32 GT/s",
        6 => "64 GT/s",
        _ => "Reserved",
    }
}

// MI v2.0, 5.6, Figure 108
static NVM_SUBSYSTEM_HEALTH: &[FieldSpec] = &[
    FieldSpec::new("NVM Subsystem Status", 4, 1, Uint),
    FieldSpec::new("Drive Functional", 4, 1, Bit(5)),
    FieldSpec::new("Reset Not Required", 4, 1, Bit(4)),
    FieldSpec::new("Port 0 PCIe Link Active", 4, 1, Bit(3)),
    FieldSpec::new("Port 1 PCIe Link Active", 4, 1, Bit(2)),
    FieldSpec::new("SMART Warnings", 5, 1, Uint),
    FieldSpec::new("Critical Warning", 5, 1, Flags(active_low_warnings)),
    FieldSpec::new("Composite Temperature", 6, 1, Interpretation::Int8).unit("°C"),
    FieldSpec::new("Drive Life Used", 7, 1, Uint).unit("%"),
    FieldSpec::new("Composite Controller Status", 8, 2, Uint),
    FieldSpec::new("Ready (RDY)", 8, 2, Bit(0)),
    FieldSpec::new("Controller Fatal Status (CFS)", 8, 2, Bit(1)),
];

// MI v2.0, 5.3, Figures 80 and 81
static CONTROLLER_HEALTH: &[FieldSpec] = &[
    FieldSpec::new("Response Entries", 3, 1, Uint),
    FieldSpec::new("Controller ID", 4, 2, Uint),
    FieldSpec::new("Controller Status", 6, 2, Uint),
    FieldSpec::new("Controller Ready", 6, 2, Bit(0)),
    FieldSpec::new("Controller Fatal Status", 6, 2, Bit(1)),
    FieldSpec::new("Shutdown Status", 6, 2, Label(shutdown_status)),
    FieldSpec::new("Composite Temperature", 8, 2, KelvinToCelsius).unit("°C"),
    FieldSpec::new("Percentage Used", 10, 1, Uint).unit("%"),
    FieldSpec::new("Available Spare", 11, 1, Uint).unit("%"),
    FieldSpec::new("Critical Warning", 12, 1, Flags(active_high_warnings)),
    FieldSpec::new("Controller Health Status Changed", 13, 2, Uint),
];

// MI v2.0, 5.7.1, Figure 110
static NVM_SUBSYSTEM_INFORMATION: &[FieldSpec] = &[
    FieldSpec::new("Response Data Length", 1, 2, Uint).unit("bytes"),
    FieldSpec::new("Number of Ports", 4, 1, Interpretation::ZeroBasedCount),
    FieldSpec::new("NVMe-MI Major Version", 5, 1, Uint),
    FieldSpec::new("NVMe-MI Minor Version", 6, 1, Uint),
    FieldSpec::new("NVMe-MI Version", 5, 2, Interpretation::Version),
    FieldSpec::new("NVM Subsystem Capabilities", 7, 1, Uint),
];

// MI v2.0, 5.7.2, Figure 111
static PORT_INFORMATION: &[FieldSpec] = &[
    FieldSpec::new("Port Type", 4, 1, Label(port_type)),
    FieldSpec::new("Port Capabilities", 5, 1, Uint),
    FieldSpec::new("Max MCTP Transmission Unit", 6, 2, Uint).unit("bytes"),
    FieldSpec::new("Management Endpoint Buffer Size", 8, 4, Uint).unit("bytes"),
];

static PCIE_PORT_DATA: &[FieldSpec] = &[
    FieldSpec::new("PCIe Max Payload Size", 12, 1, Label(pcie_payload_size)),
    FieldSpec::new("PCIe Supported Link Speeds", 13, 1, Uint),
    FieldSpec::new("PCIe Current Link Speed", 14, 1, Label(pcie_link_speed)),
    FieldSpec::new("PCIe Max Link Width", 15, 1, Uint).unit("lanes"),
    FieldSpec::new("PCIe Negotiated Link Width", 16, 1, Uint).unit("lanes"),
    FieldSpec::new("PCIe Port Number", 17, 1, Uint),
];

static TWO_WIRE_PORT_DATA: &[FieldSpec] = &[
    FieldSpec::new("Current VPD Address", 12, 1, Uint),
    FieldSpec::new("Max VPD Access Frequency", 13, 1, Label(smbus_frequency)),
    FieldSpec::new("Current ME Address", 14, 1, Uint),
    FieldSpec::new("Two-Wire Protocols Supported", 15, 1, Uint),
    FieldSpec::new("NVMe Basic Management", 16, 1, Bit(0)),
];

// MI v2.0, 5.7.3, Figure 112
static CONTROLLER_LIST: &[FieldSpec] = &[
    FieldSpec::new("Number of Identifiers", 4, 2, Uint),
    FieldSpec::new(
        "Controller IDs",
        6,
        0,
        List {
            width: 2,
            stride: 2,
            count: Count::At {
                offset: 4,
                width: 2,
            },
        },
    ),
];

// MI v2.0, 5.7.4, Figure 113
static CONTROLLER_INFORMATION: &[FieldSpec] = &[
    FieldSpec::new("Port ID", 4, 1, Uint),
    FieldSpec::new("PCIe Routing ID Valid", 9, 1, Bit(0)),
    FieldSpec::new("PCIe Routing ID", 10, 2, Uint),
    FieldSpec::new("PCI Vendor ID", 12, 2, Uint),
    FieldSpec::new("PCI Device ID", 14, 2, Uint),
    FieldSpec::new("PCI Subsystem Vendor ID", 16, 2, Uint),
    FieldSpec::new("PCI Subsystem Device ID", 18, 2, Uint),
    FieldSpec::new("PCIe Segment Number", 20, 1, Uint),
];

// MI v2.0, 5.7.5, Figure 114
static OPTIONALLY_SUPPORTED_COMMANDS: &[FieldSpec] = &[
    FieldSpec::new("Number of Commands", 4, 2, Uint),
    FieldSpec::new(
        "Command Types",
        6,
        0,
        List {
            width: 1,
            stride: 2,
            count: Count::At {
                offset: 4,
                width: 2,
            },
        },
    ),
    FieldSpec::new(
        "Supported Opcodes",
        7,
        0,
        List {
            width: 1,
            stride: 2,
            count: Count::At {
                offset: 4,
                width: 2,
            },
        },
    ),
];

// MI v2.0, 5.1.1, Figure 77
static SMBUS_FREQUENCY: &[FieldSpec] = &[FieldSpec::new(
    "SMBus/I2C Frequency",
    1,
    1,
    Label(smbus_frequency),
)];

// MI v2.0, 5.1.3, Figure 79
static MCTP_TRANSMISSION_UNIT: &[FieldSpec] =
    &[FieldSpec::new("MCTP Transmission Unit Size", 1, 2, Uint).unit("bytes")];

// MI v2.0, 5.9, Figure 122
static VPD_READ: &[FieldSpec] = &[FieldSpec::new(
    "VPD Data",
    4,
    0,
    List {
        width: 1,
        stride: 1,
        count: Count::Remaining,
    },
)];

/// Port Information: common fields, then the port-type specific block
#[derive(Clone, Copy, Debug, Default)]
pub struct PortInformationDecoder;

impl ResponseDecoder for PortInformationDecoder {
    fn decode(&self, status_code: u8, payload: &[u8]) -> DecodedResponse {
        let mut resp = DecodedResponse::new(status_code, payload);
        if !resp.success {
            return resp;
        }

        resp.decode_fields(PORT_INFORMATION, payload);
        match payload.get(4) {
            Some(&PORT_TYPE_PCIE) => resp.decode_fields(PCIE_PORT_DATA, payload),
            Some(&PORT_TYPE_TWO_WIRE) => resp.decode_fields(TWO_WIRE_PORT_DATA, payload),
            _ => (),
        }
        resp
    }
}

fn data_structure(dtyp: DataStructureType) -> DecoderKey {
    DecoderKey::new(NvmeMiOpcode::ReadNvmeMiDataStructure.id(), Some(dtyp.id()))
}

fn configuration(cid: ConfigurationIdentifier) -> DecoderKey {
    DecoderKey::new(NvmeMiOpcode::ConfigurationGet.id(), Some(cid.id()))
}

pub(super) fn register_defaults(reg: &mut DecoderRegistry) {
    reg.register(
        DecoderKey::opcode(NvmeMiOpcode::NvmSubsystemHealthStatusPoll.id()),
        TableDecoder::new(NVM_SUBSYSTEM_HEALTH),
    );
    reg.register(
        DecoderKey::opcode(NvmeMiOpcode::ControllerHealthStatusPoll.id()),
        TableDecoder::new(CONTROLLER_HEALTH),
    );
    reg.register(
        data_structure(DataStructureType::NvmSubsystemInformation),
        TableDecoder::new(NVM_SUBSYSTEM_INFORMATION),
    );
    reg.register(
        data_structure(DataStructureType::PortInformation),
        PortInformationDecoder,
    );
    reg.register(
        data_structure(DataStructureType::ControllerList),
        TableDecoder::new(CONTROLLER_LIST),
    );
    reg.register(
        data_structure(DataStructureType::ControllerInformation),
        TableDecoder::new(CONTROLLER_INFORMATION),
    );
    reg.register(
        data_structure(DataStructureType::OptionallySupportedCommandList),
        TableDecoder::new(OPTIONALLY_SUPPORTED_COMMANDS),
    );
    reg.register(
        configuration(ConfigurationIdentifier::SmbusI2cFrequency),
        TableDecoder::new(SMBUS_FREQUENCY),
    );
    reg.register(
        configuration(ConfigurationIdentifier::HealthStatusChange),
        TableDecoder::new(&[]),
    );
    reg.register(
        configuration(ConfigurationIdentifier::MctpTransmissionUnitSize),
        TableDecoder::new(MCTP_TRANSMISSION_UNIT),
    );
    reg.register(
        DecoderKey::opcode(NvmeMiOpcode::VpdRead.id()),
        TableDecoder::new(VPD_READ),
    );
}

#[cfg(test)]
mod test {
    use super::{active_low_warnings, pcie_link_speed, port_type, smbus_frequency};

    #[test]
    fn labels() {
        assert_eq!(port_type(1), "PCIe");
        assert_eq!(port_type(9), "Reserved");
        assert_eq!(pcie_link_speed(4), "16 GT/s");
        assert_eq!(smbus_frequency(0x02), "400 kHz");
        assert_eq!(smbus_frequency(0x0e), "Reserved");
    }

    #[test]
    fn smart_warnings_active_low() {
        assert_eq!(active_low_warnings(0xff), "None");
        assert_eq!(active_low_warnings(0xfd), "Temperature Exceeded");
    }
}
