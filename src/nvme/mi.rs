// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
pub mod decode;
pub mod decoders;

use alloc::format;
use alloc::vec::Vec;
use core::ops::RangeInclusive;
use deku::{DekuContainerRead, DekuRead, DekuWrite};
use log::debug;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{Discriminant, Encode, Error, Result};

use decode::DecoderKey;

/// Opcodes reserved for vendor-specific commands, MI v2.0, Figure 68
pub const VENDOR_SPECIFIC_OPCODES: RangeInclusive<u8> = 0xc0..=0xff;

/// Status values reserved for vendor-specific use, MI v2.0, Figure 29
pub const VENDOR_SPECIFIC_STATUS: RangeInclusive<u8> = 0xe0..=0xff;

// MI v2.0, 5, Figure 68
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum NvmeMiOpcode {
    ReadNvmeMiDataStructure = 0x00,
    NvmSubsystemHealthStatusPoll = 0x01,
    ControllerHealthStatusPoll = 0x02,
    ConfigurationSet = 0x03,
    ConfigurationGet = 0x04,
    VpdRead = 0x05,
    VpdWrite = 0x06,
    Reset = 0x07,
    SesReceive = 0x08,
    SesSend = 0x09,
    ManagementEndpointBufferRead = 0x0a,
    ManagementEndpointBufferWrite = 0x0b,
    Shutdown = 0x0c,
}
unsafe impl Discriminant<u8> for NvmeMiOpcode {}

impl NvmeMiOpcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadNvmeMiDataStructure => "Read NVMe-MI Data Structure",
            Self::NvmSubsystemHealthStatusPoll => "NVM Subsystem Health Status Poll",
            Self::ControllerHealthStatusPoll => "Controller Health Status Poll",
            Self::ConfigurationSet => "Configuration Set",
            Self::ConfigurationGet => "Configuration Get",
            Self::VpdRead => "VPD Read",
            Self::VpdWrite => "VPD Write",
            Self::Reset => "Reset",
            Self::SesReceive => "SES Receive",
            Self::SesSend => "SES Send",
            Self::ManagementEndpointBufferRead => "Management Endpoint Buffer Read",
            Self::ManagementEndpointBufferWrite => "Management Endpoint Buffer Write",
            Self::Shutdown => "Shutdown",
        }
    }
}

/// An opcode byte resolved against the standard and vendor ranges
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    Standard(NvmeMiOpcode),
    VendorSpecific(u8),
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        if let Some(op) = NvmeMiOpcode::from_u8(value) {
            Self::Standard(op)
        } else if VENDOR_SPECIFIC_OPCODES.contains(&value) {
            Self::VendorSpecific(value)
        } else {
            Self::Reserved(value)
        }
    }
}

impl From<NvmeMiOpcode> for Opcode {
    fn from(value: NvmeMiOpcode) -> Self {
        Self::Standard(value)
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard(op) => op.id(),
            Opcode::VendorSpecific(v) | Opcode::Reserved(v) => v,
        }
    }
}

impl core::fmt::Display for Opcode {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Standard(op) => write!(fmt, "{}", op.name()),
            Self::VendorSpecific(v) => write!(fmt, "Vendor Specific ({v:#04x})"),
            Self::Reserved(v) => write!(fmt, "Reserved ({v:#04x})"),
        }
    }
}

// MI v2.0, 4.1.2, Figure 29
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum ResponseStatus {
    Success = 0x00,
    MoreProcessingRequired = 0x01,
    InternalError = 0x02,
    InvalidCommandOpcode = 0x03,
    InvalidParameter = 0x04,
    InvalidCommandSize = 0x05,
    InvalidCommandInputDataSize = 0x06,
    AccessDenied = 0x07,
    VpdUpdatesExceeded = 0x20,
    PcieInaccessible = 0x21,
    ManagementEndpointBufferCleared = 0x22,
    EnclosureServicesFailure = 0x23,
    EnclosureServicesTransferFailure = 0x24,
    EnclosureFailure = 0x25,
    EnclosureServicesTransferRefused = 0x26,
    UnsupportedEnclosureFunction = 0x27,
    EnclosureServicesUnavailable = 0x28,
    EnclosureDegraded = 0x29,
    SanitizeInProgress = 0x2a,
}
unsafe impl Discriminant<u8> for ResponseStatus {}

impl ResponseStatus {
    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::MoreProcessingRequired => "More Processing Required",
            Self::InternalError => "Internal Error",
            Self::InvalidCommandOpcode => "Invalid Command Opcode",
            Self::InvalidParameter => "Invalid Parameter",
            Self::InvalidCommandSize => "Invalid Command Size",
            Self::InvalidCommandInputDataSize => "Invalid Command Input Data Size",
            Self::AccessDenied => "Access Denied",
            Self::VpdUpdatesExceeded => "VPD Updates Exceeded",
            Self::PcieInaccessible => "PCIe Inaccessible",
            Self::ManagementEndpointBufferCleared => "Management Endpoint Buffer Cleared",
            Self::EnclosureServicesFailure => "Enclosure Services Failure",
            Self::EnclosureServicesTransferFailure => "Enclosure Services Transfer Failure",
            Self::EnclosureFailure => "Enclosure Failure",
            Self::EnclosureServicesTransferRefused => "Enclosure Services Transfer Refused",
            Self::UnsupportedEnclosureFunction => "Unsupported Enclosure Function",
            Self::EnclosureServicesUnavailable => "Enclosure Services Unavailable",
            Self::EnclosureDegraded => "Enclosure Degraded",
            Self::SanitizeInProgress => "Sanitize In Progress",
        }
    }
}

/// A response status byte resolved against the defined and vendor ranges
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Defined(ResponseStatus),
    VendorSpecific(u8),
    Reserved(u8),
}

impl Status {
    pub fn is_success(&self) -> bool {
        *self == Self::Defined(ResponseStatus::Success)
    }
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        if let Some(status) = ResponseStatus::from_u8(value) {
            Self::Defined(status)
        } else if VENDOR_SPECIFIC_STATUS.contains(&value) {
            Self::VendorSpecific(value)
        } else {
            Self::Reserved(value)
        }
    }
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::Defined(s) => s.id(),
            Status::VendorSpecific(v) | Status::Reserved(v) => v,
        }
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Defined(s) => write!(fmt, "{}", s.name()),
            Self::VendorSpecific(v) => write!(fmt, "Vendor Specific ({v:#04x})"),
            Self::Reserved(v) => write!(fmt, "Reserved ({v:#04x})"),
        }
    }
}

// MI v2.0, 5.7, Figure 109, DTYP
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum DataStructureType {
    NvmSubsystemInformation = 0x00,
    PortInformation = 0x01,
    ControllerList = 0x02,
    ControllerInformation = 0x03,
    OptionallySupportedCommandList = 0x04,
    ManagementEndpointBufferCommandSupportList = 0x05,
}
unsafe impl Discriminant<u8> for DataStructureType {}

// MI v2.0, 5, Figure 75
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
#[repr(u8)]
pub enum ConfigurationIdentifier {
    SmbusI2cFrequency = 0x01,
    HealthStatusChange = 0x02,
    MctpTransmissionUnitSize = 0x03,
}
unsafe impl Discriminant<u8> for ConfigurationIdentifier {}

// MI v2.0, Figure 116, MVPDFREQ
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum SmbusFrequency {
    FreqNotSupported = 0x00,
    Freq100Khz = 0x01,
    Freq400Khz = 0x02,
    Freq1Mhz = 0x03,
}
unsafe impl Discriminant<u8> for SmbusFrequency {}

// MI v2.0, 5, Figure 67
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct NvmeMiCommandRequestHeader {
    #[deku(pad_bytes_after = "3")]
    opcode: u8,
}
impl Encode<4> for NvmeMiCommandRequestHeader {}

// MI v2.0, 5.3, Figure 79
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct ControllerHealthStatusPollRequest {
    #[deku(pad_bytes_after = "2")]
    ctlid: u16,
}
impl Encode<4> for ControllerHealthStatusPollRequest {}

// MI v2.0, 5.7, Figure 109
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct ReadNvmeMiDataStructureRequest {
    dtyp: u8,
    #[deku(pad_bytes_after = "2")]
    id: u8,
}
impl Encode<4> for ReadNvmeMiDataStructureRequest {}

// MI v2.0, 5.1, Figure 74 and 5.2, Figure 84
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct ConfigurationRequest {
    cid: u8,
    #[deku(pad_bytes_after = "2")]
    portid: u8,
}
impl Encode<4> for ConfigurationRequest {}

// MI v2.0, 5.9, Figure 124
#[derive(Debug, DekuRead, DekuWrite)]
#[deku(endian = "little")]
struct VpdReadRequest {
    dofst: u16,
    dlen: u16,
}
impl Encode<4> for VpdReadRequest {}

/// An NVMe-MI command request: opcode plus command-specific data
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub opcode: u8,
    pub data: Vec<u8>,
}

impl Request {
    pub fn new(opcode: impl Into<u8>, data: Vec<u8>) -> Self {
        Self {
            opcode: opcode.into(),
            data,
        }
    }

    fn standard<const S: usize>(opcode: NvmeMiOpcode, body: &impl Encode<S>) -> Result<Self> {
        let (buf, len) = body.encode()?;
        Ok(Self::new(opcode.id(), buf[..len].to_vec()))
    }

    /// Recovers a request from its packed form
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let ((rest, _), hdr) = NvmeMiCommandRequestHeader::from_bytes((bytes, 0))?;
        Ok(Self {
            opcode: hdr.opcode,
            data: rest.to_vec(),
        })
    }

    /// `[opcode, 0, 0, 0]` followed by the request data
    pub fn pack(&self) -> Result<Vec<u8>> {
        let (hdr, len) = NvmeMiCommandRequestHeader {
            opcode: self.opcode,
        }
        .encode()?;
        let mut buf = Vec::with_capacity(len + self.data.len());
        buf.extend_from_slice(&hdr[..len]);
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode.into()
    }

    /// Key used to select a response decoder. Commands whose response shape
    /// depends on the first data byte (data structure type, configuration
    /// identifier) include it as the selector.
    pub fn decoder_key(&self) -> DecoderKey {
        let selector = match self.opcode() {
            Opcode::Standard(
                NvmeMiOpcode::ReadNvmeMiDataStructure
                | NvmeMiOpcode::ConfigurationGet
                | NvmeMiOpcode::ConfigurationSet,
            ) => self.data.first().copied(),
            _ => None,
        };
        DecoderKey::new(self.opcode, selector)
    }

    // MI v2.0, 5.6
    pub fn health_status_poll() -> Self {
        Self::new(NvmeMiOpcode::NvmSubsystemHealthStatusPoll, Vec::new())
    }

    // MI v2.0, 5.3
    pub fn controller_health_status(controller_id: u16) -> Result<Self> {
        Self::standard(
            NvmeMiOpcode::ControllerHealthStatusPoll,
            &ControllerHealthStatusPollRequest {
                ctlid: controller_id,
            },
        )
    }

    // MI v2.0, 5.7
    pub fn read_data_structure(
        dtyp: impl Into<u8>,
        port_id: u8,
        controller_id: u8,
    ) -> Result<Self> {
        let dtyp = dtyp.into();
        let id = match DataStructureType::from_u8(dtyp) {
            Some(DataStructureType::PortInformation) => port_id,
            Some(DataStructureType::ControllerInformation) => controller_id,
            _ => 0,
        };
        Self::standard(
            NvmeMiOpcode::ReadNvmeMiDataStructure,
            &ReadNvmeMiDataStructureRequest { dtyp, id },
        )
    }

    // MI v2.0, 5.1
    pub fn configuration_get(config_id: impl Into<u8>, port_id: u8) -> Result<Self> {
        Self::standard(
            NvmeMiOpcode::ConfigurationGet,
            &ConfigurationRequest {
                cid: config_id.into(),
                portid: port_id,
            },
        )
    }

    // MI v2.0, 5.2
    pub fn configuration_set(
        config_id: impl Into<u8>,
        port_id: u8,
        config_data: &[u8],
    ) -> Result<Self> {
        let mut req = Self::standard(
            NvmeMiOpcode::ConfigurationSet,
            &ConfigurationRequest {
                cid: config_id.into(),
                portid: port_id,
            },
        )?;
        req.data.extend_from_slice(config_data);
        Ok(req)
    }

    // MI v2.0, 5.9
    pub fn vpd_read(offset: u16, length: u16) -> Result<Self> {
        Self::standard(
            NvmeMiOpcode::VpdRead,
            &VpdReadRequest {
                dofst: offset,
                dlen: length,
            },
        )
    }

    // MI v2.0, 5.8
    pub fn reset() -> Self {
        Self::new(NvmeMiOpcode::Reset, Vec::new())
    }

    pub fn vendor_specific(opcode: u8, data: &[u8]) -> Result<Self> {
        if !VENDOR_SPECIFIC_OPCODES.contains(&opcode) {
            debug!("Rejecting vendor-specific request with opcode {opcode:#04x}");
            return Err(Error::InvalidArgument(format!(
                "Vendor opcode must be 0xc0-0xff, got {opcode:#04x}"
            )));
        }
        Ok(Self::new(opcode, data.to_vec()))
    }
}

impl From<DataStructureType> for u8 {
    fn from(value: DataStructureType) -> Self {
        value.id()
    }
}

impl From<ConfigurationIdentifier> for u8 {
    fn from(value: ConfigurationIdentifier) -> Self {
        value.id()
    }
}

impl From<NvmeMiOpcode> for u8 {
    fn from(value: NvmeMiOpcode) -> Self {
        value.id()
    }
}

impl core::fmt::Display for Request {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(fmt, "{} {:02x?}", self.opcode(), self.data)
    }
}
