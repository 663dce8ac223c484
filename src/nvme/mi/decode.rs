// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */

//! Tolerant decoding of NVMe-MI response payloads into named fields

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use deku::{DekuError, deku_error};
use log::debug;

use super::Status;
use crate::nvme::kelvin_to_celsius;
use crate::wire::{read_le, read_le_list, read_string};
use crate::{Error, Result};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Str(String),
    Bool(bool),
    List(Vec<u64>),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[u64]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }
}

impl core::fmt::Display for FieldValue {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::Int(v) => write!(fmt, "{v}"),
            Self::Str(s) => write!(fmt, "{s}"),
            Self::Bool(b) => write!(fmt, "{}", if *b { "Yes" } else { "No" }),
            Self::List(l) => {
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{v:#x}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedField {
    pub name: &'static str,
    pub value: FieldValue,
    /// Payload bytes the value was read from
    pub raw: Vec<u8>,
    pub unit: Option<&'static str>,
}

impl core::fmt::Display for DecodedField {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(fmt, "{}: {}", self.name, self.value)?;
        if let Some(unit) = self.unit {
            write!(fmt, " {unit}")?;
        }
        Ok(())
    }
}

/// A response payload broken out into fields.
///
/// `success` reflects the protocol status alone. Fields that could not be
/// read are named in `decode_errors` rather than failing the decode.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DecodedResponse {
    pub opcode: u8,
    pub status_code: u8,
    pub status: Status,
    pub success: bool,
    pub fields: Vec<DecodedField>,
    pub decode_errors: Vec<&'static str>,
    pub raw: Vec<u8>,
}

impl DecodedResponse {
    /// A response carrying only its status
    pub fn new(status_code: u8, payload: &[u8]) -> Self {
        let status = Status::from(status_code);
        Self {
            opcode: 0,
            status_code,
            status,
            success: status.is_success(),
            fields: Vec::new(),
            decode_errors: Vec::new(),
            raw: payload.to_vec(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DecodedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.get(name).map(|f| &f.value)
    }

    /// Every field the decoder knows about was read
    pub fn is_complete(&self) -> bool {
        self.decode_errors.is_empty()
    }

    /// Decodes `table` from `payload`, recording failures by name
    pub fn decode_fields(&mut self, table: &[FieldSpec], payload: &[u8]) {
        for fs in table {
            match fs.decode(payload) {
                Ok(field) => self.fields.push(field),
                Err(e) => {
                    debug!("Failed to decode {}: {e}", fs.name);
                    self.decode_errors.push(fs.name);
                }
            }
        }
    }
}

/// Turns a raw response payload into a [`DecodedResponse`]
///
/// `payload` starts with the status byte, so field offsets are payload
/// offsets.
pub trait ResponseDecoder: Send + Sync {
    fn decode(&self, status_code: u8, payload: &[u8]) -> DecodedResponse;
}

impl<F> ResponseDecoder for F
where
    F: Fn(u8, &[u8]) -> DecodedResponse + Send + Sync,
{
    fn decode(&self, status_code: u8, payload: &[u8]) -> DecodedResponse {
        self(status_code, payload)
    }
}

/// Element count of a list field
#[derive(Clone, Copy, Debug)]
pub enum Count {
    Fixed(usize),
    /// As many whole elements as the payload holds
    Remaining,
    /// Read from a little-endian integer elsewhere in the payload
    At { offset: usize, width: usize },
}

#[derive(Clone, Copy, Debug)]
pub enum Interpretation {
    /// Little-endian unsigned integer
    Uint,
    /// Signed byte
    Int8,
    Bit(u8),
    Bits { shift: u8, width: u8 },
    Label(fn(u64) -> &'static str),
    Flags(fn(u64) -> String),
    KelvinToCelsius,
    /// Major and minor bytes, rendered "major.minor"
    Version,
    Text,
    /// 0's based count, reported as the actual count
    ZeroBasedCount,
    /// `len` of the field is ignored; the list extends as far as it needs
    List {
        width: usize,
        stride: usize,
        count: Count,
    },
}

/// One named field of a response payload
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub offset: usize,
    pub len: usize,
    pub interp: Interpretation,
    pub unit: Option<&'static str>,
}

impl FieldSpec {
    pub const fn new(
        name: &'static str,
        offset: usize,
        len: usize,
        interp: Interpretation,
    ) -> Self {
        Self {
            name,
            offset,
            len,
            interp,
            unit: None,
        }
    }

    pub const fn unit(self, unit: &'static str) -> Self {
        Self {
            unit: Some(unit),
            ..self
        }
    }

    fn bytes<'a>(&self, payload: &'a [u8], len: usize) -> core::result::Result<&'a [u8], DekuError> {
        let end = self.offset.checked_add(len);
        end.and_then(|end| payload.get(self.offset..end)).ok_or_else(|| {
            deku_error!(
                DekuError::Parse,
                "Field beyond end of payload",
                "{}+{} > {}",
                self.offset,
                len,
                payload.len()
            )
        })
    }

    pub fn decode(&self, payload: &[u8]) -> core::result::Result<DecodedField, DekuError> {
        let (value, raw) = match self.interp {
            Interpretation::List {
                width,
                stride,
                count,
            } => {
                let count = match count {
                    Count::Fixed(n) => n,
                    Count::Remaining => {
                        let avail = payload.len().saturating_sub(self.offset);
                        if avail < width || stride == 0 {
                            0
                        } else {
                            (avail - width) / stride + 1
                        }
                    }
                    Count::At { offset, width } => {
                        let Some(b) = offset
                            .checked_add(width)
                            .and_then(|end| payload.get(offset..end))
                        else {
                            return Err(deku_error!(
                                DekuError::Parse,
                                "List count beyond end of payload"
                            ));
                        };
                        let n = read_le(b)?;
                        match usize::try_from(n) {
                            Ok(n) if n <= payload.len() => n,
                            _ => {
                                return Err(deku_error!(
                                    DekuError::Parse,
                                    "List count exceeds payload",
                                    "{} > {}",
                                    n,
                                    payload.len()
                                ));
                            }
                        }
                    }
                };
                let len = match count {
                    0 => Some(0),
                    n => (n - 1)
                        .checked_mul(stride)
                        .and_then(|l| l.checked_add(width)),
                };
                let Some(len) = len else {
                    return Err(deku_error!(
                        DekuError::Parse,
                        "List length overflow",
                        "{} x {}",
                        count,
                        stride
                    ));
                };
                let raw = self.bytes(payload, len)?;
                (FieldValue::List(read_le_list(raw, width, stride, count)?), raw)
            }
            interp => {
                let raw = self.bytes(payload, self.len)?;
                (Self::interpret(interp, raw)?, raw)
            }
        };

        Ok(DecodedField {
            name: self.name,
            value,
            raw: raw.to_vec(),
            unit: self.unit,
        })
    }

    fn interpret(
        interp: Interpretation,
        raw: &[u8],
    ) -> core::result::Result<FieldValue, DekuError> {
        Ok(match interp {
            Interpretation::Uint => FieldValue::Int(read_le(raw)? as i64),
            Interpretation::Int8 => {
                let [v] = raw else {
                    return Err(deku_error!(
                        DekuError::InvalidParam,
                        "Signed byte field must be one byte"
                    ));
                };
                FieldValue::Int(*v as i8 as i64)
            }
            Interpretation::Bit(bit) => FieldValue::Bool((read_le(raw)? >> bit) & 1 == 1),
            Interpretation::Bits { shift, width } => {
                let mask = (1u64 << width) - 1;
                FieldValue::Int(((read_le(raw)? >> shift) & mask) as i64)
            }
            Interpretation::Label(f) => FieldValue::Str(f(read_le(raw)?).to_string()),
            Interpretation::Flags(f) => FieldValue::Str(f(read_le(raw)?)),
            Interpretation::KelvinToCelsius => FieldValue::Int(kelvin_to_celsius(read_le(raw)?)),
            Interpretation::Version => {
                let [major, minor] = raw else {
                    return Err(deku_error!(
                        DekuError::InvalidParam,
                        "Version field must be two bytes"
                    ));
                };
                FieldValue::Str(format!("{major}.{minor}"))
            }
            Interpretation::Text => FieldValue::Str(read_string(raw)?),
            Interpretation::ZeroBasedCount => FieldValue::Int(read_le(raw)? as i64 + 1),
            Interpretation::List { .. } => {
                return Err(deku_error!(
                    DekuError::InvalidParam,
                    "List field decoded as scalar"
                ));
            }
        })
    }
}

/// Decodes a fixed list of fields, only when the status reports success
#[derive(Clone, Copy, Debug)]
pub struct TableDecoder {
    fields: &'static [FieldSpec],
}

impl TableDecoder {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }
}

impl ResponseDecoder for TableDecoder {
    fn decode(&self, status_code: u8, payload: &[u8]) -> DecodedResponse {
        let mut resp = DecodedResponse::new(status_code, payload);
        if resp.success {
            resp.decode_fields(self.fields, payload);
        }
        resp
    }
}

/// Registry key: an opcode and, for commands whose response depends on it,
/// the first request data byte
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct DecoderKey {
    pub opcode: u8,
    pub selector: Option<u8>,
}

impl DecoderKey {
    pub const fn new(opcode: u8, selector: Option<u8>) -> Self {
        Self { opcode, selector }
    }

    pub const fn opcode(opcode: u8) -> Self {
        Self::new(opcode, None)
    }
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: BTreeMap<DecoderKey, Box<dyn ResponseDecoder>>,
}

impl core::fmt::Debug for DecoderRegistry {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::fmt::Result {
        fmt.debug_set().entries(self.decoders.keys()).finish()
    }
}

impl DecoderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding decoders for the standard NVMe-MI responses
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        super::decoders::register_defaults(&mut reg);
        reg
    }

    /// Installs `decoder` for `key`, replacing any existing one
    pub fn register(&mut self, key: DecoderKey, decoder: impl ResponseDecoder + 'static) {
        self.decoders.insert(key, Box::new(decoder));
    }

    /// Exact match first, then the opcode-wide decoder
    pub fn get(&self, key: DecoderKey) -> Option<&dyn ResponseDecoder> {
        self.decoders
            .get(&key)
            .or_else(|| {
                key.selector
                    .and_then(|_| self.decoders.get(&DecoderKey::opcode(key.opcode)))
            })
            .map(|d| d.as_ref())
    }

    pub fn decode(&self, key: DecoderKey, payload: &[u8]) -> Result<DecodedResponse> {
        let Some(&status_code) = payload.first() else {
            debug!("Empty response payload for opcode {:#04x}", key.opcode);
            return Err(Error::Format(
                "Response payload has no status byte".to_string(),
            ));
        };

        let mut resp = match self.get(key) {
            Some(decoder) => decoder.decode(status_code, payload),
            None => {
                debug!("No decoder for {key:?}, reporting status only");
                DecodedResponse::new(status_code, payload)
            }
        };
        resp.opcode = key.opcode;
        Ok(resp)
    }
}
