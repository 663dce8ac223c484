// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
pub mod mi;

use alloc::string::String;
use alloc::vec::Vec;
use flagset::{FlagSet, flags};

use crate::wire::{FlagLabel, flag_labels};

/// Offset between the Kelvin values NVMe reports and degrees Celsius
pub const KELVIN_OFFSET: i64 = 273;

pub fn kelvin_to_celsius(kelvin: u64) -> i64 {
    kelvin as i64 - KELVIN_OFFSET
}

pub fn celsius_to_kelvin(celsius: i64) -> i64 {
    celsius + KELVIN_OFFSET
}

// Base v2.1, 5.1.12.1.3, Figure 206, CW
flags! {
    pub enum CriticalWarning: u8 {
        Ascbt,
        Ttc,
        Ndr,
        Amro,
        Vmbf,
        Pmrro,
    }
}

impl FlagLabel for CriticalWarning {
    fn label(self) -> &'static str {
        match self {
            Self::Ascbt => "Spare Below Threshold",
            Self::Ttc => "Temperature Exceeded",
            Self::Ndr => "Reliability Degraded",
            Self::Amro => "Read Only Mode",
            Self::Vmbf => "Volatile Backup Failed",
            Self::Pmrro => "PMR Read Only",
        }
    }
}

/// Active warnings in a critical warning byte, lowest bit first. Reserved
/// bits are ignored.
pub fn critical_warnings(cw: u8) -> Vec<&'static str> {
    flag_labels(FlagSet::<CriticalWarning>::new_truncated(cw))
}

/// Critical warnings joined for display, or "None"
pub fn critical_warning_summary(cw: u8) -> String {
    let warnings = critical_warnings(cw);
    if warnings.is_empty() {
        return String::from("None");
    }
    warnings.join(", ")
}

// Base v2.1, 3.1.4.6, Figure 42, SHST
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ShutdownStatus {
    Normal = 0x00,
    InProgress = 0x01,
    Complete = 0x02,
    Reserved = 0x03,
}

impl From<u8> for ShutdownStatus {
    fn from(value: u8) -> Self {
        match value & 0x03 {
            0x00 => Self::Normal,
            0x01 => Self::InProgress,
            0x02 => Self::Complete,
            _ => Self::Reserved,
        }
    }
}

impl ShutdownStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal operation",
            Self::InProgress => "Shutdown in progress",
            Self::Complete => "Shutdown complete",
            Self::Reserved => "Reserved",
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ShutdownStatus, critical_warning_summary, critical_warnings, kelvin_to_celsius};

    #[test]
    fn warnings_ascending() {
        assert_eq!(
            critical_warnings(0x03),
            ["Spare Below Threshold", "Temperature Exceeded"]
        );
        assert_eq!(
            critical_warnings(0x28),
            ["Read Only Mode", "PMR Read Only"]
        );
    }

    #[test]
    fn warnings_reserved_ignored() {
        assert!(critical_warnings(0xc0).is_empty());
        assert_eq!(critical_warning_summary(0xc0), "None");
        assert_eq!(
            critical_warning_summary(0x05),
            "Spare Below Threshold, Reliability Degraded"
        );
    }

    #[test]
    fn temperature() {
        assert_eq!(kelvin_to_celsius(315), 42);
        assert_eq!(kelvin_to_celsius(263), -10);
        assert_eq!(kelvin_to_celsius(0), -273);
    }

    #[test]
    fn shutdown() {
        assert_eq!(ShutdownStatus::from(0x06), ShutdownStatus::Complete);
        assert_eq!(ShutdownStatus::from(0x03).label(), "Reserved");
    }
}
