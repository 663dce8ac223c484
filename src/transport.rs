// SPDX-License-Identifier: GPL-3.0-only
/*
 * Copyright (c) 2025 Code Construct
 */
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::{Error, Result};

/// Moves framed MCTP-over-SMBus packets to and from an endpoint.
///
/// Implementations block; timeouts surface as [`Error::Timeout`] and other
/// link failures as [`Error::Communication`].
pub trait Transport {
    /// Transmits one packet and waits for exactly one response packet
    fn send_packet(&mut self, packet: &[u8]) -> Result<Vec<u8>>;

    /// Selects the target for subsequent packets, where the link has a
    /// notion of slots or addresses
    fn set_target(&mut self, _slot: Option<u8>, _address: Option<u8>) -> Result<()> {
        Ok(())
    }

    /// Transmits a packet that does not end the request message
    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.send_packet(packet).map(|_| ())
    }

    /// Receives the next packet of a response spanning several packets
    fn recv_packet(&mut self) -> Result<Vec<u8>> {
        Err(Error::Communication(
            "Transport cannot receive continuation packets".to_string(),
        ))
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_packet(&mut self, packet: &[u8]) -> Result<Vec<u8>> {
        (**self).send_packet(packet)
    }

    fn set_target(&mut self, slot: Option<u8>, address: Option<u8>) -> Result<()> {
        (**self).set_target(slot, address)
    }

    fn write_packet(&mut self, packet: &[u8]) -> Result<()> {
        (**self).write_packet(packet)
    }

    fn recv_packet(&mut self) -> Result<Vec<u8>> {
        (**self).recv_packet()
    }
}
