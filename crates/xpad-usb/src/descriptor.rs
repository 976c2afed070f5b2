//! Byte-level USB descriptor parsing and building.
//!
//! Descriptors are handled as explicit little-endian byte layouts rather than
//! packed structs; parsing never trusts a `bLength` beyond the bytes actually
//! present.

use crate::stack::{DeviceStack, UsbError};

pub const DESC_DEVICE: u8 = 0x01;
pub const DESC_CONFIGURATION: u8 = 0x02;
pub const DESC_STRING: u8 = 0x03;
pub const DESC_INTERFACE: u8 = 0x04;
pub const DESC_ENDPOINT: u8 = 0x05;
pub const DESC_HID: u8 = 0x21;
pub const DESC_HID_REPORT: u8 = 0x22;
pub const DESC_HID_PHYSICAL: u8 = 0x23;

pub const INTERFACE_DESCRIPTOR_LEN: usize = 9;
pub const ENDPOINT_DESCRIPTOR_LEN: usize = 7;

/// Transfer kind from endpoint `bmAttributes` bits 1..0.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

/// A standard interface descriptor (9 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterfaceDescriptor {
    pub b_interface_number: u8,
    pub b_alternate_setting: u8,
    pub b_num_endpoints: u8,
    pub b_interface_class: u8,
    pub b_interface_sub_class: u8,
    pub b_interface_protocol: u8,
    pub i_interface: u8,
}

impl InterfaceDescriptor {
    /// Parse an interface descriptor from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < INTERFACE_DESCRIPTOR_LEN
            || bytes[0] as usize != INTERFACE_DESCRIPTOR_LEN
            || bytes[1] != DESC_INTERFACE
        {
            return None;
        }
        Some(Self {
            b_interface_number: bytes[2],
            b_alternate_setting: bytes[3],
            b_num_endpoints: bytes[4],
            b_interface_class: bytes[5],
            b_interface_sub_class: bytes[6],
            b_interface_protocol: bytes[7],
            i_interface: bytes[8],
        })
    }
}

/// A standard endpoint descriptor (7 bytes).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointDescriptor {
    pub b_endpoint_address: u8,
    pub bm_attributes: u8,
    pub w_max_packet_size: u16,
    pub b_interval: u8,
}

impl EndpointDescriptor {
    /// Parse an endpoint descriptor from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ENDPOINT_DESCRIPTOR_LEN
            || bytes[0] as usize != ENDPOINT_DESCRIPTOR_LEN
            || bytes[1] != DESC_ENDPOINT
        {
            return None;
        }
        Some(Self {
            b_endpoint_address: bytes[2],
            bm_attributes: bytes[3],
            w_max_packet_size: u16::from_le_bytes([bytes[4], bytes[5]]),
            b_interval: bytes[6],
        })
    }

    /// Endpoint number (0..=15), without the direction bit.
    pub fn number(&self) -> u8 {
        self.b_endpoint_address & 0x0f
    }

    pub fn is_in(&self) -> bool {
        self.b_endpoint_address & 0x80 != 0
    }

    pub fn transfer_kind(&self) -> TransferKind {
        match self.bm_attributes & 0x03 {
            0 => TransferKind::Control,
            1 => TransferKind::Isochronous,
            2 => TransferKind::Bulk,
            _ => TransferKind::Interrupt,
        }
    }
}

/// Iterator over a packed `bLength`-prefixed descriptor stream.
///
/// Yields `(descriptor_type, descriptor_bytes)` with the two header bytes
/// included. Stops on a zero `bLength` or a descriptor that would run past
/// the end of the buffer, so a truncated stream can never cause a read out of
/// bounds.
#[derive(Debug)]
pub struct Descriptors<'a> {
    bytes: &'a [u8],
}

impl<'a> Descriptors<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl<'a> Iterator for Descriptors<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.bytes.len() < 2 {
            return None;
        }
        let len = self.bytes[0] as usize;
        if len < 2 || len > self.bytes.len() {
            return None;
        }
        let (desc, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Some((desc[1], desc))
    }
}

/// Open up to `num_endpoints` endpoint descriptors found at the front of
/// `bytes` and hand back the `(out, in)` endpoint addresses (0 where the
/// direction is absent).
///
/// Every endpoint must carry the expected transfer kind; anything else
/// rejects the whole group without opening further endpoints.
pub fn open_endpoint_pair(
    stack: &mut dyn DeviceStack,
    rhport: u8,
    bytes: &[u8],
    num_endpoints: u8,
    kind: TransferKind,
) -> Result<(u8, u8), UsbError> {
    let mut ep_out = 0u8;
    let mut ep_in = 0u8;
    let mut offset = 0usize;

    for _ in 0..num_endpoints {
        let desc = bytes
            .get(offset..)
            .and_then(EndpointDescriptor::parse)
            .ok_or(UsbError::InvalidParameter)?;
        if desc.transfer_kind() != kind {
            return Err(UsbError::InvalidParameter);
        }
        stack.endpoint_open(rhport, &desc)?;
        if desc.is_in() {
            ep_in = desc.b_endpoint_address;
        } else {
            ep_out = desc.b_endpoint_address;
        }
        offset += ENDPOINT_DESCRIPTOR_LEN;
    }

    Ok((ep_out, ep_in))
}

/// Write a UTF-16LE string descriptor for `s` into `buf`.
///
/// Returns the descriptor length, or `None` if `buf` cannot hold it.
pub fn write_string_descriptor(buf: &mut [u8], s: &str) -> Option<usize> {
    let units = s.encode_utf16().count();
    let len = 2 + units * 2;
    if len > 0xff || len > buf.len() {
        return None;
    }
    buf[0] = len as u8;
    buf[1] = DESC_STRING;
    for (chunk, unit) in buf[2..len].chunks_exact_mut(2).zip(s.encode_utf16()) {
        chunk.copy_from_slice(&unit.to_le_bytes());
    }
    Some(len)
}
