//! The 8-byte USB SETUP packet and the request taxonomy encoded in its
//! `bmRequestType` bitfield.

use core::fmt;

/// Direction bit of `bmRequestType` (bit 7).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestDirection {
    HostToDevice,
    DeviceToHost,
}

/// Type field of `bmRequestType` (bits 6..5).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestType {
    Standard,
    Class,
    Vendor,
    Reserved,
}

/// Recipient field of `bmRequestType` (bits 4..0).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestRecipient {
    Device,
    Interface,
    Endpoint,
    Other,
}

/// Stage of a control transfer as seen by a class driver.
///
/// Drivers are offered the same SETUP packet once per stage; the data and
/// status mechanics between stages are owned by the device stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlStage {
    Setup,
    Data,
    Ack,
}

/// A parsed SETUP packet.
///
/// Multi-byte fields are little-endian on the wire; `parse` performs the
/// conversion once so downstream code only deals with host-order values.
#[derive(Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub bm_request_type: u8,
    pub b_request: u8,
    pub w_value: u16,
    pub w_index: u16,
    pub w_length: u16,
}

impl SetupPacket {
    pub fn parse(bytes: [u8; 8]) -> Self {
        Self {
            bm_request_type: bytes[0],
            b_request: bytes[1],
            w_value: u16::from_le_bytes([bytes[2], bytes[3]]),
            w_index: u16::from_le_bytes([bytes[4], bytes[5]]),
            w_length: u16::from_le_bytes([bytes[6], bytes[7]]),
        }
    }

    pub fn direction(&self) -> RequestDirection {
        if self.bm_request_type & 0x80 != 0 {
            RequestDirection::DeviceToHost
        } else {
            RequestDirection::HostToDevice
        }
    }

    pub fn request_type(&self) -> RequestType {
        match (self.bm_request_type >> 5) & 0x03 {
            0 => RequestType::Standard,
            1 => RequestType::Class,
            2 => RequestType::Vendor,
            _ => RequestType::Reserved,
        }
    }

    pub fn recipient(&self) -> RequestRecipient {
        match self.bm_request_type & 0x1f {
            0 => RequestRecipient::Device,
            1 => RequestRecipient::Interface,
            2 => RequestRecipient::Endpoint,
            _ => RequestRecipient::Other,
        }
    }

    /// Descriptor type for GET_DESCRIPTOR requests (high byte of `wValue`).
    pub fn descriptor_type(&self) -> u8 {
        (self.w_value >> 8) as u8
    }

    /// Descriptor index for GET_DESCRIPTOR requests (low byte of `wValue`).
    pub fn descriptor_index(&self) -> u8 {
        (self.w_value & 0x00ff) as u8
    }
}

impl fmt::Debug for SetupPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupPacket")
            .field("bm_request_type", &format_args!("{:#04x}", self.bm_request_type))
            .field("b_request", &format_args!("{:#04x}", self.b_request))
            .field("w_value", &format_args!("{:#06x}", self.w_value))
            .field("w_index", &format_args!("{:#06x}", self.w_index))
            .field("w_length", &self.w_length)
            .finish()
    }
}
