//! Microsoft OS 1.0 descriptors.
//!
//! Windows probes string descriptor index 0xEE during enumeration. A device
//! that answers with the `MSFT100` signature hands Windows a vendor code; the
//! host then issues vendor requests with that code to fetch the extended
//! compat-ID descriptor (`wIndex` 0x04, used for automatic driver binding;
//! `XUSB10` selects the Xbox 360 driver) and the extended properties
//! descriptor (`wIndex` 0x05, registry values per interface).

use crate::setup::{ControlStage, RequestType, SetupPacket};
use crate::stack::{DeviceStack, UsbError};
use crate::descriptor::DESC_STRING;

/// String descriptor index Windows probes for the OS string descriptor.
pub const OS_STRING_INDEX: u8 = 0xee;
/// Length of the OS string descriptor.
pub const OS_STRING_DESC_LEN: usize = 0x12;

/// `bcdVersion` carried by every MS OS 1.0 feature descriptor.
pub const OS_DESCRIPTOR_BCD_VERSION: u16 = 0x0100;

/// `wIndex` values identifying the feature descriptor being requested.
pub const GENRE_DESCRIPTOR_INDEX: u16 = 0x0001;
pub const COMPAT_ID_DESCRIPTOR_INDEX: u16 = 0x0004;
pub const EXTENDED_PROPERTIES_DESCRIPTOR_INDEX: u16 = 0x0005;
pub const CONTAINER_ID_DESCRIPTOR_INDEX: u16 = 0x0006;

/// "MSFT100" as UTF-16LE, the qwSignature of the OS string descriptor.
const SIGNATURE: [u8; 14] = [
    0x4d, 0x00, 0x53, 0x00, 0x46, 0x00, 0x54, 0x00, 0x31, 0x00, 0x30, 0x00, 0x30, 0x00,
];

pub const COMPAT_ID_HEADER_LEN: usize = 16;
pub const COMPAT_ID_FUNCTION_LEN: usize = 24;
pub const EXTENDED_PROPERTIES_HEADER_LEN: usize = 10;

/// Registry data types for extended property sections.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum PropertyDataType {
    /// NUL-terminated Unicode string.
    Sz = 1,
    /// NUL-terminated Unicode string with environment variables.
    ExpandSz = 2,
    /// Free-form binary.
    Binary = 3,
    /// Little-endian 32-bit integer.
    DwordLittleEndian = 4,
    /// Big-endian 32-bit integer.
    DwordBigEndian = 5,
    /// NUL-terminated Unicode string holding a symbolic link.
    Link = 6,
    /// Multiple NUL-terminated Unicode strings.
    MultiSz = 7,
}

/// Build the OS string descriptor served at index 0xEE.
///
/// `container_id` sets flags bit 1, declaring ContainerID descriptor
/// support.
pub const fn os_string_descriptor(vendor_code: u8, container_id: bool) -> [u8; OS_STRING_DESC_LEN] {
    let mut desc = [0u8; OS_STRING_DESC_LEN];
    desc[0] = OS_STRING_DESC_LEN as u8;
    desc[1] = DESC_STRING;
    let mut i = 0;
    while i < SIGNATURE.len() {
        desc[2 + i] = SIGNATURE[i];
        i += 1;
    }
    desc[16] = vendor_code;
    desc[17] = if container_id { 1 << 1 } else { 0 };
    desc
}

/// One function section of the compat-ID descriptor.
///
/// IDs are 8 bytes of uppercase ASCII (letters, digits, underscores), NUL
/// padded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompatIdFunction {
    pub first_interface: u8,
    pub compatible_id: [u8; 8],
    pub sub_compatible_id: [u8; 8],
}

impl CompatIdFunction {
    pub const fn new(first_interface: u8, compatible_id: [u8; 8]) -> Self {
        Self {
            first_interface,
            compatible_id,
            sub_compatible_id: [0; 8],
        }
    }
}

/// Build a complete single-function compat-ID descriptor in const context,
/// the common case of one driver binding for the whole device.
pub const fn compat_id_descriptor(
    function: CompatIdFunction,
) -> [u8; COMPAT_ID_HEADER_LEN + COMPAT_ID_FUNCTION_LEN] {
    let total = (COMPAT_ID_HEADER_LEN + COMPAT_ID_FUNCTION_LEN) as u32;
    let mut desc = [0u8; COMPAT_ID_HEADER_LEN + COMPAT_ID_FUNCTION_LEN];

    // Header: dwLength, bcdVersion, wIndex, bCount, 7 reserved bytes.
    desc[0] = total as u8;
    desc[1] = (total >> 8) as u8;
    desc[2] = (total >> 16) as u8;
    desc[3] = (total >> 24) as u8;
    desc[4] = OS_DESCRIPTOR_BCD_VERSION as u8;
    desc[5] = (OS_DESCRIPTOR_BCD_VERSION >> 8) as u8;
    desc[6] = COMPAT_ID_DESCRIPTOR_INDEX as u8;
    desc[7] = (COMPAT_ID_DESCRIPTOR_INDEX >> 8) as u8;
    desc[8] = 1;

    // Function section: bFirstInterfaceNumber, the fixed 0x01, both IDs and
    // 6 reserved bytes.
    desc[16] = function.first_interface;
    desc[17] = 0x01;
    let mut i = 0;
    while i < 8 {
        desc[18 + i] = function.compatible_id[i];
        desc[26 + i] = function.sub_compatible_id[i];
        i += 1;
    }
    desc
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Incremental writer for a multi-function compat-ID descriptor.
///
/// Writes into caller-provided storage; `finish` patches the header and
/// returns the blob length.
#[derive(Debug)]
pub struct CompatIdWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    count: u8,
}

impl<'a> CompatIdWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Result<Self, UsbError> {
        if buf.len() < COMPAT_ID_HEADER_LEN {
            return Err(UsbError::BufferOverflow);
        }
        buf[..COMPAT_ID_HEADER_LEN].fill(0);
        put_u16(buf, 4, OS_DESCRIPTOR_BCD_VERSION);
        put_u16(buf, 6, COMPAT_ID_DESCRIPTOR_INDEX);
        Ok(Self {
            buf,
            len: COMPAT_ID_HEADER_LEN,
            count: 0,
        })
    }

    pub fn push(&mut self, function: CompatIdFunction) -> Result<(), UsbError> {
        if self.len + COMPAT_ID_FUNCTION_LEN > self.buf.len() {
            return Err(UsbError::BufferOverflow);
        }
        let section = &mut self.buf[self.len..self.len + COMPAT_ID_FUNCTION_LEN];
        section.fill(0);
        section[0] = function.first_interface;
        section[1] = 0x01;
        section[2..10].copy_from_slice(&function.compatible_id);
        section[10..18].copy_from_slice(&function.sub_compatible_id);
        self.len += COMPAT_ID_FUNCTION_LEN;
        self.count += 1;
        Ok(())
    }

    /// Patch `dwLength` and `bCount` and return the final blob length.
    pub fn finish(self) -> usize {
        put_u32(self.buf, 0, self.len as u32);
        self.buf[8] = self.count;
        self.len
    }
}

/// Incremental writer for an extended-properties descriptor.
#[derive(Debug)]
pub struct ExtendedPropertiesWriter<'a> {
    buf: &'a mut [u8],
    len: usize,
    count: u16,
}

impl<'a> ExtendedPropertiesWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Result<Self, UsbError> {
        if buf.len() < EXTENDED_PROPERTIES_HEADER_LEN {
            return Err(UsbError::BufferOverflow);
        }
        buf[..EXTENDED_PROPERTIES_HEADER_LEN].fill(0);
        put_u16(buf, 4, OS_DESCRIPTOR_BCD_VERSION);
        put_u16(buf, 6, EXTENDED_PROPERTIES_DESCRIPTOR_INDEX);
        Ok(Self {
            buf,
            len: EXTENDED_PROPERTIES_HEADER_LEN,
            count: 0,
        })
    }

    /// Append one custom property section.
    ///
    /// `name` is encoded as a NUL-terminated UTF-16LE string; `data` is taken
    /// verbatim (callers encode registry strings themselves).
    pub fn push(
        &mut self,
        data_type: PropertyDataType,
        name: &str,
        data: &[u8],
    ) -> Result<(), UsbError> {
        let name_units = name.encode_utf16().count() + 1;
        let name_len = name_units * 2;
        if name_len > u16::MAX as usize || data.len() > u32::MAX as usize {
            return Err(UsbError::InvalidParameter);
        }
        // dwSize, dwPropertyDataType, wPropertyNameLength, name,
        // dwPropertyDataLength, data.
        let section_len = 4 + 4 + 2 + name_len + 4 + data.len();
        if self.len + section_len > self.buf.len() {
            return Err(UsbError::BufferOverflow);
        }

        let mut at = self.len;
        put_u32(self.buf, at, section_len as u32);
        at += 4;
        put_u32(self.buf, at, data_type as u32);
        at += 4;
        put_u16(self.buf, at, name_len as u16);
        at += 2;
        for unit in name.encode_utf16() {
            put_u16(self.buf, at, unit);
            at += 2;
        }
        put_u16(self.buf, at, 0);
        at += 2;
        put_u32(self.buf, at, data.len() as u32);
        at += 4;
        self.buf[at..at + data.len()].copy_from_slice(data);
        at += data.len();

        self.len = at;
        self.count += 1;
        Ok(())
    }

    /// Patch `dwLength` and `wCount` and return the final blob length.
    pub fn finish(self) -> usize {
        put_u32(self.buf, 0, self.len as u32);
        put_u16(self.buf, 8, self.count);
        self.len
    }
}

/// Responder for the vendor-coded MS OS 1.0 feature descriptor requests.
///
/// The application registers the blobs it wants served; requests for
/// anything unregistered (or any other `wIndex`) are left unhandled so the
/// caller stalls them. The application's vendor-request hook typically
/// chains its class drivers first and this responder second.
#[derive(Clone, Copy, Debug)]
pub struct MsOsDescriptors<'a> {
    vendor_code: u8,
    container_id: bool,
    compat_id: Option<&'a [u8]>,
    properties: Option<&'a [u8]>,
}

impl<'a> MsOsDescriptors<'a> {
    pub const fn new(vendor_code: u8) -> Self {
        Self {
            vendor_code,
            container_id: false,
            compat_id: None,
            properties: None,
        }
    }

    pub const fn with_container_id(mut self) -> Self {
        self.container_id = true;
        self
    }

    pub const fn with_compat_id(mut self, blob: &'a [u8]) -> Self {
        self.compat_id = Some(blob);
        self
    }

    pub const fn with_properties(mut self, blob: &'a [u8]) -> Self {
        self.properties = Some(blob);
        self
    }

    pub const fn vendor_code(&self) -> u8 {
        self.vendor_code
    }

    /// The OS string descriptor this responder expects the device to serve
    /// at string index 0xEE.
    pub const fn string_descriptor(&self) -> [u8; OS_STRING_DESC_LEN] {
        os_string_descriptor(self.vendor_code, self.container_id)
    }

    /// Handle one stage of a vendor control request.
    ///
    /// Returns `false` (stall) for anything that is not a feature descriptor
    /// request carrying our vendor code. Replies are sent at the setup stage
    /// only; the stack runs the remaining stages.
    pub fn control_xfer(
        &self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        stage: ControlStage,
        setup: &SetupPacket,
    ) -> bool {
        if setup.request_type() != RequestType::Vendor || setup.b_request != self.vendor_code {
            return false;
        }

        let blob = match setup.w_index {
            COMPAT_ID_DESCRIPTOR_INDEX => self.compat_id,
            EXTENDED_PROPERTIES_DESCRIPTOR_INDEX => self.properties,
            _ => None,
        };
        let Some(blob) = blob else {
            log::warn!(
                "unhandled MS OS descriptor request, wIndex {:#06x}",
                setup.w_index
            );
            return false;
        };

        if stage != ControlStage::Setup {
            return true;
        }
        stack.control_in(rhport, setup, blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_string_descriptor_layout() {
        let desc = os_string_descriptor(0x42, true);
        assert_eq!(desc[0], 0x12);
        assert_eq!(desc[1], 0x03);
        // "MSFT100" in UTF-16LE.
        assert_eq!(&desc[2..16], &SIGNATURE);
        assert_eq!(desc[16], 0x42);
        assert_eq!(desc[17], 0x02);

        assert_eq!(os_string_descriptor(0x42, false)[17], 0x00);
    }

    #[test]
    fn compat_id_descriptor_layout() {
        let desc = compat_id_descriptor(CompatIdFunction::new(0, *b"XUSB10\0\0"));
        assert_eq!(desc.len(), 40);
        assert_eq!(&desc[0..4], &40u32.to_le_bytes());
        assert_eq!(&desc[4..6], &[0x00, 0x01]); // bcdVersion 1.00
        assert_eq!(&desc[6..8], &[0x04, 0x00]); // wIndex
        assert_eq!(desc[8], 1); // bCount
        assert_eq!(&desc[9..16], &[0; 7]);
        assert_eq!(desc[16], 0); // bFirstInterfaceNumber
        assert_eq!(desc[17], 0x01);
        assert_eq!(&desc[18..26], b"XUSB10\0\0");
        assert_eq!(&desc[26..40], &[0; 14]);
    }

    #[test]
    fn compat_id_writer_matches_const_builder() {
        let mut buf = [0u8; 64];
        let mut writer = CompatIdWriter::new(&mut buf).unwrap();
        writer.push(CompatIdFunction::new(0, *b"XUSB10\0\0")).unwrap();
        let len = writer.finish();
        assert_eq!(
            &buf[..len],
            &compat_id_descriptor(CompatIdFunction::new(0, *b"XUSB10\0\0"))
        );
    }

    #[test]
    fn compat_id_writer_two_functions() {
        let mut buf = [0u8; 64];
        let mut writer = CompatIdWriter::new(&mut buf).unwrap();
        writer.push(CompatIdFunction::new(0, *b"XUSB10\0\0")).unwrap();
        writer.push(CompatIdFunction::new(1, *b"WINUSB\0\0")).unwrap();
        let len = writer.finish();

        assert_eq!(len, 16 + 2 * 24);
        assert_eq!(&buf[0..4], &(64u32).to_le_bytes());
        assert_eq!(buf[8], 2);
        assert_eq!(buf[40], 1);
        assert_eq!(&buf[42..50], b"WINUSB\0\0");
    }

    #[test]
    fn compat_id_writer_rejects_overflow() {
        let mut buf = [0u8; COMPAT_ID_HEADER_LEN + COMPAT_ID_FUNCTION_LEN];
        let mut writer = CompatIdWriter::new(&mut buf).unwrap();
        writer.push(CompatIdFunction::new(0, *b"XUSB10\0\0")).unwrap();
        assert_eq!(
            writer.push(CompatIdFunction::new(1, *b"WINUSB\0\0")),
            Err(UsbError::BufferOverflow)
        );
    }

    #[test]
    fn extended_properties_single_sz() {
        let mut buf = [0u8; 256];
        let mut writer = ExtendedPropertiesWriter::new(&mut buf).unwrap();
        // "Icons" -> 6 UTF-16 units with NUL = 12 bytes.
        writer
            .push(PropertyDataType::Sz, "Icons", &[0x41, 0x00, 0x00, 0x00])
            .unwrap();
        let len = writer.finish();

        let section_len = 4 + 4 + 2 + 12 + 4 + 4;
        assert_eq!(len, EXTENDED_PROPERTIES_HEADER_LEN + section_len);
        assert_eq!(&buf[0..4], &(len as u32).to_le_bytes());
        assert_eq!(&buf[4..6], &[0x00, 0x01]); // bcdVersion
        assert_eq!(&buf[6..8], &[0x05, 0x00]); // wIndex
        assert_eq!(&buf[8..10], &[0x01, 0x00]); // wCount

        let s = &buf[10..];
        assert_eq!(&s[0..4], &(section_len as u32).to_le_bytes());
        assert_eq!(&s[4..8], &1u32.to_le_bytes()); // REG_SZ
        assert_eq!(&s[8..10], &12u16.to_le_bytes());
        assert_eq!(&s[10..22], &[b'I', 0, b'c', 0, b'o', 0, b'n', 0, b's', 0, 0, 0]);
        assert_eq!(&s[22..26], &4u32.to_le_bytes());
        assert_eq!(&s[26..30], &[0x41, 0x00, 0x00, 0x00]);
    }
}
