//! Stock descriptor tables for a wired X360-compatible gamepad.
//!
//! A single-interface device: the XInput vendor interface with its interrupt
//! endpoint pair, the MS OS string descriptor at index 0xEE and a compat-ID
//! descriptor that makes Windows bind `XUSB10` without a driver install.
//! Applications with their own identity build equivalent tables themselves;
//! the drivers only ever see these as opaque bytes.

use crate::descriptor::{self, DESC_CONFIGURATION, DESC_DEVICE, DESC_ENDPOINT, DESC_INTERFACE};
use crate::msos::{self, CompatIdFunction, MsOsDescriptors};
use crate::x360::{self, X360Config};

pub const VENDOR_ID: u16 = 0xcafe;
pub const PRODUCT_ID: u16 = 0x1234;

/// Vendor code handed to Windows in the OS string descriptor and expected
/// back as `bRequest` of the feature descriptor requests.
pub const MS_VENDOR_CODE: u8 = 0x42;

/// The gamepad interface number (the only interface of the stock config).
pub const ITF_NUM_X360: u8 = 0;

pub const EP_X360_IN: u8 = 0x81;
pub const EP_X360_OUT: u8 = 0x01;

const MANUFACTURER: &str = "xpad";
const PRODUCT: &str = "XInput Gamepad";
const SERIAL: &str = "000000";

pub static DEVICE_DESCRIPTOR: [u8; 18] = [
    0x12, // bLength
    DESC_DEVICE,
    0x00, 0x02, // bcdUSB (2.00)
    0x00, // bDeviceClass (per interface)
    0x00, // bDeviceSubClass
    0x00, // bDeviceProtocol
    0x40, // bMaxPacketSize0 (64)
    (VENDOR_ID & 0x00ff) as u8,
    (VENDOR_ID >> 8) as u8,
    (PRODUCT_ID & 0x00ff) as u8,
    (PRODUCT_ID >> 8) as u8,
    0x00, 0x01, // bcdDevice (1.00)
    0x01, // iManufacturer
    0x02, // iProduct
    0x03, // iSerialNumber
    0x01, // bNumConfigurations
];

/// Configuration descriptor tree:
///   Config(9) + Interface(9) + ClassSpecific(17) + EP IN(7) + EP OUT(7)
pub static CONFIG_DESCRIPTOR: [u8; 49] = [
    // Configuration descriptor
    0x09, // bLength
    DESC_CONFIGURATION,
    49, 0x00, // wTotalLength
    0x01, // bNumInterfaces
    0x01, // bConfigurationValue
    0x00, // iConfiguration
    0xa0, // bmAttributes (bus powered + remote wakeup)
    100,  // bMaxPower (200 mA)
    // Interface descriptor
    0x09, // bLength
    DESC_INTERFACE,
    ITF_NUM_X360, // bInterfaceNumber
    0x00, // bAlternateSetting
    0x02, // bNumEndpoints
    x360::INTERFACE_CLASS,
    x360::INTERFACE_SUBCLASS,
    x360::INTERFACE_PROTOCOL,
    0x00, // iInterface
    // Vendor class-specific descriptor: endpoint report metadata the driver
    // treats as opaque. Layout inherited from the wired pads.
    0x11, // bLength
    x360::CLASS_SPECIFIC_DESCRIPTOR_TYPE,
    0x00, 0x01, 0x01, // unknown
    0x25, // report in: type 2, 5 trailing bytes
    EP_X360_IN,
    0x14, // transfer size
    0x00, 0x00, 0x00, 0x00,
    0x13, // report out: type 1, 3 trailing bytes
    EP_X360_OUT,
    0x08, // transfer size
    0x00, 0x00,
    // Endpoint descriptor (Interrupt IN)
    0x07, // bLength
    DESC_ENDPOINT,
    EP_X360_IN,
    0x03, // bmAttributes (Interrupt)
    0x20, 0x00, // wMaxPacketSize (32)
    0x04, // bInterval (4 ms)
    // Endpoint descriptor (Interrupt OUT)
    0x07, // bLength
    DESC_ENDPOINT,
    EP_X360_OUT,
    0x03, // bmAttributes (Interrupt)
    0x20, 0x00, // wMaxPacketSize (32)
    0x08, // bInterval (8 ms)
];

/// OS string descriptor served at string index 0xEE (ContainerID support
/// advertised, matching the wired pads).
pub static MS_OS_STRING_DESCRIPTOR: [u8; msos::OS_STRING_DESC_LEN] =
    msos::os_string_descriptor(MS_VENDOR_CODE, true);

/// Compat-ID descriptor binding `XUSB10` to the gamepad interface.
pub static MS_COMPAT_ID_DESCRIPTOR: [u8; 40] =
    msos::compat_id_descriptor(CompatIdFunction::new(ITF_NUM_X360, *b"XUSB10\0\0"));

/// Which controls exist, as replied to the input-capability query: all
/// buttons except the reserved bit, both triggers and all four axes.
pub const INPUT_CAPABILITIES: [u8; 18] = [
    0xff, 0xf7, 0xff, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0xff, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00,
];

/// Rumble capability mask (no force feedback on the stock pad).
pub const RUMBLE_CAPABILITIES: [u8; 2] = [0x00, 0x00];

/// Serial bytes returned by the vendor serial-number request (raw, no NUL).
pub const SERIAL_NUMBER: &[u8] = b"ABC";

/// Driver configuration for the stock pad.
pub const fn stock_config() -> X360Config {
    X360Config {
        rumble_capabilities: Some(RUMBLE_CAPABILITIES),
        input_capabilities: Some(INPUT_CAPABILITIES),
        serial_number: Some(SERIAL_NUMBER),
    }
}

/// MS OS responder for the stock pad.
pub fn stock_ms_os_descriptors() -> MsOsDescriptors<'static> {
    MsOsDescriptors::new(MS_VENDOR_CODE)
        .with_container_id()
        .with_compat_id(&MS_COMPAT_ID_DESCRIPTOR)
}

/// Serve a string descriptor into `buf`.
///
/// Index 0xEE is the MS OS string; 0..=3 are langid, manufacturer, product
/// and serial. Anything else is unknown (`None`), which the device stack
/// stalls.
pub fn string_descriptor(index: u8, buf: &mut [u8]) -> Option<usize> {
    match index {
        0 => {
            // US English.
            let langid = [0x04, descriptor::DESC_STRING, 0x09, 0x04];
            buf.get_mut(..4)?.copy_from_slice(&langid);
            Some(4)
        }
        1 => descriptor::write_string_descriptor(buf, MANUFACTURER),
        2 => descriptor::write_string_descriptor(buf, PRODUCT),
        3 => descriptor::write_string_descriptor(buf, SERIAL),
        msos::OS_STRING_INDEX => {
            buf.get_mut(..MS_OS_STRING_DESCRIPTOR.len())?
                .copy_from_slice(&MS_OS_STRING_DESCRIPTOR);
            Some(MS_OS_STRING_DESCRIPTOR.len())
        }
        _ => None,
    }
}
