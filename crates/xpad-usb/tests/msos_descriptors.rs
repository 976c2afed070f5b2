mod common;

use common::{run_control, setup_packet, ControlResult, MockStack};
use pretty_assertions::assert_eq;
use xpad_usb::gamepad::{self, CONFIG_DESCRIPTOR, MS_COMPAT_ID_DESCRIPTOR};
use xpad_usb::msos::{
    ExtendedPropertiesWriter, MsOsDescriptors, PropertyDataType, OS_STRING_INDEX,
};
use xpad_usb::x360::{X360Driver, X360Handler};
use xpad_usb::ClassDriver;

const RHPORT: u8 = 0;

struct NopHandler;
impl X360Handler for NopHandler {}

fn run_responder_control(
    stack: &mut MockStack,
    responder: &MsOsDescriptors<'_>,
    setup: &xpad_usb::SetupPacket,
) -> ControlResult {
    run_control(stack, setup, &[], |stack, stage, setup, _| {
        responder.control_xfer(stack, RHPORT, stage, setup)
    })
}

#[test]
fn windows_probes_the_os_string_descriptor() {
    // GET_DESCRIPTOR(String, 0xEE) is answered from the device's string
    // table; the descriptor carries the signature and the vendor code.
    let mut buf = [0u8; 64];
    let len = gamepad::string_descriptor(OS_STRING_INDEX, &mut buf).unwrap();

    assert_eq!(len, 0x12);
    assert_eq!(buf[0], 0x12);
    assert_eq!(buf[1], 0x03);
    let expected_signature: Vec<u8> = "MSFT100"
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    assert_eq!(&buf[2..16], &expected_signature[..]);
    assert_eq!(buf[16], gamepad::MS_VENDOR_CODE);
}

#[test]
fn compat_id_request_returns_the_xusb10_blob() {
    let mut stack = MockStack::new();
    let responder = gamepad::stock_ms_os_descriptors();

    // bmRequestType 0xC0, bRequest = vendor code, wIndex 0x0004.
    let setup = setup_packet(0xc0, gamepad::MS_VENDOR_CODE, 0, 0x0004, 0x28);
    let result = run_responder_control(&mut stack, &responder, &setup);

    let ControlResult::Data(blob) = result else {
        panic!("compat-ID request was not answered: {result:?}");
    };
    assert_eq!(blob, MS_COMPAT_ID_DESCRIPTOR.to_vec());
    // The first function section names XUSB10 at offset 18.
    assert_eq!(&blob[18..26], b"XUSB10\0\0");
}

#[test]
fn compat_id_header_fetch_is_clamped_to_wlength() {
    let mut stack = MockStack::new();
    let responder = gamepad::stock_ms_os_descriptors();

    // Windows first reads just the 16-byte header to learn dwLength.
    let setup = setup_packet(0xc0, gamepad::MS_VENDOR_CODE, 0, 0x0004, 0x10);
    let result = run_responder_control(&mut stack, &responder, &setup);
    assert_eq!(
        result,
        ControlResult::Data(MS_COMPAT_ID_DESCRIPTOR[..16].to_vec())
    );
}

#[test]
fn unregistered_or_unknown_feature_descriptors_stall() {
    let mut stack = MockStack::new();

    // Stock pad registers no extended properties.
    let responder = gamepad::stock_ms_os_descriptors();
    let setup = setup_packet(0xc1, gamepad::MS_VENDOR_CODE, 0, 0x0005, 0x0a);
    assert_eq!(
        run_responder_control(&mut stack, &responder, &setup),
        ControlResult::Stalled
    );

    // ContainerID (0x0006) and genre (0x0001) are never served.
    for w_index in [0x0001, 0x0006, 0x0007] {
        let setup = setup_packet(0xc0, gamepad::MS_VENDOR_CODE, 0, w_index, 0x20);
        assert_eq!(
            run_responder_control(&mut stack, &responder, &setup),
            ControlResult::Stalled
        );
    }

    // A vendor request with some other bRequest is not ours.
    let setup = setup_packet(0xc0, 0x7f, 0, 0x0004, 0x28);
    assert_eq!(
        run_responder_control(&mut stack, &responder, &setup),
        ControlResult::Stalled
    );
}

#[test]
fn extended_properties_are_served_when_registered() {
    let mut blob = [0u8; 256];
    let len = {
        let mut writer = ExtendedPropertiesWriter::new(&mut blob).unwrap();
        let mut guid = Vec::new();
        for ch in "{ec87f4b1-e458-4e6d-ac05-9b8a1f1a1c3e}".encode_utf16() {
            guid.extend_from_slice(&ch.to_le_bytes());
        }
        guid.extend_from_slice(&[0, 0]);
        writer
            .push(PropertyDataType::Sz, "DeviceInterfaceGUID", &guid)
            .unwrap();
        writer.finish()
    };

    let mut stack = MockStack::new();
    let responder = MsOsDescriptors::new(gamepad::MS_VENDOR_CODE).with_properties(&blob[..len]);

    let setup = setup_packet(0xc1, gamepad::MS_VENDOR_CODE, 0, 0x0005, len as u16);
    let result = run_responder_control(&mut stack, &responder, &setup);
    assert_eq!(result, ControlResult::Data(blob[..len].to_vec()));
}

#[test]
fn x360_driver_and_responder_chain_on_the_vendor_hook() {
    // The application's vendor-request hook tries the gamepad driver first
    // and falls back to the MS OS responder, so both kinds of vendor
    // request work side by side.
    let mut stack = MockStack::new();
    let mut driver: X360Driver<NopHandler, 1> =
        X360Driver::new(gamepad::stock_config(), NopHandler);
    driver.open(&mut stack, RHPORT, &CONFIG_DESCRIPTOR[9..]).unwrap();
    let responder = gamepad::stock_ms_os_descriptors();

    let mut vendor_request = |stack: &mut MockStack, setup: &xpad_usb::SetupPacket| {
        run_control(stack, setup, &[], |stack, stage, setup, data| {
            driver.control_xfer(stack, RHPORT, stage, setup, data)
                || responder.control_xfer(stack, RHPORT, stage, setup)
        })
    };

    // The XUSB enumeration flow: compat-ID first, then the capability query.
    let setup = setup_packet(0xc0, gamepad::MS_VENDOR_CODE, 0, 0x0004, 0x28);
    let ControlResult::Data(blob) = vendor_request(&mut stack, &setup) else {
        panic!("compat-ID request stalled");
    };
    assert_eq!(&blob[18..26], b"XUSB10\0\0");

    let setup = setup_packet(0xc1, 0x01, 0x0100, 0, 20);
    let ControlResult::Data(caps) = vendor_request(&mut stack, &setup) else {
        panic!("input capability request stalled");
    };
    assert_eq!(&caps[..2], &[0x00, 0x14]);

    // Anything neither handles stalls.
    let setup = setup_packet(0xc0, 0x55, 0, 0x0004, 0x28);
    assert_eq!(vendor_request(&mut stack, &setup), ControlResult::Stalled);
}
