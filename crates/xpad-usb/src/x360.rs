//! Xbox 360 / XInput gamepad class driver.
//!
//! XInput is not a HID class: the pad enumerates with the unofficial
//! vendor triple `bInterfaceClass 0xFF / bInterfaceSubClass 0x5D /
//! bInterfaceProtocol 0x01` and moves fixed-format messages over one
//! interrupt endpoint pair. The host additionally issues a handful of
//! vendor control requests (capability queries and a serial-number fetch)
//! while the XUSB driver binds.
//!
//! All messages share a two-byte header `{type, length}`. Device-to-host
//! input reports are 20 bytes; host-to-device messages are the 8-byte rumble
//! command and the 3-byte LED animation command.

use crate::descriptor::{self, InterfaceDescriptor, TransferKind};
use crate::setup::{ControlStage, RequestRecipient, RequestType, SetupPacket};
use crate::stack::{ClassDriver, DeviceStack, UsbError, XferResult};

pub const INTERFACE_CLASS: u8 = 0xff;
pub const INTERFACE_SUBCLASS: u8 = 0x5d;
pub const INTERFACE_PROTOCOL: u8 = 0x01;

/// Descriptor type of the vendor class-specific descriptor that follows the
/// interface descriptor. Its contents (endpoint report metadata) are opaque
/// to the driver.
pub const CLASS_SPECIFIC_DESCRIPTOR_TYPE: u8 = 0x21;

/// Transfer sizes per direction: the 20-byte input report and the 8-byte
/// rumble message (the largest OUT message).
pub const IN_TRANSFER_LEN: usize = 0x14;
pub const OUT_TRANSFER_LEN: usize = 0x08;
const LED_MESSAGE_LEN: usize = 0x03;

/// Message type bytes. IN and OUT spaces are distinct: 0x00 means "input
/// report" towards the host but "rumble" from it.
pub const MESSAGE_TYPE_INPUT: u8 = 0x00;
pub const MESSAGE_TYPE_RUMBLE: u8 = 0x00;
pub const MESSAGE_TYPE_LED: u8 = 0x01;

/// The single vendor `bRequest` the XUSB driver uses.
pub const VENDOR_REQUEST: u8 = 0x01;

/// `wValue` selectors for the vendor request. Rumble and serial share
/// 0x0000 and are told apart only by the request recipient (interface vs
/// device).
pub const REQUEST_RUMBLE_CAPABILITIES: u16 = 0x0000;
pub const REQUEST_INPUT_CAPABILITIES: u16 = 0x0100;
pub const REQUEST_SERIAL_NUMBER: u16 = 0x0000;

bitflags::bitflags! {
    /// Button bitmap of the input report (wire order, little-endian u16).
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Buttons: u16 {
        const DPAD_UP = 1 << 0;
        const DPAD_DOWN = 1 << 1;
        const DPAD_LEFT = 1 << 2;
        const DPAD_RIGHT = 1 << 3;
        const START = 1 << 4;
        const BACK = 1 << 5;
        const LEFT_STICK = 1 << 6;
        const RIGHT_STICK = 1 << 7;
        const LEFT_BUMPER = 1 << 8;
        const RIGHT_BUMPER = 1 << 9;
        const HOME = 1 << 10;
        // Bit 11 is reserved.
        const A = 1 << 12;
        const B = 1 << 13;
        const X = 1 << 14;
        const Y = 1 << 15;
    }
}

/// Home-button LED animations, as carried by the 3-byte LED message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum LedAnimation {
    /// No LED, typically an unset slot (e.g. a fifth controller).
    AllOff = 0x00,
    /// All blinking for 2 seconds, then back to the previous state.
    AllBlinking = 0x01,
    /// Short flash on 1, then stay on it (slot 1 initialisation).
    Slot1Flash = 0x02,
    /// Short flash on 2, then stay on it.
    Slot2Flash = 0x03,
    /// Short flash on 3, then stay on it.
    Slot3Flash = 0x04,
    /// Short flash on 4, then stay on it.
    Slot4Flash = 0x05,
    /// Stay on 1.
    Slot1On = 0x06,
    /// Stay on 2.
    Slot2On = 0x07,
    /// Stay on 3.
    Slot3On = 0x08,
    /// Stay on 4.
    Slot4On = 0x09,
    /// Rotational blinking (1 → 2 → 4 → 3), typical during pairing.
    Rotating = 0x0a,
    /// Fast blinking of the current slot for 8 seconds.
    BlinkingFast = 0x0b,
    /// Slow blinking of the current slot, forever.
    BlinkingSlow = 0x0c,
    /// Alternating 1+4 / 2+3, the low-battery indication.
    Alternating = 0x0d,
    /// Initial state: slow blinking, forever.
    Init = 0x0e,
    /// Blink once, then off.
    BlinkOnce = 0x0f,
}

impl LedAnimation {
    pub fn from_code(code: u8) -> Option<Self> {
        // Codes map 1:1 onto the enum discriminants 0x00..=0x0f.
        match code {
            0x00 => Some(Self::AllOff),
            0x01 => Some(Self::AllBlinking),
            0x02 => Some(Self::Slot1Flash),
            0x03 => Some(Self::Slot2Flash),
            0x04 => Some(Self::Slot3Flash),
            0x05 => Some(Self::Slot4Flash),
            0x06 => Some(Self::Slot1On),
            0x07 => Some(Self::Slot2On),
            0x08 => Some(Self::Slot3On),
            0x09 => Some(Self::Slot4On),
            0x0a => Some(Self::Rotating),
            0x0b => Some(Self::BlinkingFast),
            0x0c => Some(Self::BlinkingSlow),
            0x0d => Some(Self::Alternating),
            0x0e => Some(Self::Init),
            0x0f => Some(Self::BlinkOnce),
            _ => None,
        }
    }
}

/// The 18-byte controls payload of an input report.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Controls {
    pub buttons: Buttons,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub left_stick_x: i16,
    pub left_stick_y: i16,
    pub right_stick_x: i16,
    pub right_stick_y: i16,
}

impl Controls {
    /// Serialize to the wire layout (all multi-byte fields little-endian).
    pub fn to_bytes(&self) -> [u8; 18] {
        let mut bytes = [0u8; 18];
        bytes[0..2].copy_from_slice(&self.buttons.bits().to_le_bytes());
        bytes[2] = self.left_trigger;
        bytes[3] = self.right_trigger;
        bytes[4..6].copy_from_slice(&self.left_stick_x.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.left_stick_y.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.right_stick_x.to_le_bytes());
        bytes[10..12].copy_from_slice(&self.right_stick_y.to_le_bytes());
        // Bytes 12..18 are reserved and stay zero.
        bytes
    }

    pub fn from_bytes(bytes: &[u8; 18]) -> Self {
        Self {
            buttons: Buttons::from_bits_retain(u16::from_le_bytes([bytes[0], bytes[1]])),
            left_trigger: bytes[2],
            right_trigger: bytes[3],
            left_stick_x: i16::from_le_bytes([bytes[4], bytes[5]]),
            left_stick_y: i16::from_le_bytes([bytes[6], bytes[7]]),
            right_stick_x: i16::from_le_bytes([bytes[8], bytes[9]]),
            right_stick_y: i16::from_le_bytes([bytes[10], bytes[11]]),
        }
    }
}

/// Compile-time device properties served through the vendor requests.
///
/// A `None` capability leaves the corresponding request unhandled (stalled),
/// matching pads that do not implement it.
#[derive(Clone, Copy, Debug, Default)]
pub struct X360Config {
    /// Payload of the rumble capability reply.
    pub rumble_capabilities: Option<[u8; 2]>,
    /// Payload of the input capability reply (which controls exist).
    pub input_capabilities: Option<[u8; 18]>,
    /// Serial number, sent raw (no NUL terminator, not UTF-16).
    pub serial_number: Option<&'static [u8]>,
}

/// Application callbacks.
///
/// Default implementations make every callback optional; `report_issue`
/// returns whether the application took over error recovery (when it returns
/// `false` for an OUT endpoint, the driver re-arms the endpoint itself).
pub trait X360Handler {
    /// An input report finished transmitting.
    fn report_complete(&mut self, itf_num: u8, report: &[u8]) {
        let _ = (itf_num, report);
    }

    /// A rumble message arrived. `left` drives the heavy motor, `right` the
    /// light one.
    fn received_rumble(&mut self, itf_num: u8, left: u8, right: u8) {
        let _ = (itf_num, left, right);
    }

    /// The LED animation changed. Repeated commands carrying the animation
    /// already in effect are filtered out before this is called.
    fn received_led(&mut self, itf_num: u8, led: LedAnimation) {
        let _ = (itf_num, led);
    }

    /// A transfer finished with an error. Return `true` to take over
    /// recovery (the application must then re-arm the OUT endpoint, e.g. by
    /// waiting for the next bus reset); `false` lets the driver re-arm
    /// automatically.
    fn report_issue(&mut self, itf_num: u8, ep_addr: u8, result: XferResult, len: usize) -> bool {
        let _ = (itf_num, ep_addr, result, len);
        false
    }
}

/// Transfer buffer aligned for DMA-capable stacks.
#[derive(Clone, Copy, Debug)]
#[repr(align(4))]
struct DmaBuffer<const N: usize>([u8; N]);

/// One bound interface.
///
/// A slot is free iff both endpoint addresses are zero.
#[derive(Clone, Copy, Debug)]
struct Instance {
    rhport: u8,
    itf_num: u8,
    ep_in: u8,
    ep_out: u8,
    in_buf: DmaBuffer<IN_TRANSFER_LEN>,
    out_buf: DmaBuffer<OUT_TRANSFER_LEN>,
    /// Last LED animation code seen, for debouncing repeated commands.
    led: u8,
}

impl Instance {
    const FREE: Self = Self {
        rhport: 0,
        itf_num: 0,
        ep_in: 0,
        ep_out: 0,
        in_buf: DmaBuffer([0; IN_TRANSFER_LEN]),
        out_buf: DmaBuffer([0; OUT_TRANSFER_LEN]),
        led: 0,
    };

    fn is_free(&self) -> bool {
        self.ep_in == 0 && self.ep_out == 0
    }
}

/// The X360 class driver, managing up to `N` gamepad interfaces.
pub struct X360Driver<H: X360Handler, const N: usize> {
    config: X360Config,
    handler: H,
    instances: [Instance; N],
}

impl<H: X360Handler, const N: usize> X360Driver<H, N> {
    pub const fn new(config: X360Config, handler: H) -> Self {
        Self {
            config,
            handler,
            instances: [Instance::FREE; N],
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Whether the interface is bound, configured and idle enough to accept
    /// a new report.
    pub fn ready(&self, stack: &dyn DeviceStack, itf_num: u8) -> bool {
        let Some(index) = self.index_by_itf(itf_num) else {
            return false;
        };
        let instance = &self.instances[index];
        stack.configured()
            && instance.ep_in != 0
            && !stack.endpoint_busy(instance.rhport, instance.ep_in)
    }

    /// `(ep_in, ep_out)` addresses of a bound interface.
    pub fn endpoints(&self, itf_num: u8) -> Option<(u8, u8)> {
        let index = self.index_by_itf(itf_num)?;
        let instance = &self.instances[index];
        Some((instance.ep_in, instance.ep_out))
    }

    /// Last LED animation commanded by the host for this interface.
    pub fn led_animation(&self, itf_num: u8) -> Option<LedAnimation> {
        let index = self.index_by_itf(itf_num)?;
        LedAnimation::from_code(self.instances[index].led)
    }

    /// Send an input report.
    ///
    /// Claims the IN endpoint (so at most one report is outstanding),
    /// serializes the message into the instance buffer and queues the
    /// 20-byte transfer.
    pub fn report(
        &mut self,
        stack: &mut dyn DeviceStack,
        itf_num: u8,
        controls: &Controls,
    ) -> Result<(), UsbError> {
        let index = self.index_by_itf(itf_num).ok_or(UsbError::NotBound)?;
        let instance = &mut self.instances[index];
        if instance.ep_in == 0 {
            return Err(UsbError::EndpointUnavailable);
        }
        if !stack.endpoint_claim(instance.rhport, instance.ep_in) {
            return Err(UsbError::Busy);
        }

        instance.in_buf.0[0] = MESSAGE_TYPE_INPUT;
        instance.in_buf.0[1] = IN_TRANSFER_LEN as u8;
        instance.in_buf.0[2..].copy_from_slice(&controls.to_bytes());

        stack.endpoint_in(instance.rhport, instance.ep_in, &instance.in_buf.0)
    }

    fn index_by_itf(&self, itf_num: u8) -> Option<usize> {
        self.instances
            .iter()
            .position(|i| !i.is_free() && i.itf_num == itf_num)
    }

    fn index_by_ep(&self, ep_addr: u8) -> Option<usize> {
        self.instances
            .iter()
            .position(|i| ep_addr != 0 && (i.ep_in == ep_addr || i.ep_out == ep_addr))
    }

    /// Classify a received OUT message and notify the application.
    ///
    /// Anything that does not look like a rumble or LED message is dropped
    /// silently; hosts are known to send padding traffic.
    fn out_received(&mut self, index: usize, data: &[u8]) {
        let instance = &mut self.instances[index];
        let len = data.len().min(OUT_TRANSFER_LEN);
        instance.out_buf.0[..len].copy_from_slice(&data[..len]);
        let itf_num = instance.itf_num;
        let message = &instance.out_buf.0[..len];

        if len == OUT_TRANSFER_LEN
            && message[0] == MESSAGE_TYPE_RUMBLE
            && message[1] as usize == OUT_TRANSFER_LEN
        {
            let (left, right) = (message[3], message[4]);
            self.handler.received_rumble(itf_num, left, right);
        } else if len == LED_MESSAGE_LEN
            && message[0] == MESSAGE_TYPE_LED
            && message[1] as usize == LED_MESSAGE_LEN
        {
            let code = message[2];
            let Some(animation) = LedAnimation::from_code(code) else {
                return;
            };
            // The host re-sends the current animation on occasion; only a
            // change is reported.
            if instance.led == code {
                return;
            }
            instance.led = code;
            self.handler.received_led(itf_num, animation);
        }
    }

    fn interface_request(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        index: usize,
        stage: ControlStage,
        setup: &SetupPacket,
    ) -> bool {
        match setup.w_value {
            REQUEST_RUMBLE_CAPABILITIES => {
                // Reply carries no completion callback, so only the setup
                // stage does work.
                if stage != ControlStage::Setup {
                    return true;
                }
                let Some(caps) = self.config.rumble_capabilities else {
                    return false;
                };
                let instance = &mut self.instances[index];
                let message = &mut instance.in_buf.0[..OUT_TRANSFER_LEN];
                message.fill(0);
                message[0] = MESSAGE_TYPE_RUMBLE;
                message[1] = OUT_TRANSFER_LEN as u8;
                message[3] = caps[0];
                message[4] = caps[1];
                stack.control_in(rhport, setup, &instance.in_buf.0[..OUT_TRANSFER_LEN])
            }
            REQUEST_INPUT_CAPABILITIES => {
                if stage != ControlStage::Setup {
                    return true;
                }
                let Some(caps) = self.config.input_capabilities else {
                    return false;
                };
                let instance = &mut self.instances[index];
                instance.in_buf.0[0] = MESSAGE_TYPE_INPUT;
                instance.in_buf.0[1] = IN_TRANSFER_LEN as u8;
                instance.in_buf.0[2..].copy_from_slice(&caps);
                stack.control_in(rhport, setup, &instance.in_buf.0)
            }
            _ => false,
        }
    }

    fn device_request(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        index: usize,
        stage: ControlStage,
        setup: &SetupPacket,
    ) -> bool {
        match setup.w_value {
            REQUEST_SERIAL_NUMBER => {
                if stage != ControlStage::Setup {
                    return true;
                }
                let Some(serial) = self.config.serial_number else {
                    return false;
                };
                if serial.is_empty() || serial.len() > IN_TRANSFER_LEN {
                    return false;
                }
                let instance = &mut self.instances[index];
                instance.in_buf.0[..serial.len()].copy_from_slice(serial);
                stack.control_in(rhport, setup, &instance.in_buf.0[..serial.len()])
            }
            _ => false,
        }
    }
}

impl<H: X360Handler, const N: usize> ClassDriver for X360Driver<H, N> {
    fn reset(&mut self, _rhport: u8) {
        self.instances = [Instance::FREE; N];
    }

    fn open(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        descriptors: &[u8],
    ) -> Option<usize> {
        let itf = InterfaceDescriptor::parse(descriptors)?;
        if itf.b_interface_class != INTERFACE_CLASS
            || itf.b_interface_sub_class != INTERFACE_SUBCLASS
            || itf.b_interface_protocol != INTERFACE_PROTOCOL
        {
            return None;
        }

        // The interface block is: interface descriptor, one class-specific
        // descriptor, then exactly bNumEndpoints endpoint descriptors.
        let mut offset = descriptor::INTERFACE_DESCRIPTOR_LEN;
        let header = descriptors.get(offset..offset + 2)?;
        let class_len = header[0] as usize;
        if header[1] != CLASS_SPECIFIC_DESCRIPTOR_TYPE || class_len < 2 {
            log::warn!("x360: interface without class-specific descriptor");
            return None;
        }
        offset += class_len;

        let drv_len = offset + itf.b_num_endpoints as usize * descriptor::ENDPOINT_DESCRIPTOR_LEN;
        if drv_len > descriptors.len() {
            log::warn!(
                "x360: descriptor block truncated ({} > {})",
                drv_len,
                descriptors.len()
            );
            return None;
        }

        let Some(index) = self.instances.iter().position(Instance::is_free) else {
            log::warn!("x360: no free instance slot");
            return None;
        };

        let (ep_out, ep_in) = match descriptor::open_endpoint_pair(
            stack,
            rhport,
            &descriptors[offset..drv_len],
            itf.b_num_endpoints,
            TransferKind::Interrupt,
        ) {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("x360: endpoint open failed: {}", err);
                return None;
            }
        };

        let instance = &mut self.instances[index];
        *instance = Instance::FREE;
        instance.rhport = rhport;
        instance.itf_num = itf.b_interface_number;
        instance.ep_in = ep_in;
        instance.ep_out = ep_out;
        log::trace!(
            "x360: bound interface {} (ep_in {:#04x}, ep_out {:#04x})",
            itf.b_interface_number,
            ep_in,
            ep_out
        );

        // Arm the OUT endpoint right away so the first host message is not
        // lost.
        if ep_out != 0 {
            if let Err(err) = stack.endpoint_out(rhport, ep_out, OUT_TRANSFER_LEN) {
                log::warn!("x360: failed to arm OUT endpoint: {}", err);
            }
        }

        Some(drv_len)
    }

    fn control_xfer(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        stage: ControlStage,
        setup: &SetupPacket,
        _data: &[u8],
    ) -> bool {
        if setup.request_type() != RequestType::Vendor || setup.b_request != VENDOR_REQUEST {
            return false;
        }
        let Some(index) = self.index_by_itf(setup.w_index as u8) else {
            return false;
        };
        debug_assert_eq!(self.instances[index].rhport, rhport);

        // Rumble capabilities and the serial number share wValue 0x0000; the
        // recipient decides which one is meant, so it dispatches first.
        match setup.recipient() {
            RequestRecipient::Interface => {
                self.interface_request(stack, rhport, index, stage, setup)
            }
            RequestRecipient::Device => self.device_request(stack, rhport, index, stage, setup),
            _ => false,
        }
    }

    fn xfer_complete(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        ep_addr: u8,
        result: XferResult,
        data: &[u8],
    ) {
        let Some(index) = self.index_by_ep(ep_addr) else {
            log::warn!("x360: completion for unknown endpoint {:#04x}", ep_addr);
            return;
        };
        let instance = &self.instances[index];
        debug_assert_eq!(instance.rhport, rhport);
        let (itf_num, ep_in, ep_out) = (instance.itf_num, instance.ep_in, instance.ep_out);

        if result != XferResult::Success {
            // The application may take over recovery; otherwise keep the OUT
            // endpoint listening and drop the failure.
            if !self.handler.report_issue(itf_num, ep_addr, result, data.len())
                && ep_addr == ep_out
            {
                log::warn!("x360: OUT transfer failed ({:?}), re-arming", result);
                let _ = stack.endpoint_out(rhport, ep_out, OUT_TRANSFER_LEN);
            }
            return;
        }

        if ep_addr == ep_in {
            self.handler.report_complete(itf_num, data);
        } else if ep_addr == ep_out {
            self.out_received(index, data);
            let _ = stack.endpoint_out(rhport, ep_out, OUT_TRANSFER_LEN);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controls_round_trip() {
        let controls = Controls {
            buttons: Buttons::A | Buttons::DPAD_LEFT | Buttons::RIGHT_BUMPER,
            left_trigger: 0x20,
            right_trigger: 0xff,
            left_stick_x: -32768,
            left_stick_y: 32767,
            right_stick_x: -1,
            right_stick_y: 0x1234,
        };
        assert_eq!(Controls::from_bytes(&controls.to_bytes()), controls);
    }

    #[test]
    fn controls_wire_layout() {
        let controls = Controls {
            buttons: Buttons::A,
            ..Controls::default()
        };
        let bytes = controls.to_bytes();
        // A is bit 12 of the little-endian button word.
        assert_eq!(bytes[0], 0x00);
        assert_eq!(bytes[1], 0x10);
        assert_eq!(&bytes[2..], &[0; 16]);

        let controls = Controls {
            left_stick_x: 0x0102,
            ..Controls::default()
        };
        assert_eq!(controls.to_bytes()[4..6], [0x02, 0x01]);
    }

    #[test]
    fn led_animation_codes() {
        assert_eq!(LedAnimation::from_code(0x00), Some(LedAnimation::AllOff));
        assert_eq!(LedAnimation::from_code(0x06), Some(LedAnimation::Slot1On));
        assert_eq!(LedAnimation::from_code(0x0f), Some(LedAnimation::BlinkOnce));
        assert_eq!(LedAnimation::from_code(0x10), None);
    }

    #[test]
    fn reserved_button_bit_survives_round_trip() {
        let buttons = Buttons::from_bits_retain(1 << 11 | Buttons::Y.bits());
        let controls = Controls {
            buttons,
            ..Controls::default()
        };
        assert_eq!(Controls::from_bytes(&controls.to_bytes()).buttons, buttons);
    }
}
