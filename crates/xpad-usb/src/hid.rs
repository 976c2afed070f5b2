//! Custom HID class driver.
//!
//! Unlike a fixed-function HID implementation, this driver exposes the whole
//! HID control protocol (descriptor retrieval, GET/SET_REPORT, GET/SET_IDLE,
//! GET/SET_PROTOCOL) while leaving the report formats entirely to the
//! application: reports are opaque byte slices moved over the interrupt
//! endpoints or the control pipe.
//!
//! Receiving on the interrupt OUT endpoint is explicitly armed with
//! [`CustomHidDriver::receive_report`] and disarms after every delivery, so
//! the application controls the backpressure; an unarmed endpoint NAKs the
//! host until the application is ready again.

use crate::descriptor::{self, InterfaceDescriptor, TransferKind, DESC_HID, DESC_HID_PHYSICAL, DESC_HID_REPORT};
use crate::setup::{ControlStage, RequestDirection, RequestRecipient, RequestType, SetupPacket};
use crate::stack::{ClassDriver, DeviceStack, UsbError, XferResult};

pub const INTERFACE_CLASS: u8 = 0x03;

/// Standard request handled by the driver (descriptor retrieval only;
/// SET_DESCRIPTOR is not supported).
const REQUEST_GET_DESCRIPTOR: u8 = 0x06;

/// HID class requests.
pub const REQUEST_GET_REPORT: u8 = 0x01;
pub const REQUEST_GET_IDLE: u8 = 0x02;
pub const REQUEST_GET_PROTOCOL: u8 = 0x03;
pub const REQUEST_SET_REPORT: u8 = 0x09;
pub const REQUEST_SET_IDLE: u8 = 0x0a;
pub const REQUEST_SET_PROTOCOL: u8 = 0x0b;

/// Report id passed to [`HidHandler::report_received`] for reports arriving
/// on the interrupt OUT endpoint, where no id is carried out of band.
pub const REPORT_ID_NONE: u8 = 0xff;

/// Largest HID sub-descriptor the driver will stash (`bNumDescriptors` up to
/// 8 class descriptors).
const HID_DESCRIPTOR_MAX_LEN: usize = 30;

/// Protocol mode of an interface (GET/SET_PROTOCOL).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum HidProtocol {
    Boot = 0,
    #[default]
    Report = 1,
}

impl HidProtocol {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Boot),
            1 => Some(Self::Report),
            _ => None,
        }
    }
}

/// Report type as carried in the high byte of `wValue` for
/// GET_REPORT/SET_REPORT.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ReportType {
    Input = 1,
    Output = 2,
    Feature = 3,
}

impl ReportType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Input),
            2 => Some(Self::Output),
            3 => Some(Self::Feature),
            _ => None,
        }
    }
}

/// Application callbacks.
///
/// `report_descriptor` and `get_report` are mandatory (a HID interface
/// cannot function without them); everything else has a default that maps to
/// "not supported", which the driver turns into a stall where the protocol
/// requires one.
pub trait HidHandler {
    /// The report descriptor for this interface. Must stay valid for the
    /// duration of the control transfer.
    fn report_descriptor(&mut self, itf_num: u8) -> &[u8];

    /// A physical descriptor (`desc_index` 0 queries the set count/sizes).
    fn physical_descriptor(&mut self, itf_num: u8, desc_index: u8) -> Option<&[u8]> {
        let _ = (itf_num, desc_index);
        None
    }

    /// GET_REPORT: produce the requested report. `None` stalls.
    fn get_report(&mut self, itf_num: u8, report_id: u8, report_type: ReportType)
        -> Option<&[u8]>;

    /// SET_REPORT: how many bytes the application accepts for this report.
    /// `None` stalls the request.
    fn set_report(&mut self, itf_num: u8, report_id: u8, report_type: ReportType)
        -> Option<usize> {
        let _ = (itf_num, report_id, report_type);
        None
    }

    /// A report arrived, either through SET_REPORT (with the request's
    /// id/type) or on the interrupt OUT endpoint (id [`REPORT_ID_NONE`],
    /// type [`ReportType::Output`]). After an interrupt OUT delivery the
    /// endpoint is disarmed until [`CustomHidDriver::receive_report`] is
    /// called again.
    fn report_received(
        &mut self,
        itf_num: u8,
        report_id: u8,
        report_type: ReportType,
        data: &[u8],
    ) {
        let _ = (itf_num, report_id, report_type, data);
    }

    /// GET_IDLE for a specific report id (id 0 is answered from driver
    /// state). `None` stalls.
    fn get_idle(&mut self, itf_num: u8, report_id: u8) -> Option<u8> {
        let _ = (itf_num, report_id);
        None
    }

    /// SET_IDLE notification. `duration` is in 4 ms units, 0 = indefinite.
    fn set_idle(&mut self, itf_num: u8, report_id: u8, duration: u8) {
        let _ = (itf_num, report_id, duration);
    }

    /// SET_PROTOCOL notification (state is already updated).
    fn set_protocol(&mut self, itf_num: u8, protocol: HidProtocol) {
        let _ = (itf_num, protocol);
    }

    /// The interface opened with an interrupt OUT endpoint; the application
    /// should arm it with [`CustomHidDriver::receive_report`] when ready.
    fn out_endpoint_opened(&mut self, itf_num: u8) {
        let _ = itf_num;
    }

    /// An IN report finished transmitting.
    fn report_sent(&mut self, itf_num: u8, report: &[u8]) {
        let _ = (itf_num, report);
    }

    /// A transfer finished with an error. Return `true` to take over
    /// recovery; `false` lets the driver re-arm an armed OUT endpoint with
    /// its previous capacity.
    fn report_issue(&mut self, itf_num: u8, ep_addr: u8, result: XferResult, len: usize) -> bool {
        let _ = (itf_num, ep_addr, result, len);
        false
    }
}

/// One bound HID interface. Free iff both endpoint addresses are zero.
#[derive(Clone, Copy, Debug)]
struct Instance {
    rhport: u8,
    itf_num: u8,
    ep_in: u8,
    ep_out: u8,
    protocol: HidProtocol,
    /// Idle rate for all reports, 4 ms per unit (0 = indefinite).
    idle_rate: u8,
    /// Verbatim copy of the HID sub-descriptor, replayed for
    /// GET_DESCRIPTOR(HID).
    hid_desc: [u8; HID_DESCRIPTOR_MAX_LEN],
    hid_desc_len: u8,
    /// Armed receive capacity of the interrupt OUT endpoint, if armed.
    out_armed: Option<usize>,
    /// Accepted length of an in-flight SET_REPORT data stage.
    ctrl_accept: usize,
}

/// The custom HID class driver: up to `N` interfaces, each with a `BUF`-byte
/// receive buffer for interrupt OUT reports.
pub struct CustomHidDriver<H: HidHandler, const N: usize, const BUF: usize> {
    handler: H,
    instances: [Instance; N],
    out_bufs: [[u8; BUF]; N],
}

impl<H: HidHandler, const N: usize, const BUF: usize> CustomHidDriver<H, N, BUF> {
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            instances: [Instance::FREE; N],
            out_bufs: [[0; BUF]; N],
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Whether the interface is bound, configured and idle enough to accept
    /// a new IN report.
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

    /// Current protocol mode (Boot or Report).
    pub fn protocol(&self, itf_num: u8) -> Option<HidProtocol> {
        let index = self.index_by_itf(itf_num)?;
        Some(self.instances[index].protocol)
    }

    /// Stored idle rate for all reports, in 4 ms units.
    pub fn idle_rate(&self, itf_num: u8) -> Option<u8> {
        let index = self.index_by_itf(itf_num)?;
        Some(self.instances[index].idle_rate)
    }

    /// Send an input report on the interrupt IN endpoint.
    ///
    /// The stack consumes the bytes at submission; completion is signalled
    /// through [`HidHandler::report_sent`]. Fails with [`UsbError::Busy`]
    /// while a previous report is outstanding.
    pub fn send_report(
        &mut self,
        stack: &mut dyn DeviceStack,
        itf_num: u8,
        report: &[u8],
    ) -> Result<(), UsbError> {
        let index = self.index_by_itf(itf_num).ok_or(UsbError::NotBound)?;
        let instance = &self.instances[index];
        if instance.ep_in == 0 {
            return Err(UsbError::EndpointUnavailable);
        }
        if report.is_empty() {
            return Err(UsbError::InvalidParameter);
        }
        if !stack.endpoint_claim(instance.rhport, instance.ep_in) {
            return Err(UsbError::Busy);
        }
        stack.endpoint_in(instance.rhport, instance.ep_in, report)
    }

    /// Arm the interrupt OUT endpoint to receive up to `len` bytes.
    ///
    /// The endpoint stays armed until a report is delivered (or the bus
    /// resets); each delivery requires a fresh call.
    pub fn receive_report(
        &mut self,
        stack: &mut dyn DeviceStack,
        itf_num: u8,
        len: usize,
    ) -> Result<(), UsbError> {
        let index = self.index_by_itf(itf_num).ok_or(UsbError::NotBound)?;
        let instance = &mut self.instances[index];
        if instance.ep_out == 0 {
            return Err(UsbError::EndpointUnavailable);
        }
        if len == 0 {
            return Err(UsbError::InvalidParameter);
        }
        if len > BUF {
            return Err(UsbError::BufferOverflow);
        }
        stack.endpoint_out(instance.rhport, instance.ep_out, len)?;
        instance.out_armed = Some(len);
        Ok(())
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

    fn standard_request(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        index: usize,
        stage: ControlStage,
        setup: &SetupPacket,
    ) -> bool {
        if setup.b_request != REQUEST_GET_DESCRIPTOR {
            return false;
        }

        match setup.descriptor_type() {
            DESC_HID => {
                if stage != ControlStage::Setup {
                    return true;
                }
                let instance = &self.instances[index];
                if instance.hid_desc_len == 0 {
                    return false;
                }
                stack.control_in(
                    rhport,
                    setup,
                    &instance.hid_desc[..instance.hid_desc_len as usize],
                )
            }
            DESC_HID_REPORT => {
                if stage != ControlStage::Setup {
                    return true;
                }
                let itf_num = self.instances[index].itf_num;
                let report_desc = self.handler.report_descriptor(itf_num);
                if report_desc.is_empty() {
                    return false;
                }
                stack.control_in(rhport, setup, report_desc)
            }
            DESC_HID_PHYSICAL => {
                if stage != ControlStage::Setup {
                    return true;
                }
                let itf_num = self.instances[index].itf_num;
                match self
                    .handler
                    .physical_descriptor(itf_num, setup.descriptor_index())
                {
                    Some(desc) if !desc.is_empty() => stack.control_in(rhport, setup, desc),
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn class_request(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        index: usize,
        stage: ControlStage,
        setup: &SetupPacket,
        data: &[u8],
    ) -> bool {
        let itf_num = self.instances[index].itf_num;
        let report_id = (setup.w_value & 0x00ff) as u8;
        let report_type_raw = (setup.w_value >> 8) as u8;

        match setup.b_request {
            REQUEST_GET_REPORT => {
                if setup.direction() != RequestDirection::DeviceToHost {
                    return false;
                }
                if stage != ControlStage::Setup {
                    return true;
                }
                let Some(report_type) = ReportType::from_u8(report_type_raw) else {
                    return false;
                };
                match self.handler.get_report(itf_num, report_id, report_type) {
                    Some(report) if !report.is_empty() => stack.control_in(rhport, setup, report),
                    _ => false,
                }
            }
            REQUEST_SET_REPORT => {
                if setup.direction() != RequestDirection::HostToDevice {
                    return false;
                }
                let Some(report_type) = ReportType::from_u8(report_type_raw) else {
                    return false;
                };
                match stage {
                    ControlStage::Setup => {
                        let Some(accept) =
                            self.handler.set_report(itf_num, report_id, report_type)
                        else {
                            return false;
                        };
                        if accept == 0 {
                            return false;
                        }
                        self.instances[index].ctrl_accept = accept;
                        stack.control_receive(rhport, setup, accept)
                    }
                    ControlStage::Data => true,
                    ControlStage::Ack => {
                        let accept = self.instances[index].ctrl_accept;
                        let len = data.len().min(accept);
                        self.handler
                            .report_received(itf_num, report_id, report_type, &data[..len]);
                        true
                    }
                }
            }
            REQUEST_GET_IDLE => {
                if setup.direction() != RequestDirection::DeviceToHost {
                    return false;
                }
                if stage != ControlStage::Setup {
                    return true;
                }
                if report_id == 0 {
                    // The idle rate for "all reports" lives in the instance.
                    let idle_rate = self.instances[index].idle_rate;
                    return stack.control_in(rhport, setup, &[idle_rate]);
                }
                match self.handler.get_idle(itf_num, report_id) {
                    Some(duration) => stack.control_in(rhport, setup, &[duration]),
                    None => false,
                }
            }
            REQUEST_SET_IDLE => {
                if setup.direction() != RequestDirection::HostToDevice {
                    return false;
                }
                if stage != ControlStage::Setup {
                    return true;
                }
                let duration = (setup.w_value >> 8) as u8;
                if report_id == 0 {
                    self.instances[index].idle_rate = duration;
                }
                self.handler.set_idle(itf_num, report_id, duration);
                stack.control_status(rhport, setup)
            }
            REQUEST_GET_PROTOCOL => {
                if setup.direction() != RequestDirection::DeviceToHost {
                    return false;
                }
                if stage != ControlStage::Setup {
                    return true;
                }
                let protocol = self.instances[index].protocol as u8;
                stack.control_in(rhport, setup, &[protocol])
            }
            REQUEST_SET_PROTOCOL => {
                if setup.direction() != RequestDirection::HostToDevice {
                    return false;
                }
                if stage != ControlStage::Setup {
                    return true;
                }
                let Some(protocol) = HidProtocol::from_u16(setup.w_value) else {
                    return false;
                };
                self.instances[index].protocol = protocol;
                self.handler.set_protocol(itf_num, protocol);
                stack.control_status(rhport, setup)
            }
            _ => false,
        }
    }
}

impl Instance {
    const FREE: Self = Self {
        rhport: 0,
        itf_num: 0,
        ep_in: 0,
        ep_out: 0,
        protocol: HidProtocol::Report,
        idle_rate: 0,
        hid_desc: [0; HID_DESCRIPTOR_MAX_LEN],
        hid_desc_len: 0,
        out_armed: None,
        ctrl_accept: 0,
    };

    fn is_free(&self) -> bool {
        self.ep_in == 0 && self.ep_out == 0
    }
}

impl<H: HidHandler, const N: usize, const BUF: usize> ClassDriver for CustomHidDriver<H, N, BUF> {
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
        if itf.b_interface_class != INTERFACE_CLASS {
            return None;
        }

        // Interface descriptor, HID sub-descriptor, then the endpoints.
        let mut offset = descriptor::INTERFACE_DESCRIPTOR_LEN;
        let header = descriptors.get(offset..offset + 2)?;
        let hid_len = header[0] as usize;
        if header[1] != DESC_HID || hid_len < 6 {
            log::warn!("hid: interface without HID descriptor");
            return None;
        }
        if hid_len > HID_DESCRIPTOR_MAX_LEN {
            log::warn!("hid: HID descriptor too large ({} bytes)", hid_len);
            return None;
        }

        let drv_len = offset + hid_len + itf.b_num_endpoints as usize * descriptor::ENDPOINT_DESCRIPTOR_LEN;
        if drv_len > descriptors.len() {
            log::warn!(
                "hid: descriptor block truncated ({} > {})",
                drv_len,
                descriptors.len()
            );
            return None;
        }
        let hid_desc = &descriptors[offset..offset + hid_len];
        offset += hid_len;

        let Some(index) = self.instances.iter().position(Instance::is_free) else {
            log::warn!("hid: no free instance slot");
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
                log::warn!("hid: endpoint open failed: {}", err);
                return None;
            }
        };

        let instance = &mut self.instances[index];
        *instance = Instance::FREE;
        instance.rhport = rhport;
        instance.itf_num = itf.b_interface_number;
        instance.ep_in = ep_in;
        instance.ep_out = ep_out;
        instance.hid_desc[..hid_len].copy_from_slice(hid_desc);
        instance.hid_desc_len = hid_len as u8;
        log::trace!(
            "hid: bound interface {} (ep_in {:#04x}, ep_out {:#04x})",
            itf.b_interface_number,
            ep_in,
            ep_out
        );

        // The application owns receive arming; tell it the OUT endpoint
        // exists so it can call receive_report.
        if ep_out != 0 {
            self.handler.out_endpoint_opened(itf.b_interface_number);
        }

        Some(drv_len)
    }

    fn control_xfer(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        stage: ControlStage,
        setup: &SetupPacket,
        data: &[u8],
    ) -> bool {
        if setup.recipient() != RequestRecipient::Interface {
            return false;
        }
        let Some(index) = self.index_by_itf(setup.w_index as u8) else {
            return false;
        };
        debug_assert_eq!(self.instances[index].rhport, rhport);

        match setup.request_type() {
            RequestType::Standard => self.standard_request(stack, rhport, index, stage, setup),
            RequestType::Class => self.class_request(stack, rhport, index, stage, setup, data),
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
            log::warn!("hid: completion for unknown endpoint {:#04x}", ep_addr);
            return;
        };
        let instance = &self.instances[index];
        debug_assert_eq!(instance.rhport, rhport);
        let (itf_num, ep_in, ep_out) = (instance.itf_num, instance.ep_in, instance.ep_out);

        if result != XferResult::Success {
            if !self.handler.report_issue(itf_num, ep_addr, result, data.len())
                && ep_addr == ep_out
            {
                // Re-arm with the previous capacity; the armed state is kept.
                if let Some(len) = self.instances[index].out_armed {
                    log::warn!("hid: OUT transfer failed ({:?}), re-arming", result);
                    let _ = stack.endpoint_out(rhport, ep_out, len);
                }
            }
            return;
        }

        if ep_addr == ep_in {
            self.handler.report_sent(itf_num, data);
        } else if ep_addr == ep_out {
            // Deliver and disarm: the application must call receive_report
            // again before the host can deliver more data.
            let capacity = self.instances[index].out_armed.take().unwrap_or(BUF).min(BUF);
            let len = data.len().min(capacity);
            self.out_bufs[index][..len].copy_from_slice(&data[..len]);
            self.handler.report_received(
                itf_num,
                REPORT_ID_NONE,
                ReportType::Output,
                &self.out_bufs[index][..len],
            );
        }
    }
}
