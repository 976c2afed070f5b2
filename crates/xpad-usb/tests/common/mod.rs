#![allow(dead_code)] // each integration test binary uses a different subset

//! Scripted device-stack double for exercising the class drivers.
//!
//! `MockStack` records every endpoint operation a driver performs and lets a
//! test play the host: submit SETUP packets stage by stage, deliver endpoint
//! completions and inspect what the driver queued in response.

use xpad_usb::descriptor::EndpointDescriptor;
use xpad_usb::{ClassDriver, ControlStage, DeviceStack, SetupPacket, UsbError, XferResult};

/// Control-pipe action queued by the driver at the setup stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlAction {
    /// Data + status stages replying with these bytes (already clamped to
    /// `wLength`).
    Reply(Vec<u8>),
    /// Data-OUT stage receiving up to this many bytes.
    Receive(usize),
    /// Zero-length status stage.
    Status,
}

/// Outcome of driving a whole control transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlResult {
    Stalled,
    Data(Vec<u8>),
    Ok,
}

#[derive(Debug, Default)]
pub struct MockStack {
    pub configured: bool,
    /// Endpoints opened via `endpoint_open`.
    pub opened: Vec<EndpointDescriptor>,
    claimed: Vec<u8>,
    busy: Vec<u8>,
    /// Outstanding IN submissions (endpoint, payload).
    pub in_transfers: Vec<(u8, Vec<u8>)>,
    /// Outstanding OUT arms (endpoint, capacity).
    pub out_arms: Vec<(u8, usize)>,
    /// Action queued by the last control setup stage.
    pub control: Option<ControlAction>,
}

impl MockStack {
    pub fn new() -> Self {
        Self {
            configured: true,
            ..Self::default()
        }
    }

    pub fn armed_len(&self, ep_addr: u8) -> Option<usize> {
        self.out_arms
            .iter()
            .rev()
            .find(|(ep, _)| *ep == ep_addr)
            .map(|(_, len)| *len)
    }

    pub fn last_in_transfer(&self, ep_addr: u8) -> Option<&[u8]> {
        self.in_transfers
            .iter()
            .rev()
            .find(|(ep, _)| *ep == ep_addr)
            .map(|(_, data)| data.as_slice())
    }

    fn finish_transfer(&mut self, ep_addr: u8) {
        self.busy.retain(|ep| *ep != ep_addr);
        self.claimed.retain(|ep| *ep != ep_addr);
    }
}

impl DeviceStack for MockStack {
    fn configured(&self) -> bool {
        self.configured
    }

    fn endpoint_open(&mut self, _rhport: u8, desc: &EndpointDescriptor) -> Result<(), UsbError> {
        self.opened.push(*desc);
        Ok(())
    }

    fn endpoint_claim(&mut self, _rhport: u8, ep_addr: u8) -> bool {
        if self.claimed.contains(&ep_addr) || self.busy.contains(&ep_addr) {
            return false;
        }
        self.claimed.push(ep_addr);
        true
    }

    fn endpoint_release(&mut self, _rhport: u8, ep_addr: u8) {
        self.claimed.retain(|ep| *ep != ep_addr);
    }

    fn endpoint_busy(&self, _rhport: u8, ep_addr: u8) -> bool {
        self.busy.contains(&ep_addr)
    }

    fn endpoint_in(&mut self, _rhport: u8, ep_addr: u8, data: &[u8]) -> Result<(), UsbError> {
        if self.busy.contains(&ep_addr) {
            return Err(UsbError::Busy);
        }
        self.busy.push(ep_addr);
        self.in_transfers.push((ep_addr, data.to_vec()));
        Ok(())
    }

    fn endpoint_out(&mut self, _rhport: u8, ep_addr: u8, max_len: usize) -> Result<(), UsbError> {
        if self.busy.contains(&ep_addr) {
            return Err(UsbError::Busy);
        }
        self.busy.push(ep_addr);
        self.out_arms.push((ep_addr, max_len));
        Ok(())
    }

    fn control_in(&mut self, _rhport: u8, setup: &SetupPacket, data: &[u8]) -> bool {
        let len = data.len().min(setup.w_length as usize);
        self.control = Some(ControlAction::Reply(data[..len].to_vec()));
        true
    }

    fn control_receive(&mut self, _rhport: u8, setup: &SetupPacket, max_len: usize) -> bool {
        let len = max_len.min(setup.w_length as usize);
        self.control = Some(ControlAction::Receive(len));
        true
    }

    fn control_status(&mut self, _rhport: u8, _setup: &SetupPacket) -> bool {
        self.control = Some(ControlAction::Status);
        true
    }
}

pub fn setup_packet(
    bm_request_type: u8,
    b_request: u8,
    w_value: u16,
    w_index: u16,
    w_length: u16,
) -> SetupPacket {
    SetupPacket {
        bm_request_type,
        b_request,
        w_value,
        w_index,
        w_length,
    }
}

/// Drive a complete control transfer through `handle` (one call per stage,
/// the way a device stack would).
///
/// `payload` is the data stage of an OUT transfer; it is clamped to the
/// length the driver prepared to receive.
pub fn run_control<F>(
    stack: &mut MockStack,
    setup: &SetupPacket,
    payload: &[u8],
    mut handle: F,
) -> ControlResult
where
    F: FnMut(&mut MockStack, ControlStage, &SetupPacket, &[u8]) -> bool,
{
    stack.control = None;
    if !handle(stack, ControlStage::Setup, setup, &[]) {
        return ControlResult::Stalled;
    }

    match stack.control.take() {
        Some(ControlAction::Reply(data)) => {
            handle(stack, ControlStage::Data, setup, &[]);
            handle(stack, ControlStage::Ack, setup, &[]);
            ControlResult::Data(data)
        }
        Some(ControlAction::Receive(capacity)) => {
            let len = payload.len().min(capacity);
            handle(stack, ControlStage::Data, setup, &[]);
            handle(stack, ControlStage::Ack, setup, &payload[..len]);
            ControlResult::Ok
        }
        Some(ControlAction::Status) => {
            handle(stack, ControlStage::Ack, setup, &[]);
            ControlResult::Ok
        }
        None => panic!("driver handled the setup stage without queueing a control action"),
    }
}

/// Drive a control transfer against a `ClassDriver`.
pub fn run_driver_control(
    stack: &mut MockStack,
    driver: &mut dyn ClassDriver,
    rhport: u8,
    setup: &SetupPacket,
    payload: &[u8],
) -> ControlResult {
    run_control(stack, setup, payload, |stack, stage, setup, data| {
        driver.control_xfer(stack, rhport, stage, setup, data)
    })
}

/// Complete the outstanding IN transfer on `ep_addr` and return its bytes.
pub fn complete_in(
    stack: &mut MockStack,
    driver: &mut dyn ClassDriver,
    rhport: u8,
    ep_addr: u8,
) -> Vec<u8> {
    let pos = stack
        .in_transfers
        .iter()
        .rposition(|(ep, _)| *ep == ep_addr)
        .expect("no IN transfer outstanding");
    let (_, data) = stack.in_transfers.remove(pos);
    stack.finish_transfer(ep_addr);
    driver.xfer_complete(stack, rhport, ep_addr, XferResult::Success, &data);
    data
}

/// Deliver host bytes to the armed OUT endpoint.
pub fn deliver_out(
    stack: &mut MockStack,
    driver: &mut dyn ClassDriver,
    rhport: u8,
    ep_addr: u8,
    data: &[u8],
) {
    let pos = stack
        .out_arms
        .iter()
        .rposition(|(ep, _)| *ep == ep_addr)
        .expect("OUT endpoint not armed");
    let (_, capacity) = stack.out_arms.remove(pos);
    let len = data.len().min(capacity);
    stack.finish_transfer(ep_addr);
    driver.xfer_complete(stack, rhport, ep_addr, XferResult::Success, &data[..len]);
}

/// Deliver a transfer failure on `ep_addr`.
pub fn fail_transfer(
    stack: &mut MockStack,
    driver: &mut dyn ClassDriver,
    rhport: u8,
    ep_addr: u8,
    result: XferResult,
) {
    stack.in_transfers.retain(|(ep, _)| *ep != ep_addr);
    stack.out_arms.retain(|(ep, _)| *ep != ep_addr);
    stack.finish_transfer(ep_addr);
    driver.xfer_complete(stack, rhport, ep_addr, result, &[]);
}
