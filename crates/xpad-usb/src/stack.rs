//! The contract between class drivers and the device stack that hosts them.
//!
//! The stack side (enumeration engine, endpoint hardware, SETUP routing) is
//! deliberately out of scope for this crate; [`DeviceStack`] captures the
//! services a stack must offer so the drivers can be exercised against real
//! hardware glue or a scripted test double alike.

use crate::descriptor::EndpointDescriptor;
use crate::setup::{ControlStage, SetupPacket};

/// Outcome of a completed (non-control) endpoint transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum XferResult {
    Success,
    Failed,
    Stalled,
}

/// Errors surfaced by the driver application APIs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UsbError {
    /// No bound interface instance matches the given interface number.
    #[error("interface is not bound")]
    NotBound,
    /// The endpoint already has a transfer outstanding.
    #[error("endpoint is busy")]
    Busy,
    /// The interface has no endpoint for the requested direction.
    #[error("endpoint is not available")]
    EndpointUnavailable,
    /// A length or argument fell outside the allowed range.
    #[error("invalid parameter")]
    InvalidParameter,
    /// The data does not fit the instance transfer buffer.
    #[error("transfer buffer overflow")]
    BufferOverflow,
    /// The stack refused the transfer.
    #[error("rejected by the device stack")]
    Rejected,
}

/// Endpoint and control-pipe services a USB device stack exposes to its
/// class drivers.
///
/// Ownership rules, chosen so drivers never hand out long-lived borrows:
///
/// * [`endpoint_in`](Self::endpoint_in) consumes the payload at submission
///   (the stack copies it into its own transfer memory).
/// * [`endpoint_out`](Self::endpoint_out) arms a receive for up to `max_len`
///   bytes; the received payload is later lent to
///   [`ClassDriver::xfer_complete`] for the duration of that call.
/// * A transfer may only be submitted on a claimed or idle endpoint; the
///   claim is released by the stack when the completion is delivered.
pub trait DeviceStack {
    /// Whether the device is configured (a SET_CONFIGURATION completed).
    fn configured(&self) -> bool;

    /// Configure the hardware for an endpoint described by `desc`.
    fn endpoint_open(&mut self, rhport: u8, desc: &EndpointDescriptor) -> Result<(), UsbError>;

    /// Claim exclusive use of an endpoint.
    ///
    /// Fails (returns `false`) if the endpoint is already claimed or has a
    /// transfer outstanding. This is the primitive behind the drivers'
    /// at-most-one-outstanding guarantee.
    fn endpoint_claim(&mut self, rhport: u8, ep_addr: u8) -> bool;

    /// Release a claim taken with [`endpoint_claim`](Self::endpoint_claim).
    fn endpoint_release(&mut self, rhport: u8, ep_addr: u8);

    /// Whether the endpoint has a transfer outstanding.
    fn endpoint_busy(&self, rhport: u8, ep_addr: u8) -> bool;

    /// Queue `data` for transmission on an IN endpoint.
    fn endpoint_in(&mut self, rhport: u8, ep_addr: u8, data: &[u8]) -> Result<(), UsbError>;

    /// Arm an OUT endpoint to receive up to `max_len` bytes.
    fn endpoint_out(&mut self, rhport: u8, ep_addr: u8, max_len: usize) -> Result<(), UsbError>;

    /// Start the data and status stages of a control transfer, replying with
    /// `data` (the stack truncates to `wLength`).
    fn control_in(&mut self, rhport: u8, setup: &SetupPacket, data: &[u8]) -> bool;

    /// Prepare to receive the data stage of a control OUT transfer, up to
    /// `max_len` bytes. The received bytes are lent back to the driver at the
    /// [`ControlStage::Ack`] callback.
    fn control_receive(&mut self, rhport: u8, setup: &SetupPacket, max_len: usize) -> bool;

    /// Complete a request with a zero-length status stage.
    fn control_status(&mut self, rhport: u8, setup: &SetupPacket) -> bool;
}

/// A USB device class driver, as seen by the device stack.
pub trait ClassDriver {
    /// Invalidate all interface instances (bus reset or cable detach).
    fn reset(&mut self, rhport: u8);

    /// Offer the driver an interface from the configuration descriptor.
    ///
    /// `descriptors` starts at an interface descriptor and extends to the end
    /// of the configuration (the caller's `max_len`). A driver that
    /// recognizes the interface binds it, opens its endpoints and returns the
    /// number of bytes it consumed; `None` declines the offer.
    fn open(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        descriptors: &[u8],
    ) -> Option<usize>;

    /// Handle one stage of a control transfer addressed to this driver.
    ///
    /// `data` carries the received payload of an OUT data stage and is only
    /// non-empty at [`ControlStage::Ack`]. Returning `false` tells the stack
    /// to stall the control endpoint.
    fn control_xfer(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        stage: ControlStage,
        setup: &SetupPacket,
        data: &[u8],
    ) -> bool;

    /// Completion of a transfer on a non-control endpoint.
    ///
    /// For OUT endpoints `data` is the received payload; for IN endpoints it
    /// echoes the bytes that were sent. The borrow ends with the call.
    fn xfer_complete(
        &mut self,
        stack: &mut dyn DeviceStack,
        rhport: u8,
        ep_addr: u8,
        result: XferResult,
        data: &[u8],
    );
}
