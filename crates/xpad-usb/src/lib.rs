//! Device-side USB class drivers for XInput gamepads and custom HID
//! interfaces.
//!
//! This crate provides the class-driver half of a USB device: given a device
//! stack that performs enumeration, routes SETUP packets and moves bytes on
//! endpoints (abstracted by the [`DeviceStack`] trait), the drivers here bind
//! interfaces out of a packed configuration-descriptor stream, run the
//! control-request state machines and shuttle reports between the application
//! and the host.
//!
//! Three cooperating pieces:
//!
//! * [`x360::X360Driver`]: the unofficial Xbox 360 / XInput gamepad class
//!   (`FF/5D/01` interface triple). 20-byte input reports out, rumble and LED
//!   messages in, plus the vendor-coded capability and serial requests the
//!   XUSB driver issues during enumeration.
//! * [`hid::CustomHidDriver`]: a generic HID class driver that exposes the
//!   full HID control protocol (descriptor retrieval, GET/SET_REPORT,
//!   GET/SET_IDLE, GET/SET_PROTOCOL) without tying the interrupt data path to
//!   a fixed report layout.
//! * [`msos::MsOsDescriptors`]: the Microsoft OS 1.0 "no driver install"
//!   responder. It serves the magic string descriptor at index 0xEE and the
//!   vendor-coded compat-ID / extended-properties feature descriptors that
//!   make Windows auto-bind `XUSB10` to the gamepad interface.
//!
//! [`gamepad`] carries the stock descriptor tables for a wired pad so an
//! application only has to wire the callbacks.
//!
//! Everything is `no_std` and allocation-free: transfer buffers live inside
//! the per-interface instance records (4-byte aligned for DMA-backed stacks)
//! and descriptor builders write into caller-provided storage.

#![no_std]

pub mod descriptor;
pub mod gamepad;
pub mod hid;
pub mod msos;
mod setup;
mod stack;
pub mod x360;

pub use setup::{ControlStage, RequestDirection, RequestRecipient, RequestType, SetupPacket};
pub use stack::{ClassDriver, DeviceStack, UsbError, XferResult};
