// SPDX-License-Identifier: GPL-3.0-only

//! Double-buffered presentation backend for kernel mode-setting (KMS)
//! displays.
//!
//! The core is [`DevicePresenter`]: it owns the swap chain of the
//! device's single presentable surface, fans page flips out to every
//! active display controller, counts the asynchronous kernel
//! acknowledgements, and defers the client-visible frame callbacks to
//! the host's explicit dispatch point. When the kernel turns out not to
//! support flip scheduling, the presenter permanently degrades to
//! synchronous full mode-sets.
//!
//! Hardware access goes through the trait seams in [`hw`]; the real
//! backends over the `drm` and `gbm` crates are [`device::KmsDevice`]
//! and [`allocator::GbmScanout`]. [`event_loop`] wires a presenter into
//! a calloop-driven host.

pub mod allocator;
pub mod controller;
pub mod device;
pub mod error;
pub mod event_loop;
pub mod hw;
mod notify;
pub mod presenter;
mod swapchain;

pub use allocator::GbmScanout;
pub use controller::{ConnectorId, Controller, ControllerId};
pub use device::KmsDevice;
pub use error::{DeviceInitError, SubmitError, SurfaceAllocationError};
pub use hw::{
    FlipEvent, FrameHandler, FrameInfo, FramebufferId, FramebufferInfo, ModeSetting,
    PoolAllocator, RenderHook, ScanoutBuffer, ScanoutPool,
};
pub use presenter::{DevicePresenter, Present, Submission};
