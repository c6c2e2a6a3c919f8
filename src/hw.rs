// SPDX-License-Identifier: GPL-3.0-only

//! Trait seams toward the hardware collaborators.
//!
//! The presentation core never talks to the kernel or the buffer
//! allocation library directly; it goes through [`ModeSetting`] and
//! [`PoolAllocator`]. Real backends live in [`crate::device`] and
//! [`crate::allocator`]; tests substitute recorders.

use crate::controller::{Controller, ControllerId};
use crate::error::SurfaceAllocationError;
use std::fmt;
use std::io;
use std::num::NonZeroU32;
use std::time::Duration;

/// Kernel framebuffer identifier. The kernel hands out non-zero ids, so
/// "no framebuffer registered" is modeled as `Option<FramebufferId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramebufferId(pub NonZeroU32);

/// Parameters for registering a scanout buffer as a kernel framebuffer.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub width: u32,
    pub height: u32,
    /// Color depth in bits, e.g. 24 for XRGB8888.
    pub depth: u32,
    /// Bits per pixel, e.g. 32 for XRGB8888.
    pub bpp: u32,
    /// Row stride in bytes.
    pub stride: u32,
    /// Kernel buffer handle backing the framebuffer.
    pub handle: NonZeroU32,
}

/// A flip completion event read from the kernel.
#[derive(Debug, Clone, Copy)]
pub struct FlipEvent {
    pub controller: ControllerId,
    /// Hardware frame counter at completion.
    pub frame: u32,
    /// Monotonic timestamp of the completing vblank.
    pub time: Duration,
}

/// Metadata handed to the frame callbacks for one completed frame.
#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    /// Per-device submission sequence number.
    pub sequence: u64,
    /// Hardware frame counter, if the frame completed through a kernel
    /// event rather than the synchronous fallback.
    pub hw_frame: Option<u32>,
    pub presentation_time: Option<Duration>,
}

/// Kernel mode-setting interface.
///
/// All calls take `&self`: the kernel device is shared, internally
/// synchronized state, and the core must be able to use it while holding
/// mutable borrows of its own bookkeeping.
pub trait ModeSetting {
    /// Timing mode descriptor carried by [`Controller`].
    type Mode: Clone + fmt::Debug;

    fn register_framebuffer(&self, info: &FramebufferInfo) -> io::Result<FramebufferId>;

    /// Unregistration failures are not actionable; implementations log
    /// and swallow them.
    fn unregister_framebuffer(&self, id: FramebufferId);

    /// Synchronous full configuration of one controller: framebuffer,
    /// position, connector set and timing mode. Implementations must omit
    /// the timing mode when the connector set is empty.
    fn configure_controller(
        &self,
        controller: &Controller<Self::Mode>,
        fb: FramebufferId,
    ) -> io::Result<()>;

    /// Schedule an asynchronous page flip on the next vblank; completion
    /// arrives later as a [`FlipEvent`].
    fn schedule_flip(&self, controller: ControllerId, fb: FramebufferId) -> io::Result<()>;

    /// Drain currently pending completion events without blocking.
    fn drain_events(&self) -> io::Result<Vec<FlipEvent>>;

    /// Block until at least one completion event arrives, then drain.
    fn wait_events(&self) -> io::Result<Vec<FlipEvent>>;
}

/// Buffer allocation library: creates scanout-capable buffer pools.
pub trait PoolAllocator {
    type Pool: ScanoutPool;

    fn create_pool(&self, width: u32, height: u32) -> Result<Self::Pool, SurfaceAllocationError>;
}

/// A bounded pool of scanout buffers behind one rendering surface.
pub trait ScanoutPool {
    type Buffer: ScanoutBuffer;

    /// Lock the most recently rendered buffer for scanout. Dropping the
    /// returned buffer releases it back to the pool.
    fn lock_front(&mut self) -> Result<Self::Buffer, SurfaceAllocationError>;

    fn size(&self) -> (u32, u32);
}

/// An individual scanout buffer locked out of its pool.
pub trait ScanoutBuffer {
    fn framebuffer_info(&self) -> FramebufferInfo;
}

/// Rendering-context collaborator.
///
/// The core wraps the context's surface-swap entry point
/// ([`RenderHook::finish_frame`]) and tells the context when a buffer
/// pool of different dimensions becomes active.
pub trait RenderHook<P> {
    type Target;

    /// Eagerly create a rendering target bound to `pool`. Called at
    /// surface creation and on resize, possibly long before the target is
    /// installed.
    fn create_target(&mut self, pool: &P) -> Result<Self::Target, SurfaceAllocationError>;

    /// Install a previously created target, replacing the active one, and
    /// adopt the new framebuffer dimensions.
    fn install_target(&mut self, target: Self::Target, width: u32, height: u32);

    /// Finish the frame on the rendering API, so the pool's front buffer
    /// holds the rendered content.
    fn finish_frame(&mut self);
}

/// For hosts that drive their rendering API themselves and only need the
/// presentation pipeline.
impl<P> RenderHook<P> for () {
    type Target = ();

    fn create_target(&mut self, _pool: &P) -> Result<(), SurfaceAllocationError> {
        Ok(())
    }

    fn install_target(&mut self, _target: (), _width: u32, _height: u32) {}

    fn finish_frame(&mut self) {}
}

/// Client-visible frame callbacks, fired from the notification flush.
pub trait FrameHandler {
    /// The previous frame left the screen; rendering the next one may
    /// begin.
    fn frame_synchronized(&mut self, _frame: &FrameInfo) {}

    /// The submitted frame is on screen (or was dropped in its favor).
    fn frame_complete(&mut self, frame: &FrameInfo);
}
