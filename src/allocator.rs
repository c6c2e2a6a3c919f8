// SPDX-License-Identifier: GPL-3.0-only

//! Scanout buffer allocation over the gbm library.

use crate::error::{DeviceInitError, SurfaceAllocationError};
use crate::hw::{FramebufferInfo, PoolAllocator, ScanoutBuffer, ScanoutPool};
use drm::buffer::Buffer;
use gbm::{BufferObject, BufferObjectFlags, Device, Format, Surface};
use std::os::fd::{AsFd, OwnedFd};
use tracing::debug;

// scanout framebuffers are registered as XRGB8888
const DEPTH: u32 = 24;
const BPP: u32 = 32;

/// gbm-backed allocator for presentable buffer pools.
pub struct GbmScanout {
    device: Device<OwnedFd>,
}

impl GbmScanout {
    /// Create the allocation device on a duplicate of the mode-setting
    /// descriptor.
    pub fn new(kms: &impl AsFd) -> Result<Self, DeviceInitError> {
        let fd = kms
            .as_fd()
            .try_clone_to_owned()
            .map_err(DeviceInitError::Allocator)?;
        let device = Device::new(fd).map_err(DeviceInitError::Allocator)?;
        Ok(GbmScanout { device })
    }

    /// The underlying gbm device, e.g. for creating a rendering-API
    /// display on top of it.
    pub fn device(&self) -> &Device<OwnedFd> {
        &self.device
    }
}

impl PoolAllocator for GbmScanout {
    type Pool = GbmPool;

    fn create_pool(&self, width: u32, height: u32) -> Result<GbmPool, SurfaceAllocationError> {
        debug!(width, height, "creating scanout surface");
        let surface = self
            .device
            .create_surface::<()>(
                width,
                height,
                Format::Xrgb8888,
                BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING,
            )
            .map_err(SurfaceAllocationError::PoolCreation)?;
        Ok(GbmPool {
            surface,
            size: (width, height),
        })
    }
}

/// A gbm surface acting as the bounded scanout buffer pool.
pub struct GbmPool {
    surface: Surface<()>,
    size: (u32, u32),
}

impl ScanoutPool for GbmPool {
    type Buffer = GbmBuffer;

    fn lock_front(&mut self) -> Result<GbmBuffer, SurfaceAllocationError> {
        // SAFETY: lock_front is only called after the rendering context
        // finished its frame on this surface, so a front buffer is pending
        // as gbm requires.
        let bo = unsafe { self.surface.lock_front_buffer() }
            .map_err(|err| SurfaceAllocationError::LockFront(err.to_string()))?;
        Ok(GbmBuffer { bo })
    }

    fn size(&self) -> (u32, u32) {
        self.size
    }
}

/// A locked front buffer; dropping it releases the buffer back to its
/// surface.
pub struct GbmBuffer {
    bo: BufferObject<()>,
}

impl ScanoutBuffer for GbmBuffer {
    fn framebuffer_info(&self) -> FramebufferInfo {
        let (width, height) = Buffer::size(&self.bo);
        FramebufferInfo {
            width,
            height,
            depth: DEPTH,
            bpp: BPP,
            stride: Buffer::pitch(&self.bo),
            handle: Buffer::handle(&self.bo).into(),
        }
    }
}
