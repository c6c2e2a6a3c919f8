// SPDX-License-Identifier: GPL-3.0-only

//! Mode-setting backend over the kernel DRM interface.

use crate::controller::{Controller, ControllerId};
use crate::error::DeviceInitError;
use crate::hw::{FlipEvent, FramebufferId, FramebufferInfo, ModeSetting};
use drm::buffer::{Buffer, DrmFourcc, Handle as BufferHandle};
use drm::control::{Device as ControlDevice, Event, Mode, PageFlipFlags, connector, crtc, framebuffer};
use std::fs::OpenOptions;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::{debug, trace};

/// Handle to a kernel mode-setting device node.
pub struct KmsDevice {
    fd: OwnedFd,
}

impl AsFd for KmsDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl drm::Device for KmsDevice {}
impl ControlDevice for KmsDevice {}

impl KmsDevice {
    /// Open the device node at `path` non-blocking and validate it by
    /// enumerating its mode-setting resources.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DeviceInitError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK | libc::O_CLOEXEC)
            .open(path.as_ref())
            .map_err(DeviceInitError::Open)?;
        Self::from_fd(file.into())
    }

    /// Wrap an externally acquired device descriptor, e.g. one leased
    /// from a session manager. The descriptor should be non-blocking;
    /// event draining treats `EAGAIN` as "no events pending".
    pub fn from_fd(fd: OwnedFd) -> Result<Self, DeviceInitError> {
        let device = KmsDevice { fd };
        let resources = device
            .resource_handles()
            .map_err(DeviceInitError::Resources)?;
        debug!(
            crtcs = resources.crtcs().len(),
            connectors = resources.connectors().len(),
            "mode-setting device ready"
        );
        Ok(device)
    }

    fn collect_events(&self) -> io::Result<Vec<FlipEvent>> {
        let mut completed = Vec::new();
        for event in ControlDevice::receive_events(self)? {
            match event {
                Event::PageFlip(flip) => completed.push(FlipEvent {
                    controller: ControllerId(flip.crtc.into()),
                    frame: flip.frame,
                    time: flip.duration,
                }),
                _ => trace!("ignoring non-flip kernel event"),
            }
        }
        Ok(completed)
    }
}

/// Scanout buffer description viewed through the drm buffer interface,
/// so a kernel framebuffer can be registered from bare parameters.
struct FbSource<'a>(&'a FramebufferInfo);

impl Buffer for FbSource<'_> {
    fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Xrgb8888
    }

    fn pitch(&self) -> u32 {
        self.0.stride
    }

    fn handle(&self) -> BufferHandle {
        self.0.handle.into()
    }
}

impl ModeSetting for KmsDevice {
    type Mode = Mode;

    fn register_framebuffer(&self, info: &FramebufferInfo) -> io::Result<FramebufferId> {
        let handle = self.add_framebuffer(&FbSource(info), info.depth, info.bpp)?;
        Ok(FramebufferId(handle.into()))
    }

    fn unregister_framebuffer(&self, id: FramebufferId) {
        if let Err(err) = self.destroy_framebuffer(framebuffer::Handle::from(id.0)) {
            trace!(?err, "framebuffer removal failed");
        }
    }

    fn configure_controller(
        &self,
        controller: &Controller<Mode>,
        fb: FramebufferId,
    ) -> io::Result<()> {
        let connectors: Vec<connector::Handle> = controller
            .connectors
            .iter()
            .map(|conn| connector::Handle::from(conn.0))
            .collect();
        // a controller without connectors is programmed without a mode
        let mode = if connectors.is_empty() {
            None
        } else {
            Some(controller.mode)
        };
        self.set_crtc(
            crtc::Handle::from(controller.id.0),
            Some(framebuffer::Handle::from(fb.0)),
            controller.position,
            &connectors,
            mode,
        )
    }

    fn schedule_flip(&self, controller: ControllerId, fb: FramebufferId) -> io::Result<()> {
        self.page_flip(
            crtc::Handle::from(controller.0),
            framebuffer::Handle::from(fb.0),
            PageFlipFlags::EVENT,
            None,
        )
    }

    fn drain_events(&self) -> io::Result<Vec<FlipEvent>> {
        self.collect_events()
    }

    fn wait_events(&self) -> io::Result<Vec<FlipEvent>> {
        loop {
            let mut pollfd = libc::pollfd {
                fd: self.fd.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            let ret = unsafe { libc::poll(&mut pollfd, 1, -1) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            match self.collect_events() {
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
                result => return result,
            }
        }
    }
}
