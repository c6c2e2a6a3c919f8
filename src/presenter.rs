// SPDX-License-Identifier: GPL-3.0-only

//! The per-device presentation state machine.
//!
//! [`DevicePresenter`] owns the swap chain of the device's single
//! presentable surface, fans page flips out to every active display
//! controller, counts the asynchronous kernel acknowledgements, and
//! defers client-visible frame callbacks until the host's explicit
//! dispatch point.

use crate::controller::{Controller, ControllerId};
use crate::error::{SubmitError, SurfaceAllocationError};
use crate::hw::{
    FlipEvent, FrameHandler, FrameInfo, FramebufferId, ModeSetting, PoolAllocator, RenderHook,
    ScanoutBuffer, ScanoutPool,
};
use crate::notify::NotifyScheduler;
use crate::swapchain::{Onscreen, Slot};
use std::io;
use tracing::{debug, trace, warn};

/// Host-facing presentation interface, object-safe for event-loop glue.
pub trait Present {
    /// Present the frame most recently rendered into the surface's buffer
    /// pool.
    fn submit(&mut self) -> Result<Submission, SubmitError>;

    /// The kernel event descriptor became readable; parse and route
    /// completion events.
    fn on_event(&mut self);

    /// The host reached its dispatch point; fire owed frame callbacks.
    fn flush_notifications(&mut self);

    /// Whether a deferred flush became due since the last call. The host
    /// loop glue turns this into a one-shot idle task.
    fn take_deferred_flush(&mut self) -> bool;
}

/// Outcome of a frame submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Flips were scheduled; completion arrives via kernel events.
    Flipped { controllers: u32 },
    /// Degraded synchronous path; the frame is on screen and the request
    /// already resolved.
    Synchronous,
    /// No controller accepted the frame. The buffer was released and the
    /// completion notification queued anyway.
    Dropped,
}

/// One outstanding unit of presentation work: a frame submitted to N
/// controllers, resolved once all N acknowledge.
#[derive(Debug)]
struct FlipRequest {
    pending: u32,
}

/// Presentation pipeline of one mode-setting device.
pub struct DevicePresenter<M, A, R>
where
    M: ModeSetting,
    A: PoolAllocator,
    R: RenderHook<A::Pool>,
{
    kms: M,
    allocator: A,
    render: R,
    handler: Box<dyn FrameHandler>,
    controllers: Vec<Controller<M::Mode>>,
    width: u32,
    height: u32,
    /// The next submission must fully reprogram every controller instead
    /// of flipping.
    pending_mode_set: bool,
    /// Sticky: flip scheduling failed with a non-transient error; all
    /// later frames go through the synchronous path. No recovery.
    flips_unsupported: bool,
    onscreen: Option<Onscreen<A::Pool, R::Target>>,
    inflight: Option<FlipRequest>,
    frame_counter: u64,
    notify: NotifyScheduler,
}

impl<M, A, R> DevicePresenter<M, A, R>
where
    M: ModeSetting,
    A: PoolAllocator,
    R: RenderHook<A::Pool>,
{
    pub fn new(kms: M, allocator: A, render: R, handler: Box<dyn FrameHandler>) -> Self {
        DevicePresenter {
            kms,
            allocator,
            render,
            handler,
            controllers: Vec::new(),
            width: 0,
            height: 0,
            // the very first frame always needs a full mode-set
            pending_mode_set: true,
            flips_unsupported: false,
            onscreen: None,
            inflight: None,
            frame_counter: 0,
            notify: NotifyScheduler::default(),
        }
    }

    /// Create the device's presentable surface.
    ///
    /// Only one surface can exist per device. Buffer pool allocation is
    /// deferred while layout dimensions are still unknown.
    pub fn create_onscreen(&mut self) -> Result<(), SurfaceAllocationError> {
        if self.onscreen.is_some() {
            return Err(SurfaceAllocationError::AlreadyExists);
        }
        let mut onscreen = Onscreen::new();
        if self.width != 0 && self.height != 0 {
            let pool = self.allocator.create_pool(self.width, self.height)?;
            let target = self.render.create_target(&pool)?;
            self.render.install_target(target, self.width, self.height);
            onscreen.pool = Some(pool);
        }
        debug!(width = self.width, height = self.height, "onscreen created");
        self.onscreen = Some(onscreen);
        Ok(())
    }

    /// Tear down the presentable surface.
    ///
    /// A surface must not go away while a flip referencing its buffers is
    /// outstanding; this refuses and keeps the surface alive instead.
    pub fn destroy_onscreen(&mut self) {
        match self.onscreen.take() {
            None => {}
            Some(onscreen) if onscreen.next.is_some() => {
                warn!("refusing to destroy surface with a flip outstanding");
                self.onscreen = Some(onscreen);
            }
            Some(mut onscreen) => {
                if let Some(slot) = onscreen.current.take() {
                    slot.release(&self.kms);
                }
                debug!("onscreen destroyed");
            }
        }
    }

    /// Replace the device layout: overall dimensions and the controller
    /// set flips fan out to.
    ///
    /// On a dimension change with a live surface the replacement buffer
    /// pool and rendering target are allocated eagerly, but their
    /// installation is staged until the next submission so in-flight
    /// scanout keeps its buffers. The next submission reprograms every
    /// controller.
    pub fn set_layout(
        &mut self,
        width: u32,
        height: u32,
        controllers: &[Controller<M::Mode>],
    ) -> Result<(), SurfaceAllocationError> {
        let resized = width != self.width || height != self.height;
        if resized {
            if let Some(onscreen) = self.onscreen.as_mut() {
                let pool = self.allocator.create_pool(width, height)?;
                let target = self.render.create_target(&pool)?;
                if onscreen.pool.is_some() {
                    // a previously staged, never-installed pool is replaced
                    onscreen.staged_pool = Some(pool);
                    onscreen.staged_target = Some(target);
                } else {
                    self.render.install_target(target, width, height);
                    onscreen.pool = Some(pool);
                }
            }
        }
        self.width = width;
        self.height = height;
        self.controllers = controllers.to_vec();
        self.pending_mode_set = true;
        debug!(
            width,
            height,
            controllers = self.controllers.len(),
            "layout updated"
        );
        Ok(())
    }

    /// Re-arm the full mode-set for the next submission without changing
    /// the layout, e.g. after the device came back from an inactive
    /// session.
    pub fn queue_mode_reset(&mut self) {
        self.pending_mode_set = true;
    }

    /// Toggle a controller's exclusion from flip fan-out in place.
    pub fn set_ignore_controller(&mut self, id: ControllerId, ignore: bool) {
        if let Some(controller) = self.controllers.iter_mut().find(|c| c.id == id) {
            controller.ignore = ignore;
        }
    }

    /// Whether flip scheduling has been permanently disabled for this
    /// device.
    pub fn flip_scheduling_unsupported(&self) -> bool {
        self.flips_unsupported
    }

    /// Whether a submitted frame is still awaiting acknowledgement.
    pub fn has_pending_flip(&self) -> bool {
        self.onscreen.as_ref().is_some_and(|on| on.next.is_some())
    }

    pub fn layout_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn controllers(&self) -> &[Controller<M::Mode>] {
        &self.controllers
    }

    fn submit_frame(&mut self) -> Result<Submission, SubmitError> {
        // A prior submission still awaiting acknowledgement blocks this
        // one; drain kernel events until it resolves. On failure the
        // submission is aborted: overwriting the outstanding slot would
        // leak its framebuffer id and let the stale completion resolve
        // the new frame.
        while !self.flips_unsupported && self.has_pending_flip() {
            match self.kms.wait_events() {
                Ok(events) => {
                    for event in events {
                        self.complete(Some(event));
                    }
                }
                Err(err) => {
                    warn!(?err, "waiting for flip completion failed");
                    return Err(SubmitError::CompletionWait(err));
                }
            }
        }

        let width = self.width;
        let height = self.height;
        let Some(onscreen) = self.onscreen.as_mut() else {
            return Err(SubmitError::NoSurface);
        };

        // A rendering target staged by a resize must be active before the
        // surface swap, so the swap lands on the new target.
        if let Some(target) = onscreen.staged_target.take() {
            self.render.install_target(target, width, height);
        }

        // The wrapped surface-swap entry point. After this the pool's
        // front buffer holds the rendered frame.
        self.render.finish_frame();

        // Swap in a staged replacement pool now that the old one is done
        // rendering. The on-screen buffer belongs to the old pool and must
        // be released before the pool goes away.
        if let Some(pool) = onscreen.staged_pool.take() {
            if let Some(slot) = onscreen.current.take() {
                slot.release(&self.kms);
            }
            onscreen.pool = Some(pool);
        }

        let Some(pool) = onscreen.pool.as_mut() else {
            return Err(SubmitError::NoPool);
        };
        let buffer = pool.lock_front().map_err(SubmitError::Lock)?;
        let info = buffer.framebuffer_info();
        let fb = match self.kms.register_framebuffer(&info) {
            Ok(fb) => fb,
            Err(err) => {
                // drop the frame; prior scanout state is untouched
                warn!(?err, "framebuffer registration failed, dropping frame");
                drop(buffer);
                return Err(SubmitError::FramebufferRegistration(err));
            }
        };
        onscreen.next = Some(Slot { buffer, fb });
        onscreen.frames.push_back(FrameInfo {
            sequence: self.frame_counter,
            ..Default::default()
        });
        self.frame_counter += 1;

        if self.pending_mode_set {
            Self::configure_all(&self.kms, &self.controllers, fb);
            self.pending_mode_set = false;
        }

        // Fan the flip out to every active controller. EACCES means the
        // kernel temporarily refuses flips (e.g. VT switched away) and the
        // controller simply keeps its old buffer; any other error
        // permanently disables flip scheduling for the device.
        let mut pending = 0u32;
        let mut needs_update = false;
        for controller in &self.controllers {
            if !controller.requires_update() {
                continue;
            }
            needs_update = true;
            if self.flips_unsupported {
                break;
            }
            match self.kms.schedule_flip(controller.id, fb) {
                Ok(()) => pending += 1,
                Err(err) if err.raw_os_error() == Some(libc::EACCES) => {
                    trace!(controller = ?controller.id, "flip refused, keeping previous buffer");
                }
                Err(err) => {
                    warn!(
                        ?err,
                        controller = ?controller.id,
                        "flip scheduling failed, falling back to synchronous updates"
                    );
                    self.flips_unsupported = true;
                    break;
                }
            }
        }

        if self.flips_unsupported && needs_update {
            // no kernel events will arrive; collapse to one synthetic
            // acknowledgement resolved below
            pending = 1;
        }

        if pending == 0 {
            // Nothing took the frame. The old contents stay on screen, but
            // the client still gets its completion so it can keep
            // animating.
            if let Some(slot) = onscreen.next.take() {
                slot.release(&self.kms);
            }
            onscreen.pending_notify = true;
            onscreen.completed += 1;
            self.notify.mark();
            return Ok(Submission::Dropped);
        }

        self.inflight = Some(FlipRequest { pending });

        if self.flips_unsupported {
            Self::configure_all(&self.kms, &self.controllers, fb);
            self.complete(None);
            return Ok(Submission::Synchronous);
        }

        Ok(Submission::Flipped {
            controllers: pending,
        })
    }

    /// Full synchronous reconfiguration of every controller, the ignored
    /// and disconnected ones included, onto `fb`. An associated fn so it
    /// can run while the swap chain is mutably borrowed.
    fn configure_all(kms: &M, controllers: &[Controller<M::Mode>], fb: FramebufferId) {
        for controller in controllers {
            if let Err(err) = kms.configure_controller(controller, fb) {
                warn!(?err, controller = ?controller.id, "controller configuration failed");
            }
        }
    }

    /// Count one acknowledgement toward the inflight request. On the last
    /// one, promote next to current, release the previous buffer and
    /// queue the client notification.
    fn complete(&mut self, event: Option<FlipEvent>) {
        let Some(request) = self.inflight.as_mut() else {
            trace!("completion event with no flip outstanding, dropping");
            return;
        };
        request.pending = request.pending.saturating_sub(1);
        let remaining = request.pending;

        if let Some(event) = event {
            // at most one request is ever inflight, so the newest queued
            // frame is the one completing
            if let Some(onscreen) = self.onscreen.as_mut() {
                if let Some(frame) = onscreen.frames.back_mut() {
                    frame.hw_frame = Some(event.frame);
                    frame.presentation_time = Some(event.time);
                }
            }
        }

        if remaining > 0 {
            trace!(remaining, "flip acknowledged");
            return;
        }
        self.inflight = None;

        let Some(onscreen) = self.onscreen.as_mut() else {
            return;
        };
        if let Some(previous) = onscreen.current.take() {
            previous.release(&self.kms);
        }
        onscreen.current = onscreen.next.take();
        onscreen.pending_notify = true;
        onscreen.completed += 1;
        self.notify.mark();
        trace!("flip request resolved");
    }

    fn dispatch_events(&mut self) {
        // once flips are disabled, requests resolve synchronously and no
        // events will ever arrive
        if self.flips_unsupported {
            return;
        }
        match self.kms.drain_events() {
            Ok(events) => {
                for event in events {
                    self.complete(Some(event));
                }
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => warn!(?err, "reading kernel display events failed"),
        }
    }

    fn flush(&mut self) {
        // disarm before the callbacks run, so they may arm a fresh task
        self.notify.disarm();
        let Some(onscreen) = self.onscreen.as_mut() else {
            return;
        };
        if !onscreen.pending_notify {
            return;
        }
        onscreen.pending_notify = false;
        // A coalesced notification stands for every frame resolved since
        // the last flush; report the newest and drop the superseded
        // entries so later notifications keep their metadata aligned.
        let count = std::mem::take(&mut onscreen.completed).max(1);
        let mut info = FrameInfo::default();
        for _ in 0..count {
            match onscreen.frames.pop_front() {
                Some(next) => info = next,
                None => break,
            }
        }
        self.handler.frame_synchronized(&info);
        self.handler.frame_complete(&info);
    }
}

impl<M, A, R> Present for DevicePresenter<M, A, R>
where
    M: ModeSetting,
    A: PoolAllocator,
    R: RenderHook<A::Pool>,
{
    fn submit(&mut self) -> Result<Submission, SubmitError> {
        self.submit_frame()
    }

    fn on_event(&mut self) {
        self.dispatch_events();
    }

    fn flush_notifications(&mut self) {
        self.flush();
    }

    fn take_deferred_flush(&mut self) -> bool {
        self.notify.take_request()
    }
}

impl<M, A, R> Drop for DevicePresenter<M, A, R>
where
    M: ModeSetting,
    A: PoolAllocator,
    R: RenderHook<A::Pool>,
{
    fn drop(&mut self) {
        if let Some(mut onscreen) = self.onscreen.take() {
            if onscreen.next.is_some() {
                warn!("device dropped with a flip outstanding");
            }
            if let Some(slot) = onscreen.next.take() {
                slot.release(&self.kms);
            }
            if let Some(slot) = onscreen.current.take() {
                slot.release(&self.kms);
            }
        }
    }
}
