// SPDX-License-Identifier: GPL-3.0-only

use crate::hw::{FrameInfo, FramebufferId, ModeSetting, ScanoutPool};
use std::collections::VecDeque;

/// One scanout buffer together with its registered kernel framebuffer id.
pub(crate) struct Slot<B> {
    pub buffer: B,
    pub fb: FramebufferId,
}

impl<B> Slot<B> {
    /// Release the slot. A framebuffer id must never outlive the buffer
    /// backing it, so the id is unregistered first and the buffer is
    /// returned to its pool second.
    pub fn release<M: ModeSetting>(self, kms: &M) {
        kms.unregister_framebuffer(self.fb);
        drop(self.buffer);
    }
}

/// Double-buffer state of the single presentable surface.
pub(crate) struct Onscreen<P: ScanoutPool, T> {
    /// Active buffer pool. `None` until layout dimensions are known.
    pub pool: Option<P>,
    /// Buffer currently on screen.
    pub current: Option<Slot<P::Buffer>>,
    /// Buffer submitted and awaiting flip completion. Occupied only
    /// between submission and full completion.
    pub next: Option<Slot<P::Buffer>>,
    /// Replacement pool staged by a resize that arrived while a frame was
    /// in flight; installed at the next submission.
    pub staged_pool: Option<P>,
    /// Rendering target created alongside `staged_pool`, installed just
    /// before the next surface swap.
    pub staged_target: Option<T>,
    /// Completion callbacks owed to the client.
    pub pending_notify: bool,
    /// Frames resolved since the last fired notification. A coalesced
    /// notification covers all of them; the superseded entries drop.
    pub completed: usize,
    /// Frame metadata in submission order; entries pop as notifications
    /// fire.
    pub frames: VecDeque<FrameInfo>,
}

impl<P: ScanoutPool, T> Onscreen<P, T> {
    pub fn new() -> Self {
        Onscreen {
            pool: None,
            current: None,
            next: None,
            staged_pool: None,
            staged_target: None,
            pending_notify: false,
            completed: 0,
            frames: VecDeque::new(),
        }
    }
}
