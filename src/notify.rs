// SPDX-License-Identifier: GPL-3.0-only

/// Coalesces completion callbacks into one deferred task per frame cycle.
///
/// Kernel events can complete a flip outside the host's processing
/// window, but client callbacks must only fire when the host explicitly
/// dispatches. Marking arms at most one deferred-task request until the
/// next flush disarms the scheduler.
#[derive(Debug, Default)]
pub(crate) struct NotifyScheduler {
    armed: bool,
    request: bool,
}

impl NotifyScheduler {
    /// Request a deferred flush. Quietly does nothing while one is
    /// already armed.
    pub fn mark(&mut self) {
        if !self.armed {
            self.armed = true;
            self.request = true;
        }
    }

    /// Disarm before running callbacks, so a callback may arm a fresh
    /// task.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    /// One-shot query: whether the host must schedule a deferred flush.
    pub fn take_request(&mut self) -> bool {
        std::mem::take(&mut self.request)
    }
}
