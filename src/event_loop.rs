// SPDX-License-Identifier: GPL-3.0-only

//! calloop integration for the presentation core.
//!
//! The kernel event descriptor is registered as a level-triggered read
//! source; completion events dispatch straight into the presenter and
//! client notifications are deferred to a one-shot idle callback, so
//! they only ever fire from the host's event queue.

use crate::presenter::Present;
use calloop::generic::Generic;
use calloop::{Interest, LoopHandle, Mode, PostAction, RegistrationToken};
use std::os::fd::OwnedFd;

/// Register `fd` (a duplicate of the kernel mode-setting descriptor)
/// with the host event loop. `accessor` projects the presenter out of
/// the host's loop data.
pub fn register_device<D, P, F>(
    handle: &LoopHandle<'static, D>,
    fd: OwnedFd,
    accessor: F,
) -> Result<RegistrationToken, calloop::Error>
where
    D: 'static,
    P: Present,
    F: Fn(&mut D) -> &mut P + Clone + 'static,
{
    let idle_handle = handle.clone();
    handle
        .insert_source(
            Generic::new(fd, Interest::READ, Mode::Level),
            move |_, _, data| {
                let presenter = accessor(data);
                presenter.on_event();
                if presenter.take_deferred_flush() {
                    let accessor = accessor.clone();
                    idle_handle.insert_idle(move |data| accessor(data).flush_notifications());
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|err| err.error)
}

/// Arm the one-shot deferred flush if the presenter requested one
/// outside the event path, e.g. right after a synchronous or dropped
/// submission.
pub fn schedule_deferred_flush<D, P, F>(handle: &LoopHandle<'static, D>, data: &mut D, accessor: F)
where
    D: 'static,
    P: Present,
    F: Fn(&mut D) -> &mut P + Clone + 'static,
{
    if accessor(data).take_deferred_flush() {
        handle.insert_idle(move |data| accessor(data).flush_notifications());
    }
}
