// SPDX-License-Identifier: GPL-3.0-only

use std::num::NonZeroU32;

/// Identifier of a display controller (a CRTC in kernel terms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerId(pub NonZeroU32);

/// Identifier of a physical connector driven by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(pub NonZeroU32);

/// Descriptor of one display controller the device fans flips out to.
///
/// The timing mode type is chosen by the mode-setting backend; the drm
/// backend uses `drm::control::Mode`. The presenter deep-copies
/// descriptors on every layout change, so hardware state for in-flight
/// flips never observes a mutated descriptor.
#[derive(Debug, Clone)]
pub struct Controller<M> {
    pub id: ControllerId,
    /// Top-left position of this controller inside the device layout.
    pub position: (u32, u32),
    pub connectors: Vec<ConnectorId>,
    pub mode: M,
    /// Temporarily exclude this controller from flip fan-out, e.g. during
    /// a topology transition.
    pub ignore: bool,
}

impl<M> Controller<M> {
    /// Whether flip fan-out should target this controller.
    pub fn requires_update(&self) -> bool {
        !self.ignore && !self.connectors.is_empty()
    }
}
