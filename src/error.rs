// SPDX-License-Identifier: GPL-3.0-only

use std::io;
use thiserror::Error;

/// Errors raised while bringing up the presentation device.
///
/// All of these are fatal to device setup and are propagated to the
/// caller; there is no retry path.
#[derive(Debug, Error)]
pub enum DeviceInitError {
    #[error("failed to open mode-setting device")]
    Open(#[source] io::Error),
    #[error("kernel resource enumeration failed")]
    Resources(#[source] io::Error),
    #[error("failed to create buffer allocation device")]
    Allocator(#[source] io::Error),
}

/// Errors raised while creating or resizing a presentable surface.
#[derive(Debug, Error)]
pub enum SurfaceAllocationError {
    #[error("a presentable surface already exists for this device")]
    AlreadyExists,
    #[error("failed to allocate scanout buffer pool")]
    PoolCreation(#[source] io::Error),
    #[error("failed to lock front buffer: {0}")]
    LockFront(String),
    #[error("failed to create rendering target: {0}")]
    RenderTarget(String),
}

/// Errors raised by a frame submission.
///
/// A [`SubmitError::FramebufferRegistration`] drops the frame but leaves
/// the swap chain in its prior state; the caller may simply render and
/// submit the next frame.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no presentable surface has been created")]
    NoSurface,
    #[error("surface has no buffer pool yet; layout has not been set")]
    NoPool,
    #[error("failed to lock the rendered buffer")]
    Lock(#[source] SurfaceAllocationError),
    #[error("kernel rejected framebuffer registration")]
    FramebufferRegistration(#[source] io::Error),
    #[error("failed to wait for the previous flip to complete")]
    CompletionWait(#[source] io::Error),
}
