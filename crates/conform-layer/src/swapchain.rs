// SPDX-License-Identifier: CEPL-1.0
//! Per-swapchain image lifecycle tracking.
//!
//! Each image moves `Created -> Acquired -> Waited -> Released`, and back to
//! `Acquired` unless the swapchain is static. Wait and release do not name
//! the image they target; the tracker assumes the application waits and
//! releases in acquire order and correlates them through a FIFO of acquired
//! indices. A runtime that lets waits complete out of acquire order would be
//! misattributed by this model.

use conform_api::{GraphicsBinding, SwapchainCreateInfo};
use parking_lot::{Mutex, MutexGuard};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageState {
    Created,
    Acquired,
    Waited,
    Released,
}

impl fmt::Display for ImageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ImageState::Created => "Created",
            ImageState::Acquired => "Acquired",
            ImageState::Waited => "Waited",
            ImageState::Released => "Released",
        })
    }
}

/// A runtime behaviour that breaks the swapchain image contract.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("Invalid empty image count.")]
    EmptyImageCount,
    #[error("Invalid image count {0} for static swapchain.")]
    StaticImageCount(u32),
    #[error("Image count {reported} differs from previous count {previous}.")]
    ImageCountChanged { reported: u32, previous: u32 },
    #[error("Image count output {count} exceeds capacity input {capacity}.")]
    CountExceedsCapacity { count: u32, capacity: usize },
    #[error("Out-of-bounds image index {index} for image count {count}.")]
    IndexOutOfBounds { index: u32, count: usize },
    #[error("Acquired image in Waited state.")]
    AcquiredWhileWaited,
    #[error("Acquired image already in Acquired state.")]
    AcquiredWhileAcquired,
    #[error("Static image cannot be acquired again.")]
    StaticReacquired,
    #[error("Wait succeeded for image in wrong state {0}.")]
    WaitInWrongState(ImageState),
    #[error("Wait succeeded with no acquired image.")]
    WaitWithoutAcquire,
    #[error("Wait returned before timeout ({elapsed:?} elapsed, {timeout:?} requested).")]
    WaitReturnedEarly { elapsed: Duration, timeout: Duration },
    #[error("Release succeeded for image in wrong state {0}.")]
    ReleaseInWrongState(ImageState),
    #[error("Release succeeded with no acquired image.")]
    ReleaseWithoutAcquire,
}

/// A timed-out wait must have blocked for at least the requested timeout.
pub fn check_wait_timeout(elapsed: Duration, timeout: Duration) -> Result<(), Violation> {
    if elapsed < timeout {
        return Err(Violation::WaitReturnedEarly { elapsed, timeout });
    }
    Ok(())
}

/// Image states and the acquire FIFO. Reached only through
/// [`SwapchainState::lock`], so every event runs as one critical section.
///
/// Acquire and enumeration violations leave the tracker untouched. Waits
/// and releases the runtime accepted always advance it.
#[derive(Debug)]
pub struct ImageTracker {
    is_static: bool,
    image_states: Vec<ImageState>,
    acquired: VecDeque<u32>,
}

impl ImageTracker {
    fn new(is_static: bool) -> Self {
        Self {
            is_static,
            image_states: Vec::new(),
            acquired: VecDeque::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// False until the first enumeration with a non-zero count.
    pub fn is_enumerated(&self) -> bool {
        !self.image_states.is_empty()
    }

    pub fn image_states(&self) -> &[ImageState] {
        &self.image_states
    }

    /// Acquired indices, oldest first.
    pub fn acquired(&self) -> impl Iterator<Item = u32> + '_ {
        self.acquired.iter().copied()
    }

    /// Records the image count a successful enumeration reported. The first
    /// non-zero count sizes the tracker; later counts must match it.
    pub fn record_enumeration(&mut self, count: u32) -> Vec<Violation> {
        let mut violations = Vec::new();
        if count == 0 {
            violations.push(Violation::EmptyImageCount);
        }
        if self.is_static && count != 1 {
            violations.push(Violation::StaticImageCount(count));
        }

        if self.image_states.is_empty() {
            if count > 0 {
                self.image_states = vec![ImageState::Created; count as usize];
                debug!(count, "swapchain images enumerated");
            }
        } else if self.image_states.len() != count as usize {
            violations.push(Violation::ImageCountChanged {
                reported: count,
                previous: self.image_states.len() as u32,
            });
        }
        violations
    }

    pub fn acquire(&mut self, index: u32) -> Result<(), Violation> {
        let count = self.image_states.len();
        let state = self
            .image_states
            .get_mut(index as usize)
            .ok_or(Violation::IndexOutOfBounds { index, count })?;

        match *state {
            ImageState::Waited => return Err(Violation::AcquiredWhileWaited),
            ImageState::Acquired => return Err(Violation::AcquiredWhileAcquired),
            ImageState::Released if self.is_static => return Err(Violation::StaticReacquired),
            ImageState::Created | ImageState::Released => {}
        }

        *state = ImageState::Acquired;
        self.acquired.push_back(index);
        debug!(index, "image acquired");
        Ok(())
    }

    /// Marks the oldest acquired image as waited. The runtime accepted the
    /// wait, so a wrong prior state is reported and the transition still
    /// applies.
    pub fn wait_succeeded(&mut self) -> Option<Violation> {
        let Some(&index) = self.acquired.front() else {
            return Some(Violation::WaitWithoutAcquire);
        };
        let state = &mut self.image_states[index as usize];
        let violation =
            (*state != ImageState::Acquired).then_some(Violation::WaitInWrongState(*state));

        *state = ImageState::Waited;
        debug!(index, "image waited");
        violation
    }

    /// Marks the oldest acquired image as released and retires it from the
    /// FIFO, reporting a wrong prior state without skipping the transition.
    pub fn release_succeeded(&mut self) -> Option<Violation> {
        let Some(index) = self.acquired.pop_front() else {
            return Some(Violation::ReleaseWithoutAcquire);
        };
        let state = &mut self.image_states[index as usize];
        let violation =
            (*state != ImageState::Waited).then_some(Violation::ReleaseInWrongState(*state));

        *state = ImageState::Released;
        debug!(index, "image released");
        violation
    }
}

/// Custom state attached to a swapchain handle.
#[derive(Debug)]
pub struct SwapchainState {
    create_info: SwapchainCreateInfo,
    graphics_binding: GraphicsBinding,
    images: Mutex<ImageTracker>,
}

impl SwapchainState {
    pub fn new(create_info: SwapchainCreateInfo, graphics_binding: GraphicsBinding) -> Self {
        Self {
            images: Mutex::new(ImageTracker::new(create_info.is_static())),
            create_info,
            graphics_binding,
        }
    }

    pub fn create_info(&self) -> &SwapchainCreateInfo {
        &self.create_info
    }

    pub fn graphics_binding(&self) -> &GraphicsBinding {
        &self.graphics_binding
    }

    pub fn is_static(&self) -> bool {
        self.create_info.is_static()
    }

    pub fn lock(&self) -> MutexGuard<'_, ImageTracker> {
        self.images.lock()
    }

    pub fn image_states(&self) -> Vec<ImageState> {
        self.lock().image_states().to_vec()
    }
}
