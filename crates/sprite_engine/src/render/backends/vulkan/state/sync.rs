//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! RAII wrappers for semaphores and fences, plus the per-frame bundle the
//! frame loop cycles through.

use ash::{vk, Device};

use crate::render::backends::vulkan::initialization::context::{VkResultExt, VulkanResult};

/// Binary semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None) }.vk_context("vkCreateSemaphore")?;
        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally already signaled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None) }.vk_context("vkCreateFence")?;
        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout) }.vk_context("vkWaitForFences")
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]) }.vk_context("vkResetFences")
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Whether an acquire has signaled `image_available` without a submit
/// waiting on it yet.
///
/// A binary semaphore must be unsignaled before the next acquire reuses it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AcquireTracker {
    pending: bool,
}

impl AcquireTracker {
    /// An image was acquired with this slot's semaphore
    pub fn acquired(&mut self) {
        self.pending = true;
    }

    /// A submit that waits on the semaphore was accepted
    pub fn submitted(&mut self) {
        self.pending = false;
    }

    /// True while the acquire signal has no waiter
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Clear the pending signal, returning whether there was one
    pub fn take_unwaited(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }
}

/// Synchronization objects for one frame slot
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready
    pub image_available: Semaphore,
    /// Signaled when the frame's commands finish
    pub render_finished: Semaphore,
    /// Guards reuse of the slot's command and vertex buffers
    pub in_flight: Fence,
    /// Tracks the signal state of `image_available`
    pub acquire: AcquireTracker,
}

impl FrameSync {
    /// Create a frame slot whose fence starts signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
            acquire: AcquireTracker::default(),
        })
    }

    /// Replace the fence with a fresh signaled one.
    ///
    /// Used after a failed submit left the fence reset with nothing to signal it.
    pub fn replace_fence(&mut self, device: &Device) -> VulkanResult<()> {
        self.in_flight = Fence::new(device.clone(), true)?;
        Ok(())
    }

    /// Swap in a fresh `image_available` if an acquire left it signaled with
    /// no submit waiting on it. Returns whether the semaphore was replaced.
    ///
    /// The device must be idle, the old semaphore may still be referenced by
    /// the presentation engine otherwise.
    pub fn recover_unwaited_acquire(&mut self, device: &Device) -> VulkanResult<bool> {
        if !self.acquire.take_unwaited() {
            return Ok(false);
        }
        self.image_available = Semaphore::new(device.clone())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_without_submit_stays_pending() {
        let mut tracker = AcquireTracker::default();
        assert!(!tracker.is_pending());

        tracker.acquired();
        assert!(tracker.is_pending());
        assert!(tracker.take_unwaited());
        assert!(!tracker.is_pending());
        assert!(!tracker.take_unwaited());
    }

    #[test]
    fn test_submit_consumes_acquire() {
        let mut tracker = AcquireTracker::default();
        tracker.acquired();
        tracker.submitted();
        assert!(!tracker.take_unwaited());
    }
}
