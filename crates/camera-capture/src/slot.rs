//! Single-slot, latest-wins frame holder shared between the capture thread and readers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::Frame;

/// Holds at most one frame behind a mutex
///
/// Writers overwrite unconditionally. Readers get an owned copy, so nothing
/// outside the slot ever aliases the stored buffer. The lock is held only
/// while a frame is moved in or cloned out.
#[derive(Debug, Default)]
pub struct FrameSlot {
    current: Mutex<Option<Frame>>,
}

impl FrameSlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame
    pub fn publish(&self, frame: Frame) {
        *self.lock() = Some(frame);
    }

    /// Replace the stored frame unless `stopped` is set
    ///
    /// The flag is checked under the slot lock, so once a stopper has raised
    /// it and called [`FrameSlot::clear`], no later publish can land.
    pub fn publish_unless(&self, frame: Frame, stopped: &AtomicBool) -> bool {
        let mut current = self.lock();
        if stopped.load(Ordering::Acquire) {
            return false;
        }
        *current = Some(frame);
        true
    }

    /// Copy of the most recent frame, if any
    pub fn latest(&self) -> Option<Frame> {
        self.lock().clone()
    }

    /// Drop the stored frame
    pub fn clear(&self) {
        self.lock().take();
    }

    // A panicking writer cannot leave a half-written frame behind (the
    // assignment is a single move), so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_slot() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_latest_wins() {
        let slot = FrameSlot::new();
        slot.publish(Frame::filled(2, 2, [1, 1, 1]));
        slot.publish(Frame::filled(2, 2, [9, 9, 9]));
        assert_eq!(slot.latest().unwrap().get_pixel(0, 0), Some([9, 9, 9]));
    }

    #[test]
    fn test_latest_is_independent_copy() {
        let slot = FrameSlot::new();
        slot.publish(Frame::filled(2, 2, [50, 50, 50]));

        let mut copy = slot.latest().unwrap();
        copy.data.iter_mut().for_each(|v| *v = 0);

        assert_eq!(slot.latest().unwrap().get_pixel(1, 1), Some([50, 50, 50]));
    }

    #[test]
    fn test_publish_after_stop_is_dropped() {
        let slot = FrameSlot::new();
        let stopped = AtomicBool::new(false);
        assert!(slot.publish_unless(Frame::filled(1, 1, [1, 1, 1]), &stopped));

        stopped.store(true, Ordering::Release);
        slot.clear();
        assert!(!slot.publish_unless(Frame::filled(1, 1, [2, 2, 2]), &stopped));
        assert!(slot.latest().is_none());
    }

    #[test]
    fn test_clear() {
        let slot = FrameSlot::new();
        slot.publish(Frame::filled(1, 1, [0, 0, 0]));
        slot.clear();
        assert!(slot.latest().is_none());
    }
}
