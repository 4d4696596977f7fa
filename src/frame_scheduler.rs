//! Cooperative frame-callback scheduling.
//!
//! Consumers request one callback per rendering frame and re-arm explicitly
//! after each one. The host decides what a "frame" is: a vsync callback, a
//! fixed-cadence loop, or a manual call in tests.

/// Handle for one requested frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

/// Source of frame callbacks.
pub trait FrameScheduler {
    /// Requests a callback on the next frame.
    fn request_frame(&mut self) -> FrameId;
    /// Withdraws a request. Unknown or already delivered ids are ignored.
    fn cancel_frame(&mut self, frame: FrameId);
}

/// Frame requests queued until the host drains them on its next frame.
#[derive(Debug, Default)]
pub struct FrameQueue {
    next_id: u64,
    pending: Vec<FrameId>,
}

impl FrameQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns every request due on this frame.
    pub fn take_due(&mut self) -> Vec<FrameId> {
        std::mem::take(&mut self.pending)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

impl FrameScheduler for FrameQueue {
    fn request_frame(&mut self) -> FrameId {
        self.next_id = self.next_id.wrapping_add(1);
        let frame = FrameId(self.next_id);
        self.pending.push(frame);
        frame
    }

    fn cancel_frame(&mut self, frame: FrameId) {
        self.pending.retain(|pending| *pending != frame);
    }
}
