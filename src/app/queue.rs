//! View-mode message queue between a UI thread and the render thread.
//!
//! The UI side holds cloneable [`ModeSender`]s; the render thread owns the
//! [`ModeQueue`] and drains it once per frame. Messages arrive in FIFO
//! order and are never coalesced.

use super::ViewMode;

/// Sending half, safe to move to other threads.
#[derive(Debug, Clone)]
pub struct ModeSender {
    sender: flume::Sender<ViewMode>,
}

impl ModeSender {
    /// Queues `mode`. Logs and drops it when the queue is gone.
    pub fn send(&self, mode: ViewMode) {
        if let Err(e) = self.sender.send(mode) {
            log::error!("Failed to queue view mode: {e}. Render context is gone.");
        }
    }
}

#[derive(Debug)]
pub struct ModeQueue {
    sender: flume::Sender<ViewMode>,
    receiver: flume::Receiver<ViewMode>,
}

impl Default for ModeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    #[must_use]
    pub fn sender(&self) -> ModeSender {
        ModeSender {
            sender: self.sender.clone(),
        }
    }

    /// Every message queued so far, oldest first.
    pub fn drain(&self) -> Vec<ViewMode> {
        self.receiver.try_iter().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_the_queue() {
        let queue = ModeQueue::new();
        queue.sender().send(ViewMode::Depth);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain(), vec![ViewMode::Depth]);
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }
}
