//! Microtask queue.
//!
//! Work queued here runs when the document settles the current turn
//! (`Document::run_microtasks`), in FIFO order.

use std::collections::VecDeque;

/// A microtask.
pub type Microtask = Box<dyn FnOnce() + Send>;

/// FIFO queue of pending microtasks.
#[derive(Default)]
pub struct MicrotaskQueue {
    tasks: VecDeque<Microtask>,
}

impl MicrotaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a microtask.
    pub fn push(&mut self, task: Microtask) {
        self.tasks.push_back(task);
    }

    /// Get the next microtask.
    pub fn pop(&mut self) -> Option<Microtask> {
        self.tasks.pop_front()
    }

    /// Number of pending microtasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if there are pending microtasks.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop every pending microtask without running it.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_microtask_queue_is_fifo() {
        let mut queue = MicrotaskQueue::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            queue.push(Box::new(move || order.lock().push(i)));
        }
        assert_eq!(queue.len(), 3);

        while let Some(task) = queue.pop() {
            task();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_discards_tasks() {
        let mut queue = MicrotaskQueue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        queue.push(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        queue.clear();
        assert!(queue.pop().is_none());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
