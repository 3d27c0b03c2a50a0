//! Bounded frame queue between the capture thread and async consumers.
//!
//! The capture worker runs on an OS thread and must never block on a slow
//! consumer, so [`FrameQueue::push`] is synchronous and, when the queue is
//! full, evicts the oldest frame to make room.  Consumers await
//! [`FrameQueue::pop`] from async code.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Default capacity: three seconds of 30 fps video.
pub const DEFAULT_FRAME_CAPACITY: usize = 90;

/// Counters kept by the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub dropped: u64,
}

struct QueueState<T> {
    items: VecDeque<T>,
    stats: QueueStats,
    closed: bool,
}

/// Drop-oldest bounded queue.
pub struct FrameQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> FrameQueue<T> {
    /// Creates a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                stats: QueueStats::default(),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        // A panicking holder cannot leave the deque half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an item, evicting the oldest one if the queue is full.
    ///
    /// Returns `false` if an item was evicted or the queue is closed (the
    /// item is then discarded).
    pub fn push(&self, item: T) -> bool {
        let kept = {
            let mut state = self.lock();
            if state.closed {
                return false;
            }
            state.stats.pushed += 1;
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front();
                state.stats.dropped += 1;
                true
            } else {
                false
            };
            state.items.push_back(item);
            !evicted
        };
        self.notify.notify_one();
        kept
    }

    /// Takes the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Waits for the next item.  Returns `None` once the queue is closed and
    /// drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Closes the queue: later pushes are discarded and waiting consumers
    /// wake up once the remaining items are drained.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> QueueStats {
        self.lock().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    #[test]
    fn test_push_within_capacity_keeps_everything() {
        let q = FrameQueue::new(3);
        assert!(q.push(1));
        assert!(q.push(2));
        assert_eq!(q.len(), 2);
        assert_eq!(q.stats(), QueueStats { pushed: 2, dropped: 0 });
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        // Arrange
        let q = FrameQueue::new(3);
        for i in 1..=3 {
            q.push(i);
        }

        // Act
        let kept = q.push(4);

        // Assert
        assert!(!kept);
        assert_eq!(q.len(), 3);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), Some(4));
        assert_eq!(q.stats().dropped, 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let q = FrameQueue::new(0);
        q.push('a');
        q.push('b');
        assert_eq!(q.capacity(), 1);
        assert_eq!(q.try_pop(), Some('b'));
    }

    #[test]
    fn test_pop_waits_for_push() {
        // Arrange
        let q = FrameQueue::new(4);
        let mut pop = task::spawn(q.pop());
        assert_pending!(pop.poll());

        // Act
        q.push(7u32);

        // Assert
        assert!(pop.is_woken());
        assert_ready_eq!(pop.poll(), Some(7));
    }

    #[test]
    fn test_close_wakes_waiting_consumer() {
        let q: FrameQueue<u8> = FrameQueue::new(4);
        let mut pop = task::spawn(q.pop());
        assert_pending!(pop.poll());

        q.close();

        assert!(pop.is_woken());
        assert_ready_eq!(pop.poll(), None);
    }

    #[test]
    fn test_close_drains_remaining_items_first() {
        let q = FrameQueue::new(4);
        q.push(1);
        q.close();
        assert!(!q.push(2));
        let mut pop = task::spawn(q.pop());
        assert_ready_eq!(pop.poll(), Some(1));
    }

    #[tokio::test]
    async fn test_producer_thread_feeds_async_consumer() {
        // Arrange
        let q = Arc::new(FrameQueue::new(DEFAULT_FRAME_CAPACITY));
        let producer = Arc::clone(&q);

        // Act
        let handle = std::thread::spawn(move || {
            for i in 0..10u32 {
                producer.push(i);
            }
            producer.close();
        });
        let mut received = Vec::new();
        while let Some(i) = q.pop().await {
            received.push(i);
        }
        handle.join().unwrap();

        // Assert
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }
}
