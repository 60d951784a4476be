//! Bounded FIFO with a drop policy, timed pops, and throughput counters.
//!
//! This is the fast stream's load-shedding channel: `try_push` never blocks
//! the producer, and when the queue is full the configured [`DropPolicy`]
//! decides which item pays for the overflow. Counters make the shedding
//! observable instead of silent.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::config::DropPolicy;

struct Inner<T> {
    items: VecDeque<T>,
    pushes: u64,
    pops: u64,
    drops: u64,
}

/// Multi-producer multi-consumer bounded queue.
pub struct BoundedQueue<T> {
    capacity: usize,
    policy: DropPolicy,
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize, policy: DropPolicy) -> Self {
        Self {
            capacity,
            policy,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                pushes: 0,
                pops: 0,
                drops: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Offer an item without blocking. Returns whether it was accepted.
    ///
    /// Every call counts toward `pushes_total`; rejected or displaced items
    /// count toward `drops_total`. A zero-capacity queue rejects everything.
    pub fn try_push(&self, item: T) -> bool {
        let mut inner = self.inner.lock();
        inner.pushes += 1;

        if self.capacity == 0 {
            inner.drops += 1;
            return false;
        }

        if inner.items.len() >= self.capacity {
            match self.policy {
                DropPolicy::DropNewest => {
                    inner.drops += 1;
                    return false;
                }
                DropPolicy::DropOldest => {
                    inner.items.pop_front();
                    inner.drops += 1;
                }
            }
        }

        inner.items.push_back(item);
        drop(inner);
        self.available.notify_one();
        true
    }

    /// Take the head without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.items.pop_front()?;
        inner.pops += 1;
        Some(item)
    }

    /// Take the head, waiting up to `timeout` for one to appear.
    ///
    /// A timeout is not an error: it is the consumer's heartbeat and its
    /// chance to re-check stop flags.
    pub fn try_pop_for(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.items.is_empty() {
            if self.available.wait_until(&mut inner, deadline).timed_out() {
                break;
            }
        }
        let item = inner.items.pop_front()?;
        inner.pops += 1;
        Some(item)
    }

    pub fn clear(&self) {
        self.inner.lock().items.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> DropPolicy {
        self.policy
    }

    /// Total push attempts, accepted or not.
    pub fn pushes_total(&self) -> u64 {
        self.inner.lock().pushes
    }

    pub fn pops_total(&self) -> u64 {
        self.inner.lock().pops
    }

    pub fn drops_total(&self) -> u64 {
        self.inner.lock().drops
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn drop_oldest_sheds_the_head() {
        let q = BoundedQueue::new(3, DropPolicy::DropOldest);
        for id in 1..=4u64 {
            assert!(q.try_push(id));
        }

        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.try_pop(), Some(4));
        assert_eq!(q.try_pop(), None);
        assert_eq!(q.drops_total(), 1);
        assert_eq!(q.pushes_total(), 4);
    }

    #[test]
    fn drop_newest_rejects_the_incoming_item() {
        let q = BoundedQueue::new(3, DropPolicy::DropNewest);
        assert!(q.try_push(1u64));
        assert!(q.try_push(2));
        assert!(q.try_push(3));
        assert!(!q.try_push(4));

        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
        assert_eq!(q.drops_total(), 1);
        assert_eq!(q.pushes_total(), 4);
    }

    #[test]
    fn overflow_counters_track_the_excess() {
        let q = BoundedQueue::new(2, DropPolicy::DropOldest);
        for i in 0..10u64 {
            q.try_push(i);
        }
        assert_eq!(q.len(), 2);
        assert_eq!(q.pushes_total(), 10);
        assert_eq!(q.drops_total(), 8);
        assert_eq!(q.pops_total(), 0);
    }

    #[test]
    fn rejected_pushes_leave_contents_unchanged() {
        let q = BoundedQueue::new(2, DropPolicy::DropNewest);
        q.try_push(1u64);
        q.try_push(2);
        q.try_push(3);
        assert_eq!(q.len(), 2);
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let q = BoundedQueue::new(0, DropPolicy::DropOldest);
        assert!(!q.try_push(1u64));
        assert_eq!(q.pushes_total(), 1);
        assert_eq!(q.drops_total(), 1);
        assert_eq!(q.len(), 0);
    }

    #[test]
    fn timed_pop_gives_up_on_an_empty_queue() {
        let q: BoundedQueue<u64> = BoundedQueue::new(2, DropPolicy::DropOldest);
        let start = Instant::now();
        assert_eq!(q.try_pop_for(Duration::from_millis(20)), None);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn timed_pop_wakes_on_push() {
        let q = Arc::new(BoundedQueue::new(2, DropPolicy::DropOldest));
        let producer = {
            let q = q.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                q.try_push(7u64);
            })
        };
        assert_eq!(q.try_pop_for(Duration::from_millis(500)), Some(7));
        producer.join().unwrap();
    }

    #[test]
    fn concurrent_producers_and_consumer_drain_cleanly() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let q = Arc::new(BoundedQueue::new(8, DropPolicy::DropOldest));
        let producers_done = Arc::new(AtomicBool::new(false));

        let consumer = {
            let q = q.clone();
            let done = producers_done.clone();
            thread::spawn(move || {
                let mut popped = 0u64;
                loop {
                    if q.try_pop_for(Duration::from_millis(5)).is_some() {
                        popped += 1;
                    } else if done.load(Ordering::Relaxed) && q.is_empty() {
                        break;
                    }
                }
                popped
            })
        };

        let producers: Vec<_> = (0..2)
            .map(|p| {
                let q = q.clone();
                thread::spawn(move || {
                    for i in 0..50u64 {
                        q.try_push(p * 1000 + i);
                        thread::sleep(Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }
        producers_done.store(true, Ordering::Relaxed);

        let popped = consumer.join().unwrap();
        assert_eq!(popped, q.pops_total());

        // Conservation: every push was dropped, popped, or still queued.
        assert_eq!(q.pushes_total(), 100);
        assert_eq!(q.pushes_total(), q.drops_total() + q.pops_total());
    }

    #[test]
    fn clear_discards_contents_but_not_counters() {
        let q = BoundedQueue::new(4, DropPolicy::DropOldest);
        q.try_push(1u64);
        q.try_push(2);
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.pushes_total(), 2);
    }
}
