//! Expiry Queue
//!
//! Ordered channel of expiry-check events. Any number of threads push
//! synchronously; a single async worker pops in push order.
//!
//! A bounded queue hands out slots through [`ExpiryQueue::reserve`] before the
//! caller touches the table, so a writer that cannot get a slot never leaves
//! behind an entry with no pending expiry event.

use std::collections::VecDeque;
use std::sync::Weak;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Notify;

use crate::cache::Entry;
use crate::error::{CacheError, Result};

// == Expiry Event ==
/// A pending expiry check for one write.
#[derive(Debug)]
pub struct ExpiryEvent<K, V> {
    pub key: K,
    /// Non-owning: the table stays the sole owner of the entry
    pub handle: Weak<Entry<V>>,
    /// Entry version produced by the write that enqueued this event
    pub version: u64,
}

#[derive(Debug)]
struct QueueState<K, V> {
    events: VecDeque<ExpiryEvent<K, V>>,
    /// Slots promised to outstanding permits; counted against the bound
    reserved: usize,
    closed: bool,
}

impl<K, V> QueueState<K, V> {
    fn is_full(&self, capacity: usize) -> bool {
        self.events.len() + self.reserved >= capacity
    }
}

// == Expiry Queue ==
/// FIFO of [`ExpiryEvent`]s with optional backpressure.
#[derive(Debug)]
pub struct ExpiryQueue<K, V> {
    state: Mutex<QueueState<K, V>>,
    /// Signalled when a bounded queue frees a slot or closes
    space: Condvar,
    /// Wakes the consumer on push or close
    ready: Notify,
    capacity: Option<usize>,
}

impl<K, V> ExpiryQueue<K, V> {
    /// Creates a queue; `None` for unbounded, `Some(n)` to hold writers at `n` pending events.
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                reserved: 0,
                closed: false,
            }),
            space: Condvar::new(),
            ready: Notify::new(),
            capacity,
        }
    }

    // == Reserve ==
    /// Claims a slot for one event, waiting while a bounded queue is full.
    ///
    /// How the wait happens depends on the calling thread:
    /// - outside any runtime, or on a blocking-pool thread, the thread parks
    /// - on a multi-thread runtime worker, the worker hands its other tasks
    ///   off through `block_in_place` first, so the consumer keeps running
    /// - on a current-thread runtime nothing else could drain the queue, so
    ///   the call fails instead of waiting
    ///
    /// A closed queue grants a permit immediately; sending through it is a no-op.
    ///
    /// # Errors
    /// `QueueFull` when the queue is full and the caller is on a current-thread runtime.
    pub fn reserve(&self) -> Result<SendPermit<'_, K, V>> {
        let Some(capacity) = self.capacity else {
            return Ok(SendPermit::new(self, false));
        };

        {
            let mut state = self.state.lock();
            if state.closed {
                return Ok(SendPermit::new(self, false));
            }
            if !state.is_full(capacity) {
                state.reserved += 1;
                return Ok(SendPermit::new(self, true));
            }
        }

        let held = match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::CurrentThread) => {
                return Err(CacheError::QueueFull { capacity });
            }
            Ok(_) => tokio::task::block_in_place(|| self.wait_for_slot(capacity)),
            Err(_) => self.wait_for_slot(capacity),
        };
        Ok(SendPermit::new(self, held))
    }

    /// Parks until a slot frees up. Returns false if the queue closed instead.
    fn wait_for_slot(&self, capacity: usize) -> bool {
        let mut state = self.state.lock();
        while state.is_full(capacity) && !state.closed {
            self.space.wait(&mut state);
        }
        if state.closed {
            return false;
        }
        state.reserved += 1;
        true
    }

    // == Push ==
    /// Reserves a slot and appends `event` in one step.
    ///
    /// Returns `false` if the event was not queued: the queue is closed, or it
    /// is full and the caller is on a current-thread runtime.
    pub fn push(&self, event: ExpiryEvent<K, V>) -> bool {
        match self.reserve() {
            Ok(permit) => permit.send(event),
            Err(_) => false,
        }
    }

    // == Pop ==
    /// Waits for the next event in push order.
    ///
    /// Returns `None` once the queue is closed, even if events remain.
    pub async fn pop(&self) -> Option<ExpiryEvent<K, V>> {
        loop {
            {
                let mut state = self.state.lock();
                if state.closed {
                    return None;
                }
                if let Some(event) = state.events.pop_front() {
                    drop(state);
                    self.space.notify_one();
                    return Some(event);
                }
            }
            // A push between the check above and this await leaves a stored permit
            self.ready.notified().await;
        }
    }

    // == Close ==
    /// Closes the queue, dropping pending events and releasing blocked writers.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.events.clear();
        drop(state);

        self.space.notify_all();
        self.ready.notify_one();
    }

    // == Introspection ==
    /// Returns true once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Returns true if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Gives back a reserved slot that was never filled.
    fn release(&self) {
        let mut state = self.state.lock();
        state.reserved -= 1;
        drop(state);
        self.space.notify_one();
    }
}

// == Send Permit ==
/// A slot claimed by [`ExpiryQueue::reserve`].
///
/// Dropping the permit without sending returns the slot to the queue.
#[derive(Debug)]
pub struct SendPermit<'a, K, V> {
    queue: &'a ExpiryQueue<K, V>,
    /// Whether a slot is counted in `reserved` for this permit
    held: bool,
}

impl<'a, K, V> SendPermit<'a, K, V> {
    fn new(queue: &'a ExpiryQueue<K, V>, held: bool) -> Self {
        Self { queue, held }
    }

    /// Appends `event` into the claimed slot.
    ///
    /// Returns `false` if the queue closed in the meantime; the event is discarded.
    pub fn send(mut self, event: ExpiryEvent<K, V>) -> bool {
        let mut state = self.queue.state.lock();
        if self.held {
            state.reserved -= 1;
            self.held = false;
        }
        if state.closed {
            drop(state);
            self.queue.space.notify_one();
            return false;
        }
        state.events.push_back(event);
        drop(state);

        self.queue.ready.notify_one();
        true
    }
}

impl<K, V> Drop for SendPermit<'_, K, V> {
    fn drop(&mut self) {
        if self.held {
            self.queue.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn event(key: &str, version: u64) -> ExpiryEvent<String, String> {
        ExpiryEvent {
            key: key.to_string(),
            handle: Weak::new(),
            version,
        }
    }

    #[test]
    fn test_pop_in_push_order() {
        let queue = ExpiryQueue::new(None);
        assert!(queue.push(event("a", 1)));
        assert!(queue.push(event("b", 1)));
        assert!(queue.push(event("a", 2)));
        assert_eq!(queue.len(), 3);

        let popped: Vec<(String, u64)> = (0..3)
            .map(|_| tokio_test::block_on(queue.pop()).unwrap())
            .map(|e| (e.key, e.version))
            .collect();

        assert_eq!(
            popped,
            vec![("a".into(), 1), ("b".into(), 1), ("a".into(), 2)]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_push_after_close_is_discarded() {
        let queue = ExpiryQueue::new(None);
        queue.push(event("a", 1));
        queue.close();

        assert!(queue.is_closed());
        assert!(!queue.push(event("b", 1)));
        assert!(tokio_test::block_on(queue.pop()).is_none());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(ExpiryQueue::<String, String>::new(None));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(50));
                queue.push(event("late", 3));
            })
        };

        let popped = tokio::time::timeout(Duration::from_secs(2), queue.pop())
            .await
            .expect("pop should wake on push")
            .unwrap();
        assert_eq!(popped.key, "late");
        producer.join().unwrap();
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_consumer() {
        let queue = Arc::new(ExpiryQueue::<String, String>::new(None));

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = tokio::time::timeout(Duration::from_secs(2), consumer)
            .await
            .expect("consumer should observe close")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_queue_applies_backpressure() {
        let queue = Arc::new(ExpiryQueue::<String, String>::new(Some(1)));
        assert!(queue.push(event("first", 1)));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(event("second", 1)))
        };

        // The producer is parked until the consumer frees the only slot
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.pop().await.unwrap().key, "first");
        assert!(producer.join().unwrap());
        assert_eq!(queue.pop().await.unwrap().key, "second");
    }

    #[tokio::test]
    async fn test_reserve_on_current_thread_runtime_reports_full() {
        let queue = ExpiryQueue::<String, String>::new(Some(1));

        let permit = queue.reserve().unwrap();
        assert_eq!(queue.reserve().err(), Some(CacheError::QueueFull { capacity: 1 }));

        // An unused permit hands its slot back
        drop(permit);
        assert!(queue.push(event("a", 1)));
        assert!(!queue.push(event("b", 1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_permit_send_after_close_is_discarded() {
        let queue = ExpiryQueue::<String, String>::new(Some(1));
        let permit = queue.reserve().unwrap();

        queue.close();

        assert!(!permit.send(event("a", 1)));
        assert!(queue.is_empty());
        // Closed queues never make writers wait
        assert!(!queue.push(event("b", 1)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_async_writers_wait_without_stalling_consumer() {
        const PER_WRITER: usize = 20;
        let queue = Arc::new(ExpiryQueue::<String, String>::new(Some(2)));

        // Both workers end up inside writer tasks waiting on the full queue
        let writers: Vec<_> = (0..2)
            .map(|w| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move {
                    for i in 0..PER_WRITER {
                        assert!(queue.push(event(&format!("w{w}-{i}"), 1)));
                    }
                })
            })
            .collect();

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let mut popped = 0;
                while popped < 2 * PER_WRITER {
                    queue.pop().await.unwrap();
                    popped += 1;
                }
                popped
            })
        };

        let popped = tokio::time::timeout(Duration::from_secs(5), consumer)
            .await
            .expect("consumer must keep draining while writers wait")
            .unwrap();
        assert_eq!(popped, 2 * PER_WRITER);
        for writer in writers {
            writer.await.unwrap();
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_close_releases_blocked_producer() {
        let queue = Arc::new(ExpiryQueue::<String, String>::new(Some(1)));
        queue.push(event("first", 1));

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(event("second", 1)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.close();

        assert!(!producer.join().unwrap());
    }
}
