//! Bounded blocking queue: the hand-off primitive under the fault core and
//! the message-passing layer.
//!
//! Three backpressure policies are fixed at construction:
//!
//! - **Unbounded** — pushes never block or fail on size; pops follow the
//!   blocking discipline (a consumer still has to wait for data).
//! - **FailFast** — a push against a full queue and a pop against an empty
//!   queue return an error immediately.
//! - **Blocking** — pushes and pops suspend the calling task until space or
//!   data is available, or the queue is closed.
//!
//! ## Lock Discipline
//!
//! One mutex guards the deque and the closed flag; it is held only for O(1)
//! critical sections. Blocked callers park on two condvars (`not_full`,
//! `not_empty`) with the data lock released — a single lock held across a
//! blocking wait would deadlock concurrent pushers and poppers. Two gate
//! mutexes serialize the slow path so that at most one blocked producer and
//! one blocked consumer contend on the data lock at a time.
//!
//! ## Teardown
//!
//! [`BoundedQueue::close`] drops every still-queued element (RAII releases
//! anything they own), wakes every blocked waiter, and makes all subsequent
//! pushes and pops fail with [`QueueError::Closed`]. A request against a
//! closed queue is refused, never a panic.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::debug;

use tandem_common::consts::MIN_QUEUE_CAPACITY;

/// Backpressure policy, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
    /// Push never blocks or fails on size.
    Unbounded,
    /// Push on full and pop on empty fail immediately.
    FailFast,
    /// Push and pop suspend until space/data or close.
    Blocking,
}

/// Extraction order, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOrder {
    /// First in, first out.
    Fifo,
    /// Last in, first out.
    Lifo,
}

/// Well-defined failures of queue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// Finite capacities below 2 are rejected at construction; a
    /// single-slot queue has ambiguous hand-off semantics.
    #[error("finite queue capacity must be >= {MIN_QUEUE_CAPACITY}, got {0}")]
    InvalidCapacity(usize),

    /// The queue is in teardown; the request was refused.
    #[error("queue is closed")]
    Closed,

    /// Fail-fast push against a full queue.
    #[error("queue is full")]
    Full,

    /// Fail-fast pop against an empty queue.
    #[error("queue is empty")]
    Empty,

    /// A bounded wait elapsed without space/data becoming available.
    #[error("queue wait timed out")]
    TimedOut,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Thread-safe FIFO/LIFO container with configurable backpressure.
///
/// All methods take `&self`; share across tasks via `Arc`.
pub struct BoundedQueue<T> {
    policy: QueuePolicy,
    order: QueueOrder,
    capacity: Option<usize>,
    state: Mutex<State<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    // Slow-path gates: serialize blocked producers / blocked consumers so
    // only one of each contends on the data lock at a time.
    push_gate: Mutex<()>,
    pop_gate: Mutex<()>,
}

impl<T> BoundedQueue<T> {
    fn with_parts(policy: QueuePolicy, order: QueueOrder, capacity: Option<usize>) -> Self {
        Self {
            policy,
            order,
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            push_gate: Mutex::new(()),
            pop_gate: Mutex::new(()),
        }
    }

    /// Unbounded queue: pushes always succeed while the queue is open.
    pub fn unbounded(order: QueueOrder) -> Self {
        Self::with_parts(QueuePolicy::Unbounded, order, None)
    }

    /// Fail-fast bounded queue.
    ///
    /// # Errors
    /// `QueueError::InvalidCapacity` for capacities below 2.
    pub fn fail_fast(capacity: usize, order: QueueOrder) -> Result<Self, QueueError> {
        Self::check_capacity(capacity)?;
        Ok(Self::with_parts(QueuePolicy::FailFast, order, Some(capacity)))
    }

    /// Blocking bounded queue.
    ///
    /// # Errors
    /// `QueueError::InvalidCapacity` for capacities below 2.
    pub fn blocking(capacity: usize, order: QueueOrder) -> Result<Self, QueueError> {
        Self::check_capacity(capacity)?;
        Ok(Self::with_parts(QueuePolicy::Blocking, order, Some(capacity)))
    }

    fn check_capacity(capacity: usize) -> Result<(), QueueError> {
        if capacity < MIN_QUEUE_CAPACITY {
            return Err(QueueError::InvalidCapacity(capacity));
        }
        Ok(())
    }

    #[inline]
    fn is_full_locked(&self, state: &State<T>) -> bool {
        match self.capacity {
            Some(cap) => state.items.len() >= cap,
            None => false,
        }
    }

    /// Push using the construction-time policy (blocks without a deadline
    /// under the blocking policy).
    pub fn push(&self, item: T) -> Result<(), QueueError> {
        self.push_wait(item, None)
    }

    /// Push with an optional timeout.
    ///
    /// Under the unbounded and fail-fast policies the timeout is irrelevant
    /// and this behaves like [`Self::push_nowait`].
    pub fn push_wait(&self, item: T, timeout: Option<Duration>) -> Result<(), QueueError> {
        if self.policy != QueuePolicy::Blocking {
            return self.push_nowait(item);
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let _gate = self.push_gate.lock();
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !self.is_full_locked(&state) {
                break;
            }
            match deadline {
                Some(d) => {
                    if self.not_full.wait_until(&mut state, d).timed_out() {
                        return Err(if state.closed {
                            QueueError::Closed
                        } else {
                            QueueError::TimedOut
                        });
                    }
                }
                None => self.not_full.wait(&mut state),
            }
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Push without ever suspending the caller.
    pub fn push_nowait(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        if self.is_full_locked(&state) {
            return Err(QueueError::Full);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pop using the construction-time policy (blocks without a deadline
    /// unless the policy is fail-fast).
    pub fn pop(&self) -> Result<T, QueueError> {
        self.pop_wait(None)
    }

    /// Pop with an optional timeout.
    ///
    /// Under the fail-fast policy the timeout is irrelevant and this
    /// behaves like [`Self::pop_nowait`].
    pub fn pop_wait(&self, timeout: Option<Duration>) -> Result<T, QueueError> {
        if self.policy == QueuePolicy::FailFast {
            return self.pop_nowait();
        }

        let deadline = timeout.map(|t| Instant::now() + t);
        let _gate = self.pop_gate.lock();
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(QueueError::Closed);
            }
            if !state.items.is_empty() {
                break;
            }
            match deadline {
                Some(d) => {
                    if self.not_empty.wait_until(&mut state, d).timed_out() {
                        return Err(if state.closed {
                            QueueError::Closed
                        } else {
                            QueueError::TimedOut
                        });
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
        let item = self.take_locked(&mut state).ok_or(QueueError::Empty)?;
        drop(state);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Pop without ever suspending the caller.
    pub fn pop_nowait(&self) -> Result<T, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        let item = self.take_locked(&mut state).ok_or(QueueError::Empty)?;
        drop(state);
        self.not_full.notify_one();
        Ok(item)
    }

    fn take_locked(&self, state: &mut State<T>) -> Option<T> {
        match self.order {
            QueueOrder::Fifo => state.items.pop_front(),
            QueueOrder::Lifo => state.items.pop_back(),
        }
    }

    /// Tear the queue down: drop all queued elements, wake every blocked
    /// waiter, and refuse all subsequent pushes and pops.
    ///
    /// Idempotent. Returns the number of elements discarded.
    pub fn close(&self) -> usize {
        let discarded;
        {
            let mut state = self.state.lock();
            if state.closed {
                return 0;
            }
            state.closed = true;
            discarded = state.items.len();
            // Drop queued elements while holding the lock; their Drop impls
            // release whatever external resources they own.
            state.items.clear();
        }
        self.not_full.notify_all();
        self.not_empty.notify_all();
        if discarded > 0 {
            debug!(discarded, "queue closed with elements still pending");
        }
        discarded
    }

    /// Number of queued elements.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// True when no elements are queued.
    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// True once `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Configured capacity; `None` for unbounded queues.
    #[inline]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Construction-time policy.
    #[inline]
    pub const fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// Construction-time extraction order.
    #[inline]
    pub const fn order(&self) -> QueueOrder {
        self.order
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn single_slot_capacity_rejected() {
        assert_eq!(
            BoundedQueue::<u32>::blocking(1, QueueOrder::Fifo).err(),
            Some(QueueError::InvalidCapacity(1))
        );
        assert_eq!(
            BoundedQueue::<u32>::fail_fast(0, QueueOrder::Fifo).err(),
            Some(QueueError::InvalidCapacity(0))
        );
        assert!(BoundedQueue::<u32>::blocking(2, QueueOrder::Fifo).is_ok());
    }

    #[test]
    fn fifo_order() {
        let q = BoundedQueue::unbounded(QueueOrder::Fifo);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop_nowait().unwrap(), 1);
        assert_eq!(q.pop_nowait().unwrap(), 2);
        assert_eq!(q.pop_nowait().unwrap(), 3);
    }

    #[test]
    fn lifo_order() {
        let q = BoundedQueue::unbounded(QueueOrder::Lifo);
        q.push(1).unwrap();
        q.push(2).unwrap();
        q.push(3).unwrap();
        assert_eq!(q.pop_nowait().unwrap(), 3);
        assert_eq!(q.pop_nowait().unwrap(), 2);
        assert_eq!(q.pop_nowait().unwrap(), 1);
    }

    #[test]
    fn fail_fast_full_and_empty() {
        let q = BoundedQueue::fail_fast(2, QueueOrder::Fifo).unwrap();
        assert_eq!(q.pop(), Err(QueueError::Empty));
        q.push(10).unwrap();
        q.push(11).unwrap();
        assert_eq!(q.push(12), Err(QueueError::Full));
        assert_eq!(q.pop().unwrap(), 10);
        q.push(12).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn unbounded_never_full() {
        let q = BoundedQueue::unbounded(QueueOrder::Fifo);
        for i in 0..1000 {
            q.push(i).unwrap();
        }
        assert_eq!(q.len(), 1000);
        assert_eq!(q.capacity(), None);
    }

    #[test]
    fn blocking_push_times_out_then_succeeds_after_pop() {
        let q = BoundedQueue::blocking(2, QueueOrder::Fifo).unwrap();
        q.push(1).unwrap();
        q.push(2).unwrap();

        let start = Instant::now();
        assert_eq!(
            q.push_wait(3, Some(Duration::from_millis(100))),
            Err(QueueError::TimedOut)
        );
        assert!(start.elapsed() >= Duration::from_millis(100));

        assert_eq!(q.pop_nowait().unwrap(), 1);
        q.push_wait(3, Some(Duration::from_millis(100))).unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn blocked_pusher_wakes_on_pop() {
        let q = Arc::new(BoundedQueue::blocking(2, QueueOrder::Fifo).unwrap());
        q.push(1).unwrap();
        q.push(2).unwrap();

        let q2 = Arc::clone(&q);
        let pusher = thread::spawn(move || q2.push(3));

        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.pop_nowait().unwrap(), 1);

        pusher.join().unwrap().unwrap();
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn close_wakes_blocked_pusher_with_refusal() {
        let q = Arc::new(BoundedQueue::blocking(2, QueueOrder::Fifo).unwrap());
        q.push(1).unwrap();
        q.push(2).unwrap();

        let q2 = Arc::clone(&q);
        let pusher = thread::spawn(move || q2.push(3));

        thread::sleep(Duration::from_millis(50));
        q.close();

        assert_eq!(pusher.join().unwrap(), Err(QueueError::Closed));
    }

    #[test]
    fn close_wakes_blocked_popper_with_refusal() {
        let q = Arc::new(BoundedQueue::<u32>::blocking(4, QueueOrder::Fifo).unwrap());

        let q2 = Arc::clone(&q);
        let popper = thread::spawn(move || q2.pop());

        thread::sleep(Duration::from_millis(50));
        q.close();

        assert_eq!(popper.join().unwrap(), Err(QueueError::Closed));
    }

    #[test]
    fn closed_queue_refuses_everything() {
        let q = BoundedQueue::unbounded(QueueOrder::Fifo);
        q.push(1).unwrap();
        assert_eq!(q.close(), 1);

        assert_eq!(q.push(2), Err(QueueError::Closed));
        assert_eq!(q.push_nowait(2), Err(QueueError::Closed));
        assert_eq!(q.pop_nowait(), Err(QueueError::Closed));
        assert_eq!(q.pop_wait(Some(Duration::from_millis(10))), Err(QueueError::Closed));
        assert!(q.is_closed());

        // Idempotent.
        assert_eq!(q.close(), 0);
    }

    #[test]
    fn close_drops_queued_elements() {
        struct Tracked(Arc<AtomicUsize>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));
        let q = BoundedQueue::unbounded(QueueOrder::Fifo);
        q.push(Tracked(Arc::clone(&drops))).unwrap();
        q.push(Tracked(Arc::clone(&drops))).unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        assert_eq!(q.close(), 2);
        assert_eq!(drops.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn threaded_hand_off_delivers_everything() {
        let q = Arc::new(BoundedQueue::blocking(4, QueueOrder::Fifo).unwrap());
        let total = 200u64;

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                for i in 0..total {
                    q.push(i).unwrap();
                }
            })
        };
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || {
                let mut sum = 0u64;
                for _ in 0..total {
                    sum += q.pop().unwrap();
                }
                sum
            })
        };

        producer.join().unwrap();
        let sum = consumer.join().unwrap();
        assert_eq!(sum, total * (total - 1) / 2);
        assert!(q.is_empty());
    }

    #[test]
    fn pop_wait_times_out_on_empty_queue() {
        let q = BoundedQueue::<u32>::blocking(2, QueueOrder::Fifo).unwrap();
        assert_eq!(
            q.pop_wait(Some(Duration::from_millis(50))),
            Err(QueueError::TimedOut)
        );
    }
}
