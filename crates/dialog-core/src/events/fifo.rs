use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::errors::{DialogError, DialogResult};

/// Backpressure state of a [`Fifo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FifoState {
    Empty,
    Ok,
    Full,
}

#[derive(Debug)]
struct Inner<T> {
    queue: VecDeque<T>,
    state: FifoState,
}

impl<T> Inner<T> {
    fn refresh(&mut self, capacity: usize) {
        self.state = match self.queue.len() {
            0 => FifoState::Empty,
            n if n >= capacity => FifoState::Full,
            _ => FifoState::Ok,
        };
    }
}

/// Bounded multi-producer queue with blocking, non-blocking and async consumers
///
/// Every successful `add`/`insert` wakes exactly one blocked `get` and posts
/// one permit on the async [`waker`](Fifo::waker).
#[derive(Debug)]
pub struct Fifo<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    waker: Arc<Notify>,
    capacity: usize,
}

impl<T> Fifo<T> {
    /// Create an empty fifo holding at most `capacity` items (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Fifo {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                state: FifoState::Empty,
            }),
            not_empty: Condvar::new(),
            waker: Arc::new(Notify::new()),
            capacity: capacity.max(1),
        }
    }

    /// Append at the tail
    pub fn add(&self, item: T) -> DialogResult<()> {
        self.push(item, false)
    }

    /// Insert at the head
    pub fn insert(&self, item: T) -> DialogResult<()> {
        self.push(item, true)
    }

    fn push(&self, item: T, front: bool) -> DialogResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.queue.len() >= self.capacity {
                inner.state = FifoState::Full;
                return Err(DialogError::QueueFull {
                    capacity: self.capacity,
                });
            }
            if front {
                inner.queue.push_front(item);
            } else {
                inner.queue.push_back(item);
            }
            inner.refresh(self.capacity);
        }
        self.not_empty.notify_one();
        self.waker.notify_one();
        Ok(())
    }

    /// Pop from the head, blocking until an item is available
    pub fn get(&self) -> T {
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                inner.refresh(self.capacity);
                return item;
            }
            self.not_empty.wait(&mut inner);
        }
    }

    /// Pop from the head, blocking for at most `timeout`
    pub fn get_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                inner.refresh(self.capacity);
                return Some(item);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Pop from the head without blocking
    pub fn tryget(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        let item = inner.queue.pop_front();
        inner.refresh(self.capacity);
        item
    }

    /// Pop from the head, awaiting the next `add` when empty
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.tryget() {
                return item;
            }
            self.waker.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> FifoState {
        self.inner.lock().state
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wake-up handle signalled once per queued item, for external event loops
    pub fn waker(&self) -> Arc<Notify> {
        self.waker.clone()
    }
}
