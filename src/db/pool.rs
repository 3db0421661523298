//! Bounded connection pool with blocking acquisition.
//!
//! Availability is tracked by a coroutine-aware semaphore holding one
//! permit per pooled connection, so an acquirer with no connection
//! available suspends its coroutine instead of pinning a scheduler
//! thread. The FIFO queue itself sits behind a plain mutex whose critical
//! sections never suspend. Acquisition takes the semaphore strictly
//! before the queue lock; release pushes under the queue lock and posts
//! the semaphore afterwards, so a releaser never waits on an acquirer.
//!
//! Invariant: permits + wrappers in flight = capacity, and the queue
//! holds exactly `permits` connections at every quiescent point.

use may::sync::Semphore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::debug;

struct PoolShared<C> {
    queue: Mutex<VecDeque<C>>,
    available: Semphore,
    capacity: usize,
}

/// Fixed-size pool of raw connections.
pub struct Pool<C> {
    shared: Arc<PoolShared<C>>,
}

impl<C> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Pool {
            shared: self.shared.clone(),
        }
    }
}

impl<C> Pool<C> {
    /// Build a pool that owns the given connections.
    pub fn from_conns(conns: Vec<C>) -> Self {
        let capacity = conns.len();
        Pool {
            shared: Arc::new(PoolShared {
                queue: Mutex::new(conns.into()),
                available: Semphore::new(capacity),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Connections currently sitting in the pool.
    pub fn idle(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Take a connection, blocking the calling coroutine until one is
    /// available. The wrapper returns its connection on drop.
    pub fn get_or_block(&self) -> Pooled<C> {
        self.shared.available.wait();
        let conn = {
            let mut queue = self.shared.queue.lock().unwrap();
            queue
                .pop_front()
                .expect("pool semaphore granted a permit for an empty queue")
        };
        debug!(idle = self.idle(), capacity = self.shared.capacity, "connection acquired");
        Pooled {
            shared: self.shared.clone(),
            conn: Mutex::new(Some(conn)),
        }
    }
}

/// Single-owner wrapper around a pooled connection.
///
/// Not clonable; share within one request via `Arc` if needed. Dropping
/// the wrapper pushes the connection to the back of the pool and wakes
/// one blocked acquirer.
pub struct Pooled<C> {
    shared: Arc<PoolShared<C>>,
    conn: Mutex<Option<C>>,
}

impl<C> Pooled<C> {
    /// Lock the wrapped connection for exclusive use.
    pub fn lock(&self) -> std::sync::MutexGuard<'_, Option<C>> {
        self.conn.lock().unwrap()
    }
}

impl<C> Drop for Pooled<C> {
    fn drop(&mut self) {
        let conn = self.conn.lock().unwrap().take();
        if let Some(conn) = conn {
            {
                let mut queue = self.shared.queue.lock().unwrap();
                queue.push_back(conn);
            }
            self.shared.available.post();
        }
    }
}
