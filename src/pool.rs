//! Connection pool skeleton.
//!
//! Judging runs do not touch the database on their critical path; results are
//! written back by the surrounding service. The pool is the process-wide
//! piece of that surface: a bounded free list with condition-variable
//! checkout, RAII return, and a background sweeper that drops connections
//! left idle longer than `max_free_time`.

use crate::error::{JudgeError, Result};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: usize,
    /// Idle connections older than this are dropped by the sweeper.
    pub max_free_time: Duration,
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 16,
            max_free_time: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

type Factory<T> = Box<dyn Fn() -> Result<T> + Send + Sync>;

struct Idle<T> {
    conn: T,
    since: Instant,
}

struct PoolState<T> {
    free: VecDeque<Idle<T>>,
    busy: usize,
}

struct PoolShared<T> {
    state: Mutex<PoolState<T>>,
    available: Condvar,
    config: PoolConfig,
    factory: Factory<T>,
}

/// Generic bounded pool. `T` is the connection type; construction is
/// delegated to the factory so the pool itself stays transport-agnostic.
pub struct Pool<T: Send + 'static> {
    shared: Arc<PoolShared<T>>,
    sweeper: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

/// RAII checkout; the connection returns to the free list on drop.
pub struct PooledConn<T: Send + 'static> {
    conn: Option<T>,
    shared: Arc<PoolShared<T>>,
}

impl<T: Send + 'static> Pool<T> {
    pub fn new(config: PoolConfig, factory: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                free: VecDeque::new(),
                busy: 0,
            }),
            available: Condvar::new(),
            config,
            factory: Box::new(factory),
        });

        let (shutdown_tx, shutdown_rx) = bounded(1);
        let sweeper_shared = Arc::clone(&shared);
        let sweeper = std::thread::spawn(move || loop {
            match shutdown_rx.recv_timeout(sweeper_shared.config.sweep_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => Self::sweep(&sweeper_shared),
            }
        });

        Self {
            shared,
            sweeper: Some(sweeper),
            shutdown: Some(shutdown_tx),
        }
    }

    fn sweep(shared: &PoolShared<T>) {
        if let Ok(mut state) = shared.state.lock() {
            let before = state.free.len();
            let max_free_time = shared.config.max_free_time;
            state.free.retain(|idle| idle.since.elapsed() <= max_free_time);
            let dropped = before - state.free.len();
            if dropped > 0 {
                log::debug!("pool sweeper dropped {dropped} idle connection(s)");
            }
        }
    }

    /// Check out a connection, creating one while under capacity and blocking
    /// while the pool is exhausted.
    pub fn get(&self) -> Result<PooledConn<T>> {
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| JudgeError::Process("pool mutex poisoned".to_string()))?;

        loop {
            if let Some(idle) = state.free.pop_front() {
                state.busy += 1;
                return Ok(PooledConn {
                    conn: Some(idle.conn),
                    shared: Arc::clone(&self.shared),
                });
            }

            if state.free.len() + state.busy < self.shared.config.max_size {
                state.busy += 1;
                drop(state);
                match (self.shared.factory)() {
                    Ok(conn) => {
                        return Ok(PooledConn {
                            conn: Some(conn),
                            shared: Arc::clone(&self.shared),
                        })
                    }
                    Err(e) => {
                        if let Ok(mut state) = self.shared.state.lock() {
                            state.busy -= 1;
                        }
                        self.shared.available.notify_one();
                        return Err(e);
                    }
                }
            }

            state = self
                .shared
                .available
                .wait(state)
                .map_err(|_| JudgeError::Process("pool mutex poisoned".to_string()))?;
        }
    }

    /// Connections currently checked out.
    pub fn busy(&self) -> usize {
        self.shared.state.lock().map(|s| s.busy).unwrap_or(0)
    }

    /// Connections sitting in the free list.
    pub fn idle(&self) -> usize {
        self.shared.state.lock().map(|s| s.free.len()).unwrap_or(0)
    }
}

impl<T: Send + 'static> Drop for Pool<T> {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(sweeper) = self.sweeper.take() {
            let _ = sweeper.join();
        }
    }
}

impl<T: Send + 'static> Deref for PooledConn<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.conn.as_ref().expect("connection taken")
    }
}

impl<T: Send + 'static> DerefMut for PooledConn<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().expect("connection taken")
    }
}

impl<T: Send + 'static> Drop for PooledConn<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Ok(mut state) = self.shared.state.lock() {
                state.busy -= 1;
                state.free.push_back(Idle {
                    conn,
                    since: Instant::now(),
                });
            }
            self.shared.available.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_pool(config: PoolConfig) -> (Pool<usize>, Arc<AtomicUsize>) {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let pool = Pool::new(config, move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst))
        });
        (pool, created)
    }

    #[test]
    fn returned_connections_are_reused() {
        let (pool, created) = counting_pool(PoolConfig::default());

        let first = pool.get().unwrap();
        assert_eq!(*first, 0);
        drop(first);

        let second = pool.get().unwrap();
        assert_eq!(*second, 0);
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.busy(), 1);
    }

    #[test]
    fn checkout_blocks_at_capacity_until_a_return() {
        let (pool, _) = counting_pool(PoolConfig {
            max_size: 1,
            ..Default::default()
        });
        let pool = Arc::new(pool);

        let held = pool.get().unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || *pool.get().unwrap())
        };

        std::thread::sleep(Duration::from_millis(50));
        drop(held);
        assert_eq!(waiter.join().unwrap(), 0);
    }

    #[test]
    fn sweeper_drops_stale_idle_connections() {
        let (pool, created) = counting_pool(PoolConfig {
            max_size: 4,
            max_free_time: Duration::from_millis(20),
            sweep_interval: Duration::from_millis(10),
        });

        drop(pool.get().unwrap());
        assert_eq!(pool.idle(), 1);

        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(pool.idle(), 0);

        drop(pool.get().unwrap());
        assert_eq!(created.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn factory_failures_release_the_reserved_slot() {
        let pool: Pool<usize> = Pool::new(
            PoolConfig {
                max_size: 1,
                ..Default::default()
            },
            || Err(JudgeError::Config("connect refused".to_string())),
        );

        assert!(pool.get().is_err());
        assert_eq!(pool.busy(), 0);
        assert!(pool.get().is_err());
    }
}
