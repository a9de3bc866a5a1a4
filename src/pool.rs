//! Pool of pre-built script environments
//!
//! The pool lends environments to concurrent callers. Each environment is held
//! by at most one caller at a time; `acquire` blocks until one is idle and the
//! returned guard puts it back when dropped, including while unwinding.
//!
//! The idle queue reserves room for twice the target size. `release` never
//! waits for space: returning more environments than were lent out is logged
//! and accepted rather than blocking or dropping anything.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use crate::status::{PoolGauge, PoolStatus};
use crate::{Error, Result};

/// Idle buffer capacity as a multiple of the target size
pub const HEADROOM_FACTOR: usize = 2;

/// Lifecycle of the pool as a whole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PoolLifecycle {
    /// Warm-up not started
    Empty = 0,
    /// Environments are being built
    Warming = 1,
    /// Every build of the warm-up succeeded
    Ready = 2,
    /// Warm-up finished with some builds failed
    Partial = 3,
}

impl PoolLifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PoolLifecycle::Warming,
            2 => PoolLifecycle::Ready,
            3 => PoolLifecycle::Partial,
            _ => PoolLifecycle::Empty,
        }
    }
}

/// Fixed-capacity container of environments with blocking hand-off
pub struct EnvironmentPool<E> {
    idle: Mutex<VecDeque<E>>,
    available: Condvar,
    target: AtomicUsize,
    initialized: AtomicUsize,
    outstanding: AtomicUsize,
    lifecycle: AtomicU8,
}

impl<E> Default for EnvironmentPool<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EnvironmentPool<E> {
    /// Create an empty pool. The target size is set when warm-up starts.
    pub fn new() -> Self {
        Self {
            idle: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            target: AtomicUsize::new(0),
            initialized: AtomicUsize::new(0),
            outstanding: AtomicUsize::new(0),
            lifecycle: AtomicU8::new(PoolLifecycle::Empty as u8),
        }
    }

    /// Create an empty pool with a known target size
    pub fn with_target(target: usize) -> Self {
        let pool = Self::new();
        pool.set_target(target);
        pool
    }

    /// Set the target size and reserve the idle buffer headroom
    pub(crate) fn set_target(&self, target: usize) {
        self.target.store(target, Ordering::Release);
        let mut idle = self.idle.lock();
        let headroom = target * HEADROOM_FACTOR;
        let additional = headroom.saturating_sub(idle.len());
        idle.reserve(additional);
    }

    pub(crate) fn set_lifecycle(&self, lifecycle: PoolLifecycle) {
        self.lifecycle.store(lifecycle as u8, Ordering::Release);
    }

    /// Insert a freshly built environment.
    ///
    /// Counts toward the initialized total while it is below the target;
    /// beyond that the environment is still accepted as idle. Returns the
    /// initialized count after the insert.
    pub fn add(&self, env: E) -> usize {
        let target = self.target();
        let counted = self
            .initialized
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < target).then_some(n + 1));

        let initialized = match counted {
            Ok(previous) => previous + 1,
            Err(current) => {
                tracing::warn!(target_size = target, initialized = current, "Pool already at target size, adding environment as idle");
                current
            }
        };

        self.push_idle(env);

        if counted.is_ok() && initialized == target {
            tracing::info!(target_size = target, "Environment pool is initialized and ready to be used");
        }
        initialized
    }

    /// Take an idle environment, waiting as long as it takes
    pub fn acquire(&self) -> PooledEnvironment<'_, E> {
        let started = Instant::now();
        let mut idle = self.idle.lock();
        let env = loop {
            if let Some(env) = idle.pop_front() {
                break env;
            }
            tracing::trace!(initialized = self.initialized_count(), "Waiting for an idle environment");
            self.available.wait(&mut idle);
        };
        let remaining = idle.len();
        drop(idle);

        self.lend(env, started, remaining)
    }

    /// Take an idle environment, giving up after `timeout`
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledEnvironment<'_, E>> {
        let started = Instant::now();
        let mut idle = self.idle.lock();
        if let Some(env) = idle.pop_front() {
            let remaining = idle.len();
            drop(idle);
            return Ok(self.lend(env, started, remaining));
        }
        let Some(deadline) = started.checked_add(timeout) else {
            drop(idle);
            return Ok(self.acquire());
        };
        let env = loop {
            if let Some(env) = idle.pop_front() {
                break env;
            }
            if self.available.wait_until(&mut idle, deadline).timed_out() {
                match idle.pop_front() {
                    Some(env) => break env,
                    None => {
                        tracing::warn!(timeout_ms = timeout.as_millis() as u64, "No environment available");
                        return Err(Error::PoolExhausted(timeout));
                    }
                }
            }
        };
        let remaining = idle.len();
        drop(idle);

        Ok(self.lend(env, started, remaining))
    }

    /// Take an idle environment if one is available right now
    pub fn try_acquire(&self) -> Option<PooledEnvironment<'_, E>> {
        let started = Instant::now();
        let mut idle = self.idle.lock();
        let env = idle.pop_front()?;
        let remaining = idle.len();
        drop(idle);

        Some(self.lend(env, started, remaining))
    }

    fn lend(&self, env: E, started: Instant, remaining: usize) -> PooledEnvironment<'_, E> {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(
            waited_ms = started.elapsed().as_millis() as u64,
            idle = remaining,
            "Environment acquired"
        );
        PooledEnvironment { pool: self, env: Some(env) }
    }

    /// Return an environment to the idle set. Never blocks.
    pub fn release(&self, env: E) {
        let matched = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if matched.is_err() {
            tracing::warn!("Environment released without a matching acquire");
        }

        let idle = self.push_idle(env);
        tracing::debug!(idle, "Environment released");
    }

    fn push_idle(&self, env: E) -> usize {
        let headroom = self.target() * HEADROOM_FACTOR;
        let mut idle = self.idle.lock();
        if idle.len() >= headroom {
            tracing::warn!(idle = idle.len(), headroom, "Idle environments exceed reserved headroom");
        }
        idle.push_back(env);
        let len = idle.len();
        drop(idle);

        self.available.notify_one();
        len
    }

    pub fn target(&self) -> usize {
        self.target.load(Ordering::Acquire)
    }

    /// Environments successfully built and added so far
    pub fn initialized_count(&self) -> usize {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Environments currently lent out
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn lifecycle(&self) -> PoolLifecycle {
        PoolLifecycle::from_u8(self.lifecycle.load(Ordering::Acquire))
    }

    pub fn status(&self) -> PoolStatus {
        PoolStatus::from_counts(self.initialized_count(), self.target())
    }
}

impl<E: Send> PoolGauge for EnvironmentPool<E> {
    fn target(&self) -> usize {
        EnvironmentPool::target(self)
    }

    fn initialized_count(&self) -> usize {
        EnvironmentPool::initialized_count(self)
    }

    fn idle_count(&self) -> usize {
        EnvironmentPool::idle_count(self)
    }

    fn outstanding(&self) -> usize {
        EnvironmentPool::outstanding(self)
    }

    fn lifecycle(&self) -> PoolLifecycle {
        EnvironmentPool::lifecycle(self)
    }
}

/// An environment on loan from the pool, returned when dropped
pub struct PooledEnvironment<'a, E> {
    pool: &'a EnvironmentPool<E>,
    env: Option<E>,
}

impl<E> PooledEnvironment<'_, E> {
    /// Keep the environment past the guard. The caller becomes responsible
    /// for handing it back with [`EnvironmentPool::release`].
    pub fn detach(mut self) -> E {
        self.env.take().expect("environment present until guard is consumed")
    }
}

impl<E> Deref for PooledEnvironment<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.env.as_ref().expect("environment present until guard is consumed")
    }
}

impl<E> DerefMut for PooledEnvironment<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.env.as_mut().expect("environment present until guard is consumed")
    }
}

impl<E> Drop for PooledEnvironment<'_, E> {
    fn drop(&mut self) {
        if let Some(env) = self.env.take() {
            self.pool.release(env);
        }
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for PooledEnvironment<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PooledEnvironment").field(&self.env).finish()
    }
}
