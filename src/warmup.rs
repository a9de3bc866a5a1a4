//! Background warm-up of the environment pool
//!
//! Warm-up runs once per process. The first `start` spawns a thread that
//! builds the target number of environments one after another, adding each
//! success to the pool as soon as it is ready. A failed or panicking build is
//! logged and skipped. Callers of `acquire` simply wait for the first environment.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use crate::builder::EnvironmentFactory;
use crate::config::PoolSettings;
use crate::pool::{EnvironmentPool, PoolLifecycle};
use crate::Result;

/// Name of the warm-up thread
pub const WARMUP_THREAD_NAME: &str = "environment-warmup";

/// One build attempt that did not produce an environment
#[derive(Debug, Clone)]
pub struct BuildFailure {
    /// 1-based attempt number
    pub index: usize,
    pub error: String,
}

/// Outcome of a finished warm-up
#[derive(Debug, Clone)]
pub struct WarmupReport {
    pub target: usize,
    pub built: usize,
    pub failures: Vec<BuildFailure>,
    pub duration: Duration,
}

impl WarmupReport {
    pub fn is_complete(&self) -> bool {
        self.built == self.target
    }
}

/// Handle on the running warm-up thread
pub struct WarmupHandle {
    inner: JoinHandle<WarmupReport>,
}

impl WarmupHandle {
    /// Wait for warm-up to finish
    pub fn join(self) -> WarmupReport {
        match self.inner.join() {
            Ok(report) => report,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

/// Populates a pool from a factory, at most once
pub struct WarmupCoordinator<F: EnvironmentFactory> {
    factory: Arc<F>,
    pool: Arc<EnvironmentPool<F::Environment>>,
    started: AtomicBool,
}

impl<F: EnvironmentFactory> WarmupCoordinator<F> {
    pub fn new(factory: Arc<F>, pool: Arc<EnvironmentPool<F::Environment>>) -> Self {
        Self {
            factory,
            pool,
            started: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &Arc<EnvironmentPool<F::Environment>> {
        &self.pool
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Start warming the pool in the background.
    ///
    /// Only the first call does anything; later calls, concurrent or not, are
    /// logged and return `Ok(None)`. Fails only if the thread cannot be spawned.
    pub fn start(&self, settings: &PoolSettings) -> Result<Option<WarmupHandle>> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Environment warm-up already started, ignoring duplicate start");
            return Ok(None);
        }

        let target = settings.target_size();
        if target != settings.pool_size {
            tracing::warn!(requested = settings.pool_size, target_size = target, "Pool size clamped");
        }
        self.pool.set_target(target);
        self.pool.set_lifecycle(PoolLifecycle::Warming);

        let factory = Arc::clone(&self.factory);
        let pool = Arc::clone(&self.pool);
        let settings = settings.clone();

        let spawned = thread::Builder::new()
            .name(WARMUP_THREAD_NAME.to_string())
            .spawn(move || warm_up(factory.as_ref(), &pool, &settings, target));

        match spawned {
            Ok(inner) => {
                tracing::info!(target_size = target, "Started creating script environments");
                Ok(Some(WarmupHandle { inner }))
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to spawn warm-up thread");
                self.pool.set_lifecycle(PoolLifecycle::Partial);
                Err(e.into())
            }
        }
    }
}

fn warm_up<F: EnvironmentFactory>(
    factory: &F,
    pool: &EnvironmentPool<F::Environment>,
    settings: &PoolSettings,
    target: usize,
) -> WarmupReport {
    let started = Instant::now();
    let mut built = 0;
    let mut failures = Vec::new();

    for index in 1..=target {
        tracing::debug!(index, target_size = target, "Building script environment");
        let error = match panic::catch_unwind(AssertUnwindSafe(|| factory.build(settings))) {
            Ok(Ok(env)) => {
                pool.add(env);
                built += 1;
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("build panicked: {}", panic_message(payload.as_ref())),
        };
        tracing::error!(index, target_size = target, error = %error, "Failed to build script environment");
        failures.push(BuildFailure { index, error });
    }

    let lifecycle = if failures.is_empty() {
        PoolLifecycle::Ready
    } else {
        PoolLifecycle::Partial
    };
    pool.set_lifecycle(lifecycle);

    let duration = started.elapsed();
    tracing::info!(
        built,
        failed = failures.len(),
        target_size = target,
        elapsed_ms = duration.as_millis() as u64,
        "Environment warm-up finished"
    );

    WarmupReport { target, built, failures, duration }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
