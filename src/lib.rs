//! Script Environment Pool
//!
//! Validation rules of the update service run inside script environments that
//! are expensive to construct: module resolution, interpreter bootstrap and
//! template loading. This crate keeps a bounded set of them ready and lends
//! them to concurrent requests.
//!
//! # Key Features
//!
//! - **Non-blocking startup** - environments are built on a background thread
//! - **Exclusive borrowing** - an environment is held by one caller at a time
//! - **Failure tolerant** - a failed build shrinks the pool instead of aborting it
//! - **Health checks** - `NOT_AVAILABLE` / `CREATING` / `OK` readiness signal
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scripter_pool::{Dynamic, EnvironmentBuilder, EnvironmentPool, PoolSettings, WarmupCoordinator};
//!
//! let settings = PoolSettings::builder()
//!     .base_dir("/opt/updateservice/scripts")
//!     .install_name("fbs")
//!     .pool_size(10)
//!     .build_validated()?;
//!
//! let pool = Arc::new(EnvironmentPool::new());
//! let warmup = WarmupCoordinator::new(Arc::new(EnvironmentBuilder::new()), Arc::clone(&pool));
//! warmup.start(&settings)?;
//!
//! // Blocks until the first environment is built
//! let mut env = pool.acquire();
//! let result = env.call_function("validateRecord", vec![Dynamic::from("001 00 *a1234".to_string())])?;
//! println!("{result}");
//! // `env` goes back to the pool when dropped
//! # Ok::<(), scripter_pool::Error>(())
//! ```

pub mod api;
pub mod builder;
pub mod config;
pub mod environment;
pub mod error;
pub mod pool;
pub mod properties;
pub mod resolver;
pub mod status;
pub mod warmup;

pub use builder::{EnvironmentBuilder, EnvironmentFactory};
pub use config::PoolSettings;
pub use environment::ScriptEnvironment;
pub use rhai::Dynamic;
pub use error::{Error, Result};
pub use pool::{EnvironmentPool, PoolLifecycle, PooledEnvironment};
pub use status::{PoolStatus, StatusReporter};
pub use warmup::{WarmupCoordinator, WarmupReport};
