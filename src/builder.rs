//! Construction of script environments
//!
//! Building an environment resolves the module sources of the configured
//! distribution, evaluates the update entry point and runs the post-build
//! function (template loading). It is slow, so the pool does it ahead of time.

use std::time::Instant;
use crate::config::PoolSettings;
use crate::environment::ScriptEnvironment;
use crate::resolver::{DirectorySource, EmbeddedSource, ModuleLoader, EMBEDDED_SETTINGS, SETTINGS_FILE};
use crate::{Error, Result};

/// Scheme of the installation's own modules
pub const FILE_SCHEME: &str = "file";
/// Scheme of the modules shared by all installations
pub const COMMON_SCHEME: &str = "common";
/// Scheme of modules bundled with the service
pub const CLASSPATH_SCHEME: &str = "classpath";

/// Something that can produce pool environments.
///
/// Implementations must be callable concurrently and repeatedly; each call is
/// independent and may fail on its own.
#[cfg_attr(test, mockall::automock(type Environment = u32;))]
pub trait EnvironmentFactory: Send + Sync + 'static {
    type Environment: Send + 'static;

    fn build(&self, settings: &PoolSettings) -> Result<Self::Environment>;
}

/// Builds [`ScriptEnvironment`]s from a distribution tree on disk
#[derive(Debug, Clone, Default)]
pub struct EnvironmentBuilder {
    embedded: EmbeddedSource,
}

impl EnvironmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modules bundled with the service, searched after the file system
    pub fn with_embedded(mut self, embedded: EmbeddedSource) -> Self {
        self.embedded = embedded;
        self
    }

    /// Module sources in lookup order: installation, common, embedded
    pub fn module_loader(&self, settings: &PoolSettings) -> ModuleLoader {
        let mut loader = ModuleLoader::new();
        loader
            .register(FILE_SCHEME, DirectorySource::new(settings.modules_dir()), SETTINGS_FILE)
            .register(COMMON_SCHEME, DirectorySource::new(settings.common_modules_dir()), SETTINGS_FILE)
            .register(CLASSPATH_SCHEME, self.embedded.clone(), EMBEDDED_SETTINGS);
        loader
    }

    fn try_build(&self, settings: &PoolSettings) -> Result<ScriptEnvironment> {
        settings.validate()?;

        let loader = self.module_loader(settings);
        let mut env = ScriptEnvironment::evaluate(loader, &settings.entrypoint_path())?;

        if let Some(function) = &settings.post_build {
            let started = Instant::now();
            env.call_with_settings(function, &settings.properties)?;
            tracing::debug!(
                env = %env.id(),
                function = %function,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Post-build step finished"
            );
        }

        Ok(env)
    }
}

impl EnvironmentFactory for EnvironmentBuilder {
    type Environment = ScriptEnvironment;

    fn build(&self, settings: &PoolSettings) -> Result<ScriptEnvironment> {
        let started = Instant::now();

        match self.try_build(settings) {
            Ok(env) => {
                tracing::info!(
                    env = %env.id(),
                    install = %settings.install_name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Script environment created"
                );
                Ok(env)
            }
            Err(e) => {
                tracing::debug!(install = %settings.install_name, error = %e, "Script environment build failed");
                Err(Error::build(e))
            }
        }
    }
}
