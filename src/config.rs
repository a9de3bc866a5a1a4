//! Pool settings with builder pattern

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::properties;

/// Smallest pool the warm-up will ever target
pub const MIN_POOL_SIZE: usize = 5;
/// Largest pool the warm-up will ever target
pub const MAX_POOL_SIZE: usize = 100;

/// Default entry point evaluated by every environment
pub const DEFAULT_ENTRYPOINT: &str = "entrypoint.rhai";
/// Script function invoked after the entry point has been evaluated
pub const DEFAULT_POST_BUILD: &str = "initTemplates";

pub const BASEDIR_KEY: &str = "javascript.basedir";
pub const INSTALL_NAME_KEY: &str = "javascript.install.name";
pub const POOL_SIZE_KEY: &str = "javascript.pool.size";
pub const ENTRYPOINT_KEY: &str = "javascript.entrypoint";
pub const POST_BUILD_KEY: &str = "javascript.post.build";

/// Distribution whose modules are shared by every installation
pub const COMMON_INSTALL_NAME: &str = "common";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Root holding the `distributions/` tree
    pub base_dir: PathBuf,
    /// Distribution the entry point and primary modules come from
    pub install_name: String,
    /// File name under `src/entrypoints/update/`
    pub entrypoint: String,
    /// Requested pool size, clamped by [`PoolSettings::target_size`]
    pub pool_size: usize,
    /// Function called once the entry point is evaluated; `None` skips the step
    pub post_build: Option<String>,
    /// Raw service settings handed to the post-build function
    pub properties: BTreeMap<String, String>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::new(),
            install_name: String::new(),
            entrypoint: DEFAULT_ENTRYPOINT.to_string(),
            pool_size: MIN_POOL_SIZE,
            post_build: Some(DEFAULT_POST_BUILD.to_string()),
            properties: BTreeMap::new(),
        }
    }
}

impl PoolSettings {
    pub fn builder() -> PoolSettingsBuilder {
        PoolSettingsBuilder::default()
    }

    /// Pool size actually targeted by the warm-up
    pub fn target_size(&self) -> usize {
        self.pool_size.clamp(MIN_POOL_SIZE, MAX_POOL_SIZE)
    }

    /// `<base>/distributions/<install>/src`
    pub fn modules_dir(&self) -> PathBuf {
        self.distribution_dir(&self.install_name)
    }

    /// `<base>/distributions/common/src`
    pub fn common_modules_dir(&self) -> PathBuf {
        self.distribution_dir(COMMON_INSTALL_NAME)
    }

    /// `<base>/distributions/<install>/src/entrypoints/update/<entrypoint>`
    pub fn entrypoint_path(&self) -> PathBuf {
        self.modules_dir()
            .join("entrypoints")
            .join("update")
            .join(&self.entrypoint)
    }

    fn distribution_dir(&self, install_name: &str) -> PathBuf {
        self.base_dir.join("distributions").join(install_name).join("src")
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.base_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("base_dir cannot be empty".into()));
        }
        if self.install_name.is_empty() {
            return Err(crate::Error::Config("install_name cannot be empty".into()));
        }
        if self.entrypoint.is_empty() {
            return Err(crate::Error::Config("entrypoint cannot be empty".into()));
        }
        Ok(())
    }

    /// Build settings from a service property map. The map itself is kept and
    /// later handed to the post-build function.
    pub fn from_properties(props: &BTreeMap<String, String>) -> Self {
        let mut settings = Self::default();

        if let Some(dir) = props.get(BASEDIR_KEY) {
            settings.base_dir = PathBuf::from(dir);
        }
        if let Some(name) = props.get(INSTALL_NAME_KEY) {
            settings.install_name = name.clone();
        }
        if let Some(entry) = props.get(ENTRYPOINT_KEY).filter(|e| !e.is_empty()) {
            settings.entrypoint = entry.clone();
        }
        if let Some(post) = props.get(POST_BUILD_KEY) {
            settings.post_build = (!post.is_empty()).then(|| post.clone());
        }
        match props.get(POOL_SIZE_KEY).map(|s| s.trim().parse::<usize>()) {
            Some(Ok(size)) => settings.pool_size = size,
            Some(Err(e)) => {
                tracing::warn!(key = POOL_SIZE_KEY, error = %e, "Invalid pool size, using minimum");
            }
            None => {
                tracing::warn!(key = POOL_SIZE_KEY, "Pool size not configured, using minimum");
            }
        }

        settings.properties = props.clone();
        settings
    }

    /// Load settings from a `.json` document or a `.properties` file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let text = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&text)?)
        } else {
            Ok(Self::from_properties(&properties::load(path)?))
        }
    }
}

#[derive(Default)]
pub struct PoolSettingsBuilder {
    settings: PoolSettings,
}

impl PoolSettingsBuilder {
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.base_dir = dir.into();
        self
    }

    pub fn install_name(mut self, name: impl Into<String>) -> Self {
        self.settings.install_name = name.into();
        self
    }

    pub fn entrypoint(mut self, file: impl Into<String>) -> Self {
        self.settings.entrypoint = file.into();
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.settings.pool_size = size;
        self
    }

    pub fn post_build(mut self, function: Option<&str>) -> Self {
        self.settings.post_build = function.map(str::to_string);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> PoolSettings {
        self.settings
    }

    pub fn build_validated(self) -> crate::Result<PoolSettings> {
        let settings = self.build();
        settings.validate()?;
        Ok(settings)
    }
}
