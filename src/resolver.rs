//! Module lookup across prioritized sources
//!
//! Scripts import modules by id (`import "record/fields" as fields;`). The
//! loader asks every registered source in order, trying each of that source's
//! search paths, and returns the first hit. An id of the form `scheme:id`
//! restricts the lookup to one source.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use rhai::{Engine, EvalAltResult, Module, Position, Scope};
use crate::{properties, Result};

/// Settings file read from each directory source
pub const SETTINGS_FILE: &str = "settings.properties";
/// Settings resource read from the embedded source
pub const EMBEDDED_SETTINGS: &str = "jsmodules.settings";
/// Key holding the `;` separated search path list
pub const SEARCH_PATH_KEY: &str = "modules.search.path";
/// Extension appended to module ids that carry none
pub const MODULE_EXTENSION: &str = "rhai";

/// A place module text can be read from
#[cfg_attr(test, mockall::automock)]
pub trait ModuleSource: Send + Sync {
    /// Read a resource relative to the source root. `Ok(None)` when absent.
    fn read(&self, path: &str) -> Result<Option<String>>;

    /// Human readable location, used in logs
    fn describe(&self) -> String;
}

/// Modules stored under a directory on disk
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ModuleSource for DirectorySource {
    fn read(&self, path: &str) -> Result<Option<String>> {
        let file = self.root.join(path);
        match std::fs::read_to_string(&file) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Modules bundled in memory, the counterpart of class path resources
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSource {
    resources: HashMap<String, String>,
}

impl EmbeddedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, path: impl Into<String>, text: impl Into<String>) -> Self {
        self.resources.insert(path.into(), text.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ModuleSource for EmbeddedSource {
    fn read(&self, path: &str) -> Result<Option<String>> {
        Ok(self.resources.get(path).cloned())
    }

    fn describe(&self) -> String {
        format!("embedded ({} resources)", self.resources.len())
    }
}

/// Where a module was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedModule {
    /// `scheme:path` of the file that matched
    pub uri: String,
    pub source: String,
}

struct Registration {
    scheme: String,
    source: Box<dyn ModuleSource>,
    search_paths: Vec<String>,
}

/// Prioritized list of module sources
#[derive(Default)]
pub struct ModuleLoader {
    registrations: Vec<Registration>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `scheme`, reading its search paths from the
    /// settings resource `settings_name`. A missing settings resource is logged
    /// and the source is then searched at its root.
    pub fn register(
        &mut self,
        scheme: impl Into<String>,
        source: impl ModuleSource + 'static,
        settings_name: &str,
    ) -> &mut Self {
        let scheme = scheme.into();
        let search_paths = match read_search_paths(&source, settings_name) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(
                    scheme = %scheme,
                    source = %source.describe(),
                    error = %e,
                    "Unable to read module settings, searching source root only"
                );
                Vec::new()
            }
        };
        self.register_with_paths(scheme, source, search_paths)
    }

    /// Register a source with explicit search paths
    pub fn register_with_paths(
        &mut self,
        scheme: impl Into<String>,
        source: impl ModuleSource + 'static,
        search_paths: Vec<String>,
    ) -> &mut Self {
        let scheme = scheme.into();
        let search_paths = if search_paths.is_empty() {
            vec![String::new()]
        } else {
            search_paths
        };

        tracing::debug!(scheme = %scheme, source = %source.describe(), paths = ?search_paths, "Registered module source");
        self.registrations.push(Registration {
            scheme,
            source: Box::new(source),
            search_paths,
        });
        self
    }

    pub fn schemes(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.scheme.as_str()).collect()
    }

    /// Search paths of one scheme, in lookup order
    pub fn search_paths(&self, scheme: &str) -> Option<&[String]> {
        self.registrations
            .iter()
            .find(|r| r.scheme == scheme)
            .map(|r| r.search_paths.as_slice())
    }

    /// Find a module and return its text. `Ok(None)` when no source has it.
    pub fn locate(&self, id: &str) -> Result<Option<(LocatedModule, String)>> {
        let (scheme, name) = split_scheme(id);
        let file = module_file(name);

        let candidates = self
            .registrations
            .iter()
            .filter(|r| scheme.map_or(true, |s| s == r.scheme));

        for reg in candidates {
            for search in &reg.search_paths {
                let path = join_path(search, &file);
                if let Some(text) = reg.source.read(&path)? {
                    let located = LocatedModule {
                        uri: format!("{}:{}", reg.scheme, path),
                        source: reg.source.describe(),
                    };
                    tracing::trace!(module = %id, uri = %located.uri, "Module located");
                    return Ok(Some((located, text)));
                }
            }
        }

        Ok(None)
    }
}

impl rhai::ModuleResolver for ModuleLoader {
    fn resolve(
        &self,
        engine: &Engine,
        _source: Option<&str>,
        path: &str,
        pos: Position,
    ) -> std::result::Result<rhai::Shared<Module>, Box<EvalAltResult>> {
        let in_module = |err: Box<EvalAltResult>| {
            Box::new(EvalAltResult::ErrorInModule(path.to_string(), err, pos))
        };

        let (located, text) = match self.locate(path) {
            Ok(Some(found)) => found,
            Ok(None) => return Err(EvalAltResult::ErrorModuleNotFound(path.to_string(), pos).into()),
            Err(e) => return Err(in_module(e.to_string().into())),
        };

        let mut ast = engine.compile(&text).map_err(|e| in_module(e.into()))?;
        ast.set_source(located.uri.as_str());

        let module = Module::eval_ast_as_new(Scope::new(), &ast, engine).map_err(in_module)?;
        Ok(module.into())
    }
}

fn read_search_paths(source: &dyn ModuleSource, settings_name: &str) -> Result<Vec<String>> {
    let Some(text) = source.read(settings_name)? else {
        tracing::warn!(source = %source.describe(), file = settings_name, "Module settings file does not exist");
        return Ok(Vec::new());
    };

    let props = properties::parse(&text);
    let Some(value) = props.get(SEARCH_PATH_KEY) else {
        tracing::warn!(source = %source.describe(), "Search path for modules is not specified");
        return Ok(Vec::new());
    };

    Ok(value
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect())
}

fn split_scheme(id: &str) -> (Option<&str>, &str) {
    match id.split_once(':') {
        Some((scheme, name)) if !scheme.is_empty() => (Some(scheme), name),
        _ => (None, id),
    }
}

fn module_file(name: &str) -> String {
    let has_extension = Path::new(name).extension().is_some();
    if has_extension {
        name.to_string()
    } else {
        format!("{}.{}", name, MODULE_EXTENSION)
    }
}

fn join_path(search: &str, file: &str) -> String {
    let search = search.trim_matches('/');
    if search.is_empty() || search == "." {
        file.to_string()
    } else {
        format!("{}/{}", search, file)
    }
}
