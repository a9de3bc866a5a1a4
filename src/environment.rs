//! A ready-to-use script execution context

use std::collections::BTreeMap;
use std::path::Path;
use rhai::{Dynamic, Engine, Scope, AST};
use uuid::Uuid;
use crate::resolver::ModuleLoader;
use crate::Result;

/// One interpreter with its entry point already evaluated.
///
/// An environment is stateful and must only be used by one caller at a time;
/// every call takes `&mut self`. It is `Send`, so the pool can move it between
/// worker threads.
pub struct ScriptEnvironment {
    id: Uuid,
    engine: Engine,
    ast: AST,
    scope: Scope<'static>,
}

impl std::fmt::Debug for ScriptEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptEnvironment")
            .field("id", &self.id)
            .field("source", &self.ast.source())
            .field("variables", &self.scope.len())
            .finish()
    }
}

impl ScriptEnvironment {
    /// Compile and evaluate `entrypoint`, resolving imports through `loader`
    pub fn evaluate(loader: ModuleLoader, entrypoint: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(entrypoint)?;

        let mut engine = Engine::new();
        engine.set_module_resolver(loader);

        let mut ast = engine.compile(&text)?;
        ast.set_source(entrypoint.display().to_string());

        let mut scope = Scope::new();
        engine.run_ast_with_scope(&mut scope, &ast)?;

        Ok(Self {
            id: Uuid::new_v4(),
            engine,
            ast,
            scope,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Check whether the entry point defines `name` taking `arity` arguments
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    /// Call a script function. The entry point is not re-run and variables
    /// created by the call do not leak into later calls.
    pub fn call_function(&mut self, name: &str, args: Vec<Dynamic>) -> Result<Dynamic> {
        let options = rhai::CallFnOptions::new().eval_ast(false).rewind_scope(true);
        let result = self
            .engine
            .call_fn_with_options::<Dynamic>(options, &mut self.scope, &self.ast, name, args)?;
        Ok(result)
    }

    /// Call a script function with a string map, the shape service settings
    /// are handed to scripts in.
    pub fn call_with_settings(&mut self, name: &str, settings: &BTreeMap<String, String>) -> Result<Dynamic> {
        let map: rhai::Map = settings
            .iter()
            .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
            .collect();
        self.call_function(name, vec![Dynamic::from_map(map)])
    }

    /// Read a global variable left behind by the entry point
    pub fn global(&self, name: &str) -> Option<Dynamic> {
        self.scope.get_value::<Dynamic>(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::EmbeddedSource;

    fn write_entry(dir: &Path, text: &str) -> std::path::PathBuf {
        let path = dir.join("entrypoint.rhai");
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_evaluate_and_call() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = write_entry(
            dir.path(),
            r#"
            let greeting = "hello";
            fn validate(record) { record.len() > 0 }
            "#,
        );

        let mut env = ScriptEnvironment::evaluate(ModuleLoader::new(), &entry).unwrap();
        assert!(env.has_function("validate", 1));
        assert!(!env.has_function("validate", 2));
        assert_eq!(env.global("greeting").unwrap().into_string().unwrap(), "hello");

        let ok = env.call_function("validate", vec![Dynamic::from("001 00 a")]).unwrap();
        assert!(ok.as_bool().unwrap());
    }

    #[test]
    fn test_entrypoint_imports_modules() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = write_entry(dir.path(), r#"import "fields" as f; let tag = f::title_tag();"#);

        let mut loader = ModuleLoader::new();
        loader.register_with_paths(
            "classpath",
            EmbeddedSource::new().with_resource("fields.rhai", r#"fn title_tag() { "245" }"#),
            vec![],
        );

        let env = ScriptEnvironment::evaluate(loader, &entry).unwrap();
        assert_eq!(env.global("tag").unwrap().into_string().unwrap(), "245");
    }

    #[test]
    fn test_call_with_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = write_entry(dir.path(), r#"fn install(settings) { settings["javascript.install.name"] }"#);

        let mut env = ScriptEnvironment::evaluate(ModuleLoader::new(), &entry).unwrap();
        let mut settings = BTreeMap::new();
        settings.insert("javascript.install.name".to_string(), "fbs".to_string());

        let name = env.call_with_settings("install", &settings).unwrap();
        assert_eq!(name.into_string().unwrap(), "fbs");
    }

    #[test]
    fn test_errors() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.rhai");
        assert!(matches!(
            ScriptEnvironment::evaluate(ModuleLoader::new(), &missing),
            Err(crate::Error::Io(_))
        ));

        let broken = write_entry(dir.path(), "fn (");
        assert!(matches!(
            ScriptEnvironment::evaluate(ModuleLoader::new(), &broken),
            Err(crate::Error::Script(_))
        ));

        let entry = write_entry(dir.path(), "fn noop() { () }");
        let mut env = ScriptEnvironment::evaluate(ModuleLoader::new(), &entry).unwrap();
        assert!(env.call_function("absent", vec![]).is_err());
    }

    #[test]
    fn test_environment_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ScriptEnvironment>();
    }
}
