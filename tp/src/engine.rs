//! Template engine
//!
//! Owns the configuration, the function bindings and the published registry.
//! Loading builds a new registry off to the side while holding the write lock
//! and swaps it in only on success, so renders always see a complete registry.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use handlebars::{Context, Handlebars, Helper, HelperDef, HelperResult, Output, RenderContext, RenderError, ScopedJson};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::delims::Delims;
use crate::error::EngineError;
use crate::layout;
use crate::registry::{Entry, Registry};
use crate::source::{DirSource, TemplateSource};

/// A function callable from templates
pub type Function = Arc<dyn HelperDef + Send + Sync>;

/// Lets one registered function be installed into every rebuilt registry
pub(crate) struct SharedHelper(pub(crate) Function);

impl HelperDef for SharedHelper {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
    ) -> Result<ScopedJson<'rc>, RenderError> {
        self.0.call_inner(h, r, ctx, rc)
    }

    fn call<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'rc>,
        r: &'reg Handlebars<'reg>,
        ctx: &'rc Context,
        rc: &mut RenderContext<'reg, 'rc>,
        out: &mut dyn Output,
    ) -> HelperResult {
        self.0.call(h, r, ctx, rc, out)
    }
}

/// Options applied on every load
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) extension: String,
    pub(crate) delims: Delims,
    pub(crate) reload: bool,
    pub(crate) debug: bool,
    pub(crate) strict: bool,
}

impl Settings {
    pub(crate) fn new(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            delims: Delims::default(),
            reload: false,
            debug: false,
            strict: false,
        }
    }
}

/// State guarded by the engine lock
struct Shared {
    functions: HashMap<String, Function>,
    registry: Arc<Registry>,
    loaded: bool,
}

/// Loads templates from a source and renders them inside nested layouts
pub struct Engine {
    source: Box<dyn TemplateSource>,
    settings: Settings,
    shared: RwLock<Shared>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("root", &self.source.root())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine for the templates under `directory`
    ///
    /// Nothing is read until [`load`](Self::load) or the first render.
    pub fn new(directory: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self::with_source(DirSource::new(directory), extension)
    }

    /// Create an engine over any template source
    pub fn with_source<S>(source: S, extension: impl Into<String>) -> Self
    where
        S: TemplateSource + 'static,
    {
        let settings = Settings::new(extension);
        debug!(root = ?source.root(), extension = %settings.extension, "Engine::with_source: called");
        Self {
            source: Box::new(source),
            settings,
            shared: RwLock::new(Shared {
                functions: HashMap::new(),
                registry: Arc::new(Registry::default()),
                loaded: false,
            }),
        }
    }

    /// Create a directory-backed engine from configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        debug!(?config, "Engine::from_config: called");
        let mut engine = Self::new(&config.directory, &config.extension);
        engine
            .set_delims(&config.delims.left, &config.delims.right)
            .set_reload(config.reload)
            .set_debug(config.debug)
            .set_strict(config.strict);
        engine
    }

    /// Set the expression delimiters; an empty side keeps the default
    pub fn set_delims(&mut self, left: impl Into<String>, right: impl Into<String>) -> &mut Self {
        self.settings.delims = Delims::new(left, right);
        self
    }

    /// Rebuild the registry before every render
    pub fn set_reload(&mut self, reload: bool) -> &mut Self {
        self.settings.reload = reload;
        self
    }

    /// Report every registered template name at info level
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.settings.debug = debug;
        self
    }

    /// Treat missing fields in binding data as render errors
    pub fn set_strict(&mut self, strict: bool) -> &mut Self {
        self.settings.strict = strict;
        self
    }

    pub fn extension(&self) -> &str {
        &self.settings.extension
    }

    pub fn delims(&self) -> &Delims {
        &self.settings.delims
    }

    pub fn reload(&self) -> bool {
        self.settings.reload
    }

    /// Bind a function under `name`, replacing any previous binding
    ///
    /// Takes effect on the next load.
    pub fn register_function<H>(&self, name: impl Into<String>, helper: H) -> Result<(), EngineError>
    where
        H: HelperDef + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(%name, "Engine::register_function: called");
        let mut shared = self.shared.write().map_err(|_| EngineError::LockPoisoned)?;
        shared.functions.insert(name, Arc::new(helper));
        Ok(())
    }

    /// Rebuild the registry from the source
    ///
    /// On failure the previously loaded templates stay in place.
    pub fn load(&self) -> Result<(), EngineError> {
        debug!("Engine::load: called");
        let mut shared = self.shared.write().map_err(|_| EngineError::LockPoisoned)?;
        self.load_locked(&mut shared)
    }

    fn load_locked(&self, shared: &mut Shared) -> Result<(), EngineError> {
        let registry = layout::compose(self.source.as_ref(), &self.settings, &shared.functions)?;
        info!(root = ?self.source.root(), count = registry.len(), "Loaded templates");
        shared.registry = Arc::new(registry);
        shared.loaded = true;
        Ok(())
    }

    /// Current registry, loading first when reload is on or nothing was loaded yet
    fn current(&self) -> Result<Arc<Registry>, EngineError> {
        if self.settings.reload {
            debug!("Engine::current: reload on render");
            let mut shared = self.shared.write().map_err(|_| EngineError::LockPoisoned)?;
            self.load_locked(&mut shared)?;
            return Ok(shared.registry.clone());
        }

        {
            let shared = self.shared.read().map_err(|_| EngineError::LockPoisoned)?;
            if shared.loaded {
                return Ok(shared.registry.clone());
            }
        }

        let mut shared = self.shared.write().map_err(|_| EngineError::LockPoisoned)?;
        if !shared.loaded {
            debug!("Engine::current: first render, loading");
            self.load_locked(&mut shared)?;
        }
        Ok(shared.registry.clone())
    }

    /// Snapshot of the published registry
    pub fn registry(&self) -> Result<Arc<Registry>, EngineError> {
        let shared = self.shared.read().map_err(|_| EngineError::LockPoisoned)?;
        Ok(shared.registry.clone())
    }

    /// Look up a loaded template by logical name
    pub fn lookup(&self, name: &str) -> Result<Entry, EngineError> {
        self.registry()?
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound { name: name.to_string() })
    }

    /// Logical names of all loaded templates, sorted
    pub fn names(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.registry()?.names().map(str::to_string).collect())
    }

    /// Render `name` into `out`, wrapped in `layouts` (innermost first)
    ///
    /// `render(out, "index", data, &["layouts/nested", "layouts/main"])` writes
    /// main's head, nested's head, index, nested's tail, then main's tail.
    pub fn render<W, T>(&self, out: &mut W, name: &str, data: &T, layouts: &[&str]) -> Result<(), EngineError>
    where
        W: Write + ?Sized,
        T: Serialize,
    {
        debug!(%name, ?layouts, "Engine::render: called");
        let registry = self.current()?;
        layout::render(&registry, out, name, data, layouts)
    }

    /// Render into a new string
    pub fn render_to_string<T>(&self, name: &str, data: &T, layouts: &[&str]) -> Result<String, EngineError>
    where
        T: Serialize,
    {
        let mut out = Vec::new();
        self.render(&mut out, name, data, layouts)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use handlebars::handlebars_helper;
    use serde_json::json;

    handlebars_helper!(shout: |s: str| s.to_uppercase());
    handlebars_helper!(whisper: |s: str| s.to_lowercase());

    fn memory_engine(files: &[(&str, &str)]) -> (Engine, MemorySource) {
        let source: MemorySource = files.iter().copied().collect();
        (Engine::with_source(source.clone(), ".html"), source)
    }

    #[test]
    fn test_new_does_not_touch_filesystem() {
        let engine = Engine::new("/definitely/not/here", ".html");

        assert_eq!(engine.extension(), ".html");
        assert!(engine.delims().is_default());
        assert!(engine.names().unwrap().is_empty());
        assert!(engine.load().is_err());
    }

    #[test]
    fn test_render_loads_lazily() {
        let (engine, _) = memory_engine(&[("/index.html", "<h1>{{Title}}</h1>")]);

        let out = engine.render_to_string("index", &json!({"Title": "Hi"}), &[]).unwrap();
        assert_eq!(out, "<h1>Hi</h1>");
        assert_eq!(engine.names().unwrap(), vec!["index".to_string()]);
    }

    #[test]
    fn test_failed_load_keeps_previous_registry() {
        let (engine, source) = memory_engine(&[("/index.html", "v1")]);
        engine.load().unwrap();

        source.insert("/broken.html", "a<!--tplusContent-->b<!--tplusContent-->c");
        let err = engine.load().unwrap_err();
        assert!(matches!(err, EngineError::TooManyMarkers { ref name } if name == "broken"));

        assert!(engine.lookup("broken").is_err());
        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "v1");
    }

    #[test]
    fn test_register_function_applies_on_next_load() {
        let (engine, _) = memory_engine(&[("/index.html", "{{shout Title}}")]);
        engine.register_function("shout", shout).unwrap();
        engine.load().unwrap();

        let out = engine.render_to_string("index", &json!({"Title": "hey"}), &[]).unwrap();
        assert_eq!(out, "HEY");

        // overwrite, not visible until reload
        engine.register_function("shout", whisper).unwrap();
        let out = engine.render_to_string("index", &json!({"Title": "HeY"}), &[]).unwrap();
        assert_eq!(out, "HEY");

        engine.load().unwrap();
        let out = engine.render_to_string("index", &json!({"Title": "HeY"}), &[]).unwrap();
        assert_eq!(out, "hey");
    }

    #[test]
    fn test_custom_delims() {
        let (mut engine, _) = memory_engine(&[
            ("/index.html", "<h1>[[Title]]</h1>"),
            ("/layouts/main.html", "<main>[[#if Title]]![[/if]]<!--tplusContent--></main>"),
        ]);
        engine.set_delims("[[", "]]");

        let out = engine
            .render_to_string("index", &json!({"Title": "Hi"}), &["layouts/main"])
            .unwrap();
        assert_eq!(out, "<main>!<h1>Hi</h1></main>");
    }

    #[test]
    fn test_custom_delims_backslash_before_expression() {
        let (mut engine, _) = memory_engine(&[("/index.html", "C:\\[[dir]]")]);
        engine.set_delims("[[", "]]");

        let out = engine.render_to_string("index", &json!({"dir": "tmp"}), &[]).unwrap();
        assert_eq!(out, "C:\\tmp");
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn info_log_of_load(debug: bool) -> String {
        let (mut engine, _) = memory_engine(&[("/index.html", "<h1>x</h1>")]);
        engine.set_debug(debug);

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || engine.load().unwrap());

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_debug_flag_reports_registered_views() {
        let quiet = info_log_of_load(false);
        assert!(quiet.contains("Loaded templates"));
        assert!(!quiet.contains("Registered view"));

        let verbose = info_log_of_load(true);
        assert!(verbose.contains("Registered view"));
        assert!(verbose.contains("index"));
    }

    #[test]
    fn test_reload_on_render() {
        let (mut engine, source) = memory_engine(&[("/index.html", "v1")]);
        engine.set_reload(true);

        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "v1");
        source.insert("/index.html", "v2");
        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "v2");
    }

    #[test]
    fn test_reload_off_ignores_edits() {
        let (engine, source) = memory_engine(&[("/index.html", "v1")]);

        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "v1");
        source.insert("/index.html", "v2");
        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "v1");
    }

    #[test]
    fn test_reload_error_aborts_render() {
        let (mut engine, source) = memory_engine(&[("/index.html", "v1")]);
        engine.set_reload(true);
        source.insert("/index.html", "{{#each}}");

        let mut out = Vec::new();
        let err = engine.render(&mut out, "index", &json!({}), &[]).unwrap_err();
        assert!(err.is_load_error());
        assert!(out.is_empty());
    }

    #[test]
    fn test_strict_mode() {
        let (mut engine, _) = memory_engine(&[("/index.html", "<h1>{{Title}}</h1>")]);

        assert_eq!(engine.render_to_string("index", &json!({}), &[]).unwrap(), "<h1></h1>");

        engine.set_strict(true);
        engine.load().unwrap();
        let err = engine.render_to_string("index", &json!({}), &[]).unwrap_err();
        assert!(matches!(err, EngineError::Render { ref name, .. } if name == "index"));
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
