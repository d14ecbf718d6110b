//! Public interface for embedding the Duso runtime.
//!
//! An [`Engine`] owns the shared runtime: builtin registry, datastore
//! registry, module caches, embedded resources, host capability hooks, and
//! the spawn tracker. Every script it executes gets a fresh evaluator and
//! environment chain over that shared runtime.
//!
//! # Example
//! ```
//! use duso::Engine;
//!
//! let engine = Engine::builder().build();
//! let result = engine.eval("1 + 2").unwrap();
//! assert_eq!(result.as_number(), Some(3.0));
//! ```

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use crate::{
    args::ArgMap,
    ast::Block,
    builtins::Builtins,
    capability::{FileAccess, FilePolicy, InputReader, StdFileAccess, StdInput},
    context::{CancelToken, DispatchFrame, RequestContext, UnitKind, push_context},
    datastore::{DatastoreRegistry, Namespace, PersistConfig},
    embed::EmbeddedResources,
    error::{RunError, RunResult, ScriptError},
    eval::Evaluator,
    http::{HttpClient, HttpRequest, HttpResponse},
    io::{PrintWriter, StdPrint},
    modules::{self, ModuleStore},
    scope::Scope,
    tasks::SpawnTracker,
    tracer::{EvalTracer, NoopTracer},
    value::{CodeValue, Value},
};

/// How long shutdown waits for in-flight spawned units by default.
const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Shared state behind one engine: everything concurrent units may touch.
pub(crate) struct Runtime {
    pub(crate) builtins: Builtins,
    pub(crate) datastores: DatastoreRegistry,
    pub(crate) modules: ModuleStore,
    pub(crate) embedded: EmbeddedResources,
    pub(crate) search_paths: Vec<PathBuf>,
    pub(crate) policy: FilePolicy,
    pub(crate) files: Arc<dyn FileAccess>,
    pub(crate) input: Option<Arc<dyn InputReader>>,
    pub(crate) http: Option<Arc<dyn HttpClient>>,
    pub(crate) print: Mutex<Box<dyn PrintWriter>>,
    pub(crate) tracer: Arc<dyn EvalTracer>,
    pub(crate) spawns: SpawnTracker,
    pub(crate) max_parallel: usize,
    shutdown_grace: Duration,
    shutdown_done: AtomicBool,
}

impl Runtime {
    /// A fresh root scope carrying only the builtin registry.
    pub(crate) fn base_scope(&self) -> Scope {
        let root = Scope::root();
        self.builtins.seed(&root);
        root
    }
}

/// The embeddable scripting engine.
pub struct Engine {
    runtime: Arc<Runtime>,
}

impl Engine {
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Evaluates source text as an anonymous script and returns its terminal
    /// value. No request context is installed: `context()` yields nil.
    pub fn eval(&self, source: &str) -> Result<Value, ScriptError> {
        let program = Arc::new(crate::parse::parse_program(source)?);
        self.execute(&program, None, None)
    }

    /// Runs a script resolved like a module (so `EMBED/`/`STORE/` prefixes
    /// and search paths apply). A payload installs a request context of kind
    /// `run`, retrievable via `context().request()`.
    pub fn run_path(&self, path: &str, payload: Option<Value>) -> Result<Value, ScriptError> {
        let probe = Evaluator::new(self.runtime.clone(), None, CancelToken::new());
        let module = modules::load(&probe, path).map_err(ScriptError::from_run)?;
        self.execute(&module.program, module.script_path, payload)
    }

    /// Runs already-parsed code (a value returned by [`parse`](Self::parse)).
    pub fn run_code(&self, code: &Value, payload: Option<Value>) -> Result<Value, ScriptError> {
        let Value::Code(code) = code else {
            return Err(ScriptError::from_run(RunError::type_error(format!(
                "run_code() expects a code value, got {}",
                code.type_name()
            ))));
        };
        self.execute(&code.program, None, payload)
    }

    /// Parses source into a `Code` value without executing it.
    pub fn parse(&self, source: &str, name: Option<&str>) -> Result<Value, ScriptError> {
        let program = crate::parse::parse_program(source)?;
        Ok(Value::Code(Arc::new(CodeValue {
            source: source.into(),
            program: Arc::new(program),
            name: name.map(str::to_owned),
            meta: None,
        })))
    }

    /// Dispatches an HTTP request to a handler script: installs a request
    /// context of kind `http` carrying the request object, and interprets the
    /// handler's terminal value as the response.
    pub fn handle_http(&self, handler: &str, request: &HttpRequest) -> Result<HttpResponse, ScriptError> {
        let probe = Evaluator::new(self.runtime.clone(), None, CancelToken::new());
        let module = modules::load(&probe, handler).map_err(ScriptError::from_run)?;
        let terminal = self.dispatch(
            &module.program,
            module.script_path,
            request.to_value(),
            UnitKind::Http,
        )?;
        HttpResponse::from_value(&terminal).map_err(ScriptError::from_run)
    }

    /// Host-side handle to a datastore namespace, sharing the registry
    /// scripts see.
    #[must_use]
    pub fn datastore(&self, name: &str) -> DatastoreHandle {
        DatastoreHandle {
            namespace: self.runtime.datastores.namespace(name),
        }
    }

    /// Attaches JSON snapshot persistence to a namespace.
    pub fn persist_namespace(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
        interval: Duration,
    ) -> Result<(), ScriptError> {
        self.runtime
            .datastores
            .configure_persistence(
                name,
                PersistConfig {
                    path: path.into(),
                    interval,
                },
            )
            .map_err(ScriptError::from_run)
    }

    /// Drops every cached module export, forcing the next `require` of each
    /// path to re-execute. The parse cache is left in place.
    pub fn clear_module_cache(&self) {
        self.runtime.modules.clear_module_cache();
    }

    /// Registers an extra builtin. Must be called before scripts execute.
    pub fn register_builtin(
        &mut self,
        name: &str,
        func: impl Fn(&mut Evaluator, ArgMap) -> RunResult<Value> + Send + Sync + 'static,
    ) {
        Arc::get_mut(&mut self.runtime)
            .expect("register_builtin() must be called before any unit runs")
            .builtins
            .register(name, func);
    }

    /// Cancels outstanding spawned units, waits up to the grace period, and
    /// flushes datastore snapshots. Called automatically on drop.
    pub fn shutdown(&self, grace: Option<Duration>) {
        if self.runtime.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }
        self.runtime.spawns.shutdown(grace.unwrap_or(self.runtime.shutdown_grace));
        self.runtime.datastores.shutdown();
    }

    fn execute(
        &self,
        program: &Arc<Block>,
        path: Option<PathBuf>,
        payload: Option<Value>,
    ) -> Result<Value, ScriptError> {
        match payload {
            Some(payload) => self.dispatch(program, path, payload, UnitKind::Run),
            None => {
                let cancel = self.runtime.spawns.process_cancel.child();
                self.run_in_place(program, path, cancel)
            }
        }
    }

    fn dispatch(
        &self,
        program: &Arc<Block>,
        path: Option<PathBuf>,
        payload: Value,
        kind: UnitKind,
    ) -> Result<Value, ScriptError> {
        let cancel = self.runtime.spawns.process_cancel.child();
        let payload = payload.deep_copy().map_err(ScriptError::from_run)?;
        let context = Arc::new(RequestContext {
            payload,
            kind,
            chain: vec![DispatchFrame {
                kind,
                path: path.as_ref().map(|p| p.display().to_string()),
                line: 0,
                column: 0,
            }],
            cancel: cancel.clone(),
        });
        let _guard = push_context(context);
        self.run_in_place(program, path, cancel)
    }

    fn run_in_place(
        &self,
        program: &Arc<Block>,
        path: Option<PathBuf>,
        cancel: CancelToken,
    ) -> Result<Value, ScriptError> {
        let name = path
            .as_ref()
            .map_or_else(|| "<script>".to_owned(), |p| p.display().to_string());
        self.runtime.tracer.unit_start(UnitKind::Run, &name);
        let mut evaluator = Evaluator::new(self.runtime.clone(), path, cancel);
        let scope = self.runtime.base_scope().child();
        let result = evaluator.eval_program(program, &scope);
        match result {
            Ok(value) => {
                self.runtime.tracer.unit_end(UnitKind::Run, &name, None);
                Ok(value)
            }
            Err(err) => {
                let err = ScriptError::from_run(err);
                self.runtime.tracer.unit_end(UnitKind::Run, &name, Some(&err.0));
                Err(err)
            }
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown(None);
    }
}

/// Host-side view of one datastore namespace.
///
/// Shares the same atomic, deep-copying contract scripts get, so an HTTP
/// front-end or test can coordinate with running units.
pub struct DatastoreHandle {
    namespace: Arc<Namespace>,
}

impl DatastoreHandle {
    pub fn set(&self, key: &str, value: &Value) -> Result<(), ScriptError> {
        self.namespace.set(key, value).map_err(ScriptError::from_run)
    }

    pub fn get(&self, key: &str) -> Result<Value, ScriptError> {
        self.namespace.get(key).map_err(ScriptError::from_run)
    }

    pub fn increment(&self, key: &str, delta: f64) -> Result<f64, ScriptError> {
        self.namespace.increment(key, delta).map_err(ScriptError::from_run)
    }

    pub fn push(&self, key: &str, value: &Value) -> Result<usize, ScriptError> {
        self.namespace.push(key, value).map_err(ScriptError::from_run)
    }

    pub fn delete(&self, key: &str) -> bool {
        self.namespace.delete(key)
    }

    pub fn clear(&self) {
        self.namespace.clear();
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.namespace.keys()
    }

    /// Blocks until the stored value equals `target`; false on timeout.
    pub fn wait(&self, key: &str, target: &Value, timeout: Option<Duration>) -> Result<bool, ScriptError> {
        self.namespace
            .wait(key, target, timeout, &CancelToken::new())
            .map_err(ScriptError::from_run)
    }
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    builtins: Builtins,
    embedded: EmbeddedResources,
    search_paths: Vec<PathBuf>,
    policy: FilePolicy,
    files: Arc<dyn FileAccess>,
    input: Option<Arc<dyn InputReader>>,
    http: Option<Arc<dyn HttpClient>>,
    print: Box<dyn PrintWriter>,
    tracer: Arc<dyn EvalTracer>,
    max_parallel: usize,
    shutdown_grace: Duration,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            builtins: Builtins::standard(),
            embedded: EmbeddedResources::new(),
            search_paths: Vec::new(),
            policy: FilePolicy::Unrestricted,
            files: Arc::new(StdFileAccess),
            input: Some(Arc::new(StdInput)),
            http: None,
            print: Box::new(StdPrint::default()),
            tracer: Arc::new(NoopTracer),
            max_parallel: std::thread::available_parallelism().map_or(8, std::num::NonZero::get),
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Adds a native builtin visible to every unit.
    #[must_use]
    pub fn builtin(
        mut self,
        name: &str,
        func: impl Fn(&mut Evaluator, ArgMap) -> RunResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.builtins.register(name, func);
        self
    }

    /// Adds an embedded resource addressable as `EMBED/<path>`.
    #[must_use]
    pub fn embed(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.embedded.insert(path, bytes);
        self
    }

    /// Appends a module search path.
    #[must_use]
    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Appends the search paths from the `DUSO_PATH` environment variable
    /// (platform path-separator delimited).
    #[must_use]
    pub fn search_paths_from_env(mut self) -> Self {
        if let Some(paths) = std::env::var_os("DUSO_PATH") {
            self.search_paths.extend(std::env::split_paths(&paths));
        }
        self
    }

    /// Restricts file capabilities to the `EMBED/` and `STORE/` sources.
    #[must_use]
    pub fn no_files(mut self) -> Self {
        self.policy = FilePolicy::VirtualOnly;
        self
    }

    #[must_use]
    pub fn file_access(mut self, files: impl FileAccess + 'static) -> Self {
        self.files = Arc::new(files);
        self
    }

    #[must_use]
    pub fn input_reader(mut self, input: impl InputReader + 'static) -> Self {
        self.input = Some(Arc::new(input));
        self
    }

    #[must_use]
    pub fn http_client(mut self, client: impl HttpClient + 'static) -> Self {
        self.http = Some(Arc::new(client));
        self
    }

    #[must_use]
    pub fn print_writer(mut self, print: impl PrintWriter + 'static) -> Self {
        self.print = Box::new(print);
        self
    }

    #[must_use]
    pub fn tracer(mut self, tracer: impl EvalTracer + 'static) -> Self {
        self.tracer = Arc::new(tracer);
        self
    }

    /// Caps concurrent `parallel` workers (defaults to available
    /// parallelism).
    #[must_use]
    pub fn max_parallel(mut self, slots: usize) -> Self {
        self.max_parallel = slots.max(1);
        self
    }

    /// Grace period shutdown waits for in-flight spawned units.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    #[must_use]
    pub fn build(self) -> Engine {
        Engine {
            runtime: Arc::new(Runtime {
                builtins: self.builtins,
                datastores: DatastoreRegistry::new(self.files.clone()),
                modules: ModuleStore::new(),
                embedded: self.embedded,
                search_paths: self.search_paths,
                policy: self.policy,
                files: self.files,
                input: self.input,
                http: self.http,
                print: Mutex::new(self.print),
                tracer: self.tracer,
                spawns: SpawnTracker::new(),
                max_parallel: self.max_parallel,
                shutdown_grace: self.shutdown_grace,
                shutdown_done: AtomicBool::new(false),
            }),
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
