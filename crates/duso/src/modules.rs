//! Module resolution, parse cache, module cache, and circular detection.
//!
//! `require` and `include` share one resolution algorithm and differ only in
//! execution: `require` evaluates in a fresh scope with builtins only and
//! caches the exported value per canonical path, `include` re-executes in the
//! caller's environment every time and returns nil.
//!
//! Resolution order, first match wins: `EMBED/` table, `STORE/` (the vfs
//! datastore namespace), absolute/`~` paths, the requiring script's
//! directory, then each configured search path; a candidate without an
//! extension is retried with `.duso` appended. Under the `no-files` policy
//! the real-filesystem steps are denied.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::{
    ast::Block,
    error::{ErrorKind, RunError, RunResult},
    eval::{Evaluator, Flow},
    parse::parse_program,
    scope::Scope,
    value::Value,
};

/// The language extension appended to extensionless candidates.
const SOURCE_EXTENSION: &str = "duso";

const EMBED_PREFIX: &str = "EMBED/";
const STORE_PREFIX: &str = "STORE/";

/// Where a module name resolved to.
#[derive(Debug, Clone)]
pub(crate) enum Resolved {
    /// Embedded resource; `key` excludes the `EMBED/` prefix.
    Embedded { key: String },
    /// Entry in the vfs datastore namespace; `key` excludes `STORE/`.
    Store { key: String },
    /// Real file, absolutized for cache keying.
    File { path: PathBuf },
}

impl Resolved {
    /// Canonical cache key shared by the parse and module caches.
    fn cache_key(&self) -> String {
        match self {
            Self::Embedded { key } => format!("{EMBED_PREFIX}{key}"),
            Self::Store { key } => format!("{STORE_PREFIX}{key}"),
            Self::File { path } => path.display().to_string(),
        }
    }

    /// Path installed as the evaluator's script path while the module runs.
    fn script_path(&self) -> Option<PathBuf> {
        match self {
            Self::File { path } => Some(path.clone()),
            Self::Embedded { .. } | Self::Store { .. } => None,
        }
    }
}

/// Freshness marker stored with each parse-cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    /// Embedded sources are immutable.
    Embedded,
    /// Real files revalidate against mtime.
    File(SystemTime),
    /// `STORE/` entries revalidate against the vfs namespace version.
    Store(u64),
}

struct ParsedModule {
    program: Arc<Block>,
    freshness: Freshness,
}

/// Parse cache (AST + freshness) and module cache (exported value), both
/// keyed by canonical path. Read-mostly; updates serialize per cache.
#[derive(Default)]
pub(crate) struct ModuleStore {
    parse_cache: Mutex<AHashMap<String, Arc<ParsedModule>>>,
    module_cache: Mutex<AHashMap<String, Value>>,
}

impl ModuleStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Drops every cached exported value (the parse cache is untouched).
    pub(crate) fn clear_module_cache(&self) {
        self.module_cache.lock().clear();
    }
}

/// A resolved and parsed module, ready to execute.
pub(crate) struct LoadedModule {
    pub key: String,
    pub program: Arc<Block>,
    pub script_path: Option<PathBuf>,
}

/// Resolves `name` and returns its (possibly cached) parsed form.
pub(crate) fn load(evaluator: &Evaluator, name: &str) -> RunResult<LoadedModule> {
    let resolved = resolve(evaluator, name)?;
    let key = resolved.cache_key();
    let parsed = fresh_parse(evaluator, &resolved, &key)?;
    Ok(LoadedModule {
        key,
        program: parsed.program.clone(),
        script_path: resolved.script_path(),
    })
}

/// `require(name)`: execute once in isolation, cache and return the export.
pub(crate) fn require(evaluator: &mut Evaluator, name: &str) -> RunResult<Value> {
    let module = load(evaluator, name)?;

    if let Some(cached) = evaluator.runtime.modules.module_cache.lock().get(&module.key) {
        return Ok(cached.clone());
    }

    if let Some(start) = evaluator.require_stack.iter().position(|p| p == &module.key) {
        let mut chain: Vec<&str> = evaluator.require_stack[start..].iter().map(String::as_str).collect();
        chain.push(&module.key);
        return Err(RunError::raise(
            ErrorKind::Cycle,
            format!("circular dependency: {}", chain.join(" -> ")),
        ));
    }

    evaluator.require_stack.push(module.key.clone());
    let saved_path = evaluator.swap_script_path(module.script_path.clone());
    // Isolated execution: a fresh root carrying only the builtin registry.
    let scope = evaluator.runtime.base_scope().child();
    let result = evaluator.eval_block(&module.program, &scope);
    evaluator.swap_script_path(saved_path);
    evaluator.require_stack.pop();

    let export = match result? {
        Flow::Normal(value) | Flow::Return(value) => value,
        Flow::Break | Flow::Continue => {
            return Err(RunError::type_error("'break' outside of loop"));
        }
    };
    evaluator
        .runtime
        .modules
        .module_cache
        .lock()
        .insert(module.key, export.clone());
    Ok(export)
}

/// `include(path)`: re-execute in the caller's environment, return nil.
pub(crate) fn include(evaluator: &mut Evaluator, name: &str, caller_scope: &Scope) -> RunResult<Value> {
    let module = load(evaluator, name)?;
    let saved_path = evaluator.swap_script_path(module.script_path.clone());
    let result = evaluator.eval_block(&module.program, caller_scope);
    evaluator.swap_script_path(saved_path);
    match result? {
        Flow::Normal(_) | Flow::Return(_) => Ok(Value::Nil),
        Flow::Break | Flow::Continue => Err(RunError::type_error("'break' outside of loop")),
    }
}

fn fresh_parse(evaluator: &Evaluator, resolved: &Resolved, key: &str) -> RunResult<Arc<ParsedModule>> {
    let runtime = &evaluator.runtime;
    let cached = runtime.modules.parse_cache.lock().get(key).cloned();

    let current = match resolved {
        Resolved::Embedded { .. } => Freshness::Embedded,
        Resolved::Store { .. } => Freshness::Store(runtime.datastores.vfs().version()),
        Resolved::File { path } => {
            let mtime = runtime
                .files
                .modified(path)
                .map_err(|err| module_not_found_io(key, &err))?;
            Freshness::File(mtime)
        }
    };
    if let Some(entry) = cached {
        let valid = match (entry.freshness, current) {
            (Freshness::Embedded, _) => true,
            (Freshness::File(cached_mtime), Freshness::File(mtime)) => cached_mtime >= mtime,
            (Freshness::Store(cached_version), Freshness::Store(version)) => cached_version == version,
            _ => false,
        };
        if valid {
            return Ok(entry);
        }
    }

    let source: Arc<str> = match resolved {
        Resolved::Embedded { key: embed_key } => runtime
            .embedded
            .get_str(embed_key)
            .ok_or_else(|| module_not_found(key))?
            .into(),
        Resolved::Store { key: store_key } => match runtime.datastores.vfs().get(store_key)? {
            Value::Str(text) => text.to_string().into(),
            Value::Nil => return Err(module_not_found(key)),
            other => {
                return Err(RunError::type_error(format!(
                    "STORE/{store_key} holds {}, expected a string",
                    other.type_name()
                )));
            }
        },
        Resolved::File { path } => runtime
            .files
            .read_to_string(path)
            .map_err(|err| module_not_found_io(key, &err))?
            .into(),
    };

    let program = Arc::new(parse_program(&source).map_err(RunError::from)?);
    let entry = Arc::new(ParsedModule {
        program,
        freshness: current,
    });
    runtime
        .modules
        .parse_cache
        .lock()
        .insert(key.to_owned(), entry.clone());
    Ok(entry)
}

fn resolve(evaluator: &Evaluator, name: &str) -> RunResult<Resolved> {
    let runtime = &evaluator.runtime;

    if let Some(key) = name.strip_prefix(EMBED_PREFIX) {
        for candidate in candidate_names(key) {
            if runtime.embedded.contains(&candidate) {
                return Ok(Resolved::Embedded { key: candidate });
            }
        }
        return Err(module_not_found(name));
    }

    if let Some(key) = name.strip_prefix(STORE_PREFIX) {
        let vfs = runtime.datastores.vfs();
        for candidate in candidate_names(key) {
            if !matches!(vfs.get(&candidate)?, Value::Nil) {
                return Ok(Resolved::Store { key: candidate });
            }
        }
        return Err(module_not_found(name));
    }

    // Everything below touches the real filesystem.
    runtime.policy.check_files("module resolution")?;

    let expanded = expand_home(name);
    let path = Path::new(&expanded);
    if path.is_absolute() {
        return file_candidate(evaluator, path).ok_or_else(|| module_not_found(name));
    }

    if let Some(dir) = evaluator.script_dir() {
        if let Some(found) = file_candidate(evaluator, &dir.join(path)) {
            return Ok(found);
        }
    }
    for dir in &runtime.search_paths {
        if let Some(found) = file_candidate(evaluator, &dir.join(path)) {
            return Ok(found);
        }
    }
    // A bare relative name with no requiring script falls back to the
    // process working directory.
    if evaluator.script_dir().is_none() {
        if let Some(found) = file_candidate(evaluator, path) {
            return Ok(found);
        }
    }
    Err(module_not_found(name))
}

/// The name as given, plus the `.duso`-suffixed form when no extension is
/// present.
fn candidate_names(name: &str) -> Vec<String> {
    let mut names = vec![name.to_owned()];
    if Path::new(name).extension().is_none() {
        names.push(format!("{name}.{SOURCE_EXTENSION}"));
    }
    names
}

fn file_candidate(evaluator: &Evaluator, path: &Path) -> Option<Resolved> {
    let runtime = &evaluator.runtime;
    let mut candidates = vec![path.to_path_buf()];
    if path.extension().is_none() {
        candidates.push(path.with_extension(SOURCE_EXTENSION));
    }
    for candidate in candidates {
        if runtime.files.modified(&candidate).is_ok() {
            let absolute = std::path::absolute(&candidate).unwrap_or(candidate);
            return Some(Resolved::File { path: absolute });
        }
    }
    None
}

fn expand_home(name: &str) -> String {
    if let Some(rest) = name.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return format!("{home}/{rest}");
        }
    }
    name.to_owned()
}

fn module_not_found(name: &str) -> RunError {
    RunError::raise(ErrorKind::NameResolution, format!("module '{name}' not found"))
}

fn module_not_found_io(name: &str, err: &std::io::Error) -> RunError {
    RunError::raise(
        ErrorKind::NameResolution,
        format!("module '{name}' not found: {err}"),
    )
}
