//! The coordination store: named, thread-safe key→value namespaces.
//!
//! This is the only sanctioned channel between concurrent units. Container
//! values are deep-copied on write *and* on read, so a stored value can never
//! alias script-side state; function values are dropped by the deep copy and
//! therefore cannot cross the store. Every mutation bumps a namespace version
//! and wakes all waiters on its condition variable; waiters re-check their
//! condition on wakeup, so spurious wakeups are harmless.
//!
//! A namespace may be configured with snapshot persistence: mutations mark it
//! dirty and a background worker writes a JSON snapshot at the configured
//! interval and on shutdown. Persistence is best-effort and never
//! participates in operation atomicity.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use ahash::AHashMap;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};

use crate::{
    builtins::json,
    capability::FileAccess,
    context::{CancelToken, WAIT_TICK},
    error::{RunError, RunResult},
    value::Value,
};

/// Snapshot persistence settings for one namespace.
#[derive(Debug, Clone)]
pub struct PersistConfig {
    pub path: PathBuf,
    pub interval: Duration,
}

struct NamespaceState {
    entries: IndexMap<String, Value>,
    /// Monotonic change counter; the parse cache validates `STORE/` modules
    /// against the vfs namespace's version.
    version: u64,
    dirty: bool,
    persist: Option<PersistConfig>,
}

/// One named namespace: a mutex-protected map plus a condition variable.
pub struct Namespace {
    name: String,
    state: Mutex<NamespaceState>,
    changed: Condvar,
}

impl Namespace {
    fn new(name: String) -> Self {
        Self {
            name,
            state: Mutex::new(NamespaceState {
                entries: IndexMap::new(),
                version: 0,
                dirty: false,
                persist: None,
            }),
            changed: Condvar::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current change counter. Starts at 0 and bumps on every mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    fn touch(&self, state: &mut NamespaceState) {
        state.version += 1;
        state.dirty = true;
        self.changed.notify_all();
    }

    /// Stores a deep copy of `value` under `key`.
    pub fn set(&self, key: &str, value: &Value) -> RunResult<()> {
        let copy = value.deep_copy()?;
        let mut state = self.state.lock();
        state.entries.insert(key.to_owned(), copy);
        self.touch(&mut state);
        Ok(())
    }

    /// Returns a deep copy of the stored value, or nil if absent.
    pub fn get(&self, key: &str) -> RunResult<Value> {
        let state = self.state.lock();
        match state.entries.get(key) {
            Some(value) => value.deep_copy(),
            None => Ok(Value::Nil),
        }
    }

    /// Atomically stores (current-or-0) + `delta`; errors when the current
    /// value is non-numeric and non-nil. Returns the new value.
    pub fn increment(&self, key: &str, delta: f64) -> RunResult<f64> {
        let mut state = self.state.lock();
        let current = match state.entries.get(key) {
            None | Some(Value::Nil) => 0.0,
            Some(Value::Number(n)) => *n,
            Some(other) => {
                return Err(RunError::type_error(format!(
                    "datastore '{}' key '{key}' holds {}, cannot increment",
                    self.name,
                    other.type_name()
                )));
            }
        };
        let next = current + delta;
        state.entries.insert(key.to_owned(), Value::Number(next));
        self.touch(&mut state);
        Ok(next)
    }

    /// Atomically appends a deep copy of `value` to the array under `key`,
    /// creating an empty array when the key is absent. Returns the new
    /// length.
    pub fn push(&self, key: &str, value: &Value) -> RunResult<usize> {
        let copy = value.deep_copy()?;
        let mut state = self.state.lock();
        let length = match state.entries.get(key) {
            None | Some(Value::Nil) => {
                state.entries.insert(key.to_owned(), Value::array(vec![copy]));
                1
            }
            Some(Value::Array(items)) => {
                let mut items = items.write();
                items.push(copy);
                items.len()
            }
            Some(other) => {
                return Err(RunError::type_error(format!(
                    "datastore '{}' key '{key}' holds {}, cannot push",
                    self.name,
                    other.type_name()
                )));
            }
        };
        self.touch(&mut state);
        Ok(length)
    }

    /// Removes `key`; waiters are woken since absence may satisfy them.
    pub fn delete(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let existed = state.entries.shift_remove(key).is_some();
        if existed {
            self.touch(&mut state);
        }
        existed
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        self.touch(&mut state);
    }

    /// Blocks until the value under `key` structurally equals `target`.
    ///
    /// Returns true on satisfaction, false once `timeout` elapses. Returns
    /// immediately when the value already matches. Cancellation of the
    /// calling unit raises `Cancelled`.
    pub fn wait(
        &self,
        key: &str,
        target: &Value,
        timeout: Option<Duration>,
        cancel: &CancelToken,
    ) -> RunResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(RunError::cancelled());
            }
            let current = state.entries.get(key).unwrap_or(&Value::Nil);
            if current.equals(target) {
                return Ok(true);
            }
            let Some(tick) = wait_tick(deadline) else {
                return Ok(false);
            };
            self.changed.wait_for(&mut state, tick);
        }
    }

    /// Like [`wait`](Self::wait) but satisfaction is decided by `predicate`,
    /// which receives a deep copy of the current value and runs outside the
    /// namespace lock (so it may itself use the datastore).
    pub fn wait_for(
        &self,
        key: &str,
        timeout: Option<Duration>,
        cancel: &CancelToken,
        mut predicate: impl FnMut(Value) -> RunResult<bool>,
    ) -> RunResult<bool> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if cancel.is_cancelled() {
                return Err(RunError::cancelled());
            }
            let (current, seen_version) = {
                let state = self.state.lock();
                let value = match state.entries.get(key) {
                    Some(value) => value.deep_copy()?,
                    None => Value::Nil,
                };
                (value, state.version)
            };
            if predicate(current)? {
                return Ok(true);
            }
            let mut state = self.state.lock();
            // A write may have landed while the predicate ran unlocked;
            // re-check before sleeping so the update is not missed.
            if state.version != seen_version {
                continue;
            }
            let Some(tick) = wait_tick(deadline) else {
                return Ok(false);
            };
            self.changed.wait_for(&mut state, tick);
        }
    }

    /// All keys in insertion order (used by snapshots and diagnostics).
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    fn set_persist(&self, config: PersistConfig) {
        self.state.lock().persist = Some(config);
    }

    fn persist_config(&self) -> Option<PersistConfig> {
        self.state.lock().persist.clone()
    }

    /// Writes a JSON snapshot if the namespace is dirty and persistence is
    /// configured. Serialization failures (code values in the map) surface
    /// as errors; the worker reports them to stderr.
    fn flush(&self, files: &dyn FileAccess) -> RunResult<()> {
        let (snapshot, path) = {
            let mut state = self.state.lock();
            let Some(config) = state.persist.clone() else {
                return Ok(());
            };
            if !state.dirty {
                return Ok(());
            }
            state.dirty = false;
            (Value::object(state.entries.clone()), config.path)
        };
        let rendered = json::to_json_string(&snapshot, Some(2))?;
        files
            .write(&path, &rendered)
            .map_err(|err| RunError::capability_error(format!("cannot write snapshot {}: {err}", path.display())))?;
        Ok(())
    }

    fn load_snapshot(&self, text: &str) -> RunResult<()> {
        let value = json::from_json_str(text)?;
        let Value::Object(entries) = value else {
            return Err(RunError::type_error(format!(
                "snapshot for datastore '{}' is not a JSON object",
                self.name
            )));
        };
        let mut state = self.state.lock();
        state.entries = entries.read().clone();
        state.version += 1;
        self.changed.notify_all();
        Ok(())
    }
}

fn wait_tick(deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        None => Some(WAIT_TICK),
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                None
            } else {
                Some((deadline - now).min(WAIT_TICK))
            }
        }
    }
}

/// Process-wide namespace registry.
///
/// Namespace creation/lookup serializes through a single mutex; each
/// namespace owns its own lock for its contents.
pub struct DatastoreRegistry {
    namespaces: Mutex<AHashMap<String, Arc<Namespace>>>,
    files: Arc<dyn FileAccess>,
    stop: Arc<AtomicBool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DatastoreRegistry {
    pub(crate) fn new(files: Arc<dyn FileAccess>) -> Self {
        Self {
            namespaces: Mutex::new(AHashMap::new()),
            files,
            stop: Arc::new(AtomicBool::new(false)),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Gets or creates the named namespace.
    pub fn namespace(&self, name: &str) -> Arc<Namespace> {
        let mut namespaces = self.namespaces.lock();
        namespaces
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Namespace::new(name.to_owned())))
            .clone()
    }

    /// The `vfs` namespace backing the `STORE/` virtual module source.
    pub fn vfs(&self) -> Arc<Namespace> {
        self.namespace("vfs")
    }

    /// Attaches snapshot persistence to a namespace: loads an existing
    /// snapshot (missing files are fine) and starts the background writer.
    pub fn configure_persistence(&self, name: &str, config: PersistConfig) -> RunResult<()> {
        let namespace = self.namespace(name);
        if let Ok(text) = self.files.read_to_string(&config.path) {
            namespace.load_snapshot(&text)?;
        }
        namespace.set_persist(config.clone());

        let files = self.files.clone();
        let stop = self.stop.clone();
        let worker_ns = namespace.clone();
        let handle = std::thread::Builder::new()
            .name(format!("duso-persist-{name}"))
            .spawn(move || {
                let mut last_save = Instant::now();
                loop {
                    if stop.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(config.interval.min(Duration::from_millis(200)));
                    if last_save.elapsed() >= config.interval {
                        if let Err(RunError::Raise(err)) = worker_ns.flush(files.as_ref()) {
                            eprintln!("duso: snapshot of datastore '{}' failed: {}", worker_ns.name(), err.message);
                        }
                        last_save = Instant::now();
                    }
                }
            })
            .expect("failed to spawn persistence worker");
        self.workers.lock().push(handle);
        Ok(())
    }

    /// Stops persistence workers and writes final snapshots for every dirty
    /// configured namespace.
    pub(crate) fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.workers.lock().drain(..) {
            let _ = handle.join();
        }
        let namespaces: Vec<Arc<Namespace>> = self.namespaces.lock().values().cloned().collect();
        for namespace in namespaces {
            if namespace.persist_config().is_some() {
                if let Err(RunError::Raise(err)) = namespace.flush(self.files.as_ref()) {
                    eprintln!("duso: final snapshot of datastore '{}' failed: {}", namespace.name(), err.message);
                }
            }
        }
    }
}
