//! Concurrency core: synchronous `run`, fire-and-forget `spawn`, and bounded
//! `parallel` fan-out.
//!
//! Every dispatched unit runs on its own OS thread with a fresh evaluator and
//! a fresh environment chain; the builtin registry, datastore registry, and
//! module caches are shared through the runtime. Payloads are deep-copied at
//! the dispatch boundary, so the datastore remains the only mutable channel
//! between units.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, bounded, unbounded};
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex};

use crate::{
    args::ArgMap,
    ast::Block,
    context::{CancelToken, DispatchFrame, RequestContext, UnitKind, current_context, push_context},
    engine::Runtime,
    error::{RunError, RunResult},
    eval::Evaluator,
    modules,
    value::Value,
};

/// Tracks spawned units for process shutdown.
///
/// Pids are monotonically assigned and unique within the process. Shutdown
/// cancels every outstanding unit through the process-level token, then
/// joins within a bounded grace period; stragglers are abandoned.
pub(crate) struct SpawnTracker {
    next_pid: AtomicU64,
    handles: Mutex<HashMap<u64, JoinHandle<()>>>,
    /// Cancelling this token cancels every unit the engine dispatched.
    pub(crate) process_cancel: CancelToken,
}

impl SpawnTracker {
    pub(crate) fn new() -> Self {
        Self {
            next_pid: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
            process_cancel: CancelToken::new(),
        }
    }

    fn register(&self, handle: JoinHandle<()>) -> u64 {
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        self.handles.lock().insert(pid, handle);
        pid
    }

    /// Cancels outstanding units and waits up to `grace` for them to finish.
    pub(crate) fn shutdown(&self, grace: Duration) {
        self.process_cancel.cancel();
        let deadline = Instant::now() + grace;
        let handles: HashMap<u64, JoinHandle<()>> = std::mem::take(&mut *self.handles.lock());
        let mut pending: Vec<JoinHandle<()>> = handles.into_values().collect();
        while !pending.is_empty() && Instant::now() < deadline {
            let (finished, still_running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(JoinHandle::is_finished);
            for handle in finished {
                let _ = handle.join();
            }
            pending = still_running;
            if !pending.is_empty() {
                std::thread::sleep(Duration::from_millis(10));
            }
        }
    }
}

/// Counting semaphore bounding `parallel` fan-out.
struct WorkerBudget {
    available: Mutex<usize>,
    freed: Condvar,
}

impl WorkerBudget {
    fn new(slots: usize) -> Self {
        Self {
            available: Mutex::new(slots.max(1)),
            freed: Condvar::new(),
        }
    }

    fn acquire(&self) {
        let mut available = self.available.lock();
        while *available == 0 {
            self.freed.wait(&mut available);
        }
        *available -= 1;
    }

    fn release(&self) {
        *self.available.lock() += 1;
        self.freed.notify_one();
    }
}

/// The parsed target of `run`/`spawn`: either a `Code` value or a script
/// path resolved through the module machinery (sharing its parse cache).
struct Target {
    program: Arc<Block>,
    script_path: Option<PathBuf>,
    name: String,
}

fn resolve_target(evaluator: &Evaluator, func: &str, target: &Value) -> RunResult<Target> {
    match target {
        Value::Code(code) => Ok(Target {
            program: code.program.clone(),
            script_path: None,
            name: code.name.clone().unwrap_or_else(|| "<code>".to_owned()),
        }),
        Value::Str(name) => {
            let module = modules::load(evaluator, name)?;
            Ok(Target {
                program: module.program,
                script_path: module.script_path,
                name: module.key,
            })
        }
        other => Err(RunError::type_error(format!(
            "{func}() target must be a script path or code value, got {}",
            other.type_name()
        ))),
    }
}

/// The dispatch chain for a new unit: the parent's chain plus one frame for
/// this dispatch, outermost last.
fn dispatch_chain(evaluator: &Evaluator, kind: UnitKind) -> Vec<DispatchFrame> {
    let mut chain = current_context().map(|ctx| ctx.chain.clone()).unwrap_or_default();
    chain.insert(
        0,
        DispatchFrame {
            kind,
            path: evaluator.script_path.as_ref().map(|p| p.display().to_string()),
            line: evaluator.call_pos.line,
            column: evaluator.call_pos.column,
        },
    );
    chain
}

fn run_unit(
    runtime: &Arc<Runtime>,
    context: Arc<RequestContext>,
    target: &Target,
) -> RunResult<Value> {
    let kind = context.kind;
    let cancel = context.cancel.clone();
    let _guard = push_context(context);
    runtime.tracer.unit_start(kind, &target.name);
    let mut child = Evaluator::new(runtime.clone(), target.script_path.clone(), cancel);
    let scope = runtime.base_scope().child();
    let result = child.eval_program(&target.program, &scope);
    match &result {
        Ok(_) | Err(RunError::Exit(_)) => runtime.tracer.unit_end(kind, &target.name, None),
        Err(RunError::Raise(err)) => runtime.tracer.unit_end(kind, &target.name, Some(err.as_ref())),
    }
    result
}

/// `run(target, payload[, timeout])`: execute a child to termination and
/// return its terminal value, blocking the caller.
pub(crate) fn run(evaluator: &mut Evaluator, args: &ArgMap) -> RunResult<Value> {
    let target_value = args.required("run", 0, "target")?;
    let payload = args.optional(1, "payload").unwrap_or(Value::Nil).deep_copy()?;
    let timeout = args
        .optional_number("run", 2, "timeout")?
        .map(Duration::from_secs_f64);

    let target = resolve_target(evaluator, "run", &target_value)?;
    let cancel = evaluator.cancel_token().child();
    let context = Arc::new(RequestContext {
        payload,
        kind: UnitKind::Run,
        chain: dispatch_chain(evaluator, UnitKind::Run),
        cancel: cancel.clone(),
    });

    let runtime = evaluator.runtime.clone();
    let (sender, receiver) = bounded(1);
    let worker = std::thread::Builder::new()
        .name("duso-run".to_owned())
        .spawn(move || {
            let result = run_unit(&runtime, context, &target);
            let _ = sender.send(result);
        })
        .map_err(|err| RunError::capability_error(format!("cannot spawn unit thread: {err}")))?;

    let result = match timeout {
        None => receiver.recv().unwrap_or_else(|_| Err(RunError::cancelled())),
        Some(limit) => match receiver.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                cancel.cancel();
                drop(worker);
                return Err(RunError::timeout_error(format!(
                    "run() timed out after {}s",
                    limit.as_secs_f64()
                )));
            }
            Err(RecvTimeoutError::Disconnected) => Err(RunError::cancelled()),
        },
    };
    let _ = worker.join();
    match result {
        Ok(value) | Err(RunError::Exit(value)) => Ok(value),
        Err(err) => Err(err),
    }
}

/// `spawn(target, payload)`: start a child concurrently and return its pid
/// immediately. Terminal values and errors are not delivered back; the
/// datastore is the coordination channel.
pub(crate) fn spawn(evaluator: &mut Evaluator, args: &ArgMap) -> RunResult<Value> {
    let target_value = args.required("spawn", 0, "target")?;
    let payload = args.optional(1, "payload").unwrap_or(Value::Nil).deep_copy()?;

    let target = resolve_target(evaluator, "spawn", &target_value)?;
    // Spawned units outlive the script that spawned them; only process
    // shutdown cancels them.
    let cancel = evaluator.runtime.spawns.process_cancel.child();
    let context = Arc::new(RequestContext {
        payload,
        kind: UnitKind::Spawn,
        chain: dispatch_chain(evaluator, UnitKind::Spawn),
        cancel,
    });

    let runtime = evaluator.runtime.clone();
    let handle = std::thread::Builder::new()
        .name("duso-spawn".to_owned())
        .spawn(move || {
            let _ = run_unit(&runtime, context, &target);
        })
        .map_err(|err| RunError::capability_error(format!("cannot spawn unit thread: {err}")))?;

    let pid = evaluator.runtime.spawns.register(handle);
    Ok(Value::Number(pid as f64))
}

/// `parallel(collection)`: invoke a collection of zero-argument functions
/// concurrently; the result has the same shape and order as the input, with
/// nil in slots whose function raised.
pub(crate) fn parallel(evaluator: &mut Evaluator, args: &ArgMap) -> RunResult<Value> {
    let collection = args.required("parallel", 0, "functions")?;
    let (functions, keys): (Vec<Value>, Option<Vec<String>>) = match &collection {
        Value::Array(items) => (items.read().clone(), None),
        Value::Object(entries) => {
            let entries = entries.read();
            (
                entries.values().cloned().collect(),
                Some(entries.keys().cloned().collect()),
            )
        }
        other => {
            return Err(RunError::type_error(format!(
                "parallel() expects an array or object of functions, got {}",
                other.type_name()
            )));
        }
    };
    for (i, function) in functions.iter().enumerate() {
        if !matches!(function, Value::Function(_)) {
            return Err(RunError::type_error(format!(
                "parallel() slot {i} is {}, expected a function",
                function.type_name()
            )));
        }
    }

    let budget = Arc::new(WorkerBudget::new(evaluator.runtime.max_parallel));
    let chain = dispatch_chain(evaluator, UnitKind::Parallel);
    let script_path = evaluator.script_path.clone();
    let (sender, receiver) = unbounded();

    let mut workers = Vec::with_capacity(functions.len());
    for (index, function) in functions.into_iter().enumerate() {
        let runtime = evaluator.runtime.clone();
        let cancel = evaluator.cancel_token().child();
        let context = Arc::new(RequestContext {
            payload: Value::Nil,
            kind: UnitKind::Parallel,
            chain: chain.clone(),
            cancel: cancel.clone(),
        });
        let budget = budget.clone();
        let sender = sender.clone();
        let script_path = script_path.clone();
        let worker = std::thread::Builder::new()
            .name("duso-parallel".to_owned())
            .spawn(move || {
                budget.acquire();
                let _guard = push_context(context);
                runtime.tracer.unit_start(UnitKind::Parallel, "<parallel>");
                let mut child = Evaluator::new(runtime.clone(), script_path, cancel);
                let slot = match child.call_isolated(&function, ArgMap::default()) {
                    Ok(value) | Err(RunError::Exit(value)) => {
                        runtime.tracer.unit_end(UnitKind::Parallel, "<parallel>", None);
                        Ok(value)
                    }
                    Err(RunError::Raise(err)) => {
                        runtime.tracer.unit_end(UnitKind::Parallel, "<parallel>", Some(err.as_ref()));
                        Err(())
                    }
                };
                budget.release();
                let _ = sender.send((index, slot));
            })
            .map_err(|err| RunError::capability_error(format!("cannot spawn unit thread: {err}")))?;
        workers.push(worker);
    }
    drop(sender);

    let mut slots: Vec<Value> = vec![Value::Nil; workers.len()];
    let mut remaining = workers.len();
    while remaining > 0 {
        match receiver.recv_timeout(crate::context::WAIT_TICK) {
            Ok((index, Ok(value))) => {
                slots[index] = value;
                remaining -= 1;
            }
            Ok((_, Err(()))) => remaining -= 1,
            Err(RecvTimeoutError::Timeout) => {
                if evaluator.cancel_token().is_cancelled() {
                    // Children share a linked token; they observe the
                    // cancellation and wind down on their own.
                    return Err(RunError::cancelled());
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    for worker in workers {
        let _ = worker.join();
    }

    match keys {
        None => Ok(Value::array(slots)),
        Some(keys) => {
            let mut entries = IndexMap::with_capacity(keys.len());
            for (key, value) in keys.into_iter().zip(slots) {
                entries.insert(key, value);
            }
            Ok(Value::object(entries))
        }
    }
}
