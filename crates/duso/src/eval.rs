//! Tree-walking evaluator.
//!
//! Evaluation of a node yields `(value, control signal)`: the `Ok` side
//! carries [`Flow`] (normal value, return, break, continue) and the `Err`
//! side carries [`RunError`] (raise or exit). Function bodies catch `Return`
//! and turn escaping `Break`/`Continue` into errors; loops catch
//! `Break`/`Continue`; `try` catches raises (except `Cancelled`); `Exit`
//! unwinds to the unit boundary and becomes the unit's terminal value.
//!
//! One evaluator instance executes one unit. Child units (`run`, `spawn`,
//! `parallel` slots, modules) get fresh evaluators that share the runtime —
//! builtin registry, datastore registry, module caches — but never an
//! environment chain.

use std::{path::PathBuf, sync::Arc};

use indexmap::IndexMap;

use crate::{
    args::ArgMap,
    ast::{Arg, AssignTarget, BinaryOp, Block, Expr, ExprKind, LogicalOp, Pos, Stmt, UnaryOp},
    context::CancelToken,
    engine::Runtime,
    error::{RunError, RunResult, StackFrame},
    scope::Scope,
    value::{Function, ObjectRef, ScriptFunction, Value},
};

/// Calls nested deeper than this raise instead of overflowing the stack.
const MAX_CALL_DEPTH: usize = 200;

/// Control signal produced by evaluating a statement or block.
#[derive(Debug)]
pub(crate) enum Flow {
    /// Normal completion; carries the value of the last expression statement.
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

/// Executes one unit's AST against one environment chain.
pub struct Evaluator {
    pub(crate) runtime: Arc<Runtime>,
    /// Path of the script currently executing, for traces and relative
    /// module resolution. Swapped while a module's body runs.
    pub(crate) script_path: Option<PathBuf>,
    /// Canonical paths of modules currently mid-`require` on this task.
    pub(crate) require_stack: Vec<String>,
    /// Call stack for error traces, innermost last.
    stack: Vec<StackFrame>,
    cancel: CancelToken,
    /// Position of the call site currently dispatching a native function.
    pub(crate) call_pos: Pos,
    depth: usize,
}

impl Evaluator {
    pub(crate) fn new(runtime: Arc<Runtime>, script_path: Option<PathBuf>, cancel: CancelToken) -> Self {
        Self {
            runtime,
            script_path,
            require_stack: Vec::new(),
            stack: Vec::new(),
            cancel,
            call_pos: Pos::default(),
            depth: 0,
        }
    }

    /// The unit's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Directory of the executing script, for script-relative resolution.
    #[must_use]
    pub(crate) fn script_dir(&self) -> Option<PathBuf> {
        self.script_path
            .as_ref()
            .and_then(|p| p.parent())
            .map(PathBuf::from)
    }

    pub(crate) fn swap_script_path(&mut self, path: Option<PathBuf>) -> Option<PathBuf> {
        std::mem::replace(&mut self.script_path, path)
    }

    fn check_cancel(&self) -> RunResult<()> {
        if self.cancel.is_cancelled() {
            Err(RunError::cancelled())
        } else {
            Ok(())
        }
    }

    /// Runs a whole program with unit-boundary semantics: the terminal value
    /// is whatever `exit` carried, or the value of the last top-level
    /// expression, or nil.
    pub(crate) fn eval_program(&mut self, program: &Block, scope: &Scope) -> RunResult<Value> {
        match self.eval_block(program, scope) {
            Ok(Flow::Normal(value) | Flow::Return(value)) => Ok(value),
            Ok(Flow::Break) => Err(RunError::type_error("'break' outside of loop")),
            Ok(Flow::Continue) => Err(RunError::type_error("'continue' outside of loop")),
            Err(RunError::Exit(value)) => Ok(value),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn eval_block(&mut self, block: &[Stmt], scope: &Scope) -> RunResult<Flow> {
        let mut last = Value::Nil;
        for stmt in block {
            match stmt {
                Stmt::Expr(expr) => last = self.eval_expr(expr, scope)?,
                other => match self.exec_stmt(other, scope)? {
                    Flow::Normal(_) => {}
                    flow => return Ok(flow),
                },
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Scope) -> RunResult<Flow> {
        match stmt {
            Stmt::Var { name, value, .. } => {
                let value = self.eval_expr(value, scope)?;
                scope.declare(name, value);
                Ok(Flow::Normal(Value::Nil))
            }
            Stmt::Assign { target, value, pos } => {
                let value = self.eval_expr(value, scope)?;
                self.assign(target, value, *pos, scope)?;
                Ok(Flow::Normal(Value::Nil))
            }
            Stmt::If { arms, else_body, .. } => {
                for (cond, body) in arms {
                    if self.eval_expr(cond, scope)?.truthy() {
                        return self.eval_block(body, &scope.child());
                    }
                }
                match else_body {
                    Some(body) => self.eval_block(body, &scope.child()),
                    None => Ok(Flow::Normal(Value::Nil)),
                }
            }
            Stmt::While { cond, body, .. } => {
                loop {
                    self.check_cancel()?;
                    if !self.eval_expr(cond, scope)?.truthy() {
                        break;
                    }
                    match self.eval_block(body, &scope.child())? {
                        Flow::Normal(_) | Flow::Continue => {}
                        Flow::Break => break,
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
                Ok(Flow::Normal(Value::Nil))
            }
            Stmt::ForRange {
                var,
                start,
                end,
                step,
                body,
                pos,
            } => self.exec_for_range(var, start, end, step.as_ref(), body, *pos, scope),
            Stmt::ForIn { var, iterable, body, pos } => self.exec_for_in(var, iterable, body, *pos, scope),
            Stmt::Try {
                body,
                catch_name,
                catch_detail,
                handler,
                ..
            } => match self.eval_block(body, &scope.child()) {
                Ok(flow) => Ok(flow),
                Err(err) if err.catchable() => {
                    let RunError::Raise(err) = err else { unreachable!() };
                    let handler_scope = scope.child();
                    handler_scope.declare(catch_name, Value::string(err.message.clone()));
                    if let Some(detail) = catch_detail {
                        handler_scope.declare(detail, Value::Error(Arc::new(*err)));
                    }
                    self.eval_block(handler, &handler_scope)
                }
                Err(err) => Err(err),
            },
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, scope)?,
                    None => Value::Nil,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Break { .. } => Ok(Flow::Break),
            Stmt::Continue { .. } => Ok(Flow::Continue),
            Stmt::Expr(expr) => {
                let value = self.eval_expr(expr, scope)?;
                Ok(Flow::Normal(value))
            }
        }
    }

    fn exec_for_range(
        &mut self,
        var: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Block,
        pos: Pos,
        scope: &Scope,
    ) -> RunResult<Flow> {
        let start_value = self.eval_expr(start, scope)?;
        let end_value = self.eval_expr(end, scope)?;
        let start = loop_bound(&start_value, pos)?;
        let end = loop_bound(&end_value, pos)?;
        let step = match step {
            Some(expr) => {
                let value = self.eval_expr(expr, scope)?;
                let step = loop_bound(&value, pos)?;
                if step == 0 {
                    return Err(RunError::bounds_error("for loop step must not be zero").at(pos));
                }
                step
            }
            None if start <= end => 1,
            None => -1,
        };

        let mut i = start;
        while (step > 0 && i <= end) || (step < 0 && i >= end) {
            self.check_cancel()?;
            let iteration = scope.child();
            iteration.declare(var, Value::Number(i as f64));
            match self.eval_block(body, &iteration)? {
                Flow::Normal(_) | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
            i += step;
        }
        Ok(Flow::Normal(Value::Nil))
    }

    fn exec_for_in(
        &mut self,
        var: &str,
        iterable: &Expr,
        body: &Block,
        pos: Pos,
        scope: &Scope,
    ) -> RunResult<Flow> {
        let value = self.eval_expr(iterable, scope)?;
        // Snapshot the sequence up front so body mutations cannot deadlock
        // against the container lock or shift the iteration.
        let items: Vec<Value> = match &value {
            Value::Array(items) => items.read().clone(),
            Value::Object(entries) => entries.read().keys().map(|k| Value::string(k.clone())).collect(),
            Value::Str(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
            other => {
                return Err(
                    RunError::type_error(format!("cannot iterate over {}", other.type_name())).at(pos),
                );
            }
        };
        for item in items {
            self.check_cancel()?;
            let iteration = scope.child();
            iteration.declare(var, item);
            match self.eval_block(body, &iteration)? {
                Flow::Normal(_) | Flow::Continue => {}
                Flow::Break => break,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(Value::Nil))
    }

    fn assign(&mut self, target: &AssignTarget, value: Value, pos: Pos, scope: &Scope) -> RunResult<()> {
        match target {
            AssignTarget::Name(name) => {
                scope.assign(name, value);
                Ok(())
            }
            AssignTarget::Member { object, key } => {
                let container = self.eval_expr(object, scope)?;
                match container {
                    Value::Object(entries) => {
                        entries.write().insert(key.clone(), value);
                        Ok(())
                    }
                    other => Err(RunError::type_error(format!(
                        "cannot set property '{key}' on {}",
                        other.type_name()
                    ))
                    .at(pos)),
                }
            }
            AssignTarget::Index { object, index } => {
                let container = self.eval_expr(object, scope)?;
                let index = self.eval_expr(index, scope)?;
                match container {
                    Value::Array(items) => {
                        let idx = array_index(&index, pos)?;
                        let mut items = items.write();
                        let len = items.len();
                        if idx >= len {
                            return Err(RunError::bounds_error(format!(
                                "array index {idx} out of range (length {len})"
                            ))
                            .at(pos));
                        }
                        items[idx] = value;
                        Ok(())
                    }
                    Value::Object(entries) => match index {
                        Value::Str(key) => {
                            entries.write().insert(key.to_string(), value);
                            Ok(())
                        }
                        other => Err(RunError::type_error(format!(
                            "object keys must be strings, got {}",
                            other.type_name()
                        ))
                        .at(pos)),
                    },
                    other => Err(RunError::type_error(format!(
                        "cannot index-assign into {}",
                        other.type_name()
                    ))
                    .at(pos)),
                }
            }
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr, scope: &Scope) -> RunResult<Value> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Nil => Ok(Value::Nil),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::string(s.clone())),
            ExprKind::Name(name) => scope.lookup(name).ok_or_else(|| RunError::name_error(name).at(pos)),
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, scope)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Object(fields) => {
                let mut entries = IndexMap::with_capacity(fields.len());
                for (key, value) in fields {
                    let value = self.eval_expr(value, scope)?;
                    entries.insert(key.clone(), value);
                }
                Ok(Value::object(entries))
            }
            ExprKind::Function { params, body, name } => {
                Ok(Value::Function(Arc::new(Function::Script(ScriptFunction {
                    name: name.clone(),
                    params: params.clone(),
                    body: body.clone(),
                    env: scope.clone(),
                }))))
            }
            ExprKind::Unary { op, operand } => {
                let value = self.eval_expr(operand, scope)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.truthy())),
                    UnaryOp::Neg => match value {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => {
                            Err(RunError::type_error(format!("cannot negate {}", other.type_name())).at(pos))
                        }
                    },
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs, scope)?;
                let rhs = self.eval_expr(rhs, scope)?;
                apply_binary(*op, &lhs, &rhs, pos)
            }
            ExprKind::Logical { op, lhs, rhs } => {
                let lhs = self.eval_expr(lhs, scope)?;
                match op {
                    LogicalOp::And if !lhs.truthy() => Ok(lhs),
                    LogicalOp::Or if lhs.truthy() => Ok(lhs),
                    _ => self.eval_expr(rhs, scope),
                }
            }
            ExprKind::Ternary { cond, then, otherwise } => {
                if self.eval_expr(cond, scope)?.truthy() {
                    self.eval_expr(then, scope)
                } else {
                    self.eval_expr(otherwise, scope)
                }
            }
            ExprKind::Member { object, key } => {
                let container = self.eval_expr(object, scope)?;
                self.member_value(&container, key, pos)
            }
            ExprKind::Index { object, index } => {
                let container = self.eval_expr(object, scope)?;
                let index = self.eval_expr(index, scope)?;
                self.index_value(&container, &index, pos)
            }
            ExprKind::Call { callee, args } => self.eval_call(callee, args, pos, scope),
        }
    }

    fn member_value(&self, container: &Value, key: &str, pos: Pos) -> RunResult<Value> {
        match container {
            Value::Object(entries) => Ok(entries.read().get(key).cloned().unwrap_or(Value::Nil)),
            Value::Error(err) => Ok(match key {
                "message" => Value::string(err.message.clone()),
                "kind" => Value::string(err.kind.to_string()),
                "payload" => err.payload.clone().unwrap_or(Value::Nil),
                _ => Value::Nil,
            }),
            Value::Code(code) => Ok(match key {
                "source" => Value::Str(code.source.clone()),
                "name" => code.name.clone().map_or(Value::Nil, Value::string),
                "meta" => code.meta.clone().unwrap_or(Value::Nil),
                _ => Value::Nil,
            }),
            other => Err(RunError::type_error(format!(
                "cannot read property '{key}' of {}",
                other.type_name()
            ))
            .at(pos)),
        }
    }

    fn index_value(&self, container: &Value, index: &Value, pos: Pos) -> RunResult<Value> {
        match container {
            Value::Array(items) => {
                let idx = array_index(index, pos)?;
                let items = items.read();
                items.get(idx).cloned().ok_or_else(|| {
                    RunError::bounds_error(format!(
                        "array index {idx} out of range (length {})",
                        items.len()
                    ))
                    .at(pos)
                })
            }
            Value::Object(entries) => match index {
                Value::Str(key) => Ok(entries.read().get(key.as_ref()).cloned().unwrap_or(Value::Nil)),
                other => Err(RunError::type_error(format!(
                    "object keys must be strings, got {}",
                    other.type_name()
                ))
                .at(pos)),
            },
            Value::Str(s) => {
                let idx = array_index(index, pos)?;
                s.chars().nth(idx).map(|c| Value::string(c.to_string())).ok_or_else(|| {
                    RunError::bounds_error(format!(
                        "string index {idx} out of range (length {})",
                        s.chars().count()
                    ))
                    .at(pos)
                })
            }
            other => Err(RunError::type_error(format!("cannot index {}", other.type_name())).at(pos)),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], pos: Pos, scope: &Scope) -> RunResult<Value> {
        // The module resolver intercepts `include` before evaluation: the
        // included file must execute in the caller's environment, which only
        // the call site has in hand.
        if let ExprKind::Name(name) = &callee.kind {
            if name == "include" {
                let Some(first) = args.first().filter(|arg| arg.name.is_none()) else {
                    return Err(RunError::arity_error("include() missing required argument 'path'").at(pos));
                };
                let path_value = self.eval_expr(&first.value, scope)?;
                let Value::Str(path) = path_value else {
                    return Err(RunError::type_error(format!(
                        "include() argument 'path' must be a string, got {}",
                        path_value.type_name()
                    ))
                    .at(pos));
                };
                let saved_pos = std::mem::replace(&mut self.call_pos, pos);
                let result = crate::modules::include(self, &path, scope);
                self.call_pos = saved_pos;
                return result.map_err(|err| err.at(pos));
            }
        }

        // Method-call shape: evaluate the receiver once, and if the member is
        // a script function, bind the receiver as an ambient frame. An
        // extracted member called later goes through the plain path and
        // loses the binding.
        let (callee_value, bind) = match &callee.kind {
            ExprKind::Member { object, key } => {
                let receiver = self.eval_expr(object, scope)?;
                match &receiver {
                    Value::Object(entries) => {
                        let member = entries.read().get(key.as_str()).cloned();
                        let Some(member) = member else {
                            return Err(RunError::type_error(format!("object has no member '{key}'")).at(pos));
                        };
                        (member, Some(entries.clone()))
                    }
                    other => (self.member_value(other, key, callee.pos)?, None),
                }
            }
            _ => (self.eval_expr(callee, scope)?, None),
        };

        let mut positional = Vec::new();
        let mut named = IndexMap::new();
        for arg in args {
            let value = self.eval_expr(&arg.value, scope)?;
            match &arg.name {
                Some(name) => {
                    named.insert(name.clone(), value);
                }
                None => positional.push(value),
            }
        }

        self.call_value(&callee_value, ArgMap::new(positional, named), pos, bind, false)
    }

    /// Invokes a callable value from a builtin (comparator, predicate,
    /// parallel slot). Positions default to the current native call site.
    pub fn call_function(&mut self, callee: &Value, args: ArgMap) -> RunResult<Value> {
        let pos = self.call_pos;
        self.call_value(callee, args, pos, None, false)
    }

    /// Like [`call_function`](Self::call_function) but the call frame is a
    /// write barrier: assignments never escape into the closure's captured
    /// environment. Used for parallel slots.
    pub(crate) fn call_isolated(&mut self, callee: &Value, args: ArgMap) -> RunResult<Value> {
        let pos = self.call_pos;
        self.call_value(callee, args, pos, None, true)
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: ArgMap,
        pos: Pos,
        bind: Option<ObjectRef>,
        isolate: bool,
    ) -> RunResult<Value> {
        match callee {
            Value::Function(function) => match function.as_ref() {
                Function::Native(native) => {
                    self.runtime.tracer.call(&native.name, pos);
                    let frame = self.push_frame(&native.name, pos);
                    let saved_pos = std::mem::replace(&mut self.call_pos, pos);
                    let func = native.func.clone();
                    let result = (func.as_ref())(self, args);
                    self.call_pos = saved_pos;
                    self.stack.pop();
                    result.map_err(|err| err.at(pos).in_frame(frame))
                }
                Function::Script(func) => {
                    self.check_cancel().map_err(|err| err.at(pos))?;
                    if self.depth >= MAX_CALL_DEPTH {
                        return Err(RunError::type_error(format!(
                            "maximum call depth ({MAX_CALL_DEPTH}) exceeded"
                        ))
                        .at(pos));
                    }
                    let name = func.name.as_deref().unwrap_or("<anonymous>");
                    self.runtime.tracer.call(name, pos);

                    let parent = match bind {
                        Some(receiver) => func.env.object_frame(receiver),
                        None => func.env.clone(),
                    };
                    let call_scope = if isolate { parent.child_barrier() } else { parent.child() };
                    for (param, value) in args.bind_params(&func.params) {
                        call_scope.declare(&param, value);
                    }

                    let frame = self.push_frame(name, pos);
                    self.depth += 1;
                    let flow = self.eval_block(&func.body, &call_scope);
                    self.depth -= 1;
                    self.stack.pop();

                    match flow {
                        Ok(Flow::Return(value)) => Ok(value),
                        Ok(Flow::Normal(_)) => Ok(Value::Nil),
                        Ok(Flow::Break) => Err(RunError::type_error("'break' outside of loop").at(pos)),
                        Ok(Flow::Continue) => Err(RunError::type_error("'continue' outside of loop").at(pos)),
                        Err(err) => Err(err.in_frame(frame)),
                    }
                }
            },
            // Constructor pattern: calling an object produces a shallow copy
            // with named arguments overwriting (or appending) keys.
            Value::Object(entries) => {
                if !args.positional().is_empty() {
                    return Err(
                        RunError::type_error("object constructors accept named arguments only").at(pos),
                    );
                }
                let mut copy = entries.read().clone();
                for (key, value) in args.named() {
                    copy.insert(key.clone(), value.clone());
                }
                Ok(Value::object(copy))
            }
            // Calling an array produces a shallow copy with positional
            // arguments appended.
            Value::Array(items) => {
                if !args.named().is_empty() {
                    return Err(
                        RunError::type_error("array constructors accept positional arguments only").at(pos),
                    );
                }
                let mut copy = items.read().clone();
                copy.extend(args.positional().iter().cloned());
                Ok(Value::array(copy))
            }
            other => {
                Err(RunError::type_error(format!("{} is not callable", other.type_name())).at(pos))
            }
        }
    }

    fn push_frame(&mut self, name: &str, pos: Pos) -> StackFrame {
        let frame = StackFrame {
            name: name.to_owned(),
            path: self.script_path.as_ref().map(|p| p.display().to_string()),
            line: pos.line,
            column: pos.column,
        };
        self.stack.push(frame.clone());
        frame
    }
}

fn loop_bound(value: &Value, pos: Pos) -> RunResult<i64> {
    value.integer().ok_or_else(|| {
        RunError::bounds_error(format!(
            "for loop bounds must be integer numbers, got {}",
            value.type_name()
        ))
        .at(pos)
    })
}

fn array_index(value: &Value, pos: Pos) -> RunResult<usize> {
    match value.integer() {
        Some(i) if i >= 0 => Ok(i as usize),
        Some(i) => Err(RunError::bounds_error(format!("array index {i} out of range")).at(pos)),
        None => Err(RunError::bounds_error(format!(
            "array index must be an integer, got {}",
            value.type_name()
        ))
        .at(pos)),
    }
}

fn apply_binary(op: BinaryOp, lhs: &Value, rhs: &Value, pos: Pos) -> RunResult<Value> {
    match op {
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            // String concatenation coerces the other operand to its string
            // form whenever either side is a string.
            (Value::Str(_), _) | (_, Value::Str(_)) => {
                Ok(Value::string(format!("{}{}", lhs.display(), rhs.display())))
            }
            _ => Err(binary_type_error("add", lhs, rhs, pos)),
        },
        BinaryOp::Sub => numeric_op(lhs, rhs, pos, "subtract", |a, b| Ok(a - b)),
        BinaryOp::Mul => numeric_op(lhs, rhs, pos, "multiply", |a, b| Ok(a * b)),
        BinaryOp::Div => numeric_op(lhs, rhs, pos, "divide", |a, b| {
            if b == 0.0 {
                Err(RunError::arithmetic_error("division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        BinaryOp::Rem => numeric_op(lhs, rhs, pos, "take remainder of", |a, b| {
            if b == 0.0 {
                Err(RunError::arithmetic_error("modulo by zero"))
            } else {
                Ok(a % b)
            }
        }),
        BinaryOp::Eq => Ok(Value::Bool(lhs.equals(rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!lhs.equals(rhs))),
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = compare_values(lhs, rhs, pos)?;
            let result = match op {
                BinaryOp::Lt => ordering == std::cmp::Ordering::Less,
                BinaryOp::Gt => ordering == std::cmp::Ordering::Greater,
                BinaryOp::Le => ordering != std::cmp::Ordering::Greater,
                BinaryOp::Ge => ordering != std::cmp::Ordering::Less,
                _ => unreachable!(),
            };
            Ok(Value::Bool(result))
        }
    }
}

fn numeric_op(
    lhs: &Value,
    rhs: &Value,
    pos: Pos,
    verb: &str,
    op: impl FnOnce(f64, f64) -> RunResult<f64>,
) -> RunResult<Value> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => op(*a, *b).map(Value::Number).map_err(|err| err.at(pos)),
        _ => Err(binary_type_error(verb, lhs, rhs, pos)),
    }
}

fn binary_type_error(verb: &str, lhs: &Value, rhs: &Value, pos: Pos) -> RunError {
    RunError::type_error(format!(
        "cannot {verb} {} and {}",
        lhs.type_name(),
        rhs.type_name()
    ))
    .at(pos)
}

/// Ordering for `<`, `>`, `<=`, `>=`.
///
/// Mixed number/string comparisons parse the string as a number; two strings
/// compare lexically; anything else is an arithmetic error.
pub(crate) fn compare_values(lhs: &Value, rhs: &Value, pos: Pos) -> RunResult<std::cmp::Ordering> {
    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.as_ref().cmp(b.as_ref())),
        (Value::Number(a), Value::Str(b)) => parse_numeric(b).and_then(|b| a.partial_cmp(&b)),
        (Value::Str(a), Value::Number(b)) => parse_numeric(a).and_then(|a| a.partial_cmp(b)),
        _ => None,
    };
    ordering.ok_or_else(|| {
        RunError::arithmetic_error(format!(
            "cannot compare {} with {}",
            lhs.type_name(),
            rhs.type_name()
        ))
        .at(pos)
    })
}

fn parse_numeric(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}
