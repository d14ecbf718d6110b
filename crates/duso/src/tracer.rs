//! Execution tracing hooks.
//!
//! Trait-based with a no-op default so tracing costs nothing unless enabled.
//! The CLI installs [`StderrTracer`] for `--verbose`; embedders can implement
//! [`EvalTracer`] to feed their own diagnostics.

use crate::{ast::Pos, context::UnitKind, error::ErrorValue};

/// Hook points at unit and call boundaries.
///
/// Implementations must be `Send + Sync`: units run on their own threads and
/// share one tracer instance.
pub trait EvalTracer: Send + Sync {
    /// A unit (script, `run`/`spawn` child, parallel slot, module) started.
    fn unit_start(&self, kind: UnitKind, name: &str) {
        let _ = (kind, name);
    }

    /// A unit terminated; `error` carries the failure when it did not
    /// terminate normally.
    fn unit_end(&self, kind: UnitKind, name: &str, error: Option<&ErrorValue>) {
        let _ = (kind, name, error);
    }

    /// A function call is about to be evaluated.
    fn call(&self, name: &str, pos: Pos) {
        let _ = (name, pos);
    }
}

/// Zero-cost default: every hook is an empty body.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl EvalTracer for NoopTracer {}

/// Human-readable execution log on stderr, used by `--verbose`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrTracer;

impl EvalTracer for StderrTracer {
    fn unit_start(&self, kind: UnitKind, name: &str) {
        eprintln!("duso: {kind} unit start: {name}");
    }

    fn unit_end(&self, kind: UnitKind, name: &str, error: Option<&ErrorValue>) {
        match error {
            Some(err) => eprintln!("duso: {kind} unit error: {name}: {} ({})", err.message, err.kind),
            None => eprintln!("duso: {kind} unit end: {name}"),
        }
    }

    fn call(&self, name: &str, pos: Pos) {
        eprintln!("duso: call {name} at {pos}");
    }
}
