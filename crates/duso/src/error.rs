//! Runtime error taxonomy and control-flow escape values.
//!
//! Errors are values: the same [`ErrorValue`] travels inside `Value::Error`,
//! through `throw`/`catch`, and out of the engine as a [`ScriptError`].
//! `Exit` is not an error but rides the error channel so it can unwind past
//! every construct to the unit boundary.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

use crate::{ast::Pos, parse::ParseError, value::Value};

/// Result type alias for operations that can raise or exit.
pub type RunResult<T> = Result<T, RunError>;

/// Classification of a runtime error.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations. The display form is the lowercase
/// label used in rendered messages and in the `kind` field of error values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Syntax error from the parser, re-surfaced verbatim.
    #[strum(serialize = "parse")]
    Parse,
    /// Wrong value kind for an operation.
    #[strum(serialize = "type")]
    Type,
    /// Array index or for-loop bound out of range or non-integral.
    #[strum(serialize = "bounds")]
    Bounds,
    /// Undefined identifier or unresolvable module.
    #[strum(serialize = "name")]
    NameResolution,
    /// Missing required argument.
    #[strum(serialize = "arity")]
    Arity,
    /// Division by zero or non-numeric comparison.
    #[strum(serialize = "arithmetic")]
    Arithmetic,
    /// Circular module dependency or JSON cycle.
    #[strum(serialize = "cycle")]
    Cycle,
    #[strum(serialize = "timeout")]
    Timeout,
    /// Unit was cancelled; passes through `catch` handlers.
    #[strum(serialize = "cancelled")]
    Cancelled,
    /// Raised by `throw`.
    #[strum(serialize = "thrown")]
    UserThrown,
    /// Host capability unavailable or denied by policy.
    #[strum(serialize = "capability")]
    HostCapability,
}

/// One call-stack record attached to an error (innermost first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Function name, or a unit label such as `<main>` or `<module>`.
    pub name: String,
    /// Source path of the frame, when the unit came from a file.
    pub path: Option<String>,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({path}:{}:{})", self.name, self.line, self.column),
            None => write!(f, "{} ({}:{})", self.name, self.line, self.column),
        }
    }
}

/// The error payload shared by `Value::Error`, raises, and the public error.
#[derive(Debug, Clone)]
pub struct ErrorValue {
    pub kind: ErrorKind,
    pub message: String,
    /// Structured metadata supplied by `throw` with an object argument.
    pub payload: Option<Value>,
    /// Source position the error originated at, when known.
    pub pos: Option<Pos>,
    /// Call stack, innermost first. Filled in as the error unwinds.
    pub frames: Vec<StackFrame>,
}

impl ErrorValue {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            payload: None,
            pos: None,
            frames: Vec::new(),
        }
    }
}

/// Non-value outcome of evaluating a node.
///
/// `Raise` unwinds until a `try` catches it (or the unit boundary); `Exit`
/// unwinds unconditionally and carries the unit's terminal value.
#[derive(Debug, Clone)]
pub enum RunError {
    Raise(Box<ErrorValue>),
    Exit(Value),
}

impl RunError {
    pub fn raise(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Raise(Box::new(ErrorValue::new(kind, message)))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Type, message)
    }

    pub fn bounds_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Bounds, message)
    }

    pub fn name_error(name: &str) -> Self {
        Self::raise(ErrorKind::NameResolution, format!("undefined name '{name}'"))
    }

    pub fn arity_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Arity, message)
    }

    pub fn arithmetic_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Arithmetic, message)
    }

    pub fn cycle_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Cycle, message)
    }

    pub fn timeout_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::Timeout, message)
    }

    pub fn cancelled() -> Self {
        Self::raise(ErrorKind::Cancelled, "unit cancelled")
    }

    pub fn capability_error(message: impl Into<String>) -> Self {
        Self::raise(ErrorKind::HostCapability, message)
    }

    /// Sets the source position if the error does not already carry one.
    pub fn at(self, pos: Pos) -> Self {
        match self {
            Self::Raise(mut err) => {
                if err.pos.is_none() {
                    err.pos = Some(pos);
                }
                Self::Raise(err)
            }
            exit @ Self::Exit(_) => exit,
        }
    }

    /// Appends a call-stack frame while unwinding through a call boundary.
    pub fn in_frame(self, frame: StackFrame) -> Self {
        match self {
            Self::Raise(mut err) => {
                err.frames.push(frame);
                Self::Raise(err)
            }
            exit @ Self::Exit(_) => exit,
        }
    }

    /// Whether a `catch` handler may bind this error.
    ///
    /// Cancellation is propagated past handlers to enforce timeout and
    /// shutdown semantics; `Exit` is not an error at all.
    pub fn catchable(&self) -> bool {
        match self {
            Self::Raise(err) => err.kind != ErrorKind::Cancelled,
            Self::Exit(_) => false,
        }
    }
}

impl From<ParseError> for RunError {
    fn from(err: ParseError) -> Self {
        Self::raise(ErrorKind::Parse, err.message).at(err.pos)
    }
}

impl From<ErrorValue> for RunError {
    fn from(err: ErrorValue) -> Self {
        Self::Raise(Box::new(err))
    }
}

/// Terminating error surfaced by the public API.
///
/// Renders kind, message, originating position, and the call stack
/// innermost-first:
///
/// ```text
/// type error: cannot add array and number
///   at worker.duso:3:12
///   in process (worker.duso:3:5)
///   in <main> (worker.duso:1:1)
/// ```
#[derive(Debug, Clone)]
pub struct ScriptError(pub(crate) ErrorValue);

impl ScriptError {
    /// Surfaces an evaluator error at the public boundary. `Exit` never
    /// reaches here (unit boundaries consume it), but the conversion stays
    /// total for safety.
    pub(crate) fn from_run(err: RunError) -> Self {
        match err {
            RunError::Raise(err) => Self(*err),
            RunError::Exit(_) => Self(ErrorValue::new(ErrorKind::Type, "unexpected exit outside a unit")),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        self.0.message.as_str()
    }

    /// Call stack at the point of the error, innermost first.
    #[must_use]
    pub fn frames(&self) -> &[StackFrame] {
        &self.0.frames
    }

    /// The error as a script value, e.g. for re-injection into a handler.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Error(std::sync::Arc::new(self.0.clone()))
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error: {}", self.0.kind, self.0.message)?;
        if let Some(pos) = self.0.pos {
            write!(f, "\n  at {pos}")?;
        }
        for frame in &self.0.frames {
            write!(f, "\n  in {frame}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScriptError {}

impl From<ErrorValue> for ScriptError {
    fn from(err: ErrorValue) -> Self {
        Self(err)
    }
}

impl From<ParseError> for ScriptError {
    fn from(err: ParseError) -> Self {
        let mut value = ErrorValue::new(ErrorKind::Parse, err.message);
        value.pos = Some(err.pos);
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_labels_are_lowercase() {
        assert_eq!(ErrorKind::Type.to_string(), "type");
        assert_eq!(ErrorKind::NameResolution.to_string(), "name");
        assert_eq!(ErrorKind::UserThrown.to_string(), "thrown");
    }

    #[test]
    fn cancelled_is_not_catchable() {
        assert!(!RunError::cancelled().catchable());
        assert!(RunError::type_error("x").catchable());
    }

    #[test]
    fn display_includes_stack() {
        let mut err = ErrorValue::new(ErrorKind::Arithmetic, "division by zero");
        err.pos = Some(Pos::new(3, 7));
        err.frames.push(StackFrame {
            name: "divide".to_owned(),
            path: Some("math.duso".to_owned()),
            line: 3,
            column: 1,
        });
        let rendered = ScriptError(err).to_string();
        assert!(rendered.contains("arithmetic error: division by zero"));
        assert!(rendered.contains("at 3:7"));
        assert!(rendered.contains("in divide (math.duso:3:1)"));
    }
}
