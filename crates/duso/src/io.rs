//! Output handling for the `print` builtin.
//!
//! Implement [`PrintWriter`] to capture or redirect script output. The writer
//! is shared by every unit the engine dispatches, so implementations must be
//! `Send`; the engine serializes access behind a mutex.

use std::{
    borrow::Cow,
    io::{self, Write as _},
    sync::Arc,
};

use parking_lot::Mutex;

/// Trait for handling output from the `print()` builtin.
///
/// `write` is called once per formatted argument; separators (spaces) and the
/// trailing newline arrive via `push`.
pub trait PrintWriter: Send {
    fn write(&mut self, output: Cow<'_, str>);

    /// Emits a separator or terminator character.
    fn push(&mut self, end: char);
}

/// Default writer: line-buffered stdout.
#[derive(Debug, Default)]
pub struct StdPrint {
    buffer: String,
}

impl PrintWriter for StdPrint {
    fn write(&mut self, output: Cow<'_, str>) {
        self.buffer.push_str(&output);
    }

    fn push(&mut self, end: char) {
        self.buffer.push(end);
        if end == '\n' {
            let _ = io::stdout().write_all(self.buffer.as_bytes());
            let _ = io::stdout().flush();
            self.buffer.clear();
        }
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            let _ = io::stdout().write_all(self.buffer.as_bytes());
            let _ = io::stdout().flush();
        }
    }
}

/// A `PrintWriter` that collects all output into a shared string.
///
/// Clones share the same buffer, so a test can keep one handle while the
/// engine owns the other:
///
/// ```
/// use duso::{CollectStringPrint, Engine};
///
/// let output = CollectStringPrint::new();
/// let engine = Engine::builder().print_writer(output.clone()).build();
/// engine.eval("print('hi')").unwrap();
/// assert_eq!(output.output(), "hi\n");
/// ```
#[derive(Debug, Clone, Default)]
pub struct CollectStringPrint(Arc<Mutex<String>>);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything printed so far.
    #[must_use]
    pub fn output(&self) -> String {
        self.0.lock().clone()
    }
}

impl PrintWriter for CollectStringPrint {
    fn write(&mut self, output: Cow<'_, str>) {
        self.0.lock().push_str(&output);
    }

    fn push(&mut self, end: char) {
        self.0.lock().push(end);
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn write(&mut self, _output: Cow<'_, str>) {}

    fn push(&mut self, _end: char) {}
}
