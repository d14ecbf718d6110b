//! Host capability hooks and access policy.
//!
//! The core never touches the filesystem or terminal directly: module
//! resolution, `input`, and datastore persistence go through the traits here,
//! and the embedding layer decides what to provide. A missing hook or a
//! policy denial surfaces as an error of kind `HostCapability`, so sandboxed
//! configurations fail closed instead of silently reading the host.

use std::{io, path::Path, time::SystemTime};

use crate::error::{RunError, RunResult};

/// What the unit may reach on the filesystem.
///
/// `VirtualOnly` is the `no-files` CLI mode: module resolution is restricted
/// to the `EMBED/` and `STORE/` sources and any real-path lookup is denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilePolicy {
    #[default]
    Unrestricted,
    VirtualOnly,
}

impl FilePolicy {
    /// Checks that real-file access is allowed for `what`.
    pub(crate) fn check_files(self, what: &str) -> RunResult<()> {
        match self {
            Self::Unrestricted => Ok(()),
            Self::VirtualOnly => Err(RunError::capability_error(format!(
                "{what} denied: file access is restricted to EMBED/ and STORE/ sources"
            ))),
        }
    }
}

/// Script-source and snapshot file access.
pub trait FileAccess: Send + Sync {
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

/// Default `FileAccess` backed by `std::fs`.
#[derive(Debug, Default)]
pub struct StdFileAccess;

impl FileAccess for StdFileAccess {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        std::fs::write(path, contents)
    }
}

/// Line-oriented input for the `input()` builtin.
pub trait InputReader: Send + Sync {
    fn read_line(&self) -> io::Result<String>;
}

/// Default `InputReader` reading from stdin.
#[derive(Debug, Default)]
pub struct StdInput;

impl InputReader for StdInput {
    fn read_line(&self) -> io::Result<String> {
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(line)
    }
}
