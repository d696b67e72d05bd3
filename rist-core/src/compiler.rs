//! Compiler orchestration: source text to compiled unit, and the
//! flag-driven `rist` entry point.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use pyo3::prelude::*;
use tracing::{debug, warn};

use crate::builtins::get_builtins;
use crate::error::{ConfigError, CoreError};
use crate::executor::Executor;
use crate::flags::Flags;
use crate::lexer::tokenize;
use crate::rewriter::{rewrite, Rewritten};
use crate::source::strip_terminators;

/// Synthetic file name for units compiled from literal text.
pub const DEFAULT_FILE_NAME: &str = "<unknown.rist>";

/// A rewritten unit plus what is needed to report errors against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCode {
    pub code: Rewritten,
    /// Text the unit was compiled from, kept for diagnostics.
    pub source: String,
    pub file: String,
}

impl CompiledCode {
    /// Wrap Python text that needs no rewriting, such as a previously
    /// written `.py` target.
    pub fn from_host_source(text: impl Into<String>, file: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            code: Rewritten {
                prelude: Vec::new(),
                body: text.clone(),
            },
            source: text,
            file: file.into(),
        }
    }

    /// Python text of the unit.
    pub fn text(&self) -> String {
        self.code.text()
    }
}

impl fmt::Display for CompiledCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.code, f)
    }
}

pub fn compile(source: &str, file: &str) -> Result<CompiledCode, CoreError> {
    let stripped = strip_terminators(source, file)?;
    let tokens = tokenize(&stripped, file)?;
    let code = rewrite(&tokens);
    debug!(file, prelude = code.prelude.len(), "compiled unit");
    Ok(CompiledCode {
        code,
        source: source.to_string(),
        file: file.to_string(),
    })
}

pub fn compile_file(path: impl AsRef<Path>) -> Result<CompiledCode, CoreError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path)?;
    compile(&source, &path.display().to_string())
}

/// Write the Python text of `code` to `path`, creating parent directories.
pub fn write_compiled(code: &CompiledCode, path: &Path) -> Result<(), CoreError> {
    let write = || -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, code.text())
    };
    write().map_err(|source| CoreError::WriteOutput {
        path: path.to_path_buf(),
        source,
    })
}

/// What a [`rist`] call produced.
#[derive(Debug)]
pub struct RistOutcome {
    pub code: CompiledCode,
    pub written: Option<PathBuf>,
    /// Non-`None` values emitted when the unit was executed.
    pub emitted: Vec<PyObject>,
}

/// Compile `arg` and run the stages selected by `flags`.
///
/// With [`Flags::FILE`] `arg` is a path, otherwise Rist source text.
pub fn rist(arg: &str, flags: Flags, compile_to: Option<&Path>) -> Result<RistOutcome, CoreError> {
    let parsed = flags.parse();
    if parsed.write && compile_to.is_none() {
        return Err(ConfigError::MissingCompileTarget.into());
    }
    debug!(?flags, "rist");

    let code = if parsed.file {
        compile_file(arg)?
    } else {
        compile(arg, DEFAULT_FILE_NAME)?
    };

    let written = match compile_to.filter(|_| parsed.write) {
        Some(path) => {
            write_compiled(&code, path)?;
            Some(path.to_path_buf())
        }
        None => None,
    };

    let emitted = if parsed.execute {
        run(&code)?
    } else {
        Vec::new()
    };

    Ok(RistOutcome {
        code,
        written,
        emitted,
    })
}

/// What [`execute`] is asked to run.
#[derive(Debug, Clone, Copy)]
pub enum Runnable<'a> {
    Compiled(&'a CompiledCode),
    /// Rist source text, or a path when [`Flags::FILE`] is set.
    Source(&'a str),
}

impl<'a> From<&'a CompiledCode> for Runnable<'a> {
    fn from(code: &'a CompiledCode) -> Self {
        Runnable::Compiled(code)
    }
}

impl<'a> From<&'a str> for Runnable<'a> {
    fn from(arg: &'a str) -> Self {
        Runnable::Source(arg)
    }
}

/// Run `code` with the default builtins and return what it emitted.
///
/// `None` emissions are skipped; every other emitted value is sent back
/// into the unit as the result of the suspend point that produced it.
///
/// `flags` reroute the call:
/// - `COMPILE|WRITE` compiles source (a path with `FILE`), writes it to
///   `compile_to` and runs it. Already compiled code is written and run.
/// - `COMPILE` compiles source and runs it.
/// - otherwise only compiled code is accepted.
pub fn execute<'a>(
    code: impl Into<Runnable<'a>>,
    flags: Flags,
    compile_to: Option<&Path>,
) -> Result<Vec<PyObject>, CoreError> {
    let parsed = flags.parse();
    let file = if parsed.file { Flags::FILE } else { Flags::NONE };

    match code.into() {
        Runnable::Source(arg) if parsed.compile && parsed.write => {
            Ok(rist(arg, file | Flags::E | Flags::W, compile_to)?.emitted)
        }
        Runnable::Source(arg) if parsed.compile => Ok(rist(arg, file | Flags::E, None)?.emitted),
        Runnable::Source(_) => Err(ConfigError::NotCompiled.into()),
        Runnable::Compiled(code) if parsed.compile && parsed.write => {
            let target = compile_to.ok_or(ConfigError::MissingCompileTarget)?;
            write_compiled(code, target)?;
            run(code)
        }
        Runnable::Compiled(code) => run(code),
    }
}

fn run(code: &CompiledCode) -> Result<Vec<PyObject>, CoreError> {
    let result = drive_with_echo(code);
    Python::with_gil(flush_std_streams);
    result
}

fn drive_with_echo(code: &CompiledCode) -> Result<Vec<PyObject>, CoreError> {
    let builtins = Python::with_gil(get_builtins)?;
    let mut driver = Executor::new(code.clone())?.with_args(builtins).start()?;

    let mut emitted = Vec::new();
    while let Some(value) = driver.next() {
        let value = value?;
        let echo = Python::with_gil(|py| (!value.is_none(py)).then(|| value.clone_ref(py)));
        if let Some(echo) = echo {
            driver.send(echo);
            emitted.push(value);
        }
    }
    Ok(emitted)
}

fn flush_std_streams(py: Python<'_>) {
    let Ok(sys) = py.import("sys") else {
        return;
    };
    for stream in ["stdout", "stderr"] {
        if let Ok(handle) = sys.getattr(stream) {
            if let Err(err) = handle.call_method0("flush") {
                warn!(stream, error = %err, "failed to flush host stream");
            }
        }
    }
}
