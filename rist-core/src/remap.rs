//! Mapping host failures back to Rist source lines.
//!
//! A failing unit's original text is written into Python's `linecache`
//! under the unit's synthetic file name, so tracebacks rendered afterwards
//! show Rist lines instead of generated Python. Entries are never removed
//! and live for the rest of the process.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use pyo3::prelude::*;
use pyo3::exceptions::PySyntaxError;
use pyo3::types::PyList;
use thiserror::Error;
use tracing::warn;

/// A failure raised while compiling, evaluating or driving a unit.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message} ({file}{})", .line.map(|l| format!(":{l}")).unwrap_or_default())]
pub struct RuntimeError {
    /// Python exception class name, e.g. `ZeroDivisionError`.
    pub kind: String,
    pub message: String,
    pub file: String,
    /// Line in the Rist source, when the failure points into the unit.
    pub line: Option<usize>,
    pub source_line: Option<String>,
    /// Formatted Python traceback, rendered after the source was registered.
    pub traceback: String,
}

fn registry() -> &'static Mutex<HashMap<String, Vec<String>>> {
    static SOURCES: OnceLock<Mutex<HashMap<String, Vec<String>>>> = OnceLock::new();
    SOURCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register `source` as the text of `file` for diagnostics.
pub fn register(py: Python<'_>, file: &str, source: &str) -> PyResult<()> {
    let lines: Vec<String> = source.lines().map(|line| format!("{line}\n")).collect();
    let entry = (
        source.len(),
        py.None(),
        PyList::new(py, lines.iter().map(String::as_str))?,
        file,
    );
    py.import("linecache")?
        .getattr("cache")?
        .set_item(file, entry)?;

    if let Ok(mut sources) = registry().lock() {
        sources.insert(
            file.to_string(),
            source.lines().map(str::to_string).collect(),
        );
    }
    Ok(())
}

/// A registered source line, 1-based.
pub fn original_line(file: &str, line: usize) -> Option<String> {
    let sources = registry().lock().ok()?;
    sources
        .get(file)?
        .get(line.checked_sub(1)?)
        .cloned()
}

/// Register the unit's source and convert `err` into a [`RuntimeError`].
pub fn remap_error(py: Python<'_>, err: PyErr, file: &str, source: &str) -> RuntimeError {
    if let Err(register_err) = register(py, file, source) {
        warn!(file, error = %register_err, "could not register source for diagnostics");
    }

    let kind = err
        .get_type(py)
        .getattr("__name__")
        .and_then(|name| name.extract::<String>())
        .unwrap_or_else(|_| "Exception".to_string());
    let value = err.value(py);
    let message = value
        .str()
        .map(|text| text.to_string())
        .unwrap_or_default();
    let line = failing_line(py, &err, file).ok().flatten();
    let traceback = format_traceback(py, &err).unwrap_or_else(|_| format!("{kind}: {message}\n"));

    let error = RuntimeError {
        kind,
        message,
        file: file.to_string(),
        line,
        source_line: line.and_then(|line| original_line(file, line)),
        traceback,
    };
    warn!(file, line = ?error.line, kind = %error.kind, "unit failed");
    error
}

/// The innermost traceback frame inside `file`, or the position of a
/// syntax error reported against it.
fn failing_line(py: Python<'_>, err: &PyErr, file: &str) -> PyResult<Option<usize>> {
    let value = err.value(py);
    if err.is_instance_of::<PySyntaxError>(py) {
        let filename: Option<String> = value.getattr("filename")?.extract()?;
        if filename.as_deref() == Some(file) {
            return value.getattr("lineno")?.extract();
        }
    }

    let Some(traceback) = err.traceback(py) else {
        return Ok(None);
    };
    let frames = py
        .import("traceback")?
        .call_method1("extract_tb", (traceback,))?;
    let mut line = None;
    for frame in frames.try_iter()? {
        let frame = frame?;
        let filename: String = frame.getattr("filename")?.extract()?;
        if filename == file {
            line = frame.getattr("lineno")?.extract()?;
        }
    }
    Ok(line)
}

fn format_traceback(py: Python<'_>, err: &PyErr) -> PyResult<String> {
    let value = err.value(py);
    let traceback = value.getattr("__traceback__")?;
    let lines = py.import("traceback")?.call_method1(
        "format_exception",
        (value.get_type(), value, traceback),
    )?;
    let mut out = String::new();
    for line in lines.try_iter()? {
        out.push_str(&line?.extract::<String>()?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyo3::types::PyDict;

    #[test]
    fn registered_lines_feed_linecache() {
        Python::with_gil(|py| {
            register(py, "<remap-test.rist>", "first = 1\nsecond = 2").expect("register");
            let line: String = py
                .import("linecache")
                .and_then(|m| m.call_method1("getline", ("<remap-test.rist>", 2)))
                .and_then(|l| l.extract())
                .expect("getline");
            assert_eq!(line, "second = 2\n");
            assert_eq!(
                original_line("<remap-test.rist>", 1).as_deref(),
                Some("first = 1")
            );
            assert_eq!(original_line("<remap-test.rist>", 0), None);
            assert_eq!(original_line("<remap-test.rist>", 3), None);
        });
    }

    #[test]
    fn locates_failure_in_unit_file() {
        Python::with_gil(|py| {
            let source = "a = 1\nb = a / 0\n";
            let code = py
                .import("builtins")
                .and_then(|b| b.getattr("compile"))
                .and_then(|c| c.call1((source, "<remap-fail.rist>", "exec")))
                .expect("compile");
            let err = py
                .import("builtins")
                .and_then(|b| b.getattr("exec"))
                .and_then(|e| e.call1((code, PyDict::new(py))))
                .expect_err("division by zero");

            let error = remap_error(py, err, "<remap-fail.rist>", "a = 1;\nb = a / 0;");
            assert_eq!(error.kind, "ZeroDivisionError");
            assert_eq!(error.line, Some(2));
            assert_eq!(error.source_line.as_deref(), Some("b = a / 0;"));
            assert!(error.traceback.contains("ZeroDivisionError"));
            assert!(error.traceback.contains("b = a / 0;"));
            assert!(error.to_string().starts_with("ZeroDivisionError: division by zero"));
        });
    }

    #[test]
    fn syntax_errors_report_their_line() {
        Python::with_gil(|py| {
            let err = py
                .import("ast")
                .and_then(|ast| ast.call_method1("parse", ("ok = 1\nbad = (\n", "<remap-syntax.rist>")))
                .expect_err("syntax error");
            let error = remap_error(py, err, "<remap-syntax.rist>", "ok = 1;\nbad = {;");
            assert_eq!(error.kind, "SyntaxError");
            assert!(error.line.is_some());
        });
    }
}
