//! Wrapping rewritten statements in the generated entry function.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};
use tracing::debug;

use crate::rewriter::Rewritten;

/// Name of the generated function every unit is wrapped in.
pub const ENTRY_FUNCTION: &str = "_rist_entry";
/// First parameter of [`ENTRY_FUNCTION`], bound to the running executor.
pub const SELF_PARAM: &str = "_executor";
/// Alias under which the wrapper imports `importlib.import_module`.
pub const IMPORTER_ALIAS: &str = "__rist_import__";

fn template(params: &[&str]) -> String {
    format!(
        "def {ENTRY_FUNCTION}({}):\n    from importlib import import_module as {IMPORTER_ALIAS}\n\n    try:\n        pass\n    finally:\n        {SELF_PARAM}.scope.globals.update(locals())\n",
        params.join(", ")
    )
}

/// Build the module tree for one unit.
///
/// Prelude and body are parsed separately so body statements keep the
/// line numbers of the Rist source. They are spliced, in order, into the
/// `try` block of the template; a trailing bare expression becomes a
/// `yield` of that expression.
pub fn assemble<'py>(
    py: Python<'py>,
    rewritten: &Rewritten,
    params: &[&str],
    file: &str,
) -> PyResult<Bound<'py, PyAny>> {
    let ast = py.import("ast")?;
    let parse = |text: &str| -> PyResult<Bound<'py, PyAny>> {
        let kwargs = PyDict::new(py);
        kwargs.set_item("filename", file)?;
        ast.call_method("parse", (text,), Some(&kwargs))
    };

    let module = parse(&template(params))?;
    let function = module.getattr("body")?.get_item(0)?;
    let guarded = function.getattr("body")?.get_item(1)?;

    let statements = PyList::empty(py);
    let prelude = parse(&rewritten.prelude.join("\n"))?;
    for statement in prelude.getattr("body")?.try_iter()? {
        statements.append(statement?)?;
    }
    let body = parse(&rewritten.body)?;
    for statement in body.getattr("body")?.try_iter()? {
        statements.append(statement?)?;
    }

    let count = statements.len();
    if count > 0 {
        let last = statements.get_item(count - 1)?;
        if let Some(emitting) = as_yield(py, &ast, &last)? {
            statements.set_item(count - 1, emitting)?;
        }
        guarded.setattr("body", statements)?;
    }

    ast.call_method1("fix_missing_locations", (&module,))?;
    debug!(file, params = params.len(), statements = count, "assembled unit");
    Ok(module)
}

/// `Expr(value)` into `Expr(Yield(value))`, unless it already suspends.
fn as_yield<'py>(
    py: Python<'py>,
    ast: &Bound<'py, PyModule>,
    statement: &Bound<'py, PyAny>,
) -> PyResult<Option<Bound<'py, PyAny>>> {
    if !statement.is_instance(&ast.getattr("Expr")?)? {
        return Ok(None);
    }
    let value = statement.getattr("value")?;
    if value.is_instance(&ast.getattr("Yield")?)? || value.is_instance(&ast.getattr("YieldFrom")?)? {
        return Ok(None);
    }

    let kwargs = PyDict::new(py);
    kwargs.set_item("value", &value)?;
    let suspend = ast.getattr("Yield")?.call((), Some(&kwargs))?;
    ast.call_method1("copy_location", (&suspend, &value))?;

    let kwargs = PyDict::new(py);
    kwargs.set_item("value", &suspend)?;
    let wrapped = ast.getattr("Expr")?.call((), Some(&kwargs))?;
    ast.call_method1("copy_location", (&wrapped, statement))?;
    Ok(Some(wrapped))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unparse(py: Python<'_>, rewritten: &Rewritten) -> String {
        let tree = assemble(py, rewritten, &[SELF_PARAM, "encrypt"], "<assemble.rist>")
            .expect("assemble");
        py.import("ast")
            .and_then(|ast| ast.call_method1("unparse", (tree,)))
            .and_then(|text| text.extract())
            .expect("unparse")
    }

    fn body(text: &str) -> Rewritten {
        Rewritten {
            prelude: Vec::new(),
            body: text.to_string(),
        }
    }

    #[test]
    fn trailing_expression_becomes_yield() {
        Python::with_gil(|py| {
            let text = unparse(py, &body("x = 1\nx + 1\n"));
            assert!(text.starts_with("def _rist_entry(_executor, encrypt):"));
            assert!(text.contains("from importlib import import_module as __rist_import__"));
            assert!(text.contains("yield (x + 1)") || text.contains("yield x + 1"));
            assert!(text.contains("_executor.scope.globals.update(locals())"));
        });
    }

    #[test]
    fn existing_yield_and_statements_are_left_alone() {
        Python::with_gil(|py| {
            let text = unparse(py, &body("yield 1\n"));
            assert_eq!(text.matches("yield").count(), 1);
            let text = unparse(py, &body("x = 1\n"));
            assert!(!text.contains("yield"));
        });
    }

    #[test]
    fn empty_units_keep_the_placeholder() {
        Python::with_gil(|py| {
            let text = unparse(py, &body("\n\n"));
            assert!(text.contains("pass"));
        });
    }

    #[test]
    fn body_statements_keep_source_line_numbers() {
        Python::with_gil(|py| {
            let rewritten = Rewritten {
                prelude: vec!["import typing".to_string()],
                body: "\n\nvalue: typing.Any = 3\n".to_string(),
            };
            let tree = assemble(py, &rewritten, &[SELF_PARAM], "<assemble.rist>")
                .expect("assemble");
            let guarded = tree
                .getattr("body")
                .and_then(|b| b.get_item(0))
                .and_then(|f| f.getattr("body"))
                .and_then(|b| b.get_item(1))
                .and_then(|t| t.getattr("body"))
                .expect("try body");
            let lines: Vec<usize> = guarded
                .try_iter()
                .expect("iter")
                .map(|s| s.and_then(|s| s.getattr("lineno")).and_then(|l| l.extract()).expect("lineno"))
                .collect();
            assert_eq!(lines, vec![1, 3]);
        });
    }
}
