//! Compiling and starting one unit against a shared [`Scope`].

use pyo3::prelude::*;
use pyo3::exceptions::PyRuntimeError;
use pyo3::types::PyTuple;
use tracing::debug;

use crate::assembler::{assemble, ENTRY_FUNCTION, SELF_PARAM};
use crate::compiler::CompiledCode;
use crate::driver::{Driver, GeneratorRoutine, OnceRoutine, Routine, StateCell, UnitState};
use crate::error::CoreError;
use crate::remap::{remap_error, RuntimeError};
use crate::scope::Scope;

/// The object generated code receives as `_executor`.
#[pyclass(frozen, module = "rist", name = "Executor")]
pub struct ExecutorHandle {
    #[pyo3(get)]
    scope: Py<Scope>,
}

/// Runs a compiled unit.
///
/// The scope outlives a single run: starting the same executor again, or
/// handing its scope to another executor with [`Executor::with_scope`],
/// lets later units see earlier bindings. The state is shared with the
/// driver of the latest run, so it ends as `Exhausted` or `Failed`.
pub struct Executor {
    unit: CompiledCode,
    scope: Py<Scope>,
    args: Vec<(String, PyObject)>,
    state: StateCell,
}

impl Executor {
    /// An executor with a fresh, empty scope.
    pub fn new(unit: CompiledCode) -> Result<Self, CoreError> {
        let scope = Python::with_gil(|py| Py::new(py, Scope::new(py)))?;
        Ok(Self {
            unit,
            scope,
            args: Vec::new(),
            state: StateCell::new(UnitState::Created),
        })
    }

    pub fn with_scope(mut self, scope: Py<Scope>) -> Self {
        self.scope = scope;
        self
    }

    /// Extra named arguments passed to the entry function after `_executor`.
    pub fn with_args(mut self, args: Vec<(String, PyObject)>) -> Self {
        self.args = args;
        self
    }

    pub fn scope(&self) -> &Py<Scope> {
        &self.scope
    }

    pub fn unit(&self) -> &CompiledCode {
        &self.unit
    }

    pub fn state(&self) -> UnitState {
        self.state.get()
    }

    pub fn arg_names(&self) -> Vec<&str> {
        std::iter::once(SELF_PARAM)
            .chain(self.args.iter().map(|(name, _)| name.as_str()))
            .collect()
    }

    /// Compile, evaluate and call the entry function.
    ///
    /// The returned driver yields the values the unit emits. Failures up to
    /// this point are already remapped to the unit's source.
    pub fn start(&mut self) -> Result<Driver, RuntimeError> {
        Python::with_gil(|py| match self.launch(py) {
            Ok(routine) => Ok(Driver::with_state(
                routine,
                self.state.clone(),
                &self.unit.file,
                &self.unit.source,
            )),
            Err(err) => {
                self.state.set(UnitState::Failed);
                Err(remap_error(py, err, &self.unit.file, &self.unit.source))
            }
        })
    }

    fn launch(&mut self, py: Python<'_>) -> PyResult<Box<dyn Routine>> {
        let file = self.unit.file.as_str();
        let tree = assemble(py, &self.unit.code, &self.arg_names(), file)?;
        let builtins = py.import("builtins")?;
        let code = builtins
            .getattr("compile")?
            .call1((tree, file, "exec"))?;
        self.state.set(UnitState::Compiled);

        let scope = self.scope.get();
        builtins
            .getattr("exec")?
            .call1((code, scope.globals(py), scope.locals(py)))?;
        let entry = scope.lookup(py, ENTRY_FUNCTION)?.ok_or_else(|| {
            PyRuntimeError::new_err(format!("{ENTRY_FUNCTION} was not defined by {file}"))
        })?;
        let entry = entry.bind(py);

        let is_generator = py
            .import("inspect")?
            .call_method1("isgeneratorfunction", (entry,))?
            .is_truthy()?;
        debug!(file, is_generator, "calling entry function");

        let handle = Py::new(
            py,
            ExecutorHandle {
                scope: self.scope.clone_ref(py),
            },
        )?;
        let mut call_args = vec![handle.into_any()];
        call_args.extend(self.args.iter().map(|(_, value)| value.clone_ref(py)));
        let result = entry.call1(PyTuple::new(py, call_args)?)?.unbind();

        Ok(if is_generator {
            Box::new(GeneratorRoutine::new(result))
        } else {
            Box::new(OnceRoutine::new(result))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;

    fn start(source: &str, file: &str) -> (Executor, Driver) {
        let unit = compile(source, file).expect("compile");
        let mut executor = Executor::new(unit).expect("executor");
        let driver = executor.start().expect("start");
        (executor, driver)
    }

    fn lookup_int(executor: &Executor, name: &str) -> Option<i64> {
        Python::with_gil(|py| {
            executor
                .scope()
                .get()
                .lookup(py, name)
                .expect("lookup")
                .map(|v| v.extract(py).expect("int"))
        })
    }

    #[test]
    fn suspends_and_commits_bindings_before_failing() {
        let source = "first = 1;\nyield first;\nsecond = 2;\nyield second;\nthird = 3;\nboom = third / 0;";
        let (executor, mut driver) = start(source, "<scenario-d.rist>");

        let first = driver.next().expect("first").expect("ok");
        let second = driver.next().expect("second").expect("ok");
        let err = driver.next().expect("third").expect_err("failure");
        assert!(driver.next().is_none());
        assert_eq!(driver.state(), UnitState::Failed);
        assert_eq!(executor.state(), UnitState::Failed);

        Python::with_gil(|py| {
            assert_eq!(first.extract::<i64>(py).expect("int"), 1);
            assert_eq!(second.extract::<i64>(py).expect("int"), 2);
        });
        assert_eq!(err.kind, "ZeroDivisionError");
        assert_eq!(err.line, Some(6));
        assert_eq!(err.source_line.as_deref(), Some("boom = third / 0;"));
        assert!(err.traceback.contains("boom = third / 0;"));

        assert_eq!(lookup_int(&executor, "first"), Some(1));
        assert_eq!(lookup_int(&executor, "second"), Some(2));
        assert_eq!(lookup_int(&executor, "third"), Some(3));
        assert_eq!(lookup_int(&executor, "boom"), None);
    }

    #[test]
    fn sent_values_reach_the_unit() {
        let (_executor, mut driver) = start("got = yield 1;\nyield got * 2;", "<send.rist>");
        let first = driver.next().expect("first").expect("ok");
        let sent = Python::with_gil(|py| 21i64.into_pyobject(py).expect("int").into_any().unbind());
        driver.send(sent);
        let second = driver.next().expect("second").expect("ok");
        assert!(driver.next().is_none());
        assert_eq!(driver.state(), UnitState::Exhausted);
        Python::with_gil(|py| {
            assert_eq!(first.extract::<i64>(py).expect("int"), 1);
            assert_eq!(second.extract::<i64>(py).expect("int"), 42);
        });
    }

    #[test]
    fn non_suspending_units_emit_their_return_value_once() {
        let (executor, driver) = start("x = 40 + 2;", "<plain.rist>");
        let values: Vec<_> = driver.collect::<Result<_, _>>().expect("values");
        assert_eq!(values.len(), 1);
        Python::with_gil(|py| assert!(values[0].is_none(py)));
        assert_eq!(executor.state(), UnitState::Exhausted);
        assert_eq!(lookup_int(&executor, "x"), Some(42));
    }

    #[test]
    fn state_runs_from_created_to_exhausted() {
        let unit = compile("1;", "<state.rist>").expect("compile");
        let mut executor = Executor::new(unit).expect("executor");
        assert_eq!(executor.state(), UnitState::Created);
        let mut driver = executor.start().expect("start");
        assert_eq!(executor.state(), UnitState::Running);
        while let Some(value) = driver.next() {
            value.expect("ok");
        }
        assert_eq!(executor.state(), UnitState::Exhausted);
    }

    #[test]
    fn scope_carries_across_units() {
        let first = compile("counter = 10;", "<session-1.rist>").expect("compile");
        let mut executor = Executor::new(first).expect("executor");
        executor.start().expect("start").for_each(drop);

        let second = compile("counter + 5;", "<session-2.rist>").expect("compile");
        let mut next = Executor::new(second)
            .expect("executor")
            .with_scope(Python::with_gil(|py| executor.scope().clone_ref(py)));
        let values: Vec<_> = next.start().expect("start").collect::<Result<_, _>>().expect("values");
        Python::with_gil(|py| assert_eq!(values[0].extract::<i64>(py).expect("int"), 15));
    }

    #[test]
    fn extra_arguments_are_visible_by_name() {
        let unit = compile("greeting;", "<args.rist>").expect("compile");
        let arg = Python::with_gil(|py| "hi".into_pyobject(py).expect("str").into_any().unbind());
        let mut executor = Executor::new(unit)
            .expect("executor")
            .with_args(vec![("greeting".to_string(), arg)]);
        assert_eq!(executor.arg_names(), vec!["_executor", "greeting"]);
        let values: Vec<_> = executor.start().expect("start").collect::<Result<_, _>>().expect("values");
        Python::with_gil(|py| assert_eq!(values[0].extract::<String>(py).expect("str"), "hi"));
    }

    #[test]
    fn host_syntax_errors_are_remapped() {
        let unit = compile("ok = 1;\nbad = {1 +;", "<syntax.rist>").expect("compile");
        let mut executor = Executor::new(unit).expect("executor");
        let err = executor.start().err().expect("syntax error");
        assert_eq!(err.kind, "SyntaxError");
        assert_eq!(err.line, Some(2));
        assert_eq!(executor.state(), UnitState::Failed);
    }
}
