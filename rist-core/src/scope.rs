//! The two-tier namespace a compiled unit reads and writes.

use pyo3::prelude::*;
use pyo3::types::PyDict;

/// Global and local bindings shared by every unit an executor runs.
///
/// Exposed to generated code as `_executor.scope`; the wrapper's
/// `finally` clause merges its locals into `scope.globals`.
#[pyclass(frozen, module = "rist", name = "Scope")]
pub struct Scope {
    globals: Py<PyDict>,
    locals: Py<PyDict>,
}

impl Scope {
    pub fn globals<'a, 'py>(&'a self, py: Python<'py>) -> &'a Bound<'py, PyDict> {
        self.globals.bind(py)
    }

    pub fn locals<'a, 'py>(&'a self, py: Python<'py>) -> &'a Bound<'py, PyDict> {
        self.locals.bind(py)
    }
}

#[pymethods]
impl Scope {
    #[new]
    pub fn new(py: Python<'_>) -> Self {
        Self {
            globals: PyDict::new(py).unbind(),
            locals: PyDict::new(py).unbind(),
        }
    }

    #[getter(globals)]
    fn py_globals(&self, py: Python<'_>) -> Py<PyDict> {
        self.globals.clone_ref(py)
    }

    #[getter(locals)]
    fn py_locals(&self, py: Python<'_>) -> Py<PyDict> {
        self.locals.clone_ref(py)
    }

    /// Bind `name` in the global tier.
    pub fn define(&self, py: Python<'_>, name: &str, value: PyObject) -> PyResult<()> {
        self.globals(py).set_item(name, value)
    }

    /// Local tier first, then global.
    pub fn lookup(&self, py: Python<'_>, name: &str) -> PyResult<Option<PyObject>> {
        if let Some(value) = self.locals(py).get_item(name)? {
            return Ok(Some(value.unbind()));
        }
        Ok(self.globals(py).get_item(name)?.map(Bound::unbind))
    }

    /// Copy both tiers of `other` over this scope's tiers.
    pub fn merge(&self, py: Python<'_>, other: &Bound<'_, Scope>) -> PyResult<()> {
        let other = other.get();
        self.globals(py).update(other.globals(py).as_mapping())?;
        self.locals(py).update(other.locals(py).as_mapping())
    }

    pub fn update_globals(&self, py: Python<'_>, mapping: &Bound<'_, PyDict>) -> PyResult<()> {
        self.globals(py).update(mapping.as_mapping())
    }

    pub fn update_locals(&self, py: Python<'_>, mapping: &Bound<'_, PyDict>) -> PyResult<()> {
        self.locals(py).update(mapping.as_mapping())
    }

    fn __repr__(&self, py: Python<'_>) -> String {
        format!(
            "<Scope globals={} locals={}>",
            self.globals(py).len(),
            self.locals(py).len()
        )
    }
}
