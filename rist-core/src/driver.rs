//! Driving a unit's entry function as a bidirectional coroutine.

use std::sync::{Arc, Mutex, PoisonError};

use pyo3::exceptions::PyStopIteration;
use pyo3::prelude::*;
use tracing::trace;

use crate::remap::{remap_error, RuntimeError};

/// Lifecycle of one run of a compiled unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Compiled,
    Running,
    Exhausted,
    Failed,
}

/// A [`UnitState`] shared between an executor and the drivers it starts.
#[derive(Debug, Clone)]
pub struct StateCell(Arc<Mutex<UnitState>>);

impl StateCell {
    pub fn new(state: UnitState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    pub fn get(&self) -> UnitState {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, state: UnitState) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

/// Outcome of a single resumption.
#[derive(Debug)]
pub enum Step {
    Yielded(PyObject),
    /// Carries the routine's return value.
    Exhausted(PyObject),
}

/// Something that can be resumed with an optional sent value.
pub trait Routine: Send {
    fn resume(&mut self, py: Python<'_>, sent: Option<PyObject>) -> PyResult<Step>;
}

/// A Python generator.
pub struct GeneratorRoutine {
    generator: PyObject,
    started: bool,
}

impl GeneratorRoutine {
    pub fn new(generator: PyObject) -> Self {
        Self {
            generator,
            started: false,
        }
    }
}

impl Routine for GeneratorRoutine {
    fn resume(&mut self, py: Python<'_>, sent: Option<PyObject>) -> PyResult<Step> {
        // a just-started generator only accepts None
        let value = match sent {
            Some(value) if self.started => value,
            _ => py.None(),
        };
        self.started = true;

        match self.generator.bind(py).call_method1("send", (value,)) {
            Ok(yielded) => Ok(Step::Yielded(yielded.unbind())),
            Err(err) if err.is_instance_of::<PyStopIteration>(py) => {
                let returned = err.value(py).getattr("value")?;
                Ok(Step::Exhausted(returned.unbind()))
            }
            Err(err) => Err(err),
        }
    }
}

/// A plain return value, emitted once.
pub struct OnceRoutine {
    value: Option<PyObject>,
}

impl OnceRoutine {
    pub fn new(value: PyObject) -> Self {
        Self { value: Some(value) }
    }
}

impl Routine for OnceRoutine {
    fn resume(&mut self, py: Python<'_>, _sent: Option<PyObject>) -> PyResult<Step> {
        Ok(match self.value.take() {
            Some(value) => Step::Yielded(value),
            None => Step::Exhausted(py.None()),
        })
    }
}

/// Iterates the values a unit emits.
///
/// Only the unit's own suspend points are visible. A yielded generator is
/// an ordinary value; nesting goes through `yield from` inside the unit.
/// Call [`Driver::send`] between items to set the value the next
/// resumption receives.
pub struct Driver {
    routine: Option<Box<dyn Routine>>,
    pending: Option<PyObject>,
    state: StateCell,
    file: String,
    source: String,
}

impl Driver {
    pub fn new(routine: Box<dyn Routine>, file: impl Into<String>, source: impl Into<String>) -> Self {
        Self::with_state(routine, StateCell::new(UnitState::Running), file, source)
    }

    /// A driver that records its progress in `state`.
    pub fn with_state(
        routine: Box<dyn Routine>,
        state: StateCell,
        file: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        state.set(UnitState::Running);
        Self {
            routine: Some(routine),
            pending: None,
            state,
            file: file.into(),
            source: source.into(),
        }
    }

    /// Stage the value passed to the next resumption.
    pub fn send(&mut self, value: PyObject) {
        self.pending = Some(value);
    }

    pub fn state(&self) -> UnitState {
        self.state.get()
    }

    fn finish(&mut self, state: UnitState) {
        self.routine = None;
        self.pending = None;
        self.state.set(state);
    }
}

impl Iterator for Driver {
    type Item = Result<PyObject, RuntimeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut routine = self.routine.take()?;
        let sent = self.pending.take();
        Python::with_gil(|py| match routine.resume(py, sent) {
            Ok(Step::Yielded(value)) => {
                trace!(file = %self.file, "routine yielded");
                self.routine = Some(routine);
                Some(Ok(value))
            }
            Ok(Step::Exhausted(_)) => {
                trace!(file = %self.file, "routine exhausted");
                self.finish(UnitState::Exhausted);
                None
            }
            Err(err) => {
                self.finish(UnitState::Failed);
                Some(Err(remap_error(py, err, &self.file, &self.source)))
            }
        })
    }
}
