//! Builtins injected into every executed unit.
//!
//! Each descriptor becomes an extra named parameter of the generated entry
//! function, bound to a Python callable implemented in Rust.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::cipher::{self, CipherError};

/// Kind of builtin, used to pick the callable that implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// Layered encryption, generating a key when none is given.
    Encrypt,

    /// Reverses [`BuiltinKind::Encrypt`].
    Decrypt,
}

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name the unit sees, e.g. `encrypt`.
    pub name: &'static str,

    /// Logical module the builtin belongs to. Informational only.
    pub logical_module: &'static str,

    pub kind: BuiltinKind,
}

/// The complete list of builtins handed to units by [`get_builtins`].
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "encrypt",
        logical_module: "rist.cipher",
        kind: BuiltinKind::Encrypt,
    },
    BuiltinDescriptor {
        name: "decrypt",
        logical_module: "rist.cipher",
        kind: BuiltinKind::Decrypt,
    },
];

/// Look up a builtin by the name units see.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

/// Materialise [`BUILTINS`] as `(name, callable)` pairs.
pub fn get_builtins(py: Python<'_>) -> PyResult<Vec<(String, PyObject)>> {
    BUILTINS
        .iter()
        .map(|builtin| {
            let function = match builtin.kind {
                BuiltinKind::Encrypt => wrap_pyfunction!(py_encrypt, py)?,
                BuiltinKind::Decrypt => wrap_pyfunction!(py_decrypt, py)?,
            };
            Ok((builtin.name.to_string(), function.into_any().unbind()))
        })
        .collect()
}

fn value_error(err: CipherError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// `encrypt(text, key=None, depth=1)`; returns `(text, key)` when the key
/// was generated.
#[pyfunction]
#[pyo3(name = "encrypt", signature = (text, key = None, depth = 1))]
fn py_encrypt(py: Python<'_>, text: &str, key: Option<i64>, depth: u32) -> PyResult<PyObject> {
    match key {
        Some(key) => {
            let encrypted = cipher::encrypt(text, key, depth).map_err(value_error)?;
            Ok(encrypted.into_pyobject(py)?.into_any().unbind())
        }
        None => {
            let key = cipher::random_key();
            let encrypted = cipher::encrypt(text, key, depth).map_err(value_error)?;
            Ok((encrypted, key).into_pyobject(py)?.into_any().unbind())
        }
    }
}

#[pyfunction]
#[pyo3(name = "decrypt", signature = (text, key, depth = 1))]
fn py_decrypt(text: &str, key: i64, depth: u32) -> PyResult<String> {
    cipher::decrypt(text, key, depth).map_err(value_error)
}
