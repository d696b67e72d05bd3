//! Core of the Rist language toolchain.
//!
//! Rist is a thin surface syntax over Python. The pipeline is:
//!
//!   source .rist
//!     -> source    (terminator check and stripping)
//!     -> lexer     (rule table, tokens)
//!     -> rewriter  (Python text)
//!     -> assembler (entry function template, via the embedded interpreter)
//!     -> executor + driver (evaluate against a shared scope, drive yields)
//!
//! Failures past the rewriter are remapped to Rist lines by `remap`.
//! Higher-level tools (the CLI) should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod error;
pub mod remap;

// ---------------------------------------------------------------------
// Front-end: preprocessing, lexing and rewriting
// ---------------------------------------------------------------------

pub mod source;
pub mod lexer;
pub mod rewriter;

// ---------------------------------------------------------------------
// Execution: template assembly, scope, executor, coroutine driving
// ---------------------------------------------------------------------

pub mod assembler;
pub mod scope;
pub mod executor;
pub mod driver;

// ---------------------------------------------------------------------
// Builtins and the cipher behind them
// ---------------------------------------------------------------------

pub mod cipher;
pub mod builtins;

// ---------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------

pub mod flags;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{
    compile, compile_file, execute, rist, write_compiled, CompiledCode, RistOutcome, Runnable,
    DEFAULT_FILE_NAME,
};
pub use driver::{Driver, StateCell, UnitState};
pub use error::{ConfigError, CoreError};
pub use executor::Executor;
pub use flags::{Flags, ParsedFlags};
pub use remap::RuntimeError;
pub use scope::Scope;
