use std::path::PathBuf;

use pyo3::PyErr;
use thiserror::Error;

use crate::cipher::CipherError;
use crate::lexer::RuleTableError;
use crate::remap::RuntimeError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("failed to write compiled output to {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{file}:{line}:{offset}: line must end with \";\" not \"{found}\"")]
    LineFormat {
        file: String,
        line: usize,
        offset: usize,
        found: char,
        text: String,
    },
    #[error("{file}:{line}:{column}: unexpected character '{character}' in identifier")]
    LexError {
        file: String,
        line: usize,
        column: usize,
        character: char,
        text: String,
    },
    #[error(transparent)]
    RuleTable(#[from] RuleTableError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Cipher(#[from] CipherError),
    #[error("host runtime error: {0}")]
    Host(#[from] PyErr),
}

/// Flag or argument combinations rejected before any compilation happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("\"compile_to\" target not given while the WRITE flag is set")]
    MissingCompileTarget,
    #[error("a key must be provided for decryption")]
    MissingKey,
    #[error("source text must be compiled before it is executed, set the COMPILE flag")]
    NotCompiled,
}
