//! Suite execution engine
//!
//! The run loop sequences scripts through the parser and interpreter
//! collaborators and folds their outcomes into the suite verdict.

mod runner;
mod state;

pub use runner::{RunReport, RunStatus, SuiteRunner};
pub use state::RunState;

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Run-level errors
#[derive(Error, Debug)]
pub enum RunError {
    #[error("{}: {message}", path.display())]
    File { path: PathBuf, message: String },

    #[error("No input files given and no previous run to rerun")]
    NoInput,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RunError {
    pub fn file(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        RunError::File {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::File { .. } | RunError::NoInput | RunError::Config(_) => 2,
            RunError::Internal(_) => 1,
        }
    }
}
