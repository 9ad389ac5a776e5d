//! Operation-level errors.
//!
//! These are failures of a mutating call and are never stored in a cell.
//! Computation errors inside formulas are [`crate::value::FormulaError`]
//! values instead.

use cellgraph_core::Position;
use thiserror::Error;

use crate::formula::FormulaParseError;

/// Errors returned by [`crate::sheet::Sheet`] operations.
#[derive(Error, Debug)]
pub enum SheetError {
    #[error("Invalid position: ({}, {})", .0.row, .0.col)]
    InvalidPosition(Position),

    #[error("Formula syntax error: {0}")]
    FormulaSyntax(#[from] FormulaParseError),

    #[error("Circular dependency detected at {cell}")]
    CircularDependency {
        cell: Position,
        /// Cells on the offending cycle, starting and ending at `cell`
        path: Vec<Position>,
    },

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, SheetError>;
