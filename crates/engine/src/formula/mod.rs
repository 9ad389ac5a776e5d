// Formula parsing and evaluation

pub mod eval;
pub mod parser;

use cellgraph_core::Position;
use thiserror::Error;

use crate::value::FormulaError;
pub use eval::CellLookup;
pub use parser::Expr;

/// Malformed formula text. Carries the parser's diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FormulaParseError {
    message: String,
}

impl FormulaParseError {
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    ast: Expr,
}

impl Formula {
    /// Parse formula source (the text after the leading '=').
    pub fn parse(expression: &str) -> Result<Self, FormulaParseError> {
        parser::parse(expression)
            .map(|ast| Self { ast })
            .map_err(|message| FormulaParseError { message })
    }

    pub fn evaluate<L: CellLookup + ?Sized>(&self, lookup: &L) -> Result<f64, FormulaError> {
        eval::evaluate(&self.ast, lookup)
    }

    /// Canonical text of the formula, without the leading '='.
    pub fn expression(&self) -> String {
        parser::format_expr(&self.ast)
    }

    /// Valid positions the formula reads, sorted and without duplicates.
    pub fn referenced_cells(&self) -> Vec<Position> {
        let mut cells: Vec<Position> = parser::extract_cell_refs(&self.ast)
            .into_iter()
            .filter(Position::is_valid)
            .collect();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    pub fn ast(&self) -> &Expr {
        &self.ast
    }
}
