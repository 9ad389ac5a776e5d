// Formula evaluator - reduces an AST to a number, pulling operands through a CellLookup

use cellgraph_core::Position;

use super::parser::{Expr, Op, UnaryOp};
use crate::value::FormulaError;

/// Source of operand values for formula evaluation.
///
/// Implementors decide how a referenced cell turns into a number (or an
/// error that aborts the rest of the expression).
pub trait CellLookup {
    fn lookup(&self, pos: Position) -> Result<f64, FormulaError>;
}

impl<F> CellLookup for F
where
    F: Fn(Position) -> Result<f64, FormulaError>,
{
    fn lookup(&self, pos: Position) -> Result<f64, FormulaError> {
        self(pos)
    }
}

/// Evaluate an expression. The first error encountered wins; operands to its
/// right are never looked up.
pub fn evaluate<L: CellLookup + ?Sized>(expr: &Expr, lookup: &L) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef(pos) => {
            if !pos.is_valid() {
                return Err(FormulaError::reference());
            }
            lookup.lookup(*pos)
        }
        Expr::Unary { op, operand } => {
            let value = evaluate(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Minus => -value,
            })
        }
        Expr::BinaryOp { op, left, right } => {
            let l = evaluate(left, lookup)?;
            let r = evaluate(right, lookup)?;
            let result = match op {
                Op::Add => l + r,
                Op::Sub => l - r,
                Op::Mul => l * r,
                Op::Div => l / r,
            };

            // Division by zero and overflow both surface as non-finite floats
            if result.is_finite() {
                Ok(result)
            } else {
                Err(FormulaError::arithmetic())
            }
        }
    }
}
