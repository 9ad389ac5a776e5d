//! Cell values and formula errors.
//!
//! Formula errors are ordinary values: they flow through dependent formulas
//! like numbers and render as fixed display tokens.

use std::fmt;

use thiserror::Error;

/// Category of a computation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormulaErrorCategory {
    /// Reference to a position outside the sheet
    Ref,
    /// Operand could not be interpreted as a number
    Value,
    /// Arithmetic fault (division by zero, overflow)
    Arithmetic,
}

impl FormulaErrorCategory {
    /// Display token. These strings are part of the output format.
    pub fn token(self) -> &'static str {
        match self {
            FormulaErrorCategory::Ref => "#REF!",
            FormulaErrorCategory::Value => "#VALUE!",
            FormulaErrorCategory::Arithmetic => "#ARITHM!",
        }
    }
}

/// An error produced while evaluating a formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("{}", .category.token())]
pub struct FormulaError {
    category: FormulaErrorCategory,
}

impl FormulaError {
    pub fn new(category: FormulaErrorCategory) -> Self {
        Self { category }
    }

    pub fn reference() -> Self {
        Self::new(FormulaErrorCategory::Ref)
    }

    pub fn value() -> Self {
        Self::new(FormulaErrorCategory::Value)
    }

    pub fn arithmetic() -> Self {
        Self::new(FormulaErrorCategory::Arithmetic)
    }

    pub fn category(&self) -> FormulaErrorCategory {
        self.category
    }
}

impl From<FormulaErrorCategory> for FormulaError {
    fn from(category: FormulaErrorCategory) -> Self {
        Self::new(category)
    }
}

/// The value a cell produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<FormulaError> {
        match self {
            Value::Error(e) => Some(*e),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<FormulaError> for Value {
    fn from(e: FormulaError) -> Self {
        Value::Error(e)
    }
}

impl From<Result<f64, FormulaError>> for Value {
    fn from(result: Result<f64, FormulaError>) -> Self {
        match result {
            Ok(n) => Value::Number(n),
            Err(e) => Value::Error(e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Error(e) => write!(f, "{}", e),
        }
    }
}
