use std::cell::RefCell;

use cellgraph_core::Position;
use rustc_hash::FxHashSet;

use crate::formula::{CellLookup, Formula, FormulaParseError};
use crate::sheet::Sheet;
use crate::value::Value;

/// Leading character that marks the rest of the input as a formula.
pub const FORMULA_SIGN: char = '=';
/// Leading character that forces the rest of the input to be literal text.
pub const ESCAPE_SIGN: char = '\'';

/// A formula together with its memoized result.
#[derive(Debug)]
pub struct FormulaCell {
    formula: Formula,
    /// Last evaluated result; dropped whenever a precedent changes
    cache: RefCell<Option<Value>>,
}

impl FormulaCell {
    pub fn new(formula: Formula) -> Self {
        Self {
            formula,
            cache: RefCell::new(None),
        }
    }

    pub fn formula(&self) -> &Formula {
        &self.formula
    }

    fn value<L: CellLookup + ?Sized>(&self, lookup: &L, memoize: bool) -> Value {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.clone();
        }

        let value = Value::from(self.formula.evaluate(lookup));
        if memoize {
            *self.cache.borrow_mut() = Some(value.clone());
        }
        value
    }
}

/// What a cell holds.
#[derive(Debug, Default)]
pub enum CellContent {
    #[default]
    Empty,
    /// Raw text as entered, escape sign included
    Text(String),
    Formula(FormulaCell),
}

impl CellContent {
    /// Interpret user input.
    /// - "" -> Empty
    /// - "=" followed by at least one character -> Formula (parse errors propagate)
    /// - anything else (including a lone "=") -> Text
    pub fn from_input(input: &str) -> Result<Self, FormulaParseError> {
        if input.is_empty() {
            return Ok(CellContent::Empty);
        }

        if let Some(expression) = input.strip_prefix(FORMULA_SIGN) {
            if !expression.is_empty() {
                let formula = Formula::parse(expression)?;
                return Ok(CellContent::Formula(FormulaCell::new(formula)));
            }
        }

        Ok(CellContent::Text(input.to_string()))
    }

    /// Source representation: raw text, or "=" plus the canonical expression.
    pub fn text(&self) -> String {
        match self {
            CellContent::Empty => String::new(),
            CellContent::Text(s) => s.clone(),
            CellContent::Formula(f) => format!("{}{}", FORMULA_SIGN, f.formula.expression()),
        }
    }

    pub fn value<L: CellLookup + ?Sized>(&self, lookup: &L, memoize: bool) -> Value {
        match self {
            CellContent::Empty => Value::Number(0.0),
            CellContent::Text(s) => {
                let shown = s.strip_prefix(ESCAPE_SIGN).unwrap_or(s);
                Value::Text(shown.to_string())
            }
            CellContent::Formula(f) => f.value(lookup, memoize),
        }
    }

    pub fn referenced_cells(&self) -> Vec<Position> {
        match self {
            CellContent::Formula(f) => f.formula.referenced_cells(),
            _ => Vec::new(),
        }
    }

    pub fn has_cache(&self) -> bool {
        match self {
            CellContent::Formula(f) => f.cache.borrow().is_some(),
            _ => false,
        }
    }

    /// True for a formula whose result is not cached.
    pub fn needs_evaluation(&self) -> bool {
        matches!(self, CellContent::Formula(f) if f.cache.borrow().is_none())
    }

    pub fn wipe_cache(&self) {
        if let CellContent::Formula(f) = self {
            f.cache.borrow_mut().take();
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, CellContent::Empty)
    }
}

/// One grid slot: content plus its place in the dependency graph.
///
/// `precedents` and `dependents` hold positions, not cells. The sheet owns
/// every cell; these sets are back-references resolved through it.
#[derive(Debug, Default)]
pub struct Cell {
    pub(crate) content: CellContent,
    /// Cells this cell's formula reads from
    pub(crate) precedents: FxHashSet<Position>,
    /// Cells whose formulas read from this cell
    pub(crate) dependents: FxHashSet<Position>,
}

impl Cell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub fn text(&self) -> String {
        self.content.text()
    }

    /// True when the text representation is non-empty. Text cells are never
    /// stored with empty text, so this is exactly "not Empty".
    pub fn has_text(&self) -> bool {
        !self.content.is_empty()
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.is_empty()
    }

    pub fn precedents(&self) -> impl Iterator<Item = Position> + '_ {
        self.precedents.iter().copied()
    }

    pub fn dependents(&self) -> impl Iterator<Item = Position> + '_ {
        self.dependents.iter().copied()
    }
}

/// Read-only handle to a cell, bound to the sheet that owns it.
#[derive(Clone, Copy)]
pub struct CellView<'a> {
    sheet: &'a Sheet,
    cell: &'a Cell,
    position: Position,
}

impl<'a> CellView<'a> {
    pub(crate) fn new(sheet: &'a Sheet, cell: &'a Cell, position: Position) -> Self {
        Self { sheet, cell, position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Evaluated value. Formula cells are evaluated lazily against the sheet.
    pub fn value(&self) -> Value {
        self.sheet.evaluate(self.position)
    }

    pub fn text(&self) -> String {
        self.cell.text()
    }

    pub fn referenced_cells(&self) -> Vec<Position> {
        self.cell.content.referenced_cells()
    }

    pub fn content(&self) -> &'a CellContent {
        &self.cell.content
    }

    /// Precedent positions in row-major order.
    pub fn precedents(&self) -> Vec<Position> {
        let mut cells: Vec<Position> = self.cell.precedents().collect();
        cells.sort_unstable();
        cells
    }

    /// Dependent positions in row-major order.
    pub fn dependents(&self) -> Vec<Position> {
        let mut cells: Vec<Position> = self.cell.dependents().collect();
        cells.sort_unstable();
        cells
    }

    pub fn has_dependents(&self) -> bool {
        self.cell.has_dependents()
    }

    pub fn has_cache(&self) -> bool {
        self.cell.content.has_cache()
    }
}

impl std::fmt::Debug for CellView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellView")
            .field("position", &self.position)
            .field("text", &self.text())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FormulaError;

    fn no_cells(_: Position) -> Result<f64, FormulaError> {
        Ok(0.0)
    }

    #[test]
    fn test_from_input_shapes() {
        assert!(matches!(CellContent::from_input("").unwrap(), CellContent::Empty));
        assert!(matches!(CellContent::from_input("hello").unwrap(), CellContent::Text(_)));
        assert!(matches!(CellContent::from_input("=1+2").unwrap(), CellContent::Formula(_)));
        // A lone formula sign is plain text
        assert!(matches!(CellContent::from_input("=").unwrap(), CellContent::Text(_)));
    }

    #[test]
    fn test_from_input_syntax_error() {
        let err = CellContent::from_input("=1+").unwrap_err();
        assert_eq!(err.message(), "Unexpected end of expression");
    }

    #[test]
    fn test_empty_value_is_zero() {
        let content = CellContent::Empty;
        assert_eq!(content.value(&no_cells, true), Value::Number(0.0));
        assert_eq!(content.text(), "");
    }

    #[test]
    fn test_escaped_text() {
        let content = CellContent::from_input("'=2+2").unwrap();
        assert_eq!(content.value(&no_cells, true), Value::Text("=2+2".into()));
        assert_eq!(content.text(), "'=2+2");
    }

    #[test]
    fn test_text_that_looks_numeric_stays_text() {
        let content = CellContent::from_input("42").unwrap();
        assert_eq!(content.value(&no_cells, true), Value::Text("42".into()));
    }

    #[test]
    fn test_formula_text_is_canonical() {
        let content = CellContent::from_input("=(1 + A2)").unwrap();
        assert_eq!(content.text(), "=1+A2");
        assert_eq!(content.referenced_cells(), vec![Position::new(1, 0)]);
    }

    #[test]
    fn test_formula_cache_population_and_wipe() {
        let content = CellContent::from_input("=1+2").unwrap();
        assert!(!content.has_cache());

        assert_eq!(content.value(&no_cells, true), Value::Number(3.0));
        assert!(content.has_cache());

        content.wipe_cache();
        assert!(!content.has_cache());
    }

    #[test]
    fn test_formula_without_memoization_never_caches() {
        let content = CellContent::from_input("=1+2").unwrap();
        assert_eq!(content.value(&no_cells, false), Value::Number(3.0));
        assert!(!content.has_cache());
    }

    #[test]
    fn test_formula_error_becomes_value() {
        let content = CellContent::from_input("=1/0").unwrap();
        assert_eq!(
            content.value(&no_cells, true),
            Value::Error(FormulaError::arithmetic())
        );
    }

    #[test]
    fn test_needs_evaluation() {
        let formula = CellContent::from_input("=2*2").unwrap();
        assert!(formula.needs_evaluation());
        formula.value(&no_cells, true);
        assert!(!formula.needs_evaluation());

        assert!(!CellContent::Empty.needs_evaluation());
        assert!(!CellContent::from_input("text").unwrap().needs_evaluation());
    }

    #[test]
    fn test_non_formula_content_has_no_cache() {
        let content = CellContent::from_input("text").unwrap();
        content.wipe_cache();
        assert!(!content.has_cache());
        assert!(content.referenced_cells().is_empty());
    }
}
