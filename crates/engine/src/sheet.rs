use std::io::{self, Write};

use cellgraph_core::{Position, Size};
use rustc_hash::FxHashMap;

use crate::cell::{CellContent, CellView};
use crate::config::SheetConfig;
use crate::dep_graph;
use crate::error::{Result, SheetError};
use crate::formula::CellLookup;
use crate::grid::Grid;
use crate::value::{FormulaError, Value};

/// A grid of cells with automatic dependency tracking.
///
/// Writes rewire the dependency graph and drop stale cached results. Reads
/// evaluate formulas lazily, so a value is only computed when asked for.
#[derive(Debug, Default)]
pub struct Sheet {
    grid: Grid,
    config: SheetConfig,
}

impl CellLookup for Sheet {
    fn lookup(&self, pos: Position) -> std::result::Result<f64, FormulaError> {
        if !pos.is_valid() {
            return Err(FormulaError::reference());
        }
        operand(&self.evaluate(pos))
    }
}

/// Operand lookup for formulas evaluated in dependency order.
///
/// Every formula precedent was evaluated earlier in the same pass, so its
/// value is either staged here or cached on the cell. Nothing recurses.
struct Staged<'a> {
    sheet: &'a Sheet,
    values: &'a FxHashMap<Position, Value>,
}

impl CellLookup for Staged<'_> {
    fn lookup(&self, pos: Position) -> std::result::Result<f64, FormulaError> {
        if !pos.is_valid() {
            return Err(FormulaError::reference());
        }
        if let Some(value) = self.values.get(&pos) {
            return operand(value);
        }
        match self.sheet.grid.get(pos) {
            Some(cell) => operand(
                &cell
                    .content
                    .value(self.sheet, self.sheet.config.cache_formula_results),
            ),
            None => Ok(0.0),
        }
    }
}

/// A cell value used as a formula operand.
fn operand(value: &Value) -> std::result::Result<f64, FormulaError> {
    match value {
        Value::Number(n) => Ok(*n),
        Value::Text(s) => text_to_number(s),
        Value::Error(e) => Err(*e),
    }
}

/// Read a text operand as a number. The whole string must be consumed and
/// the result must be finite; leading whitespace is skipped.
fn text_to_number(text: &str) -> std::result::Result<f64, FormulaError> {
    match text.trim_start().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(FormulaError::value()),
    }
}

impl Sheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SheetConfig) -> Self {
        Self {
            grid: Grid::new(),
            config,
        }
    }

    pub fn config(&self) -> &SheetConfig {
        &self.config
    }

    fn validate(pos: Position) -> Result<()> {
        if pos.is_valid() {
            Ok(())
        } else {
            Err(SheetError::InvalidPosition(pos))
        }
    }

    /// Set the content of a cell from user input.
    ///
    /// - `""` makes the cell Empty
    /// - `=expr` stores a formula; every cell it reads is materialized
    /// - anything else is stored as text (`'` escapes a leading `=`)
    ///
    /// Position, syntax, and cycle checks all run before anything is touched,
    /// so a failed call leaves the sheet exactly as it was.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<()> {
        Self::validate(pos)?;

        let content = CellContent::from_input(text)?;
        let refs = content.referenced_cells();

        if let Some(path) = dep_graph::would_create_cycle(&self.grid, pos, &refs) {
            log::warn!(
                "rejected {} = {:?}: circular dependency through {}",
                pos,
                text,
                format_path(&path)
            );
            return Err(SheetError::CircularDependency { cell: pos, path });
        }

        self.grid.materialize(pos).content = content;
        dep_graph::replace_edges(&mut self.grid, pos, &refs);
        let dropped = dep_graph::invalidate_dependents(&self.grid, pos);

        log::debug!(
            "set {} = {:?} ({} precedent(s), {} cache(s) dropped)",
            pos,
            text,
            refs.len(),
            dropped
        );
        Ok(())
    }

    /// The cell at `pos`, or None if nothing is stored there.
    pub fn cell(&self, pos: Position) -> Result<Option<CellView<'_>>> {
        Self::validate(pos)?;
        Ok(self
            .grid
            .get(pos)
            .map(|cell| CellView::new(self, cell, pos)))
    }

    /// Remove the content of a cell.
    ///
    /// A cell that other formulas still read becomes Empty in place; any
    /// other cell is removed outright. Clearing an absent cell does nothing.
    pub fn clear_cell(&mut self, pos: Position) -> Result<()> {
        Self::validate(pos)?;

        if !self.grid.contains(pos) {
            return Ok(());
        }

        dep_graph::detach(&mut self.grid, pos);
        let dropped = dep_graph::invalidate_dependents(&self.grid, pos);

        let keep = self
            .grid
            .get(pos)
            .map_or(false, |cell| cell.has_dependents());
        if keep {
            if let Some(cell) = self.grid.get_mut(pos) {
                cell.content = CellContent::Empty;
            }
        } else {
            self.grid.vacate(pos);
        }

        log::debug!(
            "cleared {} ({}, {} cache(s) dropped)",
            pos,
            if keep { "kept as empty" } else { "removed" },
            dropped
        );
        Ok(())
    }

    /// Value of the cell at `pos`; absent cells read as zero.
    ///
    /// Formula precedents without a cached result are evaluated first, in
    /// dependency order, so no formula evaluates another from inside its own
    /// evaluation. Call depth stays flat however long the reference chain.
    /// Without memoization the intermediate results live in a scratch map
    /// for the duration of this read.
    pub(crate) fn evaluate(&self, pos: Position) -> Value {
        let Some(cell) = self.grid.get(pos) else {
            return Value::default();
        };
        let memoize = self.config.cache_formula_results;

        let order = dep_graph::evaluation_order(&self.grid, pos);
        if order.len() > 1 {
            log::trace!("evaluating {} formula(s) to read {}", order.len(), pos);
        }

        let mut staged: FxHashMap<Position, Value> = FxHashMap::default();
        for at in order {
            let Some(pending) = self.grid.get(at) else {
                continue;
            };
            let lookup = Staged {
                sheet: self,
                values: &staged,
            };
            let value = pending.content.value(&lookup, memoize);
            if !memoize {
                staged.insert(at, value);
            }
        }

        staged
            .remove(&pos)
            .unwrap_or_else(|| cell.content.value(self, memoize))
    }

    /// Value of the cell at `pos`. An absent cell reads as zero.
    pub fn value(&self, pos: Position) -> Result<Value> {
        Ok(self.cell(pos)?.map(|c| c.value()).unwrap_or_default())
    }

    /// Text of the cell at `pos`. An absent cell reads as "".
    pub fn text(&self, pos: Position) -> Result<String> {
        Ok(self.cell(pos)?.map(|c| c.text()).unwrap_or_default())
    }

    /// Every stored cell, row-major.
    pub fn cells(&self) -> impl Iterator<Item = CellView<'_>> + '_ {
        self.grid
            .iter()
            .map(move |(pos, cell)| CellView::new(self, cell, pos))
    }

    /// Smallest origin-anchored rectangle covering every cell with text.
    ///
    /// Cells that exist only because a formula reads them are Empty and do
    /// not count.
    pub fn printable_size(&self) -> Size {
        self.grid
            .iter()
            .filter(|(_, cell)| cell.has_text())
            .fold(Size::default(), |size, (pos, _)| Size {
                rows: size.rows.max(pos.row + 1),
                cols: size.cols.max(pos.col + 1),
            })
    }

    /// Write the values of the printable area, tab separated.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |view| view.value().to_string())
    }

    /// Write the texts of the printable area, tab separated.
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_with(out, |view| view.text())
    }

    fn print_with<W, F>(&self, out: &mut W, render: F) -> io::Result<()>
    where
        W: Write,
        F: Fn(CellView<'_>) -> String,
    {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    out.write_all(b"\t")?;
                }
                let pos = Position::new(row, col);
                if let Some(cell) = self.grid.get(pos) {
                    out.write_all(render(CellView::new(self, cell, pos)).as_bytes())?;
                }
            }
            out.write_all(b"\n")?;
        }
        Ok(())
    }

    /// Check all structural invariants. Panics if any are violated.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let cols = self.grid.col_count();
        assert!(
            self.grid.rows().iter().all(|row| row.len() == cols),
            "grid rows have uneven lengths"
        );
        dep_graph::assert_consistent(&self.grid);
    }
}

fn format_path(path: &[Position]) -> String {
    path.iter()
        .map(Position::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
