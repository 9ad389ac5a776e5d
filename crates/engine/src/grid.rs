//! Rectangular cell storage.
//!
//! Rows always share one length. Growing for a position beyond the current
//! bounds resizes every row together, so `rows[r][c]` is addressable for all
//! `r < row_count()` and `c < col_count()`.

use cellgraph_core::Position;

use crate::cell::Cell;

type Row = Vec<Option<Box<Cell>>>;

#[derive(Debug, Default)]
pub(crate) struct Grid {
    rows: Vec<Row>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    fn index(&self, pos: Position) -> Option<(usize, usize)> {
        let row = usize::try_from(pos.row).ok()?;
        let col = usize::try_from(pos.col).ok()?;
        (row < self.row_count() && col < self.col_count()).then_some((row, col))
    }

    /// The cell at `pos`, or None when the slot is absent or out of bounds.
    pub fn get(&self, pos: Position) -> Option<&Cell> {
        let (row, col) = self.index(pos)?;
        self.rows[row][col].as_deref()
    }

    pub fn get_mut(&mut self, pos: Position) -> Option<&mut Cell> {
        let (row, col) = self.index(pos)?;
        self.rows[row][col].as_deref_mut()
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.get(pos).is_some()
    }

    /// Grow (never shrink) so that `pos` is addressable. `pos` must be valid.
    pub fn ensure_addressable(&mut self, pos: Position) {
        debug_assert!(pos.is_valid(), "growing for invalid position {:?}", pos);
        let need_rows = pos.row as usize + 1;
        let cols = self.col_count().max(pos.col as usize + 1);

        if cols > self.col_count() {
            for row in &mut self.rows {
                row.resize_with(cols, || None);
            }
        }
        if need_rows > self.rows.len() {
            self.rows.resize_with(need_rows, || empty_row(cols));
        }
    }

    /// The cell at `pos`, creating an Empty one (and growing) if needed.
    pub fn materialize(&mut self, pos: Position) -> &mut Cell {
        self.ensure_addressable(pos);
        let row = pos.row as usize;
        let col = pos.col as usize;
        self.rows[row][col].get_or_insert_with(|| Box::new(Cell::new()))
    }

    /// Remove the cell at `pos`, leaving the slot absent.
    pub fn vacate(&mut self, pos: Position) -> Option<Box<Cell>> {
        let (row, col) = self.index(pos)?;
        self.rows[row][col].take()
    }

    #[cfg(test)]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Every present cell with its position, row-major.
    pub fn iter(&self) -> impl Iterator<Item = (Position, &Cell)> + '_ {
        self.rows.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, slot)| {
                slot.as_deref()
                    .map(|cell| (Position::new(r as i32, c as i32), cell))
            })
        })
    }
}

fn empty_row(cols: usize) -> Row {
    std::iter::repeat_with(|| None).take(cols).collect()
}
