//! Grid coordinates.
//!
//! A `Position` is a zero-based (row, column) pair bounded by
//! [`Position::MAX_ROWS`] x [`Position::MAX_COLS`]. Out-of-range coordinates
//! are representable (formulas can mention them) but never pass
//! [`Position::is_valid`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const LETTERS: u32 = 26;
const MAX_LETTER_COUNT: usize = 3;
const MAX_DIGIT_COUNT: usize = 5;

/// A cell coordinate (0-based).
///
/// Ordering is row-major, which is also the order `referenced_cells` reports.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Position {
    /// Row index (0-based)
    pub row: i32,
    /// Column index (0-based)
    pub col: i32,
}

impl Position {
    pub const MAX_ROWS: i32 = 16384;
    pub const MAX_COLS: i32 = 16384;

    /// The canonical invalid position.
    pub const NONE: Position = Position { row: -1, col: -1 };

    #[inline]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }

    /// True if both coordinates lie inside the sheet limits.
    #[inline]
    pub fn is_valid(&self) -> bool {
        (0..Self::MAX_ROWS).contains(&self.row) && (0..Self::MAX_COLS).contains(&self.col)
    }

    /// Parse A1 notation (`A1`, `AB12`). Only uppercase column letters are
    /// accepted. Returns [`Position::NONE`] for anything malformed or out of
    /// range.
    pub fn from_a1(text: &str) -> Position {
        let letters_end = text
            .bytes()
            .position(|b| !b.is_ascii_uppercase())
            .unwrap_or(text.len());
        let (letters, digits) = text.split_at(letters_end);

        if letters.is_empty() || letters.len() > MAX_LETTER_COUNT {
            return Position::NONE;
        }
        if digits.is_empty()
            || digits.len() > MAX_DIGIT_COUNT
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Position::NONE;
        }

        let col = letters
            .bytes()
            .fold(0i32, |acc, b| acc * LETTERS as i32 + i32::from(b - b'A') + 1)
            - 1;
        let row = match digits.parse::<i32>() {
            Ok(n) if n > 0 => n - 1,
            _ => return Position::NONE,
        };

        let pos = Position::new(row, col);
        if pos.is_valid() {
            pos
        } else {
            Position::NONE
        }
    }

    /// Column letters for a 0-based column index: 0 -> A, 25 -> Z, 26 -> AA.
    /// Negative columns have no letters and give "".
    pub fn col_to_letters(col: i32) -> String {
        let mut result = String::new();
        let Ok(col) = u32::try_from(col) else {
            return result;
        };
        let mut n = col + 1;
        while n > 0 {
            n -= 1;
            result.insert(0, (b'A' + (n % LETTERS) as u8) as char);
            n /= LETTERS;
        }
        result
    }
}

impl fmt::Display for Position {
    /// Renders A1 notation; invalid positions render as an empty string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return Ok(());
        }
        write!(f, "{}{}", Position::col_to_letters(self.col), self.row + 1)
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pos = Position::from_a1(s);
        if pos.is_valid() {
            Ok(pos)
        } else {
            Err(format!("Invalid cell reference: {}", s))
        }
    }
}

/// Extent of the printable area of a sheet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub rows: i32,
    pub cols: i32,
}

impl Size {
    #[inline]
    pub const fn new(rows: i32, cols: i32) -> Self {
        Self { rows, cols }
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }
}
