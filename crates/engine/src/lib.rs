pub mod cell;
pub mod config;
mod dep_graph;
pub mod error;
pub mod formula;
mod grid;
pub mod sheet;
pub mod value;

pub use cell::{CellContent, CellView};
pub use cellgraph_core::{Position, Size};
pub use config::SheetConfig;
pub use error::{Result, SheetError};
pub use formula::{CellLookup, Formula, FormulaParseError};
pub use sheet::Sheet;
pub use value::{FormulaError, FormulaErrorCategory, Value};
