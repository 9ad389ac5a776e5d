//! Core value types shared by the engine and its callers.

pub mod position;

pub use position::{Position, Size};
