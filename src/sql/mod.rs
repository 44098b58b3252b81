//! Database rows inserted before the main actions of a test.
//!
//! Table descriptions are provided by the caller; they are turned into
//! insertion templates whose genes follow the column types and constraints.

pub mod repair;
pub mod table;

pub use repair::{repair_broken_initialization_actions, verify_initialization_actions};
pub use table::{Column, ColumnType, Table};

use serde::{Deserialize, Serialize};

/// Insertion of one row into `table`; one top-level gene per column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlInsert {
    pub table: String,
    pub columns: Vec<String>,
}

impl SqlInsert {
    pub fn new(table: &str, columns: Vec<String>) -> Self {
        Self {
            table: table.to_string(),
            columns,
        }
    }
}
