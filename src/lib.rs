pub mod config;
pub mod error;
pub mod gene;
pub mod rest;
pub mod search;
pub mod sql;
pub mod types;

pub use error::{Result, SearchError};
