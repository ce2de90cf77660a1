//! Validation engine for participatory-budgeting (`.pb`) data files.

pub mod config;
pub mod consistency;
pub mod counting;
pub mod driver;
pub mod model;
pub mod parser;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod schema;
pub mod validate;

pub use driver::{process_batch, Input};
pub use report::Report;
