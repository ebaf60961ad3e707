// ABOUTME: Library module for spanner-dump
// ABOUTME: Exports DDL ordering, row rendering and the Spanner client for the binary and tests

pub mod commands;
pub mod config;
pub mod dump;
pub mod error;
pub mod filters;
pub mod schema;
pub mod source;
pub mod spanner;
pub mod table_rules;
pub mod utils;
pub mod value;

pub use error::{DumpError, Result};
