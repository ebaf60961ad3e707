// ABOUTME: Command implementations invoked by the CLI
// ABOUTME: Exports the dump command and its output sink helper

pub mod dump;

pub use dump::{dump, dump_to, open_output};
