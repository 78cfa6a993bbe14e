//! Command-line configuration

pub mod args;

pub use args::{Args, SymbolQuery};
