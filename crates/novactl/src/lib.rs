//! Novactl library - session controller pieces, exposed for integration tests

pub mod cli;
pub mod confirm;
pub mod demo;
pub mod display;
pub mod errors;
pub mod input;
pub mod logging;
pub mod repl;
pub mod startup;
