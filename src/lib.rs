pub mod archive;
pub mod classify;
pub mod config;
pub mod derive;
pub mod display;
pub mod errors;
pub mod parse;
pub mod record;
pub mod runner;
pub mod shell;
pub mod types;
