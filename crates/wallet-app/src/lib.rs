//! Argument parsing and text rendering for the `nockwallet` front-end.

pub mod cli;
pub mod render;
