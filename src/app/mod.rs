//! Command-line application around the broker engine

pub mod cli;
pub mod commands;
pub mod config;
pub mod startup;
pub mod supervisor;

#[cfg(test)]
mod tests;
