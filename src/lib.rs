pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod models;
pub mod resolver;
pub mod store;
pub mod validation;

#[cfg(test)]
mod testing;
