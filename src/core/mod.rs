// src/core/mod.rs

pub mod backend;
pub mod command_queue;
pub mod commands;
pub mod configuration;
pub mod fault;
pub mod inputs;
pub mod paths;
pub mod properties;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod suite;

#[cfg(test)]
pub(crate) mod test_support;
