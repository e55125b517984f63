// src/system/mod.rs

pub mod executor;
pub mod report;
pub mod test_runner;
