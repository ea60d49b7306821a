//! Side-effecting helpers: catalog files, configuration, process execution, filesystem layout.

pub mod catalog;
pub mod config;
pub mod layout;
pub mod process;
pub mod run_record;
