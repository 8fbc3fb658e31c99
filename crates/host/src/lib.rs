//! tfm host - configuration and command-line glue around the VFS

pub mod commands;
pub mod config;

pub use commands::Command;
pub use config::Config;
