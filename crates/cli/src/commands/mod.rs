//! Subcommand implementations

pub mod config;
pub mod doctor;
pub mod platforms;
pub mod sync;
