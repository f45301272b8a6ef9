//! crosspost adapters crate
//!
//! This crate contains infrastructure adapters implementing the domain ports:
//! - `definitions`: Filesystem-based adapter definition loader (YAML/JSON)
//! - `transport`: reqwest HTTP transport and an offline stub
//! - `registry`: In-memory platform registry
//! - `content`: Basic HTML clean-up and markdown conversion
//! - `hooks`: Reusable platform hooks

mod definitions_fs;
mod http;
mod stub;

pub mod content;
pub mod hooks;
pub mod registry;

/// Re-exports for definitions adapters
pub mod definitions {
    pub use crate::definitions_fs::FsDefinitionsRepo as FilesystemDefinitionsRepo;
}

/// Re-exports for transport adapters
pub mod transport {
    pub use crate::http::ReqwestTransport;
    pub use crate::stub::StubTransport;
}
