//! Repository implementations kept in process memory.

mod config;
mod pipeline;
mod security;

pub use config::MemoryConfigRepository;
pub use pipeline::MemoryPipelineStore;
pub use security::StaticSecurityService;
