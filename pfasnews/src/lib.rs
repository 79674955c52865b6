// Library interface for pfasnews modules
// This allows tests and other binaries to import modules

pub mod aggregator;
pub mod cache;
pub mod clock;
pub mod error;
pub mod ingestion;
pub mod news;
pub mod registry;
pub mod server;
