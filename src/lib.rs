pub mod cli;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod sources;
pub mod utils;

pub use cli::Cli;
pub use error::IngestError;
pub use models::{Config, OutputFormat, RunReport};
pub use pipeline::Orchestrator;
