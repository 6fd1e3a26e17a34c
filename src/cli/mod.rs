//! CLI module for the bulk loader.

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::Parser;

use crate::models::{Config, OutputFormat, StoreDriver};

/// Bulk-load Parquet vector shards into a turbopuffer namespace.
#[derive(Debug, Parser)]
#[command(name = "vecload")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "The API key is read from TURBOPUFFER_API_KEY (or a .env file) \
                        unless --api-key is given.")]
pub struct Cli {
    /// Namespace to load into
    pub namespace: String,

    /// Folder containing the input shards
    pub input_folder: PathBuf,

    #[arg(long, short = 'w', help = "Number of upsert workers [default: 4]")]
    pub workers: Option<usize>,

    #[arg(long, help = "Batches buffered between reader and workers [default: 4]")]
    pub queue_capacity: Option<usize>,

    #[arg(long, help = "Skip shards whose rows all lie below this offset")]
    pub start_offset: Option<u64>,

    #[arg(long, help = "Glob pattern for shards inside the input folder [default: *.parquet]")]
    pub pattern: Option<String>,

    #[arg(long, help = "Vector column name [default: emb]")]
    pub vector_column: Option<String>,

    #[arg(long, help = "Id column name, used when present [default: id]")]
    pub id_column: Option<String>,

    #[arg(
        long = "attribute",
        short = 'a',
        help = "Extra column to upload as an attribute (repeatable)"
    )]
    pub attributes: Vec<String>,

    #[arg(long, env = "TURBOPUFFER_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "TURBOPUFFER_API_BASE_URL", help = "API base URL")]
    pub api_url: Option<String>,

    #[arg(long, help = "Load into an in-memory namespace instead of the remote one")]
    pub dry_run: bool,

    #[arg(long, short = 'y', help = "Delete an existing namespace without asking")]
    pub yes: bool,

    #[arg(long, short = 'f', help = "Report format: text or json")]
    pub format: Option<OutputFormat>,

    #[arg(long, short = 'v', help = "Enable verbose output")]
    pub verbose: bool,
}

impl Cli {
    /// Overlay command-line values on top of the loaded configuration.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.pipeline.queue_capacity = capacity;
        }
        if let Some(offset) = self.start_offset {
            config.pipeline.start_offset = offset;
        }
        if let Some(ref pattern) = self.pattern {
            config.pipeline.file_pattern = pattern.clone();
        }
        if let Some(ref column) = self.vector_column {
            config.columns.vector = column.clone();
        }
        if let Some(ref column) = self.id_column {
            config.columns.id = column.clone();
        }
        if !self.attributes.is_empty() {
            config.columns.attributes = self.attributes.clone();
        }
        if let Some(ref key) = self.api_key {
            config.store.api_key = Some(key.clone());
        }
        if let Some(ref url) = self.api_url {
            config.store.base_url = url.clone();
        }
        if self.dry_run {
            config.store.driver = StoreDriver::Memory;
        }
    }
}
