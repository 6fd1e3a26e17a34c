//! Output format and run report models.

use serde::{Deserialize, Serialize};

/// Output format for the run report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// Machine-parseable JSON format
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Size and shape of an existing namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamespaceInfo {
    pub name: String,
    pub approx_count: u64,
    pub dimensions: usize,
}

/// Outcome of one ingest run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub namespace: String,
    pub files_total: u64,
    pub files_loaded: u64,
    pub files_skipped: u64,
    pub batches_upserted: u64,
    pub batches_failed: u64,
    /// Batches dequeued after cancellation and never sent.
    pub batches_dropped: u64,
    pub rows_upserted: u64,
    pub final_offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_failure: Option<String>,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl RunReport {
    /// True when every file was read and every batch landed.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.read_failure.is_none()
            && self.batches_failed == 0
            && self.batches_dropped == 0
    }
}
