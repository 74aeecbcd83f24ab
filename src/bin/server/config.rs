//! Configuration types for the classification server and CLI.

use std::path::PathBuf;

/// Model and pipeline options shared by every subcommand
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub labels_path: PathBuf,
    /// Where the first session writes its optimized graph
    pub optimized_model_path: Option<PathBuf>,
    pub device: String,
    /// Optional JSON file with a full `PipelineConfig`
    pub pipeline_config: Option<PathBuf>,
    /// Overrides the configured default confidence threshold
    pub threshold: Option<f32>,
    /// Number of ONNX Runtime sessions
    pub sessions: usize,
    /// Rayon worker threads (defaults to number of CPUs)
    pub workers: Option<usize>,
}

/// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub engine: EngineConfig,
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub keep_uploads: bool,
    /// Request body limit for multipart uploads
    pub max_upload_bytes: usize,
    /// Printer ids accepted by the record store; any id when empty
    pub printers: Vec<u64>,
}
