//! Print Defect Server and CLI
//!
//! A binary for classifying 3D print photographs via CLI or HTTP server.
//!
//! # Usage
//!
//! ## CLI Mode
//! ```bash
//! print-defect-server classify --file print.jpg --model models/defect.onnx --labels models/labels.txt
//! print-defect-server classify --dir photos/ --model models/defect.onnx --labels models/labels.txt --output json
//! ```
//!
//! ## Server Mode
//! ```bash
//! print-defect-server serve --model models/defect.onnx --labels models/labels.txt --port 3000
//! ```

mod cli;
mod config;
mod engine;
mod server;

use clap::{Args, Parser, Subcommand};
use print_defect::pipeline::InspectOptions;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "print-defect-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "3D print defect classification via CLI or HTTP server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args)]
struct EngineArgs {
    /// Path to the ONNX classification model
    #[arg(long = "model", env = "PRINT_DEFECT_MODEL")]
    model: PathBuf,

    /// Path to the label file, one label per line
    #[arg(long = "labels", env = "PRINT_DEFECT_LABELS")]
    labels: PathBuf,

    /// Write the optimized ONNX graph here when the first session is built
    #[arg(long = "optimized-model", env = "PRINT_DEFECT_OPTIMIZED_MODEL")]
    optimized_model: Option<PathBuf>,

    /// JSON pipeline configuration file
    #[arg(long = "config", env = "PRINT_DEFECT_CONFIG")]
    pipeline_config: Option<PathBuf>,

    /// Default confidence threshold
    #[arg(long, env = "PRINT_DEFECT_THRESHOLD")]
    threshold: Option<f32>,

    /// Device to use (cpu, cuda, cuda:0, tensorrt, etc.)
    #[arg(long, default_value = "cpu", env = "PRINT_DEFECT_DEVICE")]
    device: String,

    /// Number of ONNX Runtime sessions
    #[arg(long, default_value = "1", env = "PRINT_DEFECT_SESSIONS")]
    sessions: usize,

    /// Number of worker threads (defaults to number of CPUs)
    #[arg(long, env = "PRINT_DEFECT_WORKERS")]
    workers: Option<usize>,
}

impl From<EngineArgs> for config::EngineConfig {
    fn from(args: EngineArgs) -> Self {
        Self {
            model_path: args.model,
            labels_path: args.labels,
            optimized_model_path: args.optimized_model,
            device: args.device,
            pipeline_config: args.pipeline_config,
            threshold: args.threshold,
            sessions: args.sessions,
            workers: args.workers,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image or a directory of images
    Classify {
        /// Image file to classify
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,

        /// Directory whose png/jpg/jpeg files are classified
        #[arg(long, conflicts_with = "file")]
        dir: Option<PathBuf>,

        /// Skip background removal
        #[arg(long)]
        keep_background: bool,

        /// Output format (json, pretty)
        #[arg(long, default_value = "pretty")]
        output: String,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, short, default_value = "3000", env = "PRINT_DEFECT_PORT")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "PRINT_DEFECT_HOST")]
        host: String,

        /// Directory for uploaded print photographs
        #[arg(long, default_value = "uploads", env = "PRINT_DEFECT_UPLOAD_DIR")]
        upload_dir: PathBuf,

        /// Remove uploads after processing even when a print is recorded
        #[arg(long, env = "PRINT_DEFECT_DISCARD_UPLOADS")]
        discard_uploads: bool,

        /// Largest accepted upload in megabytes
        #[arg(long, default_value = "16", env = "PRINT_DEFECT_MAX_UPLOAD_MB")]
        max_upload_mb: usize,

        /// Known printer ids; any id is accepted when omitted
        #[arg(long = "printer", value_delimiter = ',', env = "PRINT_DEFECT_PRINTERS")]
        printers: Vec<u64>,

        #[command(flatten)]
        engine: EngineArgs,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    print_defect::utils::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Classify {
            file,
            dir,
            keep_background,
            output,
            engine,
        } => {
            if file.is_none() && dir.is_none() {
                eprintln!("Error: Either --file or --dir must be provided");
                std::process::exit(1);
            }

            let pipeline = engine::build_pipeline(&config::EngineConfig::from(engine))?;
            let options = InspectOptions {
                confidence_threshold: None,
                remove_background: keep_background.then_some(false),
            };

            if let Some(file) = file {
                info!("Processing file: {}", file.display());
                cli::classify_file(&pipeline, &file, &options, &output).await?;
            } else if let Some(dir) = dir {
                info!("Processing directory: {}", dir.display());
                cli::classify_dir(&pipeline, &dir, &options, &output).await?;
            }
        }
        Commands::Serve {
            port,
            host,
            upload_dir,
            discard_uploads,
            max_upload_mb,
            printers,
            engine,
        } => {
            let config = config::ServerConfig {
                engine: engine.into(),
                host,
                port,
                upload_dir,
                keep_uploads: !discard_uploads,
                max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
                printers,
            };

            info!("Starting server on {}:{}", config.host, config.port);
            server::run_server(config).await?;
        }
    }

    Ok(())
}
