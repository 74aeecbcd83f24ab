//! CLI mode for classifying files and directories.

use print_defect::core::DefectResult;
use print_defect::domain::ClassificationResult;
use print_defect::pipeline::{ImageSource, InspectOptions, Inspection, Pipeline};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use tracing::info;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Classify a single image file
pub async fn classify_file(
    pipeline: &Pipeline,
    path: &Path,
    options: &InspectOptions,
    output_format: &str,
) -> CliResult {
    let start = Instant::now();
    let inspection = pipeline
        .inspect(ImageSource::Path(path.to_path_buf()), options)
        .await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!("Classified in {:.2}ms", elapsed_ms);

    match output_format {
        "json" => println!("{}", serde_json::to_string(&inspection)?),
        _ => {
            println!("\n=== Defect Classification ===");
            println!("File: {}", path.display());
            println!("Processing time: {:.2}ms", elapsed_ms);
            print_inspection(&inspection);
        }
    }
    Ok(())
}

/// Classify every image directly inside a directory
pub async fn classify_dir(
    pipeline: &Pipeline,
    dir: &Path,
    options: &InspectOptions,
    output_format: &str,
) -> CliResult {
    let start = Instant::now();
    let results = pipeline.inspect_dir(dir, options).await?;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    info!("Classified {} images in {:.2}ms", results.len(), elapsed_ms);

    match output_format {
        "json" => {
            let response: BTreeMap<&str, serde_json::Value> = results
                .iter()
                .map(|(name, result)| (name.as_str(), result_to_json(result)))
                .collect();
            println!("{}", serde_json::to_string(&response)?);
        }
        _ => {
            println!("\n=== Defect Classification ===");
            println!("Directory: {}", dir.display());
            println!("Images: {}", results.len());
            println!("Processing time: {:.2}ms", elapsed_ms);
            for (name, result) in &results {
                println!("\n--- {} ---", name);
                match result {
                    Ok(inspection) => print_inspection(inspection),
                    Err(e) => println!("Error: {}", e),
                }
            }
        }
    }
    Ok(())
}

fn result_to_json(result: &DefectResult<Inspection>) -> serde_json::Value {
    match result {
        Ok(inspection) => serde_json::to_value(inspection)
            .unwrap_or_else(|e| serde_json::json!({ "status": "error", "message": e.to_string() })),
        Err(e) => serde_json::json!({ "status": "error", "message": e.to_string() }),
    }
}

fn print_inspection(inspection: &Inspection) {
    match &inspection.result {
        ClassificationResult::Success {
            class_name,
            confidence,
            predictions,
        } => {
            println!("Class: {} ({:.1}%)", class_name, confidence * 100.0);
            if let Some(defect) = inspection.defect {
                println!("Defect code: {}", defect);
            }
            println!("Scores:");
            for (label, score) in predictions {
                println!("    {:<24} {:.4}", label, score);
            }
        }
        ClassificationResult::LowConfidence {
            confidence,
            message,
        } => {
            println!("{} ({:.1}%)", message, confidence * 100.0);
        }
        ClassificationResult::Error { message } => {
            println!("{}", message);
        }
    }
    if inspection.segmentation_recovered() {
        println!("Note: segmentation fell back to an earlier mask");
    }
}
