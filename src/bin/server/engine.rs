//! Pipeline construction shared between CLI and server modes.

use crate::config::EngineConfig;
use print_defect::core::config::{
    ClassifierConfig, ConfigValidator, OrtSessionConfig, ParallelPolicy, PipelineConfig,
};
use print_defect::core::traits::AdapterBuilder;
use print_defect::core::{DefectError, ModelCache};
use print_defect::domain::DefectClassificationAdapterBuilder;
use print_defect::pipeline::Pipeline;
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error(transparent)]
    Pipeline(#[from] DefectError),
}

/// Translates engine options into a validated classifier configuration.
fn classifier_config(config: &EngineConfig) -> Result<ClassifierConfig, EngineError> {
    let ort_session = OrtSessionConfig::for_device(&config.device).map_err(EngineError::Config)?;
    let classifier = ClassifierConfig {
        model_path: config.model_path.clone(),
        labels_path: config.labels_path.clone(),
        optimized_model_path: config.optimized_model_path.clone(),
        session_pool_size: config.sessions.max(1),
        ort_session: Some(ort_session),
        ..Default::default()
    };
    classifier
        .validate()
        .map_err(|e| EngineError::Config(e.to_string()))?;
    Ok(classifier)
}

/// Builds the pipeline and loads the model eagerly.
pub fn build_pipeline(config: &EngineConfig) -> Result<Pipeline, EngineError> {
    for path in [&config.model_path, &config.labels_path] {
        if !path.exists() {
            return Err(EngineError::ModelNotFound(path.display().to_string()));
        }
    }

    let mut pipeline_config = match &config.pipeline_config {
        Some(path) => {
            PipelineConfig::from_json_file(path).map_err(|e| EngineError::Config(e.to_string()))?
        }
        None => PipelineConfig::default(),
    };
    if let Some(threshold) = config.threshold {
        pipeline_config.confidence_threshold = threshold;
    }
    pipeline_config
        .validate()
        .map_err(|e| EngineError::Config(e.to_string()))?;

    let classifier = classifier_config(config)?;

    let policy = ParallelPolicy::default().with_max_threads(config.workers);
    match policy.install_global_thread_pool() {
        Ok(true) => info!(threads = ?config.workers, "rayon pool configured"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "rayon pool already initialized"),
    }

    let start = Instant::now();
    let cache = ModelCache::from_config(classifier.clone());
    let model = cache.get_or_init()?;
    info!(
        device = %config.device,
        labels = model.labels().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "model loaded"
    );

    let adapter = DefectClassificationAdapterBuilder::new()
        .input_size(classifier.input_size)
        .channel_order(classifier.channel_order)
        .score_threshold(pipeline_config.confidence_threshold)
        .build(model)?;

    Ok(Pipeline::new(pipeline_config, adapter, policy)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine_config(dir: &std::path::Path) -> EngineConfig {
        let model_path = dir.join("defect.onnx");
        let labels_path = dir.join("labels.txt");
        std::fs::write(&model_path, b"onnx").unwrap();
        std::fs::write(&labels_path, "0 OK\n").unwrap();
        EngineConfig {
            model_path,
            labels_path,
            optimized_model_path: None,
            device: "cpu".to_string(),
            pipeline_config: None,
            threshold: None,
            sessions: 2,
            workers: None,
        }
    }

    #[test]
    fn test_optimized_model_path_reaches_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            optimized_model_path: Some(dir.path().join("defect.opt.onnx")),
            ..engine_config(dir.path())
        };
        let classifier = classifier_config(&config).unwrap();
        assert_eq!(
            classifier.optimized_model_path,
            Some(dir.path().join("defect.opt.onnx"))
        );
        assert_eq!(classifier.session_pool_size, 2);
    }

    #[test]
    fn test_classifier_config_is_validated() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            labels_path: PathBuf::from("missing/labels.txt"),
            ..engine_config(dir.path())
        };
        assert!(matches!(
            classifier_config(&config),
            Err(EngineError::Config(_))
        ));

        let config = EngineConfig {
            device: "tpu".to_string(),
            ..engine_config(dir.path())
        };
        assert!(matches!(
            classifier_config(&config),
            Err(EngineError::Config(_))
        ));
    }
}
