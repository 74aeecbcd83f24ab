//! Session construction from [`ClassifierConfig`] and [`OrtSessionConfig`].

use super::OrtInfer;
use crate::core::config::{
    ClassifierConfig, OrtExecutionProvider, OrtGraphOptimizationLevel, OrtSessionConfig,
};
use crate::core::errors::{DefectError, DefectResult};
use ort::execution_providers::{CPUExecutionProvider, ExecutionProviderDispatch};
use ort::logging::LogLevel;
use ort::session::Session;
use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use std::path::Path;

fn graph_level(level: OrtGraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        OrtGraphOptimizationLevel::DisableAll => GraphOptimizationLevel::Disable,
        OrtGraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        OrtGraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        OrtGraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
    }
}

fn log_level(severity: i32) -> LogLevel {
    match severity {
        i32::MIN..=0 => LogLevel::Verbose,
        1 => LogLevel::Info,
        2 => LogLevel::Warning,
        3 => LogLevel::Error,
        _ => LogLevel::Fatal,
    }
}

#[cfg(feature = "cuda")]
fn cuda_provider(device_id: Option<i32>, mem_limit: Option<usize>) -> ExecutionProviderDispatch {
    let mut provider = ort::execution_providers::CUDAExecutionProvider::default();
    if let Some(id) = device_id {
        provider = provider.with_device_id(id);
    }
    if let Some(limit) = mem_limit {
        provider = provider.with_memory_limit(limit);
    }
    provider.build()
}

#[cfg(feature = "tensorrt")]
fn tensorrt_provider(
    device_id: Option<i32>,
    workspace: Option<usize>,
    fp16: Option<bool>,
    engine_cache: Option<&str>,
) -> ExecutionProviderDispatch {
    let mut provider = ort::execution_providers::TensorRTExecutionProvider::default();
    if let Some(id) = device_id {
        provider = provider.with_device_id(id);
    }
    if let Some(workspace) = workspace {
        provider = provider.with_max_workspace_size(workspace);
    }
    if let Some(fp16) = fp16 {
        provider = provider.with_fp16(fp16);
    }
    if let Some(dir) = engine_cache {
        provider = provider
            .with_engine_cache(true)
            .with_engine_cache_path(dir.to_string());
    }
    provider.build()
}

fn dispatch(ep: &OrtExecutionProvider) -> Result<ExecutionProviderDispatch, ort::Error> {
    match ep {
        OrtExecutionProvider::CPU => Ok(CPUExecutionProvider::default().build()),
        #[cfg(feature = "cuda")]
        OrtExecutionProvider::CUDA {
            device_id,
            gpu_mem_limit,
        } => Ok(cuda_provider(*device_id, *gpu_mem_limit)),
        #[cfg(not(feature = "cuda"))]
        OrtExecutionProvider::CUDA { .. } => Err(ort::Error::new(
            "CUDA execution provider requested but the cuda feature is not enabled",
        )),
        #[cfg(feature = "tensorrt")]
        OrtExecutionProvider::TensorRT {
            device_id,
            max_workspace_size,
            fp16_enable,
            engine_cache_path,
        } => Ok(tensorrt_provider(
            *device_id,
            *max_workspace_size,
            *fp16_enable,
            engine_cache_path.as_deref(),
        )),
        #[cfg(not(feature = "tensorrt"))]
        OrtExecutionProvider::TensorRT { .. } => Err(ort::Error::new(
            "TensorRT execution provider requested but the tensorrt feature is not enabled",
        )),
    }
}

fn apply_session_config(
    mut builder: SessionBuilder,
    cfg: &OrtSessionConfig,
) -> Result<SessionBuilder, ort::Error> {
    if let Some(intra) = cfg.intra_threads {
        builder = builder.with_intra_threads(intra)?;
    }
    if let Some(inter) = cfg.inter_threads {
        builder = builder.with_inter_threads(inter)?;
    }
    builder = builder.with_optimization_level(graph_level(cfg.get_optimization_level()))?;
    if let Some(severity) = cfg.log_severity_level {
        builder = builder.with_log_level(log_level(severity))?;
    }
    let eps = cfg.get_execution_providers();
    let providers = eps.iter().map(dispatch).collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(providers = ?eps, "execution providers");
    if !providers.is_empty() {
        builder = builder.with_execution_providers(providers)?;
    }
    Ok(builder)
}

impl OrtInfer {
    /// Builds one session. Only the first session of a pool persists the
    /// optimized graph.
    pub(super) fn build_session(
        config: &ClassifierConfig,
        path: &Path,
        persist_optimized: bool,
    ) -> DefectResult<Session> {
        let mut builder = Session::builder()?;
        if let Some(cfg) = &config.ort_session {
            builder = apply_session_config(builder, cfg)?;
        }
        if persist_optimized && let Some(optimized) = &config.optimized_model_path {
            builder = builder.with_optimized_model_path(optimized)?;
        }
        builder.commit_from_file(path).map_err(|e| {
            DefectError::model_load_error(
                path,
                "failed to create ONNX session",
                Some("ensure model is compatible and file exists"),
                Some(e),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping_clamps() {
        assert!(matches!(log_level(-3), LogLevel::Verbose));
        assert!(matches!(log_level(2), LogLevel::Warning));
        assert!(matches!(log_level(9), LogLevel::Fatal));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_is_rejected() {
        let ep = OrtExecutionProvider::CUDA {
            device_id: Some(0),
            gpu_mem_limit: None,
        };
        assert!(dispatch(&ep).is_err());
        assert!(dispatch(&OrtExecutionProvider::CPU).is_ok());
    }
}
