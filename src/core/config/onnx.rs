//! ONNX Runtime configuration types and utilities.

use serde::{Deserialize, Serialize};

/// Graph optimization levels for ONNX Runtime.
///
/// The classifier is optimized once when the process loads it; the level chosen
/// here decides how much work that one-time step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrtGraphOptimizationLevel {
    /// Disable all optimizations.
    DisableAll,
    /// Enable basic optimizations.
    Level1,
    /// Enable extended optimizations.
    Level2,
    /// Enable all optimizations.
    #[default]
    Level3,
}

/// Execution providers for ONNX Runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum OrtExecutionProvider {
    /// CPU execution provider (always available)
    #[default]
    CPU,
    /// NVIDIA CUDA execution provider
    CUDA {
        /// CUDA device ID (default: 0)
        device_id: Option<i32>,
        /// Memory limit in bytes (optional)
        gpu_mem_limit: Option<usize>,
    },
    /// TensorRT execution provider
    TensorRT {
        /// TensorRT device ID (default: 0)
        device_id: Option<i32>,
        /// Maximum workspace size in bytes
        max_workspace_size: Option<usize>,
        /// FP16 enable flag
        fp16_enable: Option<bool>,
        /// Directory for the serialized engine cache, so the engine build
        /// happens once per model rather than once per process start.
        engine_cache_path: Option<String>,
    },
}

/// Configuration for ONNX Runtime sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrtSessionConfig {
    /// Number of threads used to parallelize execution within nodes
    pub intra_threads: Option<usize>,
    /// Number of threads used to parallelize execution across nodes
    pub inter_threads: Option<usize>,
    /// Graph optimization level
    pub optimization_level: Option<OrtGraphOptimizationLevel>,
    /// Execution providers in order of preference
    pub execution_providers: Option<Vec<OrtExecutionProvider>>,
    /// Log severity level (0=Verbose, 1=Info, 2=Warning, 3=Error, 4=Fatal)
    pub log_severity_level: Option<i32>,
}

impl OrtSessionConfig {
    /// Creates a new OrtSessionConfig with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the execution providers.
    ///
    /// # Arguments
    ///
    /// * `providers` - Vector of execution providers in order of preference.
    pub fn with_execution_providers(mut self, providers: Vec<OrtExecutionProvider>) -> Self {
        self.execution_providers = Some(providers);
        self
    }

    /// Gets the effective graph optimization level.
    pub fn get_optimization_level(&self) -> OrtGraphOptimizationLevel {
        self.optimization_level.unwrap_or_default()
    }

    /// Gets the execution providers, or a CPU provider if none are set.
    pub fn get_execution_providers(&self) -> Vec<OrtExecutionProvider> {
        self.execution_providers
            .clone()
            .unwrap_or_else(|| vec![OrtExecutionProvider::CPU])
    }

    /// Parses a device string (`cpu`, `cuda`, `cuda:N`, `tensorrt`, `tensorrt:N`).
    ///
    /// GPU devices always keep CPU as the fallback provider.
    pub fn for_device(device: &str) -> Result<Self, String> {
        let device_lower = device.to_lowercase();
        if device_lower == "cpu" {
            return Ok(Self::new().with_execution_providers(vec![OrtExecutionProvider::CPU]));
        }

        let (kind, id) = match device_lower.split_once(':') {
            Some((kind, id)) => {
                let id = id
                    .parse::<i32>()
                    .map_err(|_| format!("Invalid device ID in '{device}'"))?;
                (kind.to_string(), Some(id))
            }
            None => (device_lower.clone(), None),
        };

        let primary = match kind.as_str() {
            "cuda" => OrtExecutionProvider::CUDA {
                device_id: Some(id.unwrap_or(0)),
                gpu_mem_limit: None,
            },
            "tensorrt" | "trt" => OrtExecutionProvider::TensorRT {
                device_id: Some(id.unwrap_or(0)),
                max_workspace_size: None,
                fp16_enable: Some(true),
                engine_cache_path: None,
            },
            _ => return Err(format!("Unsupported device: {device}")),
        };

        Ok(Self::new().with_execution_providers(vec![primary, OrtExecutionProvider::CPU]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_providers_fall_back_to_cpu() {
        let config = OrtSessionConfig {
            intra_threads: Some(4),
            ..Default::default()
        };
        assert_eq!(
            config.get_execution_providers(),
            vec![OrtExecutionProvider::CPU]
        );
    }

    #[test]
    fn test_default_optimization_is_full() {
        let config = OrtSessionConfig::new();
        assert_eq!(
            config.get_optimization_level(),
            OrtGraphOptimizationLevel::Level3
        );
    }

    #[test]
    fn test_for_device_parsing() {
        let cpu = OrtSessionConfig::for_device("CPU").unwrap();
        assert_eq!(cpu.get_execution_providers(), vec![OrtExecutionProvider::CPU]);

        let cuda = OrtSessionConfig::for_device("cuda:1").unwrap();
        let providers = cuda.get_execution_providers();
        assert_eq!(providers.len(), 2);
        assert!(matches!(
            providers[0],
            OrtExecutionProvider::CUDA {
                device_id: Some(1),
                ..
            }
        ));
        assert_eq!(providers[1], OrtExecutionProvider::CPU);

        let trt = OrtSessionConfig::for_device("tensorrt").unwrap();
        assert!(matches!(
            trt.get_execution_providers()[0],
            OrtExecutionProvider::TensorRT {
                device_id: Some(0),
                fp16_enable: Some(true),
                ..
            }
        ));

        assert!(OrtSessionConfig::for_device("cuda:x").is_err());
        assert!(OrtSessionConfig::for_device("tpu").is_err());
    }
}
