//! The process-wide classification model.
//!
//! A [`ModelHandle`] pairs the inference backend with its ordered label list. It is
//! built once per process by a [`ModelCache`] and shared read-only by every request
//! as a [`SharedModel`].

use crate::core::config::ClassifierConfig;
use crate::core::errors::{DefectError, DefectResult, SimpleError};
use crate::core::inference::{ClassifierBackend, OrtInfer};
use crate::domain::defect_code::DefectCode;
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// A loaded classifier and the labels its outputs are indexed by.
#[derive(Debug)]
pub struct ModelHandle {
    backend: Box<dyn ClassifierBackend>,
    labels: Vec<String>,
}

/// Shared, read-only model handle.
pub type SharedModel = Arc<ModelHandle>;

impl ModelHandle {
    /// Wraps an already constructed backend.
    pub fn new(backend: Box<dyn ClassifierBackend>, labels: Vec<String>) -> DefectResult<Self> {
        if labels.is_empty() {
            return Err(DefectError::ConfigError {
                message: "label list is empty".to_string(),
            });
        }
        Ok(Self { backend, labels })
    }

    /// Loads labels and the ONNX model described by `config`.
    pub fn load(config: &ClassifierConfig) -> DefectResult<Self> {
        let start = Instant::now();
        let labels = load_labels(&config.labels_path)?;
        let backend = OrtInfer::from_config(config)?;
        tracing::info!(
            labels = labels.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model handle ready"
        );
        Self::new(Box::new(backend), labels)
    }

    /// Labels in model output order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The inference backend.
    pub fn backend(&self) -> &dyn ClassifierBackend {
        self.backend.as_ref()
    }
}

/// Reads a label file: one label per line, blank lines ignored.
///
/// Labels that do not begin with their defect-code numeral are accepted here but
/// logged, since mapping them will fail later.
pub fn load_labels(path: impl AsRef<Path>) -> DefectResult<Vec<String>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        DefectError::model_load_error(
            path,
            "failed to read label file",
            Some("provide labels.txt next to the model, one label per line"),
            Some(e),
        )
    })?;
    let labels: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(DefectError::model_load_error(
            path,
            "label file is empty",
            None,
            None::<SimpleError>,
        ));
    }
    for label in &labels {
        if DefectCode::from_label(label).is_err() {
            tracing::warn!(%label, "label has no leading defect code");
        }
    }
    Ok(labels)
}

type Loader = Box<dyn Fn() -> DefectResult<ModelHandle> + Send + Sync>;

/// One-time initialization barrier for the model.
///
/// Concurrent first callers block until a single load finishes. A failed load
/// leaves the cache empty, so the next call retries.
pub struct ModelCache {
    loader: Loader,
    cell: OnceCell<SharedModel>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelCache {
    /// A cache that loads from `config` on first use.
    pub fn from_config(config: ClassifierConfig) -> Self {
        Self::with_loader(move || ModelHandle::load(&config))
    }

    /// A cache backed by an arbitrary loader.
    pub fn with_loader<F>(loader: F) -> Self
    where
        F: Fn() -> DefectResult<ModelHandle> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            cell: OnceCell::new(),
        }
    }

    /// A cache that already holds `handle`.
    pub fn preloaded(handle: ModelHandle) -> Self {
        Self {
            loader: Box::new(|| {
                Err(DefectError::ConfigError {
                    message: "preloaded model cache has no loader".to_string(),
                })
            }),
            cell: OnceCell::with_value(Arc::new(handle)),
        }
    }

    /// Returns the shared model, loading it on the first call.
    pub fn get_or_init(&self) -> DefectResult<SharedModel> {
        self.cell
            .get_or_try_init(|| (self.loader)().map(Arc::new))
            .cloned()
    }

    /// Whether the model has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Tensor4D;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Uniform(usize);

    impl ClassifierBackend for Uniform {
        fn forward(&self, _input: &Tensor4D) -> DefectResult<Vec<f32>> {
            Ok(vec![1.0 / self.0 as f32; self.0])
        }

        fn name(&self) -> &str {
            "uniform"
        }
    }

    fn handle() -> DefectResult<ModelHandle> {
        ModelHandle::new(
            Box::new(Uniform(2)),
            vec!["0 OK".to_string(), "1 Underextrusion".to_string()],
        )
    }

    #[test]
    fn test_load_labels_skips_blank_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0 OK\n\n1 Underextrusion  \n").unwrap();
        let labels = load_labels(file.path()).unwrap();
        assert_eq!(labels, vec!["0 OK", "1 Underextrusion"]);
    }

    #[test]
    fn test_empty_label_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            load_labels(file.path()),
            Err(DefectError::ModelLoad { .. })
        ));
        assert!(load_labels("missing/labels.txt").is_err());
    }

    #[test]
    fn test_cache_initializes_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = Arc::new(ModelCache::with_loader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            handle()
        }));
        assert!(!cache.is_loaded());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_init().unwrap())
            })
            .collect();
        let models: Vec<SharedModel> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(models.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert!(cache.is_loaded());
    }

    #[test]
    fn test_failed_load_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = ModelCache::with_loader(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(DefectError::validation("first load fails"))
            } else {
                handle()
            }
        });
        assert!(cache.get_or_init().is_err());
        assert!(cache.get_or_init().is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_preloaded_cache() {
        let cache = ModelCache::preloaded(handle().unwrap());
        assert!(cache.is_loaded());
        assert_eq!(cache.get_or_init().unwrap().labels().len(), 2);
    }
}
