//! Sequencing of the pipeline stages for single images and batches.
//!
//! File I/O runs on the tokio runtime; decoding, segmentation, enhancement and the
//! forward pass run on the blocking pool. Every image is an independent run: a
//! failure in one never affects another.

use crate::core::config::{ConfigValidator, ParallelPolicy, PipelineConfig};
use crate::core::errors::{DefectError, DefectResult, ProcessingStage, SimpleError};
use crate::core::traits::ModelAdapter;
use crate::domain::{
    ClassificationResult, DefectClassificationAdapter, DefectClassificationConfig,
    DefectClassificationInput, DefectCode,
};
use crate::pipeline::result::{Inspection, PipelineState, StateTracker};
use crate::processors::{Enhancer, MaskSource, Segmenter};
use crate::utils::{decode_image, has_allowed_extension};
use image::{DynamicImage, GrayImage, RgbImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::Instrument;

/// One image to inspect.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// An image file on disk.
    Path(PathBuf),
    /// Encoded image bytes with their original file name.
    Bytes { name: String, data: Arc<[u8]> },
}

impl ImageSource {
    pub fn bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Display name used in logs and batch results.
    pub fn name(&self) -> String {
        match self {
            ImageSource::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            ImageSource::Bytes { name, .. } => name.clone(),
        }
    }

    async fn read(&self) -> DefectResult<Arc<[u8]>> {
        match self {
            ImageSource::Path(path) => Ok(tokio::fs::read(path).await?.into()),
            ImageSource::Bytes { data, .. } => Ok(Arc::clone(data)),
        }
    }
}

/// Per-request overrides of the pipeline defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InspectOptions {
    pub confidence_threshold: Option<f32>,
    pub remove_background: Option<bool>,
}

#[derive(Debug)]
struct PipelineInner {
    config: PipelineConfig,
    segmenter: Segmenter,
    enhancer: Enhancer,
    adapter: DefectClassificationAdapter,
}

/// The defect classification pipeline. Cheap to clone; clones share the model.
#[derive(Debug, Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

async fn blocking<T, F>(stage: ProcessingStage, f: F) -> DefectResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DefectError::processing(stage, "blocking task did not complete", e))
}

impl Pipeline {
    /// Builds a pipeline around an adapter.
    pub fn new(
        config: PipelineConfig,
        adapter: DefectClassificationAdapter,
        policy: ParallelPolicy,
    ) -> DefectResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PipelineInner {
                segmenter: Segmenter::new(config.segmentation.clone(), policy),
                enhancer: Enhancer::new(config.enhancement.clone()),
                adapter,
                config,
            }),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Runs one image through the pipeline.
    ///
    /// Low-confidence and failed classifications are `Ok` with state `Failed`.
    /// Unreadable input, a label without a defect code and internal task
    /// failures are `Err`.
    pub async fn inspect(
        &self,
        source: ImageSource,
        options: &InspectOptions,
    ) -> DefectResult<Inspection> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("inspect", %request_id, file = %source.name());
        self.run(source, options.clone()).instrument(span).await
    }

    async fn run(&self, source: ImageSource, options: InspectOptions) -> DefectResult<Inspection> {
        let start = Instant::now();
        let inner = &self.inner;
        let threshold = options
            .confidence_threshold
            .unwrap_or(inner.config.confidence_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(DefectError::validation(format!(
                "confidence threshold must be between 0 and 1, got {threshold}"
            )));
        }
        let remove_background = options
            .remove_background
            .unwrap_or(inner.config.remove_background);

        let mut tracker = StateTracker::new();
        let bytes = source.read().await?;
        let decoded = blocking(ProcessingStage::Ingest, move || decode_image(&bytes)).await??;

        // Enhancement consumes the segmented image when background removal is on.
        let (enhanced, segmentation) = if remove_background {
            tracker.advance(PipelineState::Segmenting);
            let (segmented, mask) = self.segment(decoded).await?;
            tracker.advance(PipelineState::Enhancing);
            let enhanced = self.enhance(DynamicImage::ImageRgb8(segmented)).await?;
            (enhanced, Some(mask))
        } else {
            tracker.advance(PipelineState::Enhancing);
            (self.enhance(DynamicImage::ImageRgb8(decoded)).await?, None)
        };

        tracker.advance(PipelineState::Inferring);
        let task_config = DefectClassificationConfig {
            score_threshold: threshold,
        };
        let pipeline = self.clone();
        let result = blocking(ProcessingStage::Inference, move || {
            pipeline.inner.adapter.execute(
                DefectClassificationInput::new(DynamicImage::ImageLuma8(enhanced)),
                Some(&task_config),
            )
        })
        .await?;

        let defect = match &result {
            ClassificationResult::Success { class_name, .. } => {
                let code = DefectCode::from_label(class_name)?;
                tracker.advance(PipelineState::Mapped);
                tracker.advance(PipelineState::Done);
                Some(code)
            }
            ClassificationResult::LowConfidence { .. } | ClassificationResult::Error { .. } => {
                tracker.advance(PipelineState::Failed);
                None
            }
        };

        tracing::info!(
            state = %tracker.state(),
            confidence = result.confidence(),
            defect = defect.map(DefectCode::value),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "inspection finished"
        );

        Ok(Inspection {
            result,
            defect,
            state: tracker.state(),
            segmentation,
        })
    }

    async fn segment(&self, img: RgbImage) -> DefectResult<(RgbImage, MaskSource)> {
        let pipeline = self.clone();
        blocking(ProcessingStage::Segmentation, move || {
            let outcome = pipeline.inner.segmenter.segment(&img);
            (outcome.image, outcome.source)
        })
        .await
    }

    async fn enhance(&self, img: DynamicImage) -> DefectResult<GrayImage> {
        let pipeline = self.clone();
        blocking(ProcessingStage::Enhancement, move || {
            pipeline.inner.enhancer.enhance(&img)
        })
        .await
    }

    /// Runs every source concurrently, one task each. Results are in input order.
    pub async fn inspect_batch(
        &self,
        sources: Vec<ImageSource>,
        options: &InspectOptions,
    ) -> Vec<DefectResult<Inspection>> {
        let total = sources.len();
        let mut set = JoinSet::new();
        for (idx, source) in sources.into_iter().enumerate() {
            let pipeline = self.clone();
            let options = options.clone();
            set.spawn(async move { (idx, pipeline.inspect(source, &options).await) });
        }

        let mut slots: Vec<Option<DefectResult<Inspection>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => tracing::error!(error = %e, "batch task did not complete"),
            }
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(DefectError::processing(
                        ProcessingStage::PipelineExecution,
                        "batch task did not complete",
                        SimpleError::new("task aborted"),
                    ))
                })
            })
            .collect()
    }

    /// Inspects every `.png`, `.jpg` and `.jpeg` file directly inside `dir`,
    /// keyed by file name.
    pub async fn inspect_dir(
        &self,
        dir: &Path,
        options: &InspectOptions,
    ) -> DefectResult<BTreeMap<String, DefectResult<Inspection>>> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && has_allowed_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        tracing::info!(dir = %dir.display(), images = paths.len(), "directory batch");

        let names: Vec<String> = paths
            .iter()
            .map(|p| ImageSource::Path(p.clone()).name())
            .collect();
        let sources = paths.into_iter().map(ImageSource::Path).collect();
        let results = self.inspect_batch(sources, options).await;
        Ok(names.into_iter().zip(results).collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::Tensor4D;
    use crate::core::config::SegmentationConfig;
    use crate::core::inference::ClassifierBackend;
    use crate::core::model::{ModelHandle, SharedModel};
    use crate::core::traits::AdapterBuilder;
    use crate::domain::DefectClassificationAdapterBuilder;
    use crate::domain::adapters::defect_classification_adapter::tests::{
        shared_model, shared_model_with_labels,
    };
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;
    use std::sync::Mutex;

    pub(crate) fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let dx = x as i32 - width as i32 / 2;
            let dy = y as i32 - height as i32 / 2;
            if dx * dx + dy * dy < (width.min(height) as i32 / 4).pow(2) {
                Rgb([200, 120 + seed, 40])
            } else {
                let t = ((x * 5 + y * 3) % 11) as u8;
                Rgb([30 + t, 70 + t, 140 + t])
            }
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    pub(crate) fn pipeline_for(model: SharedModel) -> Pipeline {
        let adapter = DefectClassificationAdapterBuilder::new()
            .build(model)
            .unwrap();
        let config = PipelineConfig {
            segmentation: SegmentationConfig {
                resize_to: 48,
                ..Default::default()
            },
            ..Default::default()
        };
        Pipeline::new(config, adapter, ParallelPolicy::default()).unwrap()
    }

    pub(crate) fn pipeline_with(scores: Vec<f32>) -> Pipeline {
        pipeline_for(shared_model(scores))
    }

    /// Keeps the last input tensor it was given.
    #[derive(Debug, Default)]
    struct RecordingBackend {
        last: Arc<Mutex<Option<Tensor4D>>>,
    }

    impl ClassifierBackend for RecordingBackend {
        fn forward(&self, input: &Tensor4D) -> DefectResult<Vec<f32>> {
            *self.last.lock().unwrap() = Some(input.clone());
            Ok(vec![0.9, 0.1])
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_success_maps_defect_code() {
        let pipeline = pipeline_with(vec![0.92, 0.08]);
        let inspection = pipeline
            .inspect(
                ImageSource::bytes("print.png", png_bytes(80, 60, 0)),
                &InspectOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(inspection.state, PipelineState::Done);
        assert_eq!(inspection.defect, Some(DefectCode(0)));
        assert_eq!(inspection.result.class_name(), Some("0 OK"));
        assert_eq!(inspection.result.confidence(), Some(0.92));
        assert!(inspection.segmentation.is_some());
    }

    #[tokio::test]
    async fn test_low_confidence_has_no_code() {
        let pipeline = pipeline_with(vec![0.3, 0.2]);
        let inspection = pipeline
            .inspect(
                ImageSource::bytes("print.png", png_bytes(64, 64, 0)),
                &InspectOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(inspection.state, PipelineState::Failed);
        assert_eq!(inspection.defect, None);
        assert_eq!(inspection.result, ClassificationResult::low_confidence(0.3));
    }

    #[tokio::test]
    async fn test_request_threshold_override() {
        let pipeline = pipeline_with(vec![0.92, 0.08]);
        let options = InspectOptions {
            confidence_threshold: Some(0.95),
            remove_background: Some(false),
        };
        let inspection = pipeline
            .inspect(ImageSource::bytes("a.png", png_bytes(32, 32, 0)), &options)
            .await
            .unwrap();
        assert_eq!(inspection.state, PipelineState::Failed);
        assert!(inspection.segmentation.is_none());

        let bad = InspectOptions {
            confidence_threshold: Some(1.5),
            ..Default::default()
        };
        assert!(matches!(
            pipeline
                .inspect(ImageSource::bytes("a.png", png_bytes(32, 32, 0)), &bad)
                .await,
            Err(DefectError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreadable_input_is_an_error() {
        let pipeline = pipeline_with(vec![0.92, 0.08]);
        let err = pipeline
            .inspect(
                ImageSource::bytes("broken.png", b"not a png".to_vec()),
                &InspectOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DefectError::ImageLoad(_)));

        let err = pipeline
            .inspect(
                ImageSource::Path(PathBuf::from("missing/print.png")),
                &InspectOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DefectError::Io(_)));
    }

    #[tokio::test]
    async fn test_classifier_sees_segmented_image() {
        let last = Arc::new(Mutex::new(None));
        let handle = ModelHandle::new(
            Box::new(RecordingBackend {
                last: Arc::clone(&last),
            }),
            vec!["0 OK".to_string(), "1 Underextrusion".to_string()],
        )
        .unwrap();
        let pipeline = pipeline_for(Arc::new(handle));
        let corner = async |options: InspectOptions| {
            pipeline
                .inspect(ImageSource::bytes("p.png", png_bytes(80, 60, 0)), &options)
                .await
                .unwrap();
            let guard = last.lock().unwrap();
            guard.as_ref().unwrap()[[0, 0, 0, 0]]
        };

        // Background pixels reach the classifier as the sentinel's gray level.
        let sentinel = DynamicImage::ImageRgb8(RgbImage::from_pixel(1, 1, Rgb([0, 0, 255])));
        let expected = sentinel.to_luma8()[(0, 0)][0] as f32 / 127.5 - 1.0;

        let segmented = corner(InspectOptions::default()).await;
        assert!((segmented - expected).abs() < 0.05, "{segmented} vs {expected}");

        let raw = corner(InspectOptions {
            remove_background: Some(false),
            ..Default::default()
        })
        .await;
        assert!((raw - expected).abs() > 0.2, "{raw} vs {expected}");
    }

    #[tokio::test]
    async fn test_label_without_code_is_a_mapping_error() {
        let pipeline = pipeline_for(shared_model_with_labels(
            vec![0.9, 0.1],
            &["OK", "1 Underextrusion"],
        ));
        let err = pipeline
            .inspect(
                ImageSource::bytes("p.png", png_bytes(48, 48, 0)),
                &InspectOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DefectError::Mapping(_)));
        assert_eq!(err.stage(), ProcessingStage::Mapping);
    }

    #[tokio::test]
    async fn test_batch_matches_sequential_runs() {
        let pipeline = pipeline_with(vec![0.92, 0.08]);
        let sources: Vec<ImageSource> = (0..4)
            .map(|i| ImageSource::bytes(format!("p{i}.png"), png_bytes(40 + i * 8, 40, i as u8)))
            .chain([ImageSource::bytes("bad.png", b"junk".to_vec())])
            .collect();

        let batch = pipeline
            .inspect_batch(sources.clone(), &InspectOptions::default())
            .await;
        assert_eq!(batch.len(), sources.len());

        for (source, batched) in sources.into_iter().zip(batch) {
            let sequential = pipeline.inspect(source, &InspectOptions::default()).await;
            match (batched, sequential) {
                (Ok(a), Ok(b)) => assert_eq!(a, b),
                (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
                (a, b) => panic!("batch {a:?} differs from sequential {b:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_directory_filters_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(32, 32, 0)).unwrap();
        std::fs::write(dir.path().join("b.JPG"), png_bytes(32, 32, 1)).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let pipeline = pipeline_with(vec![0.92, 0.08]);
        let results = pipeline
            .inspect_dir(dir.path(), &InspectOptions::default())
            .await
            .unwrap();

        assert_eq!(
            results.keys().cloned().collect::<Vec<_>>(),
            vec!["a.png".to_string(), "b.JPG".to_string()]
        );
        // The decoder sniffs content, so PNG bytes behind a .JPG name still load.
        assert!(results.values().all(|r| r.is_ok()));
    }
}
