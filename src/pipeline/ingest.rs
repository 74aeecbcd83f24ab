//! Upload handling: validation, staging, classification and record keeping.
//!
//! An upload is validated before anything touches the disk. Once the staged file
//! exists, every exit path removes it again unless the upload is kept to back a
//! stored record.

use crate::core::errors::DefectError;
use crate::domain::DefectCode;
use crate::pipeline::orchestrator::{ImageSource, InspectOptions, Pipeline};
use crate::pipeline::result::Inspection;
use crate::pipeline::store::{NewPrintRecord, PrintRecordStore, StoreError, StoredPrint};
use crate::utils::has_allowed_extension;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

/// Errors raised while ingesting an upload.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request was rejected before any side effect.
    #[error("invalid upload: {0}")]
    Validation(String),
    /// The staged file could not be written.
    #[error("staging failed")]
    Io(#[from] std::io::Error),
    /// The pipeline rejected the image.
    #[error(transparent)]
    Pipeline(#[from] DefectError),
    /// The record store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One uploaded print photograph.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub filename: String,
    pub data: Vec<u8>,
    pub printer_id: u64,
    pub quality: u32,
    pub options: InspectOptions,
}

/// Outcome of an accepted upload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct IngestReceipt {
    pub inspection: Inspection,
    /// The stored record; `None` when the classification was not accepted.
    pub record: Option<StoredPrint>,
    /// Where the upload was kept, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<PathBuf>,
}

/// Reduces a client-supplied file name to a safe basename.
///
/// Spaces become `_`; everything except alphanumerics and `._-` is dropped.
/// Leading dots are stripped so the result can never be hidden or relative.
pub fn secure_filename(name: &str) -> String {
    let basename = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = basename
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

/// Appends `1` before the extension: `print.png` becomes `print1.png`.
fn bump_name(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}1.{ext}"),
        None => format!("{name}1"),
    }
}

/// Creates a new file in `dir` under `name`, bumping the name until it does not
/// collide with an existing file.
async fn create_unique(dir: &Path, name: &str) -> std::io::Result<(PathBuf, tokio::fs::File)> {
    let mut candidate = name.to_string();
    loop {
        let path = dir.join(&candidate);
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = bump_name(&candidate);
            }
            Err(e) => return Err(e),
        }
    }
}

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "staged file not removed");
    }
}

/// Stages uploads, runs them through the pipeline and records accepted prints.
#[derive(Clone)]
pub struct IngestCoordinator {
    pipeline: Pipeline,
    store: Arc<dyn PrintRecordStore>,
    upload_dir: PathBuf,
    keep_uploads: bool,
}

impl std::fmt::Debug for IngestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestCoordinator")
            .field("upload_dir", &self.upload_dir)
            .field("keep_uploads", &self.keep_uploads)
            .finish_non_exhaustive()
    }
}

impl IngestCoordinator {
    pub fn new(
        pipeline: Pipeline,
        store: Arc<dyn PrintRecordStore>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            pipeline,
            store,
            upload_dir: upload_dir.into(),
            keep_uploads: false,
        }
    }

    /// Keep uploads that back a stored record instead of removing them.
    pub fn keep_uploads(mut self, keep: bool) -> Self {
        self.keep_uploads = keep;
        self
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn validate(request: &IngestRequest) -> Result<String, IngestError> {
        if request.filename.trim().is_empty() {
            return Err(IngestError::Validation("no selected file".to_string()));
        }
        let name = secure_filename(&request.filename);
        if name.is_empty() || !has_allowed_extension(&name) {
            return Err(IngestError::Validation(format!(
                "file type not allowed: {}",
                request.filename
            )));
        }
        if request.printer_id < 1 {
            return Err(IngestError::Validation(
                "printer_id must be at least 1".to_string(),
            ));
        }
        if request.quality < 1 {
            return Err(IngestError::Validation(
                "quality must be at least 1".to_string(),
            ));
        }
        if request.data.is_empty() {
            return Err(IngestError::Validation("empty upload".to_string()));
        }
        Ok(name)
    }

    /// Ingests one upload.
    ///
    /// A record is written only for a successful classification. The staged file
    /// is removed on every path except a stored record with `keep_uploads` set.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReceipt, IngestError> {
        let name = Self::validate(&request)?;

        let (path, mut file) = create_unique(&self.upload_dir, &name).await?;
        tracing::debug!(path = %path.display(), bytes = request.data.len(), "upload staged");

        let outcome = self.process(&path, &mut file, &request).await;
        drop(file);

        let keep = self.keep_uploads && matches!(&outcome, Ok((_, Some(_))));
        if !keep {
            remove_staged(&path).await;
        }

        let (inspection, record) = outcome?;
        Ok(IngestReceipt {
            inspection,
            record,
            stored_path: keep.then_some(path),
        })
    }

    async fn process(
        &self,
        path: &Path,
        file: &mut tokio::fs::File,
        request: &IngestRequest,
    ) -> Result<(Inspection, Option<StoredPrint>), IngestError> {
        file.write_all(&request.data).await?;
        file.flush().await?;

        let inspection = self
            .pipeline
            .inspect(ImageSource::Path(path.to_path_buf()), &request.options)
            .await?;

        let Some(defect) = inspection.defect else {
            tracing::info!(
                printer_id = request.printer_id,
                state = %inspection.state,
                "classification not accepted, nothing recorded"
            );
            return Ok((inspection, None));
        };

        let record = self.record(path, defect, request)?;
        Ok((inspection, Some(record)))
    }

    fn record(
        &self,
        path: &Path,
        defect: DefectCode,
        request: &IngestRequest,
    ) -> Result<StoredPrint, StoreError> {
        self.store.insert(NewPrintRecord {
            printer_id: request.printer_id,
            defect,
            img_path: path.display().to_string(),
            quality: request.quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::adapters::defect_classification_adapter::tests::shared_model_with_labels;
    use crate::pipeline::orchestrator::tests::{pipeline_for, pipeline_with, png_bytes};
    use crate::pipeline::store::MemoryRecordStore;

    fn request(filename: &str) -> IngestRequest {
        IngestRequest {
            filename: filename.to_string(),
            data: png_bytes(48, 48, 0),
            printer_id: 1,
            quality: 4,
            options: InspectOptions::default(),
        }
    }

    fn staged_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_secure_filename() {
        assert_eq!(secure_filename("my print.png"), "my_print.png");
        assert_eq!(secure_filename("../../etc/passwd"), "passwd");
        assert_eq!(secure_filename("..\\x?.jpg"), "x.jpg");
        assert_eq!(secure_filename(".hidden.png"), "hidden.png");
        assert_eq!(bump_name("a.png"), "a1.png");
        assert_eq!(bump_name("a1.png"), "a11.png");
    }

    #[tokio::test]
    async fn test_success_records_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = IngestCoordinator::new(
            pipeline_with(vec![0.92, 0.08]),
            store.clone(),
            dir.path(),
        );

        let receipt = coordinator.ingest(request("print one.png")).await.unwrap();
        let record = receipt.record.unwrap();
        assert_eq!(record.defect, DefectCode(0));
        assert_eq!(record.quality, 4);
        assert!(record.img_path.ends_with("print_one.png"));
        assert_eq!(store.len(), 1);
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = IngestCoordinator::new(
            pipeline_with(vec![0.3, 0.2]),
            store.clone(),
            dir.path(),
        )
        .keep_uploads(true);

        let receipt = coordinator.ingest(request("p.png")).await.unwrap();
        assert!(receipt.record.is_none());
        assert!(receipt.stored_path.is_none());
        assert!(store.is_empty());
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_kept_uploads_get_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("p.png"), b"existing").unwrap();
        let coordinator = IngestCoordinator::new(
            pipeline_with(vec![0.92, 0.08]),
            Arc::new(MemoryRecordStore::new()),
            dir.path(),
        )
        .keep_uploads(true);

        let first = coordinator.ingest(request("p.png")).await.unwrap();
        let second = coordinator.ingest(request("p.png")).await.unwrap();
        assert_eq!(first.stored_path.unwrap(), dir.path().join("p1.png"));
        assert_eq!(second.stored_path.unwrap(), dir.path().join("p11.png"));
        assert_eq!(staged_files(dir.path()), vec!["p.png", "p1.png", "p11.png"]);
        assert_eq!(std::fs::read(dir.path().join("p.png")).unwrap(), b"existing");
    }

    #[tokio::test]
    async fn test_validation_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = IngestCoordinator::new(
            pipeline_with(vec![0.92, 0.08]),
            store.clone(),
            dir.path(),
        );

        for bad in [
            request("notes.txt"),
            request("  "),
            IngestRequest {
                printer_id: 0,
                ..request("p.png")
            },
            IngestRequest {
                quality: 0,
                ..request("p.png")
            },
        ] {
            assert!(matches!(
                coordinator.ingest(bad).await,
                Err(IngestError::Validation(_))
            ));
        }
        assert!(store.is_empty());
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_failures_after_staging_clean_up() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = IngestCoordinator::new(
            pipeline_with(vec![0.92, 0.08]),
            Arc::new(MemoryRecordStore::with_printers([2])),
            dir.path(),
        )
        .keep_uploads(true);

        let err = coordinator.ingest(request("p.png")).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::UnknownPrinter(1))));

        let garbage = IngestRequest {
            data: b"not an image".to_vec(),
            ..request("q.jpg")
        };
        let err = coordinator.ingest(garbage).await.unwrap_err();
        assert!(matches!(err, IngestError::Pipeline(DefectError::ImageLoad(_))));
        assert!(staged_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_unmappable_label_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryRecordStore::new());
        let coordinator = IngestCoordinator::new(
            pipeline_for(shared_model_with_labels(
                vec![0.9, 0.1],
                &["OK", "1 Underextrusion"],
            )),
            store.clone(),
            dir.path(),
        )
        .keep_uploads(true);

        let err = coordinator.ingest(request("p.png")).await.unwrap_err();
        assert!(matches!(err, IngestError::Pipeline(DefectError::Mapping(_))));
        assert!(store.is_empty());
        assert!(staged_files(dir.path()).is_empty());
    }
}
