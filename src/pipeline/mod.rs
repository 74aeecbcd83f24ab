//! Per-image orchestration, upload ingest and the record store boundary.

pub mod ingest;
pub mod orchestrator;
pub mod result;
pub mod store;

pub use ingest::{IngestCoordinator, IngestError, IngestReceipt, IngestRequest, secure_filename};
pub use orchestrator::{ImageSource, InspectOptions, Pipeline};
pub use result::{Inspection, PipelineState};
pub use store::{MemoryRecordStore, NewPrintRecord, PrintRecordStore, StoreError, StoredPrint};
