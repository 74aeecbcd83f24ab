//! Persistence boundary for print records.
//!
//! The pipeline never owns the database; callers pass in a [`PrintRecordStore`].
//! [`MemoryRecordStore`] backs the server binary and the tests.

use crate::domain::DefectCode;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

/// A print record to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPrintRecord {
    pub printer_id: u64,
    pub defect: DefectCode,
    pub img_path: String,
    pub quality: u32,
}

/// A print record as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredPrint {
    pub id: u64,
    pub printer_id: u64,
    pub defect: DefectCode,
    pub img_path: String,
    pub quality: u32,
}

/// Errors raised by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced printer does not exist.
    #[error("printer {0} not found")]
    UnknownPrinter(u64),
    /// The backing store could not complete the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Writes print records.
pub trait PrintRecordStore: Send + Sync {
    /// Inserts a record and returns it with its assigned id.
    fn insert(&self, record: NewPrintRecord) -> Result<StoredPrint, StoreError>;
}

/// In-process record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<StoredPrint>>,
    printers: Option<HashSet<u64>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects records for printers not in `printers`.
    pub fn with_printers(printers: impl IntoIterator<Item = u64>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            printers: Some(printers.into_iter().collect()),
        }
    }

    /// A copy of every stored record.
    pub fn records(&self) -> Vec<StoredPrint> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PrintRecordStore for MemoryRecordStore {
    fn insert(&self, record: NewPrintRecord) -> Result<StoredPrint, StoreError> {
        if let Some(printers) = &self.printers
            && !printers.contains(&record.printer_id)
        {
            return Err(StoreError::UnknownPrinter(record.printer_id));
        }
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Unavailable("record lock poisoned".to_string()))?;
        let stored = StoredPrint {
            id: records.len() as u64 + 1,
            printer_id: record.printer_id,
            defect: record.defect,
            img_path: record.img_path,
            quality: record.quality,
        };
        records.push(stored.clone());
        tracing::info!(id = stored.id, printer_id = stored.printer_id, defect = %stored.defect, "print recorded");
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(printer_id: u64) -> NewPrintRecord {
        NewPrintRecord {
            printer_id,
            defect: DefectCode(1),
            img_path: "uploads/a.png".to_string(),
            quality: 3,
        }
    }

    #[test]
    fn test_ids_increment() {
        let store = MemoryRecordStore::new();
        assert_eq!(store.insert(record(1)).unwrap().id, 1);
        assert_eq!(store.insert(record(1)).unwrap().id, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_printer_rejected() {
        let store = MemoryRecordStore::with_printers([7]);
        assert!(matches!(
            store.insert(record(8)),
            Err(StoreError::UnknownPrinter(8))
        ));
        assert!(store.insert(record(7)).is_ok());
        assert_eq!(store.records()[0].printer_id, 7);
    }
}
