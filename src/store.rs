//! Expense record persistence
//!
//! Key-value model with composite keys in the shape the original expense
//! tables used: partition key `vendor#<name>`, sort key
//! `receipt#<date>#<id>`, with `unknown` standing in for missing segments.

use crate::error::ReceiptError;
use crate::extract::ExpenseRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub pk: String,
    pub sk: String,
}

impl RecordKey {
    pub fn for_record(record: &ExpenseRecord) -> Self {
        let vendor = record
            .vendor_name
            .as_deref()
            .map(|v| v.to_lowercase().replace(char::is_whitespace, "_"))
            .unwrap_or_else(|| "unknown".to_string());
        let date = record
            .transaction_date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            pk: format!("vendor#{}", vendor),
            sk: format!("receipt#{}#{}", date, record.receipt_id),
        }
    }
}

/// Trait all record stores implement.
pub trait ReceiptStore: Send + Sync {
    fn put(&self, record: &ExpenseRecord) -> Result<RecordKey, ReceiptError>;
    fn get(&self, key: &RecordKey) -> Result<Option<ExpenseRecord>, ReceiptError>;
    fn list(&self) -> Result<Vec<ExpenseRecord>, ReceiptError>;
}

type RecordMap = BTreeMap<(String, String), ExpenseRecord>;

/// In-process store. The BTreeMap keeps listings in deterministic key order.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<RecordMap>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReceiptStore for MemoryStore {
    fn put(&self, record: &ExpenseRecord) -> Result<RecordKey, ReceiptError> {
        let key = RecordKey::for_record(record);
        let mut records = self
            .records
            .write()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        records.insert((key.pk.clone(), key.sk.clone()), record.clone());
        Ok(key)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<ExpenseRecord>, ReceiptError> {
        let records = self
            .records
            .read()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        Ok(records.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    fn list(&self) -> Result<Vec<ExpenseRecord>, ReceiptError> {
        let records = self
            .records
            .read()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        Ok(records.values().cloned().collect())
    }
}

/// On-disk JSON serialization unit: one keyed record.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    key: RecordKey,
    record: ExpenseRecord,
}

/// File-backed store: the whole map is rewritten as a JSON document on every
/// put, via a temp file renamed into place so readers never observe a
/// partial write.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<RecordMap>,
}

impl JsonFileStore {
    /// Open (or create) a store at `path`, loading any existing records.
    pub fn open(path: &Path) -> Result<Self, ReceiptError> {
        let records = if path.exists() {
            let data = std::fs::read(path).map_err(|e| {
                ReceiptError::Storage(format!("failed to read {}: {}", path.display(), e))
            })?;
            let stored: Vec<StoredRecord> = serde_json::from_slice(&data).map_err(|e| {
                ReceiptError::Storage(format!("corrupt store file {}: {}", path.display(), e))
            })?;
            stored
                .into_iter()
                .map(|s| ((s.key.pk, s.key.sk), s.record))
                .collect()
        } else {
            RecordMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            records: RwLock::new(records),
        })
    }

    fn flush(&self, records: &RecordMap) -> Result<(), ReceiptError> {
        let stored: Vec<StoredRecord> = records
            .iter()
            .map(|((pk, sk), record)| StoredRecord {
                key: RecordKey {
                    pk: pk.clone(),
                    sk: sk.clone(),
                },
                record: record.clone(),
            })
            .collect();

        let json = serde_json::to_vec_pretty(&stored)
            .map_err(|e| ReceiptError::Storage(format!("failed to serialize store: {}", e)))?;

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| ReceiptError::Storage(format!("failed to create temp file: {}", e)))?;
        tmp.write_all(&json)
            .map_err(|e| ReceiptError::Storage(format!("failed to write store: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            ReceiptError::Storage(format!("failed to replace {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

impl ReceiptStore for JsonFileStore {
    fn put(&self, record: &ExpenseRecord) -> Result<RecordKey, ReceiptError> {
        let key = RecordKey::for_record(record);
        let mut records = self
            .records
            .write()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        records.insert((key.pk.clone(), key.sk.clone()), record.clone());
        self.flush(&records)?;
        Ok(key)
    }

    fn get(&self, key: &RecordKey) -> Result<Option<ExpenseRecord>, ReceiptError> {
        let records = self
            .records
            .read()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        Ok(records.get(&(key.pk.clone(), key.sk.clone())).cloned())
    }

    fn list(&self) -> Result<Vec<ExpenseRecord>, ReceiptError> {
        let records = self
            .records
            .read()
            .map_err(|_| ReceiptError::Storage("store lock poisoned".to_string()))?;
        Ok(records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn sample_record(vendor: Option<&str>) -> ExpenseRecord {
        ExpenseRecord {
            receipt_id: Uuid::new_v4(),
            vendor_name: vendor.map(str::to_string),
            vendor_address: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            total: Some(10.53),
            line_items: vec![],
        }
    }

    #[test]
    fn test_key_scheme() {
        let record = sample_record(Some("Corner Market"));
        let key = RecordKey::for_record(&record);
        assert_eq!(key.pk, "vendor#corner_market");
        assert!(key.sk.starts_with("receipt#2024-03-15#"));
    }

    #[test]
    fn test_key_unknown_fallbacks() {
        let mut record = sample_record(None);
        record.transaction_date = None;
        let key = RecordKey::for_record(&record);
        assert_eq!(key.pk, "vendor#unknown");
        assert!(key.sk.starts_with("receipt#unknown#"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        let record = sample_record(Some("Corner Market"));
        let key = store.put(&record).unwrap();
        assert_eq!(store.get(&key).unwrap(), Some(record));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_json_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipts.json");

        let record = sample_record(Some("Corner Market"));
        let key = {
            let store = JsonFileStore::open(&path).unwrap();
            store.put(&record).unwrap()
        };

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get(&key).unwrap(), Some(record));
    }

    #[test]
    fn test_put_same_key_overwrites() {
        let store = MemoryStore::new();
        let record = sample_record(Some("Corner Market"));
        store.put(&record).unwrap();
        store.put(&record).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
