use custcat_types::PredictionRecord;
use parking_lot::RwLock;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Name of the sled tree holding prediction documents
pub const CUSTOMERS_TREE: &str = "customers";

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Append-only store for served predictions.
///
/// Writes carry no uniqueness constraint and no ordering guarantee across
/// concurrent callers.
pub trait PredictionStore: Send + Sync {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<()>;
    fn prediction_count(&self) -> Result<u64>;
}

/// Sled-backed implementation
pub struct SledStorage {
    db: Db,
    customers: Tree,
}

impl SledStorage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let customers = db.open_tree(CUSTOMERS_TREE)?;
        Ok(Self { db, customers })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Every stored record in insertion order.
    pub fn records(&self) -> Result<Vec<PredictionRecord>> {
        self.customers
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }
}

impl PredictionStore for SledStorage {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<()> {
        // Monotonic ids keep big-endian keys in insertion order.
        let id = self.db.generate_id()?;
        let data = serde_json::to_vec(record)?;
        self.customers.insert(id.to_be_bytes(), data)?;
        Ok(())
    }

    fn prediction_count(&self) -> Result<u64> {
        Ok(self.customers.len() as u64)
    }
}

/// In-memory testing backend
#[derive(Default)]
pub struct MemoryStorage {
    records: RwLock<Vec<PredictionRecord>>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent inserts fail, simulating an unreachable store.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<PredictionRecord> {
        self.records.read().clone()
    }
}

impl PredictionStore for MemoryStorage {
    fn insert_prediction(&self, record: &PredictionRecord) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store configured to reject writes".to_string(),
            ));
        }
        self.records.write().push(record.clone());
        Ok(())
    }

    fn prediction_count(&self) -> Result<u64> {
        Ok(self.records.read().len() as u64)
    }
}
