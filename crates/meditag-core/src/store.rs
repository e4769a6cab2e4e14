//! In-memory medicine list.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{StoreError, StoreResult};
use crate::model::{MedicineDraft, MedicineRecord};

/// Thread-safe list of saved medicines.
///
/// Ids are assigned in insertion order starting at 1 and never reused.
/// Every mutation bumps the version.
pub struct MedicineStore {
    inner: RwLock<Vec<MedicineRecord>>,
    next_id: AtomicU64,
    version: AtomicU64,
}

impl Default for MedicineStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MedicineStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            version: AtomicU64::new(0),
        }
    }

    /// Creates a store seeded with drafts. Invalid drafts are rejected.
    pub fn with_records<I>(drafts: I) -> StoreResult<Self>
    where
        I: IntoIterator<Item = MedicineDraft>,
    {
        let store = Self::new();
        for draft in drafts {
            store.add(draft)?;
        }
        Ok(store)
    }

    fn read<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Vec<MedicineRecord>) -> T,
    {
        let guard = self.inner.read()?;
        Ok(f(&guard))
    }

    fn write<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Vec<MedicineRecord>) -> T,
    {
        let mut guard = self.inner.write()?;
        let result = f(&mut guard);
        self.version.fetch_add(1, Ordering::SeqCst);
        Ok(result)
    }

    /// Validates and appends a draft, returning the stored record.
    pub fn add(&self, draft: MedicineDraft) -> StoreResult<MedicineRecord> {
        draft.validate()?;
        let record = self.write(|records| {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let record = MedicineRecord::from_draft(id, draft);
            records.push(record.clone());
            record
        })?;
        tracing::debug!(
            "[MeditagStore] added #{} {:?} ({} doses)",
            record.id,
            record.draft.name,
            record.total_quantity
        );
        Ok(record)
    }

    /// Snapshot of every record in insertion order.
    pub fn list(&self) -> StoreResult<Vec<MedicineRecord>> {
        self.read(|records| records.clone())
    }

    pub fn get(&self, id: u64) -> StoreResult<MedicineRecord> {
        self.read(|records| records.iter().find(|r| r.id == id).cloned())?
            .ok_or(StoreError::NotFound(id))
    }

    /// Flips the taken flag and returns the updated record.
    pub fn toggle_taken(&self, id: u64) -> StoreResult<MedicineRecord> {
        {
            let records = self.inner.read()?;
            if !records.iter().any(|r| r.id == id) {
                return Err(StoreError::NotFound(id));
            }
        }
        self.write(|records| {
            records.iter_mut().find(|r| r.id == id).map(|record| {
                record.taken = !record.taken;
                record.clone()
            })
        })?
        .ok_or(StoreError::NotFound(id))
    }

    pub fn len(&self) -> usize {
        self.read(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DraftError;
    use crate::model::Shape;

    #[test]
    fn test_add_assigns_sequential_ids() {
        let store = MedicineStore::new();
        let a = store.add(MedicineDraft::new("Lexapro", "10 mg")).unwrap();
        let b = store.add(MedicineDraft::new("Aspirin", "100 mg")).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.len(), 2);
        assert_eq!(store.version(), 2);

        let names: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.draft.name)
            .collect();
        assert_eq!(names, ["Lexapro", "Aspirin"]);
    }

    #[test]
    fn test_add_rejects_invalid() {
        let store = MedicineStore::new();
        let err = store.add(MedicineDraft::new("", "10 mg")).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(DraftError::MissingName)));
        assert!(store.is_empty());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_toggle_taken() {
        let mut draft = MedicineDraft::new("Gabapentin", "300 mg");
        draft.shape = Shape::Capsule;
        let store = MedicineStore::with_records([draft]).unwrap();

        assert!(store.toggle_taken(1).unwrap().taken);
        assert!(!store.toggle_taken(1).unwrap().taken);
        assert!(matches!(store.toggle_taken(9), Err(StoreError::NotFound(9))));
        assert!(!store.get(1).unwrap().taken);
    }
}
