use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    error::{Error, Result},
    vector_index::FlatIndex,
};

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Durable form of a [`FlatIndex`]: one redb entry per row, keyed by row
/// index.
///
/// Binary format per entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
///
/// Row keys must be contiguous from zero and every row must carry the same
/// dimension; anything else is a corruption error on load.
pub struct VectorDb {
    db: Database,
}

impl VectorDb {
    /// Open or create a vector database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Persist every row of the index in a single transaction.
    pub fn store_index(&self, index: &FlatIndex) -> Result<()> {
        let dimension = index.dimension() as u32;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VECTORS)?;
            for row_idx in 0..index.row_count() {
                let row = index.row(row_idx);
                let byte_len = HEADER_SIZE + std::mem::size_of_val(row);

                let mut guard = table.insert_reserve(row_idx as u64, byte_len)?;
                let dest = guard.as_mut();
                dest[0..4].copy_from_slice(&dimension.to_le_bytes());
                dest[HEADER_SIZE..].copy_from_slice(bytemuck::cast_slice(row));
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Reassemble the index from persisted rows.
    pub fn load_index(&self) -> Result<FlatIndex> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;

        let mut dimension: Option<u32> = None;
        let mut data: Vec<f32> = Vec::new();
        let mut expected_key = 0u64;

        for entry in table.iter()? {
            let (key, value) = entry?;
            if key.value() != expected_key {
                return Err(Error::Corruption(format!(
                    "vector rows are not contiguous: expected row {expected_key}, found {}",
                    key.value()
                )));
            }
            expected_key += 1;

            let bytes = value.value();
            if bytes.len() < HEADER_SIZE {
                return Err(Error::Corruption(format!(
                    "vector row {} is truncated",
                    key.value()
                )));
            }

            let row_dim = u32::from_le_bytes(
                bytes[0..4]
                    .try_into()
                    .map_err(|_| Error::Corruption("unreadable row header".into()))?,
            );
            match dimension {
                None => dimension = Some(row_dim),
                Some(d) if d != row_dim => {
                    return Err(Error::Corruption(format!(
                        "vector row {} has dimension {row_dim}, expected {d}",
                        key.value()
                    )));
                }
                Some(_) => {}
            }

            let expected_len = HEADER_SIZE + row_dim as usize * 4;
            if bytes.len() != expected_len {
                return Err(Error::Corruption(format!(
                    "vector row {} has {} bytes, expected {expected_len}",
                    key.value(),
                    bytes.len()
                )));
            }

            // pod_collect_to_vec copies, so value alignment does not matter.
            data.extend(bytemuck::pod_collect_to_vec::<u8, f32>(&bytes[HEADER_SIZE..]));
        }

        FlatIndex::from_rows(dimension.unwrap_or(0) as usize, data)
    }
}

impl std::fmt::Debug for VectorDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> FlatIndex {
        let mut index = FlatIndex::new(4);
        index
            .add(&[
                vec![0.0, 0.1, 0.2, 0.3],
                vec![1.0, 1.1, 1.2, 1.3],
                vec![2.0, 2.1, 2.2, 2.3],
            ])
            .unwrap();
        index
    }

    #[test]
    fn store_and_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let db = VectorDb::open(&tmp.path().join("vectors.redb")).unwrap();

        let index = sample_index();
        db.store_index(&index).unwrap();

        let loaded = db.load_index().unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn empty_index_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let db = VectorDb::open(&tmp.path().join("vectors.redb")).unwrap();

        db.store_index(&FlatIndex::new(0)).unwrap();
        let loaded = db.load_index().unwrap();
        assert_eq!(loaded.row_count(), 0);
        assert!(loaded.is_empty());
    }

    #[test]
    fn reopen_preserves_rows() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.redb");

        {
            let db = VectorDb::open(&path).unwrap();
            db.store_index(&sample_index()).unwrap();
        }

        let db = VectorDb::open(&path).unwrap();
        let loaded = db.load_index().unwrap();
        assert_eq!(loaded.row_count(), 3);
        assert_eq!(loaded.row(2), &[2.0, 2.1, 2.2, 2.3]);
    }

    #[test]
    fn open_in_a_missing_directory_is_a_database_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("no-such-dir").join("vectors.redb");

        let err = VectorDb::open(&path).unwrap_err();
        assert!(matches!(err, Error::RedbDatabase(_)));
    }

    #[test]
    fn search_results_survive_the_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let db = VectorDb::open(&tmp.path().join("vectors.redb")).unwrap();

        let index = sample_index();
        db.store_index(&index).unwrap();
        let loaded = db.load_index().unwrap();

        let query = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(
            index.search(&query, 3).unwrap(),
            loaded.search(&query, 3).unwrap()
        );
    }
}
