use super::DatabaseKey;
use crate::{CacheError, ElevationCache, ModelQuery};

use core::ops::RangeInclusive;
use globe_terrain_core::Morton2;
use sled::{Batch, Tree};
use std::path::Path;

const ELEVATION_TREE: &str = "elevations";
const META_TREE: &str = "meta";
const MODEL_KEY: &[u8] = b"model";

/// A persistent, crash-consistent `ElevationCache`.
///
/// This is a B+ tree of `(elevation, uncertainty)` pairs (backed by the `sled` crate). The keys are the Morton wire keys of the
/// positions, so nearby positions are stored close together and the cache worker's Morton-sorted rounds touch few pages.
/// Values are two big-endian `i32`s. The server model is stored separately with `bincode`.
///
/// Writes are buffered in a `Batch` and applied atomically on `commit`.
pub struct ElevationDb {
    elevations: Tree,
    meta: Tree,
    batch: Batch,
    num_pending: usize,
}

impl ElevationDb {
    pub fn new(db: &sled::Db) -> sled::Result<Self> {
        Ok(Self {
            elevations: db.open_tree(ELEVATION_TREE)?,
            meta: db.open_tree(META_TREE)?,
            batch: Batch::default(),
            num_pending: 0,
        })
    }

    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let db = sled::Config::default()
            .path(path)
            .use_compression(false)
            .mode(sled::Mode::LowSpace)
            .open()?;

        Ok(Self::new(&db)?)
    }

    pub fn elevation_tree(&self) -> &Tree {
        &self.elevations
    }

    /// Committed records.
    pub fn len(&self) -> usize {
        self.elevations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elevations.is_empty()
    }

    /// Writes waiting for the next `commit`.
    pub fn num_pending(&self) -> usize {
        self.num_pending
    }

    /// Passes every committed record with a code in `range` to `rx`, in Morton order.
    pub fn read_range(
        &self,
        range: RangeInclusive<Morton2>,
        mut rx: impl FnMut(Morton2, i32, i32),
    ) -> Result<(), CacheError> {
        for kv in self.elevations.range(Morton2::key_range(range)) {
            let (key, value) = kv?;
            let code = Morton2::from_key_bytes(&key).ok_or_else(|| CacheError::Corrupt(key.to_vec()))?;
            let (h, dh) = decode_value(&key, &value)?;
            rx(code, h, dh);
        }

        Ok(())
    }
}

fn encode_value(h: i32, dh: i32) -> [u8; 8] {
    let mut value = [0; 8];
    value[..4].copy_from_slice(&h.to_be_bytes());
    value[4..].copy_from_slice(&dh.to_be_bytes());

    value
}

fn decode_value(key: &[u8], value: &[u8]) -> Result<(i32, i32), CacheError> {
    if value.len() != 8 {
        return Err(CacheError::Corrupt(key.to_vec()));
    }
    let mut h = [0; 4];
    let mut dh = [0; 4];
    h.copy_from_slice(&value[..4]);
    dh.copy_from_slice(&value[4..]);

    Ok((i32::from_be_bytes(h), i32::from_be_bytes(dh)))
}

impl ElevationCache for ElevationDb {
    fn get(&self, key: Morton2) -> Result<Option<(i32, i32)>, CacheError> {
        let key_bytes = key.to_key_bytes();
        match self.elevations.get(key_bytes.as_ref())? {
            Some(value) => Ok(Some(decode_value(key_bytes.as_ref(), &value)?)),
            None => Ok(None),
        }
    }

    fn set(&mut self, key: Morton2, h: i32, dh: i32) -> Result<(), CacheError> {
        self.batch
            .insert(key.to_key_bytes().as_ref(), &encode_value(h, dh)[..]);
        self.num_pending += 1;

        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        if self.num_pending == 0 {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        self.num_pending = 0;
        self.elevations.apply_batch(batch)?;
        futures::executor::block_on(self.elevations.flush_async())?;

        Ok(())
    }

    fn model_query(&self) -> Result<Option<ModelQuery>, CacheError> {
        match self.meta.get(MODEL_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn set_model_query(&mut self, model: &ModelQuery) -> Result<(), CacheError> {
        self.meta.insert(MODEL_KEY, bincode::serialize(model)?)?;
        futures::executor::block_on(self.meta.flush_async())?;

        Ok(())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;
    use crate::ModelType;

    use pretty_assertions::assert_eq;

    fn temporary_db() -> sled::Result<ElevationDb> {
        let db = sled::Config::default().temporary(true).open()?;

        ElevationDb::new(&db)
    }

    #[test]
    fn writes_are_visible_after_commit() -> Result<(), CacheError> {
        let mut db = temporary_db()?;
        let key = Morton2::from_lon_lat(-5, 17);

        db.set(key, 1234, -2)?;
        assert_eq!(db.num_pending(), 1);
        assert_eq!(db.get(key)?, None);

        db.commit()?;
        assert_eq!(db.get(key)?, Some((1234, -2)));
        assert_eq!(db.len(), 1);

        Ok(())
    }

    #[test]
    fn range_reads_follow_morton_order() -> Result<(), CacheError> {
        let mut db = temporary_db()?;
        let points = [(3, 3), (-1, -1), (0, 0), (1 << 20, -(1 << 20)), (2, 1)];
        for (i, (lon, lat)) in points.iter().enumerate() {
            db.set(Morton2::from_lon_lat(*lon, *lat), i as i32, 0)?;
        }
        db.commit()?;

        let mut read = Vec::new();
        db.read_range(Morton2(0)..=Morton2(u64::MAX), |code, h, _| read.push((code, h)))?;

        let mut expected: Vec<_> = points
            .iter()
            .enumerate()
            .map(|(i, (lon, lat))| (Morton2::from_lon_lat(*lon, *lat), i as i32))
            .collect();
        expected.sort();
        assert_eq!(read, expected);

        Ok(())
    }

    #[test]
    fn model_query_persists() -> Result<(), CacheError> {
        let mut db = temporary_db()?;
        assert_eq!(db.model_query()?, None);

        let model = ModelQuery {
            model_type: ModelType::Model4x2,
            a: 6_378_137.0,
            f: 0.003_352_810_664_747_480_5,
            h_scale: 0.1,
            version: 2,
        };
        db.set_model_query(&model)?;
        assert_eq!(db.model_query()?, Some(model));

        Ok(())
    }
}
