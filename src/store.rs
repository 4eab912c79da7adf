//! Named snapshot persistence.
//!
//! Snapshots are the save/load unit: every significant cell's raw input,
//! rendered result and color, plus a display name and last-updated
//! timestamp, keyed by an opaque id. The whole map is persisted as one
//! gzip-compressed bincode file.

use bincode::{deserialize_from, serialize_into};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::cell::{Cell, CellColor, CellId};
use crate::engine::Sheet;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("snapshot '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("snapshot file is corrupt: {0}")]
    Codec(#[from] bincode::Error),
}

/// One saved cell; `value` is the raw input, `result` the rendered value at
/// save time.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct SavedCell {
    pub value: String,
    pub result: String,
    pub color: CellColor,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct Snapshot {
    pub name: String,
    pub updated: DateTime<Utc>,
    pub cells: BTreeMap<String, SavedCell>,
}

/// Listing entry, newest first.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct SnapshotMeta {
    pub id: String,
    pub name: String,
    pub updated: DateTime<Utc>,
}

pub struct SnapshotStore {
    path: PathBuf,
    snapshots: BTreeMap<String, Snapshot>,
}

impl SnapshotStore {
    /// Open the store at `path`, reading it if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshots = if path.exists() {
            let file = File::open(&path)?;
            let reader = std::io::BufReader::new(GzDecoder::new(file));
            deserialize_from(reader)?
        } else {
            BTreeMap::new()
        };
        Ok(SnapshotStore { path, snapshots })
    }

    fn persist(&self) -> Result<(), StoreError> {
        let file = File::create(&self.path)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);
        serialize_into(&mut writer, &self.snapshots)?;
        // Flush and finish explicitly; a drop would swallow write errors.
        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?;
        Ok(())
    }

    /// Capture the sheet under `name`. Passing an existing id overwrites
    /// that snapshot; `None` allocates a fresh id. Returns the id.
    pub fn save(
        &mut self,
        id: Option<&str>,
        name: &str,
        sheet: &Sheet,
    ) -> Result<String, StoreError> {
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };

        let mut cells = BTreeMap::new();
        for (cell_id, cell) in sheet.iter() {
            if cell.is_significant() {
                cells.insert(
                    cell_id.name(),
                    SavedCell {
                        value: cell.raw.clone(),
                        result: cell.value.to_string(),
                        color: cell.color,
                    },
                );
            }
        }

        self.snapshots.insert(
            id.clone(),
            Snapshot {
                name: name.to_string(),
                updated: Utc::now(),
                cells,
            },
        );
        self.persist()?;
        info!("saved snapshot '{}' as {}", name, id);
        Ok(id)
    }

    /// Restore a snapshot into `sheet`: saved cells get their raw input and
    /// color back, every other cell resets to empty, then one full
    /// recalculation re-derives the values.
    pub fn load(&self, id: &str, sheet: &mut Sheet) -> Result<(), StoreError> {
        let snapshot = self
            .snapshots
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        for cell_id in CellId::all() {
            let cell = sheet.cell_mut(cell_id);
            match snapshot.cells.get(&cell_id.name()) {
                Some(saved) => {
                    cell.raw = saved.value.clone();
                    cell.color = saved.color;
                }
                None => *cell = Cell::empty(),
            }
        }
        sheet.recalculate_all();
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Snapshot, StoreError> {
        self.snapshots
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// All snapshots, most recently updated first.
    pub fn list(&self) -> Vec<SnapshotMeta> {
        let mut metas: Vec<SnapshotMeta> = self
            .snapshots
            .iter()
            .map(|(id, s)| SnapshotMeta {
                id: id.clone(),
                name: s.name.clone(),
                updated: s.updated,
            })
            .collect();
        metas.sort_by(|a, b| b.updated.cmp(&a.updated));
        metas
    }

    pub fn delete(&mut self, id: &str) -> Result<(), StoreError> {
        if self.snapshots.remove(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist()?;
        info!("deleted snapshot {}", id);
        Ok(())
    }
}
