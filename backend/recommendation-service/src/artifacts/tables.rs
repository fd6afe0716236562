use crate::error::{AppError, Result};
use crate::models::{ItemId, NO_HISTORY};
use memmap2::{Mmap, MmapOptions};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Most recent click per user, `NO_HISTORY` for users without one.
#[derive(Debug, Clone)]
pub struct LastClickTable {
    clicks: Vec<i64>,
}

impl LastClickTable {
    pub fn new(clicks: Vec<i64>) -> Self {
        Self { clicks }
    }

    pub fn len(&self) -> usize {
        self.clicks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clicks.is_empty()
    }

    /// Raw table value; `None` when `user_id` is outside the table.
    pub fn get(&self, user_id: i64) -> Option<i64> {
        let index = usize::try_from(user_id).ok()?;
        self.clicks.get(index).copied()
    }

    pub fn has_history(&self, user_id: i64) -> bool {
        matches!(self.get(user_id), Some(click) if click != NO_HISTORY)
    }
}

/// Magic prefix of the memory-mapped candidate table layout.
const MAPPED_MAGIC: &[u8; 8] = b"RECTBL01";

/// Magic, row count (u64 LE), row width (u64 LE). Keeps the values 8-byte aligned.
const MAPPED_HEADER_LEN: usize = 24;

/// Fixed-width matrix of precomputed candidate lists, most relevant first.
///
/// Rows are keyed by user id (ALS, Two-Tower) or by seed item id (item CF).
/// Small tables live on the heap; `.tbl` files are memory-mapped so the
/// page cache holds the only copy.
#[derive(Debug)]
pub struct CandidateTable {
    storage: Storage,
}

#[derive(Debug)]
enum Storage {
    Dense(Array2<i64>),
    Mapped {
        map: Mmap,
        rows: usize,
        width: usize,
    },
}

impl CandidateTable {
    pub fn new(rows: Array2<i64>) -> Self {
        Self {
            storage: Storage::Dense(rows),
        }
    }

    /// Builds a table from nested rows; every row must have the same width.
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = rows.iter().position(|row| row.len() != width) {
            return Err(AppError::Artifact(format!(
                "Candidate table row {} has width {}, expected {}",
                bad,
                rows[bad].len(),
                width
            )));
        }

        let height = rows.len();
        let flat: Vec<i64> = rows.into_iter().flatten().collect();
        let rows = Array2::from_shape_vec((height, width), flat)
            .map_err(|e| AppError::Artifact(format!("Invalid candidate table shape: {}", e)))?;

        Ok(Self::new(rows))
    }

    /// Maps a table written by [`CandidateTable::write_mapped`].
    pub fn open_mapped(path: &Path) -> Result<Self> {
        if cfg!(target_endian = "big") {
            return Err(AppError::Artifact(
                "Mapped candidate tables require a little-endian host".to_string(),
            ));
        }

        let file = File::open(path)?;
        // Artifacts are written once offline and never modified while served.
        let map = unsafe { MmapOptions::new().map(&file)? };

        if map.len() < MAPPED_HEADER_LEN || &map[..8] != MAPPED_MAGIC {
            return Err(AppError::Artifact(format!(
                "{} is not a mapped candidate table",
                path.display()
            )));
        }

        let rows = read_header_field(&map[8..16])?;
        let width = read_header_field(&map[16..24])?;
        let expected = rows
            .checked_mul(width)
            .and_then(|n| n.checked_mul(std::mem::size_of::<i64>()))
            .and_then(|n| n.checked_add(MAPPED_HEADER_LEN))
            .ok_or_else(|| AppError::Artifact("Mapped table shape overflows".to_string()))?;
        if map.len() != expected {
            return Err(AppError::Artifact(format!(
                "{} has {} bytes, expected {} for {}x{}",
                path.display(),
                map.len(),
                expected,
                rows,
                width
            )));
        }

        let data = map[MAPPED_HEADER_LEN..].as_ptr();
        if data.align_offset(std::mem::align_of::<i64>()) != 0 {
            return Err(AppError::Artifact(
                "Mapped table values are not 8-byte aligned".to_string(),
            ));
        }

        Ok(Self {
            storage: Storage::Mapped { map, rows, width },
        })
    }

    /// Writes the table in the memory-mapped layout.
    pub fn write_mapped(&self, path: &Path) -> Result<()> {
        let (rows, width) = self.shape();
        let mut writer = BufWriter::new(File::create(path)?);

        writer.write_all(MAPPED_MAGIC)?;
        writer.write_all(&(rows as u64).to_le_bytes())?;
        writer.write_all(&(width as u64).to_le_bytes())?;
        for index in 0..rows {
            if let Some(row) = self.row(index as i64) {
                for value in row.iter() {
                    writer.write_all(&value.to_le_bytes())?;
                }
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mapped { .. })
    }

    pub fn row(&self, key: i64) -> Option<ArrayView1<'_, i64>> {
        let index = usize::try_from(key).ok()?;
        match &self.storage {
            Storage::Dense(rows) => (index < rows.nrows()).then(|| rows.row(index)),
            Storage::Mapped { map, rows, width } => {
                if index >= *rows {
                    return None;
                }
                let values = mapped_values(map, *rows, *width);
                Some(ArrayView1::from(&values[index * width..(index + 1) * width]))
            }
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        match &self.storage {
            Storage::Dense(rows) => rows.dim(),
            Storage::Mapped { rows, width, .. } => (*rows, *width),
        }
    }
}

fn read_header_field(bytes: &[u8]) -> Result<usize> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| AppError::Artifact("Truncated mapped table header".to_string()))?;
    usize::try_from(u64::from_le_bytes(raw))
        .map_err(|_| AppError::Artifact("Mapped table dimension too large".to_string()))
}

fn mapped_values(map: &Mmap, rows: usize, width: usize) -> &[i64] {
    // SAFETY: `open_mapped` checked the length, the alignment and the host
    // byte order; the map is read-only and lives as long as the returned slice.
    unsafe {
        std::slice::from_raw_parts(
            map[MAPPED_HEADER_LEN..].as_ptr() as *const i64,
            rows * width,
        )
    }
}

/// Builds a dense embedding matrix; every vector must share one dimensionality.
pub fn embeddings_from_rows(rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let dim = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|row| row.len() != dim) {
        return Err(AppError::Artifact(
            "Embedding rows have inconsistent dimensionality".to_string(),
        ));
    }

    let count = rows.len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((count, dim), flat)
        .map_err(|e| AppError::Artifact(format!("Invalid embedding shape: {}", e)))
}

/// Contextual popularity lists. A `None` table was never supplied; lookups
/// against it contribute nothing.
#[derive(Debug, Clone, Default)]
pub struct SegmentTables {
    pub by_os: Option<HashMap<i64, Vec<ItemId>>>,
    pub by_dev: Option<HashMap<i64, Vec<ItemId>>>,
    pub by_os_reg: Option<HashMap<(i64, String), Vec<ItemId>>>,
    pub by_dev_reg: Option<HashMap<(i64, String), Vec<ItemId>>>,
}

impl SegmentTables {
    pub fn os(&self, os: i64) -> Option<&[ItemId]> {
        self.by_os.as_ref()?.get(&os).map(Vec::as_slice)
    }

    pub fn device(&self, device: i64) -> Option<&[ItemId]> {
        self.by_dev.as_ref()?.get(&device).map(Vec::as_slice)
    }

    pub fn os_region(&self, os: i64, country: &str) -> Option<&[ItemId]> {
        self.by_os_reg
            .as_ref()?
            .get(&(os, country.to_string()))
            .map(Vec::as_slice)
    }

    pub fn device_region(&self, device: i64, country: &str) -> Option<&[ItemId]> {
        self.by_dev_reg
            .as_ref()?
            .get(&(device, country.to_string()))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.by_os.is_none()
            && self.by_dev.is_none()
            && self.by_os_reg.is_none()
            && self.by_dev_reg.is_none()
    }

    /// Names of the tables that were supplied.
    pub fn loaded_tables(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.by_os.is_some() {
            names.push("by_os");
        }
        if self.by_dev.is_some() {
            names.push("by_dev");
        }
        if self.by_os_reg.is_some() {
            names.push("by_os_reg");
        }
        if self.by_dev_reg.is_some() {
            names.push("by_dev_reg");
        }
        names
    }
}

/// One `(dimension id, country)` keyed list in the serialized segment file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalEntry {
    pub id: i64,
    pub country: String,
    pub items: Vec<ItemId>,
}

/// On-disk layout of the segment tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentTablesFile {
    #[serde(default)]
    pub by_os: Option<HashMap<i64, Vec<ItemId>>>,
    #[serde(default)]
    pub by_dev: Option<HashMap<i64, Vec<ItemId>>>,
    #[serde(default)]
    pub by_os_reg: Option<Vec<RegionalEntry>>,
    #[serde(default)]
    pub by_dev_reg: Option<Vec<RegionalEntry>>,
}

impl From<SegmentTablesFile> for SegmentTables {
    fn from(file: SegmentTablesFile) -> Self {
        fn regional(entries: Vec<RegionalEntry>) -> HashMap<(i64, String), Vec<ItemId>> {
            entries
                .into_iter()
                .map(|e| ((e.id, e.country.trim().to_ascii_uppercase()), e.items))
                .collect()
        }

        Self {
            by_os: file.by_os,
            by_dev: file.by_dev,
            by_os_reg: file.by_os_reg.map(regional),
            by_dev_reg: file.by_dev_reg.map(regional),
        }
    }
}

/// One row of the held-out click file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthRow {
    pub user_id: i64,
    pub click_article_id: ItemId,
}
