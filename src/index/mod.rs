//! Flat (exhaustive-scan) vector index over L2 distance.
//!
//! Vectors are kept in one row-major buffer in insertion order; a vector's position is
//! the position of the trace it was embedded from. Search compares the query against
//! every stored vector, which is fine for the small collections this service holds.

pub mod format;

use std::cmp::Ordering;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, ShadowError};

/// A search hit: index position and L2 distance from the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

#[derive(Debug)]
pub struct FlatIndex {
    path: PathBuf,
    dimension: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    /// Empty in-memory index bound to `path` for later persistence.
    pub fn new(path: impl Into<PathBuf>, dimension: usize) -> Self {
        Self {
            path: path.into(),
            dimension,
            data: Vec::new(),
        }
    }

    /// Load the index persisted at `path`, or start an empty one if nothing is there.
    pub fn load_or_create(path: impl Into<PathBuf>, dimension: usize) -> Result<Self> {
        let path = path.into();
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), dimension, "creating empty flat index");
                return Ok(Self::new(path, dimension));
            }
            Err(e) => return Err(e.into()),
        };

        let (header, data) = format::decode(&bytes).map_err(|e| ShadowError::CorruptIndex {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if header.dimensions as usize != dimension {
            return Err(ShadowError::DimensionMismatch {
                expected: dimension,
                actual: header.dimensions as usize,
            });
        }

        tracing::info!(
            path = %path.display(),
            vectors = header.count,
            dimension,
            "flat index loaded"
        );
        Ok(Self {
            path,
            dimension,
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Vector stored at `position`, if any.
    #[cfg(test)]
    pub fn get(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append one vector. Returns its position.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize> {
        self.check_dimension(vector)?;
        self.data.extend_from_slice(vector);
        Ok(self.len() - 1)
    }

    /// Keep only the first `len` vectors.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len.saturating_mul(self.dimension));
    }

    /// Up to `top_k` positions ordered by ascending L2 distance; ties go to the
    /// earlier position.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimension(query)?;
        if top_k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, v)| Neighbor {
                position,
                distance: l2_distance(v, query),
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Write the whole index to its file, replacing any previous version.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = format::encode(self.dimension, &self.data)?;
        let tmp_path = self.path.with_extension("index.tmp");
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(&bytes)?;
        tmp.sync_all()?;
        drop(tmp);

        std::fs::rename(&tmp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), vectors = self.len(), "flat index persisted");
        Ok(())
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(ShadowError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}
