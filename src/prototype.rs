//! Prototype store: label metadata, z-score scaling fitted at load, atomic
//! JSON persistence, and a reader-writer-locked resident copy of prototype
//! vectors in scaled + L2-normalised form. Raw (pre-scaling) feature values
//! are kept alongside the resident copy so `save` can persist the form
//! `load` expects to refit a scaler against.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::scaler::{l2_normalize, FeatureScaler};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("prototype store unavailable: {0}")]
    Unavailable(String),
    #[error("prototype store corrupt: {0}")]
    Corrupt(String),
    #[error("failed to persist prototype store: {0}")]
    PersistFailed(String),
}

#[derive(Debug, Error)]
pub enum PrototypeError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("label must be non-empty")]
    EmptyLabel,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_metadata() -> HashMap<String, String> {
    HashMap::new()
}

/// A stored, labelled reference feature vector. `features` holds raw values
/// on disk but the **scaled + L2-normalised** values while resident in the
/// store (§9 persistence note — see DESIGN.md for the resolved policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prototype {
    #[serde(default = "new_id")]
    pub id: String,
    pub label: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub features: Vec<f64>,
    #[serde(default = "default_metadata")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub count: usize,
    pub label_histogram: HashMap<String, usize>,
    pub using_example: bool,
}

/// An owned, point-in-time copy of the prototypes and routing maps, taken
/// under a read lock that is released immediately after the copy.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub prototypes: Vec<Prototype>,
    pub k: usize,
    pub expected_dim: Option<usize>,
    pub scaler: Option<FeatureScaler>,
    pub label_category: HashMap<String, String>,
    pub label_metadata: HashMap<String, HashMap<String, String>>,
}

struct Inner {
    prototypes: Vec<Prototype>,
    /// Mirrors `prototypes` one-to-one but keeps the pre-scaling, pre-L2
    /// feature values — the form persisted to disk (§6.1: the prototype
    /// file holds raw features; the scaler is refit fresh on every load).
    raw_prototypes: Vec<Prototype>,
    expected_dim: Option<usize>,
    scaler: Option<FeatureScaler>,
    k: usize,
    using_example: bool,
    label_category: HashMap<String, String>,
    label_metadata: HashMap<String, HashMap<String, String>>,
}

pub struct PrototypeStore {
    inner: RwLock<Inner>,
}

impl PrototypeStore {
    /// Load a prototype file, falling back to a `.example` sibling when the
    /// primary path is missing. Fits the scaler unless `expected_dim == 2048`.
    pub fn load(path: &Path, requested_k: usize) -> Result<Self, PrototypeError> {
        let (contents, using_example) = match fs::read_to_string(path) {
            Ok(c) => (c, false),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let example = example_path(path);
                match fs::read_to_string(&example) {
                    Ok(c) => (c, true),
                    Err(_) => {
                        return Err(PrototypeError::Store(StoreError::Unavailable(format!(
                            "neither {} nor {} exist",
                            path.display(),
                            example.display()
                        ))))
                    }
                }
            }
            Err(e) => return Err(PrototypeError::Io(e)),
        };

        let mut records: Vec<Prototype> = serde_json::from_str(&contents)
            .map_err(|e| PrototypeError::Store(StoreError::Corrupt(e.to_string())))?;

        for p in &records {
            if p.label.is_empty() {
                return Err(PrototypeError::Store(StoreError::Corrupt(format!(
                    "prototype {} has an empty label",
                    p.id
                ))));
            }
        }

        let expected_dim = records.first().map(|p| p.features.len());
        if let Some(dim) = expected_dim {
            for p in &records {
                if p.features.len() != dim {
                    return Err(PrototypeError::Store(StoreError::Corrupt(format!(
                        "inconsistent feature dimension: expected {dim}, got {} for prototype {}",
                        p.features.len(),
                        p.id
                    ))));
                }
            }
        }

        let scaler = if expected_dim == Some(2048) {
            None
        } else {
            let raw: Vec<Vec<f64>> = records.iter().map(|p| p.features.clone()).collect();
            FeatureScaler::fit(&raw)
        };

        let raw_records = records.clone();

        for p in records.iter_mut() {
            if let Some(s) = &scaler {
                p.features = s.transform(&p.features);
            }
            l2_normalize(&mut p.features);
        }

        let mut label_category = HashMap::new();
        let mut label_metadata: HashMap<String, HashMap<String, String>> = HashMap::new();
        for p in &records {
            label_category.entry(p.label.clone()).or_insert_with(|| p.category.clone());
            let entry = label_metadata.entry(p.label.clone()).or_default();
            for (k, v) in &p.metadata {
                entry.insert(k.clone(), v.clone());
            }
        }

        let mut k = requested_k.min(records.len());
        if records.len() < 10 && k > 3 {
            k = 3;
        }

        info!(
            count = records.len(),
            using_example,
            k,
            expected_dim = expected_dim.unwrap_or(0),
            "loaded prototype store"
        );

        Ok(Self {
            inner: RwLock::new(Inner {
                prototypes: records,
                raw_prototypes: raw_records,
                expected_dim,
                scaler,
                k,
                using_example,
                label_category,
                label_metadata,
            }),
        })
    }

    /// Scaler-transform, L2-normalise, and append a prototype; updates the
    /// per-label category (first writer wins) and metadata (last writer
    /// wins per key). Clears `using_example`.
    pub fn add(&self, mut prototype: Prototype) -> Result<(), PrototypeError> {
        if prototype.label.is_empty() {
            return Err(PrototypeError::EmptyLabel);
        }

        let mut inner = self.inner.write().unwrap();

        match inner.expected_dim {
            Some(dim) if dim != prototype.features.len() => {
                return Err(PrototypeError::DimensionMismatch {
                    expected: dim,
                    got: prototype.features.len(),
                });
            }
            None => inner.expected_dim = Some(prototype.features.len()),
            _ => {}
        }

        let raw_prototype = prototype.clone();

        if let Some(s) = &inner.scaler {
            prototype.features = s.transform(&prototype.features);
        }
        l2_normalize(&mut prototype.features);

        inner
            .label_category
            .entry(prototype.label.clone())
            .or_insert_with(|| prototype.category.clone());
        let entry = inner.label_metadata.entry(prototype.label.clone()).or_default();
        for (k, v) in &prototype.metadata {
            entry.insert(k.clone(), v.clone());
        }

        inner.prototypes.push(prototype);
        inner.raw_prototypes.push(raw_prototype);
        inner.using_example = false;

        let n = inner.prototypes.len();
        if n < inner.k {
            inner.k = n;
        }
        if n < 10 && inner.k > 3 {
            inner.k = 3;
        }

        Ok(())
    }

    /// Atomic write: serialise the **raw**, pre-scaling prototypes to
    /// `path.tmp`, then rename over `path` (§6.1: the file holds raw
    /// features; `load` refits the scaler fresh from whatever is on disk).
    pub fn save(&self, path: &Path) -> Result<(), PrototypeError> {
        let inner = self.inner.read().unwrap();
        let json = serde_json::to_string_pretty(&inner.raw_prototypes)?;
        let tmp_path = tmp_sibling(path);

        (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&tmp_path, json)?;
            fs::rename(&tmp_path, path)?;
            Ok(())
        })()
        .map_err(|e| PrototypeError::Store(StoreError::PersistFailed(e.to_string())))?;

        Ok(())
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.read().unwrap();
        StoreSnapshot {
            prototypes: inner.prototypes.clone(),
            k: inner.k,
            expected_dim: inner.expected_dim,
            scaler: inner.scaler.clone(),
            label_category: inner.label_category.clone(),
            label_metadata: inner.label_metadata.clone(),
        }
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read().unwrap();
        let mut label_histogram = HashMap::new();
        for p in &inner.prototypes {
            *label_histogram.entry(p.label.clone()).or_insert(0) += 1;
        }
        StoreStats {
            count: inner.prototypes.len(),
            label_histogram,
            using_example: inner.using_example,
        }
    }
}

fn example_path(path: &Path) -> PathBuf {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    let name = if ext.is_empty() {
        format!("{stem}.example")
    } else {
        format!("{stem}.example.{ext}")
    };
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".tmp");
    PathBuf::from(s)
}
