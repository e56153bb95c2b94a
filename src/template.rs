//! Small-N template bank: a parallel cosine-similarity recognition channel
//! merged with the classifier's k-NN predictions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::classifier::{sort_predictions, Prediction, TopPrototype};
use crate::scaler::{cosine_similarity, l2_normalize};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub features: Vec<f64>,
}

pub struct TemplateMatcher {
    templates: Vec<Template>,
    expected_dim: usize,
    threshold: f64,
}

impl TemplateMatcher {
    pub const DEFAULT_THRESHOLD: f64 = 0.75;

    /// Load a template bank, dropping (and logging) any entry whose
    /// dimensionality doesn't match `expected_dim`; each surviving vector
    /// is L2-normalised in place.
    pub fn load(path: &Path, expected_dim: usize, threshold: f64) -> Result<Self, TemplateError> {
        let contents = fs::read_to_string(path)?;
        let raw: Vec<Template> = serde_json::from_str(&contents)?;

        let mut templates = Vec::with_capacity(raw.len());
        for mut t in raw {
            if t.features.len() != expected_dim {
                warn!(
                    label = %t.label,
                    expected = expected_dim,
                    got = t.features.len(),
                    "dropping template with mismatched feature dimension"
                );
                continue;
            }
            l2_normalize(&mut t.features);
            templates.push(t);
        }

        Ok(Self { templates, expected_dim, threshold })
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Cosine-similarity lookup against every template; entries below the
    /// threshold are dropped, survivors sorted like the k-NN classifier.
    pub fn predict(&self, query: &[f64]) -> Vec<Prediction> {
        if query.len() != self.expected_dim || self.templates.is_empty() {
            return Vec::new();
        }

        let mut q = query.to_vec();
        l2_normalize(&mut q);

        let mut predictions: Vec<Prediction> = self
            .templates
            .iter()
            .filter_map(|t| {
                let s = cosine_similarity(&q, &t.features);
                let confidence = ((s + 1.0) / 2.0).clamp(0.0, 1.0);
                if confidence < self.threshold {
                    return None;
                }
                Some(Prediction {
                    label: t.label.clone(),
                    category: "unknown".to_string(),
                    type_string: t.label.clone(),
                    confidence,
                    average_distance: 1.0 - s,
                    support: 1,
                    top_prototypes: vec![TopPrototype {
                        id: t.label.clone(),
                        distance: 1.0 - s,
                        weight: confidence,
                        source: t.source.clone(),
                    }],
                    metadata: Default::default(),
                    threat_assessment: None,
                })
            })
            .collect();

        sort_predictions(&mut predictions);
        predictions
    }
}

/// Merge by case-insensitive label, keeping the higher-confidence entry,
/// then re-sort.
pub fn merge_predictions(base: Vec<Prediction>, additions: Vec<Prediction>) -> Vec<Prediction> {
    let mut by_key: std::collections::HashMap<String, Prediction> = std::collections::HashMap::new();

    for p in base.into_iter().chain(additions) {
        let key = p.label.to_lowercase();
        by_key
            .entry(key)
            .and_modify(|existing| {
                if p.confidence > existing.confidence {
                    *existing = p.clone();
                }
            })
            .or_insert(p);
    }

    let mut merged: Vec<Prediction> = by_key.into_values().collect();
    sort_predictions(&mut merged);
    merged
}
