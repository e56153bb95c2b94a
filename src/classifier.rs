//! k-NN cosine-similarity classifier: weighted per-label aggregation,
//! adaptive K, SNR-adaptive decision threshold, threat-metadata extraction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prototype::StoreSnapshot;
use crate::scaler::{cosine_similarity, l2_normalize};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopPrototype {
    pub id: String,
    pub distance: f64,
    pub weight: f64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub threat_level: Option<String>,
    pub risk_category: Option<String>,
    pub payload_capacity_kg: Option<f64>,
    pub max_range_km: Option<f64>,
    pub max_speed_ms: Option<f64>,
    pub flight_time_minutes: Option<f64>,
    pub jamming_susceptible: Option<bool>,
    pub countermeasure_recommendations: Option<String>,
    pub detection_range_m: Option<f64>,
    pub operator_type: Option<String>,
    pub is_military_grade: Option<bool>,
}

impl ThreatAssessment {
    fn from_metadata(metadata: &HashMap<String, String>) -> Option<Self> {
        let get = |k: &str| metadata.get(k).cloned();
        let get_f64 = |k: &str| metadata.get(k).and_then(|v| v.parse::<f64>().ok());
        let get_bool = |k: &str| metadata.get(k).and_then(|v| v.parse::<bool>().ok());

        let threat_level = get("threat_level");
        let risk_category = get("risk_category");
        if threat_level.is_none() && risk_category.is_none() {
            return None;
        }

        Some(Self {
            threat_level,
            risk_category,
            payload_capacity_kg: get_f64("payload_capacity_kg"),
            max_range_km: get_f64("max_range_km"),
            max_speed_ms: get_f64("max_speed_ms"),
            flight_time_minutes: get_f64("flight_time_minutes"),
            jamming_susceptible: get_bool("jamming_susceptible"),
            countermeasure_recommendations: get("countermeasure_recommendations"),
            detection_range_m: get_f64("detection_range_m"),
            operator_type: get("operator_type"),
            is_military_grade: get_bool("is_military_grade"),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub category: String,
    #[serde(rename = "type")]
    pub type_string: String,
    pub confidence: f64,
    pub average_distance: f64,
    pub support: usize,
    pub top_prototypes: Vec<TopPrototype>,
    pub metadata: HashMap<String, String>,
    pub threat_assessment: Option<ThreatAssessment>,
}

struct Aggregate {
    weight_sum: f64,
    distance_sum: f64,
    support: usize,
    top: Vec<TopPrototype>,
}

/// Run one k-NN classification pass over a store snapshot for `query`.
/// `query` is scaled (if the scaler matches its dimension) and L2-normalised
/// internally; callers pass the raw extracted/embedded feature vector.
pub fn classify(snapshot: &StoreSnapshot, query: &[f64]) -> Result<Vec<Prediction>, ClassifyError> {
    if let Some(expected) = snapshot.expected_dim {
        if query.len() != expected {
            return Err(ClassifyError::DimensionMismatch { expected, got: query.len() });
        }
    }

    if snapshot.prototypes.is_empty() {
        return Ok(Vec::new());
    }

    let mut q = query.to_vec();
    if let Some(scaler) = &snapshot.scaler {
        if q.len() == scaler.dim() {
            q = scaler.transform(&q);
        }
    }
    l2_normalize(&mut q);

    let n = snapshot.prototypes.len();
    let k = snapshot.k.min(n).max(1);

    let mut distances: Vec<(usize, f64)> = snapshot
        .prototypes
        .iter()
        .enumerate()
        .map(|(i, p)| (i, 1.0 - cosine_similarity(&q, &p.features)))
        .collect();
    distances.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    distances.truncate(k);

    let mut by_label: HashMap<String, Aggregate> = HashMap::new();
    let mut total_weight = 0.0;

    for &(idx, distance) in &distances {
        let p = &snapshot.prototypes[idx];
        let weight = 1.0 / (distance + 1e-9);
        total_weight += weight;

        let agg = by_label.entry(p.label.clone()).or_insert_with(|| Aggregate {
            weight_sum: 0.0,
            distance_sum: 0.0,
            support: 0,
            top: Vec::new(),
        });
        agg.weight_sum += weight;
        agg.distance_sum += distance;
        agg.support += 1;
        agg.top.push(TopPrototype { id: p.id.clone(), distance, weight, source: p.source.clone() });
    }

    let mut predictions: Vec<Prediction> = by_label
        .into_iter()
        .map(|(label, mut agg)| {
            agg.top.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
            agg.top.truncate(5);

            let category = snapshot.label_category.get(&label).cloned().unwrap_or_else(|| "unknown".to_string());
            let metadata = snapshot.label_metadata.get(&label).cloned().unwrap_or_default();

            let type_string = metadata
                .get("model")
                .or_else(|| metadata.get("type"))
                .or_else(|| metadata.get("description"))
                .cloned()
                .unwrap_or_else(|| format!("{label} ({category})"));

            let threat_assessment = if category == "drone" && !metadata.is_empty() {
                ThreatAssessment::from_metadata(&metadata)
            } else {
                None
            };

            Prediction {
                label,
                category,
                type_string,
                confidence: if total_weight > 0.0 { agg.weight_sum / total_weight } else { 0.0 },
                average_distance: agg.distance_sum / agg.support as f64,
                support: agg.support,
                top_prototypes: agg.top,
                metadata,
                threat_assessment,
            }
        })
        .collect();

    sort_predictions(&mut predictions);
    Ok(predictions)
}

pub fn sort_predictions(predictions: &mut [Prediction]) {
    predictions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.average_distance.partial_cmp(&b.average_distance).unwrap_or(std::cmp::Ordering::Equal))
    });
}

/// SNR-banded offset atop `base`, clamped to `[0.5, 0.9]`. A sentinel
/// `snr_db == 0.0` (SNR unavailable) behaves as if no offset applies.
pub fn adaptive_threshold(base: f64, snr_db: f64) -> f64 {
    if snr_db == 0.0 {
        return base.clamp(0.5, 0.9);
    }
    let bumped = if snr_db < 10.0 {
        base + 0.15
    } else if snr_db < 20.0 {
        base + 0.10
    } else if snr_db < 30.0 {
        base + 0.05
    } else {
        base
    };
    bumped.clamp(0.5, 0.9)
}

pub fn is_drone(predictions: &[Prediction], adjusted_threshold: f64) -> bool {
    match predictions.first() {
        Some(top) => top.category != "noise" && top.confidence >= adjusted_threshold,
        None => false,
    }
}
