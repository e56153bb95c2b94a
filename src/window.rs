//! Sliding-window analysis for the 19-vector extractor: chop a long capture
//! into overlapping windows, classify each, and aggregate per label.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::classifier::{sort_predictions, ClassifyError, Prediction, TopPrototype};
use crate::features;

const MIN_WINDOW_DURATION_SECONDS: f64 = 4.0;
const MIN_WINDOW_SAMPLES: usize = 1024;

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub window_seconds: f64,
    pub overlap_seconds: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { window_seconds: 3.0, overlap_seconds: 1.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowPrediction {
    pub start: usize,
    pub end: usize,
    pub predictions: Vec<Prediction>,
}

/// Whether the input is long enough for sliding-window analysis at all.
pub fn should_slide(samples_len: usize, sample_rate: u32) -> bool {
    sample_rate > 0 && samples_len as f64 / sample_rate as f64 >= MIN_WINDOW_DURATION_SECONDS
}

/// Run windowed classification over `samples`. Returns `None` when the
/// caller should fall back to a single-pass classify: too short, or the
/// configured window is below the 1024-sample floor.
pub fn analyze(
    samples: &[f32],
    sample_rate: u32,
    config: &WindowConfig,
    classify_fn: impl Fn(&[f64]) -> Result<Vec<Prediction>, ClassifyError>,
) -> Option<(Vec<WindowPrediction>, Vec<Prediction>)> {
    if !should_slide(samples.len(), sample_rate) {
        return None;
    }

    let w = (config.window_seconds * sample_rate as f64).round() as usize;
    if w < MIN_WINDOW_SAMPLES {
        return None;
    }

    let overlap = (config.overlap_seconds * sample_rate as f64).round() as usize;
    let mut h = w.saturating_sub(overlap);
    if h == 0 {
        h = (w / 2).max(1);
    }
    h = h.min(w);

    let mut windows = Vec::new();
    let mut start = 0usize;
    while start + w <= samples.len() {
        let end = start + w;
        if let Ok(feats) = features::extract(&samples[start..end], sample_rate) {
            if let Ok(preds) = classify_fn(&feats) {
                if !preds.is_empty() {
                    windows.push(WindowPrediction { start, end, predictions: preds });
                }
            }
        }
        start += h;
    }

    if windows.is_empty() {
        return None;
    }

    let aggregated = aggregate(&windows);
    if aggregated.is_empty() {
        return None;
    }
    Some((windows, aggregated))
}

struct LabelAgg {
    weight_sum: f64,
    distance_weighted_sum: f64,
    support: usize,
    category: String,
    type_string: String,
    metadata: HashMap<String, String>,
    threat_assessment: Option<crate::classifier::ThreatAssessment>,
    top: HashMap<String, TopPrototype>,
}

fn aggregate(windows: &[WindowPrediction]) -> Vec<Prediction> {
    let mut by_label: HashMap<String, LabelAgg> = HashMap::new();

    for w in windows {
        for p in &w.predictions {
            let agg = by_label.entry(p.label.clone()).or_insert_with(|| LabelAgg {
                weight_sum: 0.0,
                distance_weighted_sum: 0.0,
                support: 0,
                category: p.category.clone(),
                type_string: p.type_string.clone(),
                metadata: p.metadata.clone(),
                threat_assessment: p.threat_assessment.clone(),
                top: HashMap::new(),
            });
            agg.weight_sum += p.confidence;
            agg.distance_weighted_sum += p.average_distance * p.confidence;
            agg.support += p.support;
            for tp in &p.top_prototypes {
                agg.top
                    .entry(tp.id.clone())
                    .and_modify(|existing| {
                        if tp.weight > existing.weight {
                            *existing = tp.clone();
                        }
                    })
                    .or_insert_with(|| tp.clone());
            }
        }
    }

    let total_weight: f64 = by_label.values().map(|a| a.weight_sum).sum();

    let mut predictions: Vec<Prediction> = by_label
        .into_iter()
        .map(|(label, agg)| {
            let mut top: Vec<TopPrototype> = agg.top.into_values().collect();
            top.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(Ordering::Equal));
            top.truncate(5);

            Prediction {
                label,
                category: agg.category,
                type_string: agg.type_string,
                confidence: if total_weight > 0.0 { agg.weight_sum / total_weight } else { 0.0 },
                average_distance: if agg.weight_sum > 0.0 {
                    agg.distance_weighted_sum / agg.weight_sum
                } else {
                    0.0
                },
                support: agg.support,
                top_prototypes: top,
                metadata: agg.metadata,
                threat_assessment: agg.threat_assessment,
            }
        })
        .collect();

    sort_predictions(&mut predictions);
    predictions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine_wave(freq: f32, sr: u32, duration_secs: f32) -> Vec<f32> {
        let n = (sr as f32 * duration_secs) as usize;
        (0..n).map(|i| 0.4 * (2.0 * PI * freq * i as f32 / sr as f32).sin()).collect()
    }

    #[test]
    fn short_input_returns_none() {
        let samples = sine_wave(440.0, 22050, 1.0);
        let result = analyze(&samples, 22050, &WindowConfig::default(), |_| Ok(Vec::new()));
        assert!(result.is_none());
    }

    #[test]
    fn long_input_produces_windows() {
        let samples = sine_wave(440.0, 22050, 6.0);
        let dummy_pred = |label: &str| Prediction {
            label: label.to_string(),
            category: "drone".to_string(),
            type_string: "drone (drone)".to_string(),
            confidence: 1.0,
            average_distance: 0.0,
            support: 1,
            top_prototypes: vec![],
            metadata: HashMap::new(),
            threat_assessment: None,
        };
        let result = analyze(&samples, 22050, &WindowConfig::default(), move |_| Ok(vec![dummy_pred("alpha")]));
        let (windows, aggregated) = result.unwrap();
        assert!(!windows.is_empty());
        assert_eq!(aggregated[0].label, "alpha");
        assert!((aggregated[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_predictions_falls_back() {
        let samples = sine_wave(440.0, 22050, 6.0);
        let result = analyze(&samples, 22050, &WindowConfig::default(), |_| Ok(Vec::new()));
        assert!(result.is_none());
    }
}
