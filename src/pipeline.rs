//! Top-level orchestrator: composes preprocessing, feature extraction (or
//! embedding), the prototype store, the k-NN classifier, sliding-window
//! analysis, and the template matcher into the public request/response API.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::classifier::{self, Prediction};
use crate::config::CoreConfig;
use crate::embedding::{EmbeddingService, HttpEmbeddingService};
use crate::error::CoreError;
use crate::features;
use crate::preprocess::{self, PreprocessConfig};
use crate::prototype::{Prototype, PrototypeStore, StoreStats};
use crate::template::{self, TemplateMatcher};
use crate::window::{self, WindowConfig, WindowPrediction};

/// Request to classify a decoded mono waveform (§6.3).
#[derive(Debug, Clone)]
pub struct ClassifyInput {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub preprocessed: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Accepted for contract compatibility with the transport layer; the
    /// core does not persist human-visible detection records (§1 scope).
    pub persist: bool,
    pub recording_path: Option<String>,
}

impl Default for ClassifyInput {
    fn default() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 22_050,
            preprocessed: false,
            latitude: None,
            longitude: None,
            persist: false,
            recording_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub predictions: Vec<Prediction>,
    pub is_drone: bool,
    pub latency_ms: f64,
    pub feature_vector: Vec<f64>,
    pub snr_db: f64,
    pub adjusted_threshold: f64,
    pub windows: Vec<WindowPrediction>,
    pub template_predictions: Vec<Prediction>,
    pub primary_type: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub recording_path: Option<String>,
}

/// `{ audio_path | audio_bytes, label, category, description?, source?, metadata? }` (§6.3).
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub label: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub metadata: HashMap<String, String>,
}

pub struct IngestOutcome {
    pub prototype: Prototype,
    pub stats: StoreStats,
}

pub struct DroneAcousticCore {
    store: PrototypeStore,
    template_matcher: Option<TemplateMatcher>,
    embedding_service: Option<Box<dyn EmbeddingService>>,
    config: CoreConfig,
    preprocess_config: PreprocessConfig,
    window_config: WindowConfig,
}

impl DroneAcousticCore {
    pub fn init(config: CoreConfig) -> Result<Self, CoreError> {
        let store = PrototypeStore::load(&config.model_path, config.model_k)?;
        let expected_dim = store.snapshot().expected_dim;

        let template_matcher = expected_dim.and_then(|dim| {
            match TemplateMatcher::load(&config.template_path, dim, config.template_threshold) {
                Ok(m) if !m.is_empty() => Some(m),
                Ok(_) => None,
                Err(e) => {
                    info!(error = %e, path = %config.template_path.display(), "no template bank loaded");
                    None
                }
            }
        });

        let embedding_service: Option<Box<dyn EmbeddingService>> = if config.use_embeddings {
            Some(Box::new(HttpEmbeddingService::new(&config.embedding_service_url)))
        } else {
            None
        };

        Ok(Self {
            store,
            template_matcher,
            embedding_service,
            config,
            preprocess_config: PreprocessConfig::default(),
            window_config: WindowConfig::default(),
        })
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Run the full classify pipeline for one request.
    pub fn classify(&self, input: ClassifyInput) -> Result<ClassificationSummary, CoreError> {
        let start = Instant::now();

        let snr_db = preprocess::estimate_snr(&input.samples);
        let processed = if input.preprocessed {
            input.samples.clone()
        } else {
            preprocess::preprocess(&input.samples, input.sample_rate, &self.preprocess_config)
        };

        let snapshot = self.store.snapshot();
        let use_embedding = snapshot.expected_dim.map(|d| d == 2048).unwrap_or(self.config.use_embeddings);

        let feature_vector: Vec<f64> = if use_embedding {
            match self.embedding_service.as_ref().map(|svc| svc.embed(&processed, input.sample_rate)) {
                Some(Ok(v)) => v.to_vec(),
                Some(Err(e)) => {
                    warn!(error = %e, "embedding service failed, falling back to 19-vec extraction");
                    features::extract(&processed, input.sample_rate)?.to_vec()
                }
                None => features::extract(&processed, input.sample_rate)?.to_vec(),
            }
        } else {
            features::extract(&processed, input.sample_rate)?.to_vec()
        };

        let (predictions, windows) = if !use_embedding && window::should_slide(processed.len(), input.sample_rate) {
            match window::analyze(&processed, input.sample_rate, &self.window_config, |f| {
                classifier::classify(&snapshot, f)
            }) {
                Some((w, aggregated)) => (aggregated, w),
                None => (classifier::classify(&snapshot, &feature_vector)?, Vec::new()),
            }
        } else {
            (classifier::classify(&snapshot, &feature_vector)?, Vec::new())
        };

        let template_predictions =
            self.template_matcher.as_ref().map(|m| m.predict(&feature_vector)).unwrap_or_default();

        let merged = template::merge_predictions(predictions, template_predictions.clone());

        let adjusted_threshold = classifier::adaptive_threshold(self.config.confidence_threshold, snr_db as f64);
        let is_drone = classifier::is_drone(&merged, adjusted_threshold);
        let primary_type = merged.first().map(|p| p.type_string.clone());

        Ok(ClassificationSummary {
            predictions: merged,
            is_drone,
            latency_ms: start.elapsed().as_secs_f64() * 1000.0,
            feature_vector,
            snr_db: snr_db as f64,
            adjusted_threshold,
            windows,
            template_predictions,
            primary_type,
            latitude: input.latitude,
            longitude: input.longitude,
            recording_path: input.recording_path,
        })
    }

    /// Ingest a new prototype from raw audio. Persists the store to
    /// `DRONE_MODEL_PATH` on success; a persistence failure is logged but
    /// does not undo the in-memory ingest (§7 Persist row).
    pub fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome, CoreError> {
        let processed = preprocess::preprocess(&request.samples, request.sample_rate, &self.preprocess_config);
        let snapshot = self.store.snapshot();
        let use_embedding = snapshot.expected_dim.map(|d| d == 2048).unwrap_or(self.config.use_embeddings);

        let features: Vec<f64> = if use_embedding {
            match self.embedding_service.as_ref().map(|svc| svc.embed(&processed, request.sample_rate)) {
                Some(Ok(v)) => v.to_vec(),
                Some(Err(e)) => {
                    warn!(error = %e, "embedding service failed, falling back to 19-vec extraction");
                    features::extract(&processed, request.sample_rate)?.to_vec()
                }
                None => features::extract(&processed, request.sample_rate)?.to_vec(),
            }
        } else {
            features::extract(&processed, request.sample_rate)?.to_vec()
        };

        self.ingest_from_features(
            features,
            request.label,
            request.category,
            request.description,
            request.source,
            request.metadata,
        )
    }

    /// Ingest a prototype from an already-computed feature vector, for
    /// callers that bypass audio entirely (§4 component mapping: the
    /// core's contracts are already expressed at the feature-vector level).
    pub fn ingest_from_features(
        &self,
        features: Vec<f64>,
        label: String,
        category: Option<String>,
        description: Option<String>,
        source: Option<String>,
        metadata: HashMap<String, String>,
    ) -> Result<IngestOutcome, CoreError> {
        let prototype = Prototype {
            id: Uuid::new_v4().to_string(),
            label,
            category: category.unwrap_or_else(|| "drone".to_string()),
            description,
            source,
            features,
            metadata,
        };

        self.store.add(prototype.clone())?;

        if let Err(e) = self.store.save(&self.config.model_path) {
            warn!(error = %e, "failed to persist prototype store after ingest");
        }

        Ok(IngestOutcome { prototype, stats: self.store.stats() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::Template;
    use std::fs;
    use std::io::Write;

    fn write_store(dir: &tempfile::TempDir, prototypes: &[Prototype]) -> std::path::PathBuf {
        let path = dir.path().join("prototypes.json");
        let body = serde_json::to_string(prototypes).unwrap();
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn sine_wave(freq: f32, sr: u32, duration_secs: f32) -> Vec<f32> {
        use std::f32::consts::PI;
        let n = (sr as f32 * duration_secs) as usize;
        (0..n).map(|i| 0.4 * (2.0 * PI * freq * i as f32 / sr as f32).sin()).collect()
    }

    fn proto_19(id: &str, label: &str, category: &str) -> Prototype {
        let samples = sine_wave(if label == "alpha" { 300.0 } else { 2000.0 }, 22050, 1.0);
        let features = features::extract(&samples, 22050).unwrap().to_vec();
        Prototype {
            id: id.to_string(),
            label: label.to_string(),
            category: category.to_string(),
            description: None,
            source: None,
            features,
            metadata: HashMap::new(),
        }
    }

    fn core_with(prototypes: &[Prototype]) -> (tempfile::TempDir, DroneAcousticCore) {
        let dir = tempfile::tempdir().unwrap();
        let path = write_store(&dir, prototypes);
        let mut config = CoreConfig::from_env();
        config.model_path = path;
        config.use_embeddings = false;
        config.template_path = dir.path().join("templates.json");
        let core = DroneAcousticCore::init(config).unwrap();
        (dir, core)
    }

    #[test]
    fn classify_short_capture_has_no_windows() {
        let (_dir, core) = core_with(&[proto_19("a", "alpha", "drone"), proto_19("b", "beta", "noise")]);
        let samples = sine_wave(300.0, 22050, 1.0);
        let summary = core
            .classify(ClassifyInput { samples, sample_rate: 22050, ..Default::default() })
            .unwrap();
        assert!(summary.windows.is_empty());
    }

    #[test]
    fn classify_empty_samples_is_not_drone() {
        let (_dir, core) = core_with(&[]);
        let result = core.classify(ClassifyInput { samples: Vec::new(), sample_rate: 22050, ..Default::default() });
        assert!(result.is_err() || !result.unwrap().is_drone);
    }

    #[test]
    fn ingest_persists_and_updates_stats() {
        let (dir, core) = core_with(&[proto_19("a", "alpha", "drone")]);
        let samples = sine_wave(300.0, 22050, 1.0);
        let outcome = core
            .ingest(IngestRequest {
                samples,
                sample_rate: 22050,
                label: "alpha".to_string(),
                category: Some("drone".to_string()),
                description: None,
                source: None,
                metadata: HashMap::new(),
            })
            .unwrap();
        assert_eq!(outcome.stats.count, 2);

        let saved = fs::read_to_string(dir.path().join("prototypes.json")).unwrap();
        let records: Vec<Prototype> = serde_json::from_str(&saved).unwrap();
        assert_eq!(records.len(), 2);
    }

    struct FixedEmbedding(Vec<f64>);

    impl EmbeddingService for FixedEmbedding {
        fn embed(
            &self,
            _samples: &[f32],
            _sample_rate: u32,
        ) -> Result<[f64; crate::embedding::EMBEDDING_DIM], crate::embedding::EmbeddingError> {
            let mut out = [0.0; crate::embedding::EMBEDDING_DIM];
            out.copy_from_slice(&self.0);
            Ok(out)
        }

        fn healthy(&self) -> bool {
            true
        }
    }

    fn proto_2048(id: &str, label: &str, category: &str, features: Vec<f64>) -> Prototype {
        Prototype {
            id: id.to_string(),
            label: label.to_string(),
            category: category.to_string(),
            description: None,
            source: None,
            features,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn template_channel_contributes_in_embedding_mode() {
        let dir = tempfile::tempdir().unwrap();
        let mut embedding = vec![0.0; crate::embedding::EMBEDDING_DIM];
        embedding[0] = 1.0;
        let store_path = write_store(&dir, &[proto_2048("a", "alpha", "drone", embedding.clone())]);

        let template_path = dir.path().join("templates.json");
        let mut template_features = vec![0.0; crate::embedding::EMBEDDING_DIM];
        template_features[0] = 1.0;
        let templates = vec![Template { label: "alpha-template".to_string(), source: None, features: template_features }];
        let mut f = fs::File::create(&template_path).unwrap();
        f.write_all(serde_json::to_string(&templates).unwrap().as_bytes()).unwrap();

        let mut config = CoreConfig::from_env();
        config.model_path = store_path;
        config.use_embeddings = true;
        config.template_path = template_path;

        let store = PrototypeStore::load(&config.model_path, config.model_k).unwrap();
        let template_matcher =
            Some(TemplateMatcher::load(&config.template_path, 2048, config.template_threshold).unwrap());
        let core = DroneAcousticCore {
            store,
            template_matcher,
            embedding_service: Some(Box::new(FixedEmbedding(embedding))),
            config,
            preprocess_config: PreprocessConfig::default(),
            window_config: WindowConfig::default(),
        };

        let samples = sine_wave(300.0, 22050, 1.0);
        let summary = core
            .classify(ClassifyInput { samples, sample_rate: 22050, preprocessed: true, ..Default::default() })
            .unwrap();

        assert_eq!(summary.template_predictions.len(), 1);
        assert_eq!(summary.template_predictions[0].label, "alpha-template");
    }
}
