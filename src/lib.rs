//! Acoustic drone classification core: preprocessing, feature extraction,
//! a prototype store with z-score scaling, a k-NN cosine-similarity
//! classifier, sliding-window analysis, and an optional template bank.

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod features;
pub mod pipeline;
pub mod preprocess;
pub mod prototype;
pub mod scaler;
pub mod template;
pub mod window;

pub use classifier::{ClassifyError, Prediction, ThreatAssessment, TopPrototype};
pub use config::CoreConfig;
pub use embedding::{EmbeddingError, EmbeddingService, HttpEmbeddingService};
pub use error::CoreError;
pub use features::{FeatureError, FEATURE_DIM};
pub use pipeline::{ClassificationSummary, ClassifyInput, DroneAcousticCore, IngestOutcome, IngestRequest};
pub use preprocess::PreprocessConfig;
pub use prototype::{Prototype, PrototypeError, PrototypeStore, StoreError, StoreStats};
pub use template::{Template, TemplateError, TemplateMatcher};
pub use window::{WindowConfig, WindowPrediction};
