//! Environment-sourced configuration, read exactly once at startup.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub model_path: PathBuf,
    pub model_k: usize,
    pub confidence_threshold: f64,
    pub template_path: PathBuf,
    pub template_threshold: f64,
    pub use_embeddings: bool,
    pub embedding_service_url: String,
}

impl CoreConfig {
    pub fn from_env() -> Self {
        Self {
            model_path: env_or("DRONE_MODEL_PATH", PathBuf::from("drone/prototypes.json"), PathBuf::from),
            model_k: env_parsed("DRONE_MODEL_K", 5),
            confidence_threshold: env_parsed("DRONE_CONFIDENCE_THRESHOLD", 0.55),
            template_path: env_or("DRONE_TEMPLATE_PATH", PathBuf::from("drone/templates.json"), PathBuf::from),
            template_threshold: env_parsed("DRONE_TEMPLATE_THRESHOLD", 0.75),
            use_embeddings: env_parsed("USE_PANNS_EMBEDDINGS", true),
            embedding_service_url: env::var("EMBEDDING_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:5002".to_string()),
        }
    }
}

fn env_or<T>(name: &str, default: T, parse: impl Fn(String) -> T) -> T {
    env::var(name).map(parse).unwrap_or(default)
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_apply_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for var in [
            "DRONE_MODEL_PATH",
            "DRONE_MODEL_K",
            "DRONE_CONFIDENCE_THRESHOLD",
            "DRONE_TEMPLATE_PATH",
            "DRONE_TEMPLATE_THRESHOLD",
            "USE_PANNS_EMBEDDINGS",
            "EMBEDDING_SERVICE_URL",
        ] {
            env::remove_var(var);
        }
        let config = CoreConfig::from_env();
        assert_eq!(config.model_path, PathBuf::from("drone/prototypes.json"));
        assert_eq!(config.model_k, 5);
        assert!((config.confidence_threshold - 0.55).abs() < 1e-9);
        assert!(config.use_embeddings);
        assert_eq!(config.embedding_service_url, "http://localhost:5002");
    }

    #[test]
    fn overrides_are_parsed() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DRONE_MODEL_K", "7");
        env::set_var("USE_PANNS_EMBEDDINGS", "false");
        let config = CoreConfig::from_env();
        assert_eq!(config.model_k, 7);
        assert!(!config.use_embeddings);
        env::remove_var("DRONE_MODEL_K");
        env::remove_var("USE_PANNS_EMBEDDINGS");
    }
}
