//! External neural embedding provider: a trait the core consumes plus one
//! HTTP-backed production implementation. Embedding failures are recovered
//! by the caller (§7: fall back to 19-vec extraction), never fatal here.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Output dimensionality of an external embedding.
pub const EMBEDDING_DIM: usize = 2048;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding service request failed: {0}")]
    Network(String),
    #[error("embedding service returned invalid response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// A source of 2048-dim embeddings for a mono waveform.
pub trait EmbeddingService: Send + Sync {
    fn embed(&self, samples: &[f32], sample_rate: u32) -> Result<[f64; EMBEDDING_DIM], EmbeddingError>;
    fn healthy(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f64>,
    #[allow(dead_code)]
    dimension: usize,
}

/// Blocking HTTP client for the external embedder: `POST /embed` with a
/// multipart body, `GET /health` for liveness, 30-second deadline.
pub struct HttpEmbeddingService {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpEmbeddingService {
    pub fn new(base_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self { base_url: base_url.into(), agent }
    }

    fn embed_url(&self) -> String {
        format!("{}/embed", self.base_url.trim_end_matches('/'))
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url.trim_end_matches('/'))
    }
}

impl EmbeddingService for HttpEmbeddingService {
    fn embed(&self, samples: &[f32], sample_rate: u32) -> Result<[f64; EMBEDDING_DIM], EmbeddingError> {
        let boundary = "----drone-acoustic-core-boundary";
        let body = multipart_body(boundary, samples, sample_rate);

        let response = self
            .agent
            .post(&self.embed_url())
            .set("Content-Type", &format!("multipart/form-data; boundary={boundary}"))
            .send_bytes(&body)
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let parsed: EmbedResponse = response
            .into_json()
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if parsed.embedding.len() != EMBEDDING_DIM {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {EMBEDDING_DIM} dims, got {}",
                parsed.embedding.len()
            )));
        }

        let mut out = [0.0f64; EMBEDDING_DIM];
        out.copy_from_slice(&parsed.embedding);
        Ok(out)
    }

    fn healthy(&self) -> bool {
        self.agent
            .get(&self.health_url())
            .call()
            .map(|r| r.status() == 200)
            .unwrap_or(false)
    }
}

/// Build a minimal `multipart/form-data` body with a single `audio` field
/// carrying little-endian f32 PCM samples (decode/encode of real container
/// formats is the caller's responsibility; see spec §1).
fn multipart_body(boundary: &str, samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let mut body = Vec::with_capacity(samples.len() * 4 + 256);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"audio\"; filename=\"audio.pcm\"\r\n\
             Content-Type: application/octet-stream\r\n\
             X-Sample-Rate: {sample_rate}\r\n\r\n"
        )
        .as_bytes(),
    );
    for &s in samples {
        body.extend_from_slice(&s.to_le_bytes());
    }
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_body_contains_boundary_and_samples() {
        let body = multipart_body("BOUND", &[1.0, -1.0], 22050);
        let text_prefix = String::from_utf8_lossy(&body[..80.min(body.len())]);
        assert!(text_prefix.contains("BOUND"));
        assert!(text_prefix.contains("audio"));
    }

    struct StubEmbeddingService {
        healthy: bool,
    }

    impl EmbeddingService for StubEmbeddingService {
        fn embed(&self, _samples: &[f32], _sample_rate: u32) -> Result<[f64; EMBEDDING_DIM], EmbeddingError> {
            Ok([0.5; EMBEDDING_DIM])
        }
        fn healthy(&self) -> bool {
            self.healthy
        }
    }

    #[test]
    fn trait_object_is_usable() {
        let svc: Box<dyn EmbeddingService> = Box::new(StubEmbeddingService { healthy: true });
        let v = svc.embed(&[0.0], 22050).unwrap();
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert!(svc.healthy());
    }
}
