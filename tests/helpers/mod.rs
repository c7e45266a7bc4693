#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use skill_shadow::config::SkillShadowConfig;
use skill_shadow::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use skill_shadow::server::{create_router, AppState};
use tower::ServiceExt; // for oneshot

/// Deterministic bag-of-words embedder: each lowercase word bumps one bucket, then the
/// vector is L2-normalized. Texts sharing words land close together.
pub struct HashingEmbedder {
    pub dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dims: EMBEDDING_DIM,
        }
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let bucket = fnv1a(&word.to_lowercase()) as usize % self.dims;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

/// Config whose data directory lives under `root`.
pub fn test_config(root: &Path) -> SkillShadowConfig {
    let mut config = SkillShadowConfig::default();
    config.storage.data_dir = root.join("data").to_string_lossy().into_owned();
    config
}

/// Open the service context over `root` with the hashing embedder.
pub fn test_state(root: &Path) -> Arc<AppState> {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbedder::default());
    Arc::new(AppState::open(&test_config(root), embedder).unwrap())
}

pub fn test_router(root: &Path) -> (Arc<AppState>, Router) {
    let state = test_state(root);
    let router = create_router(Arc::clone(&state));
    (state, router)
}

pub fn trace_body(error_signature: &str, summary: &str, files: &[&str]) -> serde_json::Value {
    serde_json::json!({
        "error_signature": error_signature,
        "summary": summary,
        "files_changed": files,
        "author": "tester",
    })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

pub async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}

pub async fn post_json(
    router: &Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap();
    send(router, request).await
}

pub async fn save(router: &Router, error_signature: &str, summary: &str) {
    let (status, body) = post_json(router, "/trace", &trace_body(error_signature, summary, &[])).await;
    assert_eq!(status, StatusCode::OK, "save failed: {body}");
}
