//! Deterministic provider for tests.

use super::{
    EmbedOptions, EmbedResponse, GenerateOptions, GenerateResponse, LLMProvider, ModelInfo,
};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// Test double: embeddings are derived from the input hash so equal
/// texts embed equally, and generation answers come from a canned map.
pub struct MockProvider {
    pub dimension: usize,
    /// Substring of the prompt -> canned response text
    responses: Mutex<HashMap<String, String>>,
    /// When false, every call returns None (provider outage)
    pub available: bool,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(8)
    }
}

impl MockProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            responses: Mutex::new(HashMap::new()),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(8)
        }
    }

    /// Canned response for any prompt containing `needle`.
    pub fn respond_with(&self, needle: &str, response: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(needle.to_string(), response.to_string());
    }

    /// Unit vector seeded from the text bytes.
    fn embed_text(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut v: Vec<f32> = (0..self.dimension)
            .map(|i| f32::from(digest[i % digest.len()]) / 255.0)
            .collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl LLMProvider for MockProvider {
    async fn embed(&self, text: &str, opts: &EmbedOptions) -> Option<EmbedResponse> {
        if !self.available {
            return None;
        }
        Some(EmbedResponse {
            embedding: self.embed_text(text),
            model: opts.model.clone(),
        })
    }

    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Option<GenerateResponse> {
        if !self.available {
            return None;
        }
        let responses = self.responses.lock().unwrap();
        let text = responses
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())?;
        Some(GenerateResponse {
            text,
            logprobs: Vec::new(),
            done: true,
        })
    }

    async fn model_exists(&self, model: &str) -> ModelInfo {
        ModelInfo {
            name: model.to_string(),
            exists: self.available,
            size: None,
            modified_at: None,
        }
    }

    async fn pull_model(&self, _model: &str) -> bool {
        self.available
    }
}
