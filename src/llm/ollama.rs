//! Ollama-compatible HTTP client.
//!
//! Speaks the `/api/embed`, `/api/generate`, `/api/tags`, and `/api/pull`
//! endpoints. Every transport or protocol failure is logged and mapped
//! to `None`; a missing model triggers exactly one pull-and-retry.

use super::{
    format_embedding_document, format_embedding_query, EmbedOptions, EmbedResponse,
    GenerateOptions, GenerateResponse, LLMProvider, ModelInfo, TokenLogprob,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::json;

pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbedBody {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    logprobs: Vec<LogprobBody>,
}

#[derive(Debug, Deserialize)]
struct LogprobBody {
    token: String,
    logprob: f64,
}

#[derive(Debug, Deserialize)]
struct TagsBody {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    modified_at: Option<String>,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Option<T> {
        let url = self.url(path);
        let response = match self.client.post(&url).json(body).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("{path} request failed: {e}");
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("{path} returned {status}: {text}");
            return None;
        }
        match response.json::<T>().await {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("{path} body malformed: {e}");
                None
            }
        }
    }

    async fn embed_once(&self, input: &str, model: &str) -> Option<EmbedResponse> {
        let body = json!({
            "model": model,
            "input": input,
        });
        let parsed: EmbedBody = self.post_json("/api/embed", &body).await?;
        let embedding = parsed.embeddings.into_iter().next()?;
        if embedding.is_empty() {
            warn!("/api/embed returned an empty vector");
            return None;
        }
        Some(EmbedResponse {
            embedding,
            model: parsed.model.unwrap_or_else(|| model.to_string()),
        })
    }

    async fn generate_once(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Option<GenerateResponse> {
        let mut body = json!({
            "model": opts.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": opts.max_tokens,
                "temperature": opts.temperature,
            },
        });
        if opts.raw {
            body["raw"] = json!(true);
        }
        if opts.logprobs {
            body["logprobs"] = json!(true);
        }
        if !opts.stop.is_empty() {
            body["options"]["stop"] = json!(opts.stop);
        }

        let parsed: GenerateBody = self.post_json("/api/generate", &body).await?;
        Some(GenerateResponse {
            text: parsed.response,
            logprobs: parsed
                .logprobs
                .into_iter()
                .map(|l| TokenLogprob {
                    token: l.token,
                    logprob: l.logprob,
                })
                .collect(),
            done: parsed.done,
        })
    }

    /// One pull-and-retry for a model the provider does not have yet.
    async fn pull_if_missing(&self, model: &str) -> bool {
        let info = self.model_exists(model).await;
        if info.exists {
            return false;
        }
        info!("model {model} not present, pulling");
        self.pull_model(model).await
    }
}

#[async_trait]
impl LLMProvider for OllamaClient {
    async fn embed(&self, text: &str, opts: &EmbedOptions) -> Option<EmbedResponse> {
        let input = if opts.is_query {
            format_embedding_query(text)
        } else {
            format_embedding_document(opts.title.as_deref(), text)
        };

        match self.embed_once(&input, &opts.model).await {
            Some(response) => Some(response),
            None => {
                if self.pull_if_missing(&opts.model).await {
                    self.embed_once(&input, &opts.model).await
                } else {
                    None
                }
            }
        }
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Option<GenerateResponse> {
        match self.generate_once(prompt, opts).await {
            Some(response) => Some(response),
            None => {
                if self.pull_if_missing(&opts.model).await {
                    self.generate_once(prompt, opts).await
                } else {
                    None
                }
            }
        }
    }

    async fn model_exists(&self, model: &str) -> ModelInfo {
        let absent = ModelInfo {
            name: model.to_string(),
            exists: false,
            size: None,
            modified_at: None,
        };

        let response = match self.client.get(self.url("/api/tags")).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("/api/tags request failed: {e}");
                return absent;
            }
        };
        let Ok(tags) = response.json::<TagsBody>().await else {
            return absent;
        };

        // "name" matches with or without an explicit tag suffix
        let found = tags.models.into_iter().find(|m| {
            m.name == model || m.name.split(':').next() == Some(model)
        });
        match found {
            Some(m) => ModelInfo {
                name: m.name,
                exists: true,
                size: m.size,
                modified_at: m.modified_at,
            },
            None => absent,
        }
    }

    async fn pull_model(&self, model: &str) -> bool {
        debug!("pulling model {model}");
        let body = json!({ "model": model, "stream": false });
        let response = match self
            .client
            .post(self.url("/api/pull"))
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("/api/pull request failed: {e}");
                return false;
            }
        };
        response.status().is_success()
    }
}
