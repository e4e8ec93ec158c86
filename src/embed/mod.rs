//! Embedding pipeline: chunk every body lacking vectors and drive the
//! LLM provider to fill them in.

use crate::error::Result;
use crate::llm::{EmbedOptions, LLMProvider};
use crate::store::chunker::{chunk_document, Chunk};
use crate::store::Store;
use futures::future::join_all;
use log::{info, warn};
use std::time::Instant;

/// How many embedding requests are in flight at once.
pub const EMBED_BATCH_SIZE: usize = 5;

/// Progress snapshot reported after every chunk.
#[derive(Debug, Clone, Default)]
pub struct EmbedProgress {
    pub bytes_done: usize,
    pub bytes_total: usize,
    pub chunks_done: usize,
    pub chunks_total: usize,
    pub bytes_per_sec: f64,
}

/// Outcome of one embedding run. Provider failures are tallied, never
/// fatal for the run.
#[derive(Debug, Default, PartialEq)]
pub struct EmbedOutcome {
    pub docs_embedded: usize,
    pub chunks_embedded: usize,
    pub errors: usize,
    pub skipped_empty: usize,
}

struct PlannedChunk {
    hash: String,
    title: String,
    chunk: Chunk,
}

pub struct Embedder<'a> {
    store: &'a Store,
    llm: &'a dyn LLMProvider,
    chunk_bytes: usize,
}

impl<'a> Embedder<'a> {
    pub fn new(store: &'a Store, llm: &'a dyn LLMProvider, chunk_bytes: usize) -> Self {
        Self {
            store,
            llm,
            chunk_bytes,
        }
    }

    /// Embed every hash that has an active document but no vectors for
    /// `model`. `force` purges all existing vectors first.
    pub async fn embed_documents(
        &self,
        model: &str,
        force: bool,
        progress: Option<&(dyn Fn(&EmbedProgress) + '_)>,
    ) -> Result<EmbedOutcome> {
        if force {
            info!("force: purging existing vectors");
            self.store.vectors().purge()?;
        }

        let targets = self.store.vectors().pending_targets(model)?;
        let mut outcome = EmbedOutcome::default();

        let mut plan: Vec<PlannedChunk> = Vec::new();
        let mut bytes_total = 0usize;
        for (hash, body, _path, title) in &targets {
            if body.is_empty() {
                outcome.skipped_empty += 1;
                continue;
            }
            bytes_total += body.len();
            outcome.docs_embedded += 1;
            for chunk in chunk_document(body, self.chunk_bytes) {
                plan.push(PlannedChunk {
                    hash: hash.clone(),
                    title: title.clone(),
                    chunk,
                });
            }
        }

        if plan.is_empty() {
            return Ok(outcome);
        }

        info!(
            "Embedding {} chunks across {} documents with {model}",
            plan.len(),
            outcome.docs_embedded
        );

        let mut state = ProgressState::new(bytes_total, plan.len());

        // The first chunk runs alone: its dimensionality sizes the KNN
        // table before anything is written.
        let mut dim_ready = self.store.vectors().dimension()?.is_some();
        let mut rest = &plan[..];
        if !dim_ready {
            let first = &plan[0];
            match self.embed_chunk(first, model).await {
                Some(embedding) => {
                    self.store.vectors().ensure_vec_table(embedding.len())?;
                    dim_ready = true;
                    self.write_chunk(first, model, &embedding, &mut outcome)?;
                }
                None => outcome.errors += 1,
            }
            state.tick(&plan[0].chunk, progress);
            rest = &plan[1..];
        }

        for batch in rest.chunks(EMBED_BATCH_SIZE) {
            let responses =
                join_all(batch.iter().map(|planned| self.embed_chunk(planned, model))).await;

            // Results come back in hand before anything touches the store
            for (planned, embedding) in batch.iter().zip(responses) {
                match embedding {
                    Some(embedding) if dim_ready => {
                        self.write_chunk(planned, model, &embedding, &mut outcome)?;
                    }
                    Some(embedding) => {
                        self.store.vectors().ensure_vec_table(embedding.len())?;
                        dim_ready = true;
                        self.write_chunk(planned, model, &embedding, &mut outcome)?;
                    }
                    None => outcome.errors += 1,
                }
                state.tick(&planned.chunk, progress);
            }
        }

        Ok(outcome)
    }

    async fn embed_chunk(&self, planned: &PlannedChunk, model: &str) -> Option<Vec<f32>> {
        let opts = EmbedOptions {
            model: model.to_string(),
            is_query: false,
            title: Some(planned.title.clone()),
        };
        self.llm
            .embed(&planned.chunk.text, &opts)
            .await
            .map(|r| r.embedding)
    }

    fn write_chunk(
        &self,
        planned: &PlannedChunk,
        model: &str,
        embedding: &[f32],
        outcome: &mut EmbedOutcome,
    ) -> Result<()> {
        match self.store.vectors().insert(
            &planned.hash,
            planned.chunk.seq,
            planned.chunk.pos,
            model,
            embedding,
        ) {
            Ok(()) => outcome.chunks_embedded += 1,
            Err(e) => {
                warn!(
                    "vector write failed for {}#{}: {e}",
                    planned.hash, planned.chunk.seq
                );
                outcome.errors += 1;
            }
        }
        Ok(())
    }
}

struct ProgressState {
    started: Instant,
    snapshot: EmbedProgress,
}

impl ProgressState {
    fn new(bytes_total: usize, chunks_total: usize) -> Self {
        Self {
            started: Instant::now(),
            snapshot: EmbedProgress {
                bytes_total,
                chunks_total,
                ..Default::default()
            },
        }
    }

    fn tick(&mut self, chunk: &Chunk, progress: Option<&(dyn Fn(&EmbedProgress) + '_)>) {
        self.snapshot.chunks_done += 1;
        self.snapshot.bytes_done += chunk.text.len();
        let elapsed = self.started.elapsed().as_secs_f64();
        self.snapshot.bytes_per_sec = if elapsed > 0.0 {
            self.snapshot.bytes_done as f64 / elapsed
        } else {
            0.0
        };
        if let Some(report) = progress {
            report(&self.snapshot);
        }
    }
}
