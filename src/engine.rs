//! Composition root: one `Engine` owns the store and the LLM client.
//! The CLI builds one per invocation and tears it down at exit; the
//! tool server keeps one for the session.

use crate::config::Config;
use crate::embed::Embedder;
use crate::error::Result;
use crate::index::{GlobWalker, IndexResult, Indexer, ProgressFn};
use crate::llm::OllamaClient;
use crate::search::SearchEngine;
use crate::store::Store;
use std::path::Path;

pub struct Engine {
    pub config: Config,
    pub store: Store,
    pub llm: OllamaClient,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.index_path())?;
        let llm = OllamaClient::new(config.llm_base_url.clone());
        Ok(Self { config, store, llm })
    }

    pub fn search(&self) -> SearchEngine<'_> {
        SearchEngine::new(&self.store, &self.llm, &self.config)
    }

    pub fn embedder(&self) -> Embedder<'_> {
        Embedder::new(&self.store, &self.llm, self.config.chunk_byte_size)
    }

    pub fn index_files(
        &self,
        pwd: &Path,
        glob: &str,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<IndexResult> {
        let walker = GlobWalker;
        let indexer = Indexer::new(&self.store, &walker, self.config.exclude_dirs.clone());
        indexer.index_files(pwd, glob, progress)
    }

    /// Close the store cleanly before process exit.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }
}
