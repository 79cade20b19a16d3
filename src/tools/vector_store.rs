//! Retrieval search tools
//!
//! These tools let the model search the ground-truth and archived
//! conversation corpora mid-turn. They execute synchronously against the
//! bound retrieval store and the agent loop continues afterwards.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::retrieval::RetrievalStore;

use super::types::{object_schema, SearchCorpus, ToolCallEvent, ToolSpec};

/// A search tool bound to one retrieval corpus.
pub struct VectorStoreTool {
    corpus: SearchCorpus,
    store: Arc<dyn RetrievalStore>,
}

impl VectorStoreTool {
    /// Bind a search tool to a store.
    pub fn new(corpus: SearchCorpus, store: Arc<dyn RetrievalStore>) -> Self {
        Self { corpus, store }
    }

    /// Which corpus this tool searches.
    pub fn corpus(&self) -> SearchCorpus {
        self.corpus
    }

    /// The descriptor sent to the model.
    pub fn spec(&self) -> ToolSpec {
        let description = match self.corpus {
            SearchCorpus::GroundTruth => {
                "Search the ground truth vector store database for content relevant to the query"
            }
            SearchCorpus::Conversation => {
                "Search the conversation vector store database for content relevant to the query"
            }
        };
        ToolSpec::new(
            self.corpus.tool_name(),
            description,
            object_schema(
                &[(
                    "query",
                    "string",
                    "The query to search the vector store database for",
                )],
                &["query"],
            ),
        )
    }

    /// Execute a search, producing one completed event per result.
    pub async fn execute(&self, query: &str) -> Result<Vec<ToolCallEvent>> {
        let start = Utc::now();
        let results = self.store.search(query).await?;
        let end = Utc::now();
        debug!(
            tool = self.corpus.tool_name(),
            results = results.len(),
            "Vector store search completed"
        );
        Ok(results
            .into_iter()
            .map(|result| {
                ToolCallEvent::completed(
                    self.corpus.tool_name(),
                    json!({ "query": query }),
                    &result,
                    start,
                    end,
                )
            })
            .collect())
    }
}
