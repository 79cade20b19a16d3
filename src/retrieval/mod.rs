//! Retrieval store collaborator
//!
//! This module defines the `RetrievalStore` trait — the narrow search/update
//! interface the core uses for both retrieval-augmented context and archival
//! of evicted conversation content — plus an HTTP implementation that talks
//! to a vector-store service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DoppelError, Result};

/// Search/update interface to a vector or text index.
///
/// Implementations are shared across all conversations and must tolerate
/// concurrent `search` and `update` calls.
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Search the index for content relevant to the query.
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Index a new document. Stores that forbid writes may no-op.
    async fn update(&self, document: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    n_results: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    text: String,
}

#[derive(Serialize)]
struct UpdateRequest<'a> {
    document: &'a str,
}

/// HTTP client for a vector-store service.
///
/// Wire format: `POST {endpoint}/api/search` with `{query, n_results}`
/// returning `{results: [{text}, ...]}`, and `POST {endpoint}/api/update`
/// with `{document}`.
pub struct HttpRetrievalStore {
    endpoint: String,
    n_results: usize,
    client: reqwest::Client,
}

impl HttpRetrievalStore {
    /// Create a new store client for the given endpoint.
    ///
    /// # Arguments
    /// * `endpoint` - Base URL of the vector-store service
    /// * `n_results` - Number of results to request per search
    pub fn new(endpoint: &str, n_results: usize) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            n_results,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RetrievalStore for HttpRetrievalStore {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        debug!(endpoint = %self.endpoint, query_len = query.len(), "Retrieval search");
        let response = self
            .client
            .post(format!("{}/api/search", self.endpoint))
            .json(&SearchRequest {
                query,
                n_results: self.n_results,
            })
            .send()
            .await
            .map_err(|e| DoppelError::Retrieval(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoppelError::Retrieval(format!(
                "search returned HTTP {}: {}",
                status, body
            )));
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| DoppelError::Retrieval(format!("malformed search response: {}", e)))?;

        Ok(parsed.results.into_iter().map(|r| r.text).collect())
    }

    async fn update(&self, document: &str) -> Result<()> {
        debug!(endpoint = %self.endpoint, document_len = document.len(), "Retrieval update");
        let response = self
            .client
            .post(format!("{}/api/update", self.endpoint))
            .json(&UpdateRequest { document })
            .send()
            .await
            .map_err(|e| DoppelError::Retrieval(format!("update request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DoppelError::Retrieval(format!(
                "update returned HTTP {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// In-memory retrieval store.
///
/// Substring-match search over stored documents. Useful as an offline
/// stand-in for a real vector store and as a test double; archival writes
/// land in `documents` in insertion order, which is what the no-loss
/// eviction tests assert against.
#[derive(Default)]
pub struct MemoryRetrievalStore {
    /// Stored documents, in the order they were written.
    pub documents: std::sync::Mutex<Vec<String>>,
}

impl MemoryRetrievalStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored documents, in write order.
    pub fn snapshot(&self) -> Vec<String> {
        self.documents.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalStore for MemoryRetrievalStore {
    async fn search(&self, query: &str) -> Result<Vec<String>> {
        let docs = self.documents.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|d| d.contains(query))
            .cloned()
            .collect())
    }

    async fn update(&self, document: &str) -> Result<()> {
        self.documents.lock().unwrap().push(document.to_string());
        Ok(())
    }
}
