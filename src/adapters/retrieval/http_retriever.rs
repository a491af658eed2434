//! HTTP knowledge retriever.
//!
//! Posts the query as JSON to `<base_url>/retrieve` and expects
//! `{"excerpts": [{"content": "...", "score": 0.8, "source": "..."}]}`.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::prompt::RetrievedExcerpt;
use crate::ports::{KnowledgeRetriever, RetrievalError, RetrievalQuery};

/// Retriever that talks to a JSON-over-HTTP search service.
pub struct HttpKnowledgeRetriever {
    client: Client,
    base_url: String,
    api_key: Option<Secret<String>>,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    excerpts: Vec<RetrievedExcerpt>,
}

impl HttpKnowledgeRetriever {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<Secret<String>>,
        timeout: Duration,
    ) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn retrieve_url(&self) -> String {
        format!("{}/retrieve", self.base_url)
    }
}

#[async_trait]
impl KnowledgeRetriever for HttpKnowledgeRetriever {
    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RetrievedExcerpt>, RetrievalError> {
        let mut request = self.client.post(self.retrieve_url()).json(query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                RetrievalError::Timeout
            } else {
                RetrievalError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Unavailable(format!("status {}", status)));
        }

        let body: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| RetrievalError::InvalidResponse(e.to_string()))?;

        let mut excerpts = body.excerpts;
        excerpts.sort_by(|a, b| b.score.total_cmp(&a.score));
        excerpts.truncate(query.top_k);
        Ok(excerpts)
    }
}
