//! Knowledge retriever port.
//!
//! An external service that returns ranked dataset excerpts for a query.
//! Callers treat any failure as "no augmentation".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::prompt::RetrievedExcerpt;

/// Query sent to the retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    pub dataset_ids: Vec<String>,
    pub query: String,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

/// Retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RetrievalError {
    #[error("retriever unavailable: {0}")]
    Unavailable(String),

    #[error("invalid retriever response: {0}")]
    InvalidResponse(String),

    #[error("retrieval timed out")]
    Timeout,
}

/// Port for the knowledge retrieval service.
#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    /// Ranked excerpts for the query, best first. May be empty.
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievedExcerpt>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_retriever_is_object_safe() {
        fn _accepts_dyn(_retriever: &dyn KnowledgeRetriever) {}
    }

    #[test]
    fn query_omits_missing_min_score() {
        let query = RetrievalQuery {
            dataset_ids: vec!["ds-1".into()],
            query: "stents".into(),
            top_k: 3,
            min_score: None,
        };
        let json = serde_json::to_value(&query).unwrap();
        assert!(json.get("min_score").is_none());
        assert_eq!(json["top_k"], 3);
    }
}
