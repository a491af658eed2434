//! Knowledge retrieval adapters.

mod http_retriever;

pub use http_retriever::HttpKnowledgeRetriever;
