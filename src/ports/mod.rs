//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Generation
//!
//! - `LlmProvider` - Language model completions, with classified errors
//! - `KnowledgeRetriever` - Optional dataset excerpts for prompt augmentation
//!
//! ## Persistence
//!
//! - `SessionRepository` - Sessions and their append-only messages
//! - `RoleRepository` / `TemplateRepository` - Read-only flow catalogs
//! - `InteractionRecorder` - Durable audit trail of provider interactions

mod flow_catalog;
mod interaction_recorder;
mod knowledge_retriever;
mod llm_provider;
mod session_repository;

pub use flow_catalog::{RoleRepository, TemplateRepository};
pub use interaction_recorder::{InteractionRecorder, RecorderError};
pub use knowledge_retriever::{KnowledgeRetriever, RetrievalError, RetrievalQuery};
pub use llm_provider::{
    Generation, GenerationOptions, LlmProvider, ProviderError, ProviderErrorKind, ProviderInfo,
    RequestMetadata, TokenUsage,
};
pub use session_repository::SessionRepository;
