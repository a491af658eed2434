//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the engine to external systems:
//! - `ai` - LLM providers (OpenAI-compatible, mock)
//! - `http` - REST surface over the flow engine
//! - `memory` - In-process repositories and recorder
//! - `postgres` - Session and message storage
//! - `recorder` - File-backed interaction audit log
//! - `retrieval` - Knowledge retrieval service client
//! - `yaml` - Template and role catalogs loaded from disk

pub mod ai;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod recorder;
pub mod retrieval;
pub mod yaml;
