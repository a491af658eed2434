//! HTTP adapter for flow session endpoints.

mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, JumpRequest, OpenSessionRequest};
pub use handlers::FlowAppState;
pub use routes::flow_router;
