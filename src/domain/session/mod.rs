//! Session domain module.
//!
//! A session is one run of a flow template. It owns the step cursor, the
//! round counter and the lifecycle status; messages are appended to it and
//! never changed afterwards.

mod aggregate;
mod message;

pub use aggregate::Session;
pub use message::{Message, MessageFilter};
