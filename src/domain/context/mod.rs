//! Context resolution for flow steps.

mod resolver;

pub use resolver::{ContextFragment, ContextResolver};
