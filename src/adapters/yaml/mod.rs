//! YAML file adapters for flow definitions.

mod catalog;

pub use catalog::{YamlRoleRepository, YamlTemplateRepository};
