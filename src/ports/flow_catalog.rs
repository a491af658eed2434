//! Read-only catalogs of roles and flow templates.

use crate::domain::flow::{FlowTemplate, RoleProfile};
use crate::domain::foundation::{DomainError, RoleName, TemplateId};
use async_trait::async_trait;
use std::sync::Arc;

/// Role name to instruction profile lookup.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Returns `None` if no role with this name is defined.
    async fn find(&self, name: &RoleName) -> Result<Option<RoleProfile>, DomainError>;

    /// All defined roles, sorted by name.
    async fn list(&self) -> Result<Vec<RoleProfile>, DomainError>;
}

/// Flow template lookup.
#[async_trait]
pub trait TemplateRepository: Send + Sync {
    /// Returns `None` if no template with this id exists.
    async fn find(&self, id: &TemplateId) -> Result<Option<Arc<FlowTemplate>>, DomainError>;

    /// All templates, sorted by id.
    async fn list(&self) -> Result<Vec<Arc<FlowTemplate>>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogs_are_object_safe() {
        fn _roles(_repo: &dyn RoleRepository) {}
        fn _templates(_repo: &dyn TemplateRepository) {}
    }
}
