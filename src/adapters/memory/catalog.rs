//! In-memory role and template catalogs.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::flow::{FlowTemplate, RoleProfile};
use crate::domain::foundation::{DomainError, RoleName, TemplateId};
use crate::ports::{RoleRepository, TemplateRepository};

/// Roles held in memory, keyed by name.
#[derive(Default)]
pub struct InMemoryRoleRepository {
    roles: RwLock<BTreeMap<RoleName, RoleProfile>>,
}

impl InMemoryRoleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: impl IntoIterator<Item = RoleProfile>) -> Self {
        let map = roles.into_iter().map(|r| (r.name.clone(), r)).collect();
        Self {
            roles: RwLock::new(map),
        }
    }

    /// Adds or replaces a role.
    pub async fn insert(&self, role: RoleProfile) {
        self.roles.write().await.insert(role.name.clone(), role);
    }
}

#[async_trait]
impl RoleRepository for InMemoryRoleRepository {
    async fn find(&self, name: &RoleName) -> Result<Option<RoleProfile>, DomainError> {
        Ok(self.roles.read().await.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<RoleProfile>, DomainError> {
        Ok(self.roles.read().await.values().cloned().collect())
    }
}

/// Templates held in memory, keyed by id.
#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: RwLock<BTreeMap<TemplateId, Arc<FlowTemplate>>>,
}

impl InMemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_templates(templates: impl IntoIterator<Item = FlowTemplate>) -> Self {
        let map = templates
            .into_iter()
            .map(|t| (t.id().clone(), Arc::new(t)))
            .collect();
        Self {
            templates: RwLock::new(map),
        }
    }

    pub async fn insert(&self, template: FlowTemplate) {
        self.templates
            .write()
            .await
            .insert(template.id().clone(), Arc::new(template));
    }
}

#[async_trait]
impl TemplateRepository for InMemoryTemplateRepository {
    async fn find(&self, id: &TemplateId) -> Result<Option<Arc<FlowTemplate>>, DomainError> {
        Ok(self.templates.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Arc<FlowTemplate>>, DomainError> {
        Ok(self.templates.read().await.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::FlowStep;
    use crate::domain::foundation::StepId;

    #[tokio::test]
    async fn roles_are_found_by_name() {
        let repo = InMemoryRoleRepository::with_roles([RoleProfile::new(
            RoleName::new("host").unwrap(),
            "Keep the discussion moving.",
        )
        .unwrap()]);

        assert!(repo.find(&RoleName::new("host").unwrap()).await.unwrap().is_some());
        assert!(repo.find(&RoleName::new("guest").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn templates_list_in_id_order() {
        let step = FlowStep::new(
            StepId::new("open").unwrap(),
            1,
            RoleName::new("host").unwrap(),
            "introduce",
        );
        let make = |id: &str| {
            FlowTemplate::new(
                TemplateId::new(id).unwrap(),
                id,
                vec![step.clone()],
                Default::default(),
            )
            .unwrap()
        };
        let repo = InMemoryTemplateRepository::with_templates([make("b"), make("a")]);

        let ids: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .iter()
            .map(|t| t.id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
