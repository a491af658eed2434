//! YAML-backed role and template catalogs.
//!
//! Templates live one per file in a directory:
//!
//! ```text
//! templates/
//!   panel.yaml
//!   interview.yaml
//! ```
//!
//! Roles live together in a single file with a top-level `roles` list. Both
//! are read once at startup and validated before the server accepts traffic.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::domain::flow::{FlowTemplate, RoleProfile};
use crate::domain::foundation::{DomainError, ErrorCode, RoleName, TemplateId};
use crate::ports::{RoleRepository, TemplateRepository};

fn storage_error(path: &Path, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::StorageError, format!("Failed to read {}: {}", path.display(), err))
        .with_detail("path", path.display().to_string())
}

fn invalid(path: &Path, err: impl std::fmt::Display) -> DomainError {
    DomainError::new(ErrorCode::ValidationFailed, format!("{}: {}", path.display(), err))
        .with_detail("path", path.display().to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────────────────────────────────────

/// Flow templates loaded from `*.yaml` / `*.yml` files in a directory.
#[derive(Debug)]
pub struct YamlTemplateRepository {
    dir: PathBuf,
    templates: BTreeMap<TemplateId, Arc<FlowTemplate>>,
}

impl YamlTemplateRepository {
    /// Reads and validates every template file in `dir`.
    ///
    /// # Errors
    ///
    /// - `StorageError` if the directory or a file cannot be read
    /// - `ValidationFailed` if a template is malformed or two files share an id
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let dir = dir.as_ref().to_path_buf();
        let mut entries = fs::read_dir(&dir).await.map_err(|e| storage_error(&dir, e))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| storage_error(&dir, e))? {
            let path = entry.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut templates = BTreeMap::new();
        for path in paths {
            let raw = fs::read_to_string(&path)
                .await
                .map_err(|e| storage_error(&path, e))?;
            let template: FlowTemplate = serde_yaml::from_str(&raw).map_err(|e| invalid(&path, e))?;

            let id = template.id().clone();
            if templates.insert(id.clone(), Arc::new(template)).is_some() {
                return Err(invalid(&path, format!("duplicate template id '{}'", id)));
            }
            tracing::debug!(template_id = %id, path = %path.display(), "template loaded");
        }

        tracing::info!(dir = %dir.display(), count = templates.len(), "flow templates loaded");
        Ok(Self { dir, templates })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TemplateRepository for YamlTemplateRepository {
    async fn find(&self, id: &TemplateId) -> Result<Option<Arc<FlowTemplate>>, DomainError> {
        Ok(self.templates.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<Arc<FlowTemplate>>, DomainError> {
        Ok(self.templates.values().cloned().collect())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RolesFile {
    roles: Vec<RoleEntry>,
}

#[derive(Debug, Deserialize)]
struct RoleEntry {
    name: RoleName,
    instructions: String,
}

/// Role profiles loaded from a single YAML file.
#[derive(Debug)]
pub struct YamlRoleRepository {
    roles: BTreeMap<RoleName, RoleProfile>,
}

impl YamlRoleRepository {
    /// Reads and validates the roles file at `path`.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .await
            .map_err(|e| storage_error(path, e))?;
        let file: RolesFile = serde_yaml::from_str(&raw).map_err(|e| invalid(path, e))?;

        let mut roles = BTreeMap::new();
        for entry in file.roles {
            let profile =
                RoleProfile::new(entry.name, entry.instructions).map_err(|e| invalid(path, e))?;
            let name = profile.name.clone();
            if roles.insert(name.clone(), profile).is_some() {
                return Err(invalid(path, format!("duplicate role '{}'", name)));
            }
        }

        tracing::info!(path = %path.display(), count = roles.len(), "roles loaded");
        Ok(Self { roles })
    }
}

#[async_trait]
impl RoleRepository for YamlRoleRepository {
    async fn find(&self, name: &RoleName) -> Result<Option<RoleProfile>, DomainError> {
        Ok(self.roles.get(name).cloned())
    }

    async fn list(&self) -> Result<Vec<RoleProfile>, DomainError> {
        Ok(self.roles.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::flow::{CompletionPredicate, ContextScope};
    use tempfile::TempDir;

    const PANEL: &str = r#"
id: panel
name: Expert panel
completion: "min_rounds:1"
steps:
  - id: open
    order: 1
    speaker: host
    task_type: introduce
  - id: answer
    order: 2
    speaker: guest
    target: host
    task_type: answer_question
    context_scope: last_message
"#;

    async fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).await.unwrap();
    }

    #[tokio::test]
    async fn loads_templates_from_directory() {
        let dir = TempDir::new().unwrap();
        write(&dir, "panel.yaml", PANEL).await;
        write(&dir, "notes.txt", "ignored").await;

        let repo = YamlTemplateRepository::load(dir.path()).await.unwrap();
        let template = repo
            .find(&TemplateId::new("panel").unwrap())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(template.total_steps(), 2);
        assert_eq!(template.completion(), CompletionPredicate::MinRounds(1));
        assert_eq!(template.steps()[1].context_scope, ContextScope::LastMessage);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejects_template_with_non_increasing_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "bad.yaml", &PANEL.replace("order: 2", "order: 1")).await;

        let err = YamlTemplateRepository::load(dir.path()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("bad.yaml"));
    }

    #[tokio::test]
    async fn rejects_duplicate_template_ids() {
        let dir = TempDir::new().unwrap();
        write(&dir, "a.yaml", PANEL).await;
        write(&dir, "b.yml", PANEL).await;

        let err = YamlTemplateRepository::load(dir.path()).await.unwrap_err();
        assert!(err.message.contains("duplicate template id"));
    }

    #[tokio::test]
    async fn unknown_task_type_is_accepted_at_load() {
        let dir = TempDir::new().unwrap();
        write(&dir, "panel.yaml", &PANEL.replace("task_type: introduce", "task_type: juggle")).await;

        assert!(YamlTemplateRepository::load(dir.path()).await.is_ok());
    }

    #[tokio::test]
    async fn missing_directory_is_storage_error() {
        let dir = TempDir::new().unwrap();
        let err = YamlTemplateRepository::load(dir.path().join("nope"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::StorageError);
    }

    #[tokio::test]
    async fn loads_roles_file() {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "roles.yaml",
            "roles:\n  - name: host\n    instructions: Moderate.\n  - name: guest\n    instructions: Answer.\n",
        )
        .await;

        let repo = YamlRoleRepository::load(dir.path().join("roles.yaml")).await.unwrap();
        let host = repo.find(&RoleName::new("host").unwrap()).await.unwrap().unwrap();
        assert_eq!(host.instructions, "Moderate.");
        assert_eq!(repo.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_role_instructions_are_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "roles.yaml", "roles:\n  - name: host\n    instructions: \"  \"\n").await;

        let err = YamlRoleRepository::load(dir.path().join("roles.yaml"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
