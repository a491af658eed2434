//! Context scope: which prior messages a step may see.
//!
//! Templates write scopes either as a keyword string or as a list of role names:
//!
//! ```yaml
//! context_scope: last_round
//! context_scope: [Analyst, Critic]
//! context_scope: "Analyst, Critic"
//! context_scope: preset-topic
//! ```
//!
//! A string is read as a keyword first. Roles whose names collide with a
//! keyword (`all`, `none`, `roles`, `last-round`, ...) must use the list form.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{RoleName, ValidationError};

/// Rule selecting the prior messages visible to a step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawScope", into = "RawScope")]
pub enum ContextScope {
    #[default]
    None,
    LastMessage,
    LastRound,
    All,
    /// Most recent message of each listed role, in list order.
    ///
    /// An empty list means "take the roles from `ContextParam::roles`".
    Roles(Vec<RoleName>),
    PresetTopic,
}

impl ContextScope {
    /// Parses a keyword or a comma-separated list of role names.
    ///
    /// # Errors
    ///
    /// - `InvalidFormat` when a name in the comma list is a scope keyword
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if let Some(scope) = Self::keyword(trimmed) {
            return Ok(scope);
        }
        let roles = trimmed
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| match Self::keyword(part) {
                Some(_) => Err(ValidationError::invalid_format(
                    "context_scope",
                    format!("'{part}' is a scope keyword; list such roles in YAML list form"),
                )),
                None => RoleName::new(part),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ContextScope::Roles(roles))
    }

    fn keyword(word: &str) -> Option<Self> {
        let scope = match word.to_ascii_lowercase().replace('-', "_").as_str() {
            "" | "none" => ContextScope::None,
            "last_message" => ContextScope::LastMessage,
            "last_round" => ContextScope::LastRound,
            "all" | "all_context" => ContextScope::All,
            "preset_topic" => ContextScope::PresetTopic,
            "roles" => ContextScope::Roles(Vec::new()),
            _ => return None,
        };
        Some(scope)
    }

    /// Builds a role scope from a list of names.
    pub fn roles<I, S>(names: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles = names
            .into_iter()
            .map(RoleName::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ContextScope::Roles(roles))
    }
}

impl fmt::Display for ContextScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextScope::None => write!(f, "none"),
            ContextScope::LastMessage => write!(f, "last_message"),
            ContextScope::LastRound => write!(f, "last_round"),
            ContextScope::All => write!(f, "all"),
            ContextScope::PresetTopic => write!(f, "preset_topic"),
            ContextScope::Roles(roles) if roles.is_empty() => write!(f, "roles"),
            ContextScope::Roles(roles) => {
                let names: Vec<&str> = roles.iter().map(RoleName::as_str).collect();
                write!(f, "{}", names.join(", "))
            }
        }
    }
}

/// Serialized shape of a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawScope {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<RawScope> for ContextScope {
    type Error = ValidationError;

    fn try_from(raw: RawScope) -> Result<Self, Self::Error> {
        match raw {
            RawScope::Keyword(s) => ContextScope::parse(&s),
            RawScope::List(names) => ContextScope::roles(names),
        }
    }
}

impl From<ContextScope> for RawScope {
    fn from(scope: ContextScope) -> Self {
        match scope {
            ContextScope::Roles(roles) if !roles.is_empty() => {
                RawScope::List(roles.into_iter().map(String::from).collect())
            }
            other => RawScope::Keyword(other.to_string()),
        }
    }
}

/// Scope-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContextParam {
    /// Fixed topic text for the preset-topic scope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Role list for the `roles` keyword scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<RoleName>,
}

impl ContextParam {
    /// Parameter carrying only a preset topic.
    pub fn topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            roles: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords() {
        assert_eq!(ContextScope::parse("none").unwrap(), ContextScope::None);
        assert_eq!(ContextScope::parse("").unwrap(), ContextScope::None);
        assert_eq!(
            ContextScope::parse("last_message").unwrap(),
            ContextScope::LastMessage
        );
        assert_eq!(
            ContextScope::parse("last-round").unwrap(),
            ContextScope::LastRound
        );
        assert_eq!(ContextScope::parse("ALL").unwrap(), ContextScope::All);
        assert_eq!(
            ContextScope::parse("preset-topic").unwrap(),
            ContextScope::PresetTopic
        );
    }

    #[test]
    fn all_context_is_an_alias_for_all() {
        assert_eq!(ContextScope::parse("all-context").unwrap(), ContextScope::All);
        assert_eq!(ContextScope::parse("all_context").unwrap(), ContextScope::All);
    }

    #[test]
    fn comma_separated_names_become_role_scope_in_order() {
        let scope = ContextScope::parse("Critic, Analyst").unwrap();
        assert_eq!(scope, ContextScope::roles(["Critic", "Analyst"]).unwrap());
    }

    #[test]
    fn keyword_inside_comma_list_is_rejected() {
        let err = ContextScope::parse("Critic, All").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
        assert!(ContextScope::parse("none,Analyst").is_err());
    }

    #[test]
    fn list_form_allows_roles_named_like_keywords() {
        let scope: ContextScope = serde_yaml::from_str("[All, roles]").unwrap();
        assert_eq!(scope, ContextScope::roles(["All", "roles"]).unwrap());

        let single: ContextScope = serde_yaml::from_str("[None]").unwrap();
        assert_eq!(single, ContextScope::roles(["None"]).unwrap());

        let keyword: ContextScope = serde_yaml::from_str("None").unwrap();
        assert_eq!(keyword, ContextScope::None);
    }

    #[test]
    fn deserializes_list_form_from_yaml() {
        let scope: ContextScope = serde_yaml::from_str("[A, B]").unwrap();
        assert_eq!(scope, ContextScope::roles(["A", "B"]).unwrap());
    }

    #[test]
    fn serializes_role_scope_as_list() {
        let scope = ContextScope::roles(["A"]).unwrap();
        assert_eq!(serde_json::to_string(&scope).unwrap(), "[\"A\"]");
        assert_eq!(
            serde_json::to_string(&ContextScope::LastRound).unwrap(),
            "\"last_round\""
        );
    }

    #[test]
    fn context_param_defaults_are_empty() {
        let param: ContextParam = serde_yaml::from_str("{}").unwrap();
        assert_eq!(param, ContextParam::default());
    }
}
