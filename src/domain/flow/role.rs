//! Role instruction profiles.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{RoleName, ValidationError};

/// A participant role and the instructions that shape how it speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleProfile {
    pub name: RoleName,
    pub instructions: String,
}

impl RoleProfile {
    /// Creates a profile, rejecting blank instructions.
    pub fn new(name: RoleName, instructions: impl Into<String>) -> Result<Self, ValidationError> {
        let instructions = instructions.into();
        if instructions.trim().is_empty() {
            return Err(ValidationError::empty_field("instructions"));
        }
        Ok(Self { name, instructions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_instructions_are_rejected() {
        let err = RoleProfile::new(RoleName::new("A").unwrap(), "  ").unwrap_err();
        assert_eq!(err, ValidationError::empty_field("instructions"));
    }
}
