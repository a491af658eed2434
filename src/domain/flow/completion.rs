//! Named completion predicates.
//!
//! A template's completion predicate is evaluated only when the sequence runs
//! out of steps. Predicates come from a small fixed registry rather than
//! arbitrary expressions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Facts about a session the predicates may inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionFacts {
    /// Round the session is in (1-based).
    pub current_round: u32,
    /// Messages persisted for the session, including the one just produced.
    pub message_count: usize,
}

/// Registered completion predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompletionPredicate {
    /// Reaching the end of the sequence completes the session.
    #[default]
    Always,
    /// The session never completes automatically.
    Never,
    /// Complete once the session has reached at least this round.
    MinRounds(u32),
    /// Complete once at least this many messages exist.
    MinMessages(usize),
}

impl CompletionPredicate {
    /// Evaluates the predicate.
    pub fn is_satisfied(&self, facts: &CompletionFacts) -> bool {
        match self {
            CompletionPredicate::Always => true,
            CompletionPredicate::Never => false,
            CompletionPredicate::MinRounds(n) => facts.current_round >= *n,
            CompletionPredicate::MinMessages(n) => facts.message_count >= *n,
        }
    }
}

impl fmt::Display for CompletionPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompletionPredicate::Always => write!(f, "always"),
            CompletionPredicate::Never => write!(f, "never"),
            CompletionPredicate::MinRounds(n) => write!(f, "min_rounds:{}", n),
            CompletionPredicate::MinMessages(n) => write!(f, "min_messages:{}", n),
        }
    }
}

impl FromStr for CompletionPredicate {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::invalid_format("completion", reason);

        let (name, arg) = match s.trim().split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (s.trim(), None),
        };

        match (name, arg) {
            ("always", None) => Ok(CompletionPredicate::Always),
            ("never", None) => Ok(CompletionPredicate::Never),
            ("min_rounds", Some(n)) => n
                .parse()
                .map(CompletionPredicate::MinRounds)
                .map_err(|_| invalid("min_rounds expects an integer")),
            ("min_messages", Some(n)) => n
                .parse()
                .map(CompletionPredicate::MinMessages)
                .map_err(|_| invalid("min_messages expects an integer")),
            _ => Err(invalid(&format!("unknown predicate '{}'", s.trim()))),
        }
    }
}

impl TryFrom<String> for CompletionPredicate {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompletionPredicate> for String {
    fn from(p: CompletionPredicate) -> Self {
        p.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(round: u32, messages: usize) -> CompletionFacts {
        CompletionFacts {
            current_round: round,
            message_count: messages,
        }
    }

    #[test]
    fn parses_registered_names() {
        assert_eq!("always".parse(), Ok(CompletionPredicate::Always));
        assert_eq!("never".parse(), Ok(CompletionPredicate::Never));
        assert_eq!("min_rounds:2".parse(), Ok(CompletionPredicate::MinRounds(2)));
        assert_eq!(
            "min_messages: 6".parse(),
            Ok(CompletionPredicate::MinMessages(6))
        );
    }

    #[test]
    fn rejects_unknown_or_malformed() {
        assert!("sometimes".parse::<CompletionPredicate>().is_err());
        assert!("min_rounds:two".parse::<CompletionPredicate>().is_err());
        assert!("min_rounds".parse::<CompletionPredicate>().is_err());
    }

    #[test]
    fn evaluates_against_facts() {
        assert!(CompletionPredicate::Always.is_satisfied(&facts(1, 0)));
        assert!(!CompletionPredicate::Never.is_satisfied(&facts(9, 99)));
        assert!(!CompletionPredicate::MinRounds(2).is_satisfied(&facts(1, 10)));
        assert!(CompletionPredicate::MinRounds(2).is_satisfied(&facts(2, 10)));
        assert!(CompletionPredicate::MinMessages(3).is_satisfied(&facts(1, 3)));
    }

    #[test]
    fn display_round_trips() {
        for p in [
            CompletionPredicate::Always,
            CompletionPredicate::Never,
            CompletionPredicate::MinRounds(3),
            CompletionPredicate::MinMessages(4),
        ] {
            assert_eq!(p.to_string().parse::<CompletionPredicate>().unwrap(), p);
        }
    }
}
