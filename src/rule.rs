//! Matching rules used by include, exclude and priority options.
//!
//! A rule is one of four shapes:
//! - [`Rule::Pattern`]: a compiled regular expression
//! - [`Rule::Predicate`]: any `Fn(&str) -> bool`
//! - [`Rule::All`]: a list of rules that must all match
//! - [`Rule::Literal`]: a string, compiled to a regular expression on every evaluation
//!
//! Rules coming from a config file are built with [`Rule::from_value`], which rejects
//! every other YAML shape up front.

use regex::Regex;
use serde_yaml::Value;
use std::fmt;
use std::sync::Arc;

use crate::error::{DeployError, Result};

pub type PredicateFn = dyn Fn(&str) -> bool + Send + Sync;

#[derive(Clone)]
pub enum Rule {
    Pattern(Regex),
    Predicate(Arc<PredicateFn>),
    All(Vec<Rule>),
    Literal(String),
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Rule::Predicate(_) => f.write_str("Predicate(<fn>)"),
            Rule::All(rules) => f.debug_tuple("All").field(rules).finish(),
            Rule::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
        }
    }
}

impl Rule {
    /// Builds a string rule, checking up front that it compiles.
    pub fn literal(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        Regex::new(&pattern).map_err(|e| DeployError::invalid_rule(format!("{pattern}: {e}")))?;
        Ok(Rule::Literal(pattern))
    }

    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Rule::Pattern)
            .map_err(|e| DeployError::invalid_rule(format!("{pattern}: {e}")))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Rule::Predicate(Arc::new(f))
    }

    /// Converts a config value into a rule.
    ///
    /// Accepted shapes: a string (literal), a sequence (all of), or a mapping with a single
    /// `regex` key (pattern). Anything else is an [`DeployError::InvalidRule`].
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) => Rule::literal(s.clone()),
            Value::Sequence(items) => items
                .iter()
                .map(Rule::from_value)
                .collect::<Result<Vec<_>>>()
                .map(Rule::All),
            Value::Mapping(map) if map.len() == 1 => match map.get("regex") {
                Some(Value::String(pattern)) => Rule::pattern(pattern),
                _ => Err(DeployError::invalid_rule(format!("{value:?}"))),
            },
            other => Err(DeployError::invalid_rule(format!("{other:?}"))),
        }
    }

    /// Evaluates the rule against `subject`.
    pub fn matches(&self, subject: &str) -> Result<bool> {
        match self {
            Rule::Pattern(re) => Ok(re.is_match(subject)),
            Rule::Predicate(f) => Ok(f(subject)),
            Rule::All(rules) => {
                for rule in rules {
                    if !rule.matches(subject)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Rule::Literal(pattern) => Regex::new(pattern)
                .map(|re| re.is_match(subject))
                .map_err(|e| DeployError::invalid_rule(format!("{pattern}: {e}"))),
        }
    }
}

/// Free-function form of [`Rule::matches`].
pub fn matches_rule(rule: &Rule, subject: &str) -> Result<bool> {
    rule.matches(subject)
}
