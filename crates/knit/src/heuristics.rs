//! Naming-convention role hints.
//!
//! These guesses are attached to node properties as `roleHint` for human
//! consumers. They are wrong often enough that nothing in identity or
//! resolution reads them.

use serde::{Deserialize, Serialize};

use crate::types::ElementKind;

/// A guessed architectural role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleHint {
    /// `IFoo`: a type named like an interface
    Interface,
    /// `useFoo`: a React-style hook
    Hook,
    /// `FooController`
    Controller,
    /// `FooService`
    Service,
    /// `FooRepository`
    Repository,
    /// `test_foo`, `FooTest`, `FooTests`, `FooSpec`
    Test,
}

impl RoleHint {
    /// Property value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interface => "interface",
            Self::Hook => "hook",
            Self::Controller => "controller",
            Self::Service => "service",
            Self::Repository => "repository",
            Self::Test => "test",
        }
    }
}

fn upper_after(name: &str, prefix: &str) -> bool {
    name.strip_prefix(prefix)
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

fn has_stem_before(name: &str, suffix: &str) -> bool {
    name.len() > suffix.len() && name.ends_with(suffix)
}

/// Guess an element's role from its kind and name.
#[must_use]
pub fn guess_role(kind: ElementKind, name: &str) -> Option<RoleHint> {
    let is_type = matches!(kind, ElementKind::Class | ElementKind::Interface);
    let is_callable = matches!(kind, ElementKind::Function | ElementKind::Method);

    if is_callable && (name.starts_with("test_") || upper_after(name, "test")) {
        return Some(RoleHint::Test);
    }
    if is_type
        && ["Test", "Tests", "Spec"]
            .iter()
            .any(|s| has_stem_before(name, s))
    {
        return Some(RoleHint::Test);
    }
    if is_type && upper_after(name, "I") && name.chars().nth(2).is_some_and(char::is_lowercase) {
        return Some(RoleHint::Interface);
    }
    if matches!(kind, ElementKind::Function | ElementKind::Variable) && upper_after(name, "use") {
        return Some(RoleHint::Hook);
    }
    if is_type {
        if has_stem_before(name, "Controller") {
            return Some(RoleHint::Controller);
        }
        if has_stem_before(name, "Service") {
            return Some(RoleHint::Service);
        }
        if has_stem_before(name, "Repository") {
            return Some(RoleHint::Repository);
        }
    }
    None
}
