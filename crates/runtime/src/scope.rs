//! Scope model: built-in scopes plus custom registrations.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The scope a bean belongs to.
///
/// A *normal* scope hands out client-proxy references that are re-resolved
/// against the active context on every access. A *pseudo* scope hands out the
/// contextual instance itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Default)]
pub enum Scope {
    /// Pseudo-scope: a brand-new instance per lookup, destroyed together
    /// with whoever requested it. The default scope.
    #[default]
    Dependent,
    /// Pseudo-scope: one instance for the container's lifetime, handed out
    /// directly (no proxy).
    Singleton,
    /// Normal scope: one instance for the container's lifetime, handed out
    /// through a client proxy.
    Application,
    /// Normal scope: one instance per activated request, thread-bound.
    Request,
    /// A custom scope backed by a context registered with the builder.
    Custom {
        /// The scope name, unique among custom scopes.
        name: String,
        /// Whether references are client proxies (`true`) or the instance
        /// itself (`false`).
        normal: bool,
    },
}

impl Scope {
    /// Create a custom scope.
    ///
    /// # Panics
    /// Panics if `name` is empty.
    pub fn custom(name: impl Into<String>, normal: bool) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "custom scope name must not be empty");
        Self::Custom { name, normal }
    }

    /// Whether references for this scope are client proxies.
    #[must_use]
    pub fn is_normal(&self) -> bool {
        match self {
            Self::Application | Self::Request => true,
            Self::Custom { normal, .. } => *normal,
            Self::Dependent | Self::Singleton => false,
        }
    }

    /// Whether references for this scope are the contextual instance itself.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        !self.is_normal()
    }

    /// Whether this is one of the four built-in scopes.
    #[must_use]
    pub fn is_built_in(&self) -> bool {
        !matches!(self, Self::Custom { .. })
    }

    /// The scope name used in logs and error messages.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Dependent => "dependent",
            Self::Singleton => "singleton",
            Self::Application => "application",
            Self::Request => "request",
            Self::Custom { name, .. } => name,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Scope::Dependent, false; "dependent is pseudo")]
    #[test_case(Scope::Singleton, false; "singleton is pseudo")]
    #[test_case(Scope::Application, true; "application is normal")]
    #[test_case(Scope::Request, true; "request is normal")]
    #[test_case(Scope::custom("conversation", true), true; "custom normal")]
    #[test_case(Scope::custom("session", false), false; "custom pseudo")]
    fn test_normality(scope: Scope, normal: bool) {
        assert_eq!(scope.is_normal(), normal);
        assert_eq!(scope.is_pseudo(), !normal);
    }

    #[test]
    fn test_built_in() {
        assert!(Scope::Dependent.is_built_in());
        assert!(Scope::Request.is_built_in());
        assert!(!Scope::custom("flow", true).is_built_in());
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(Scope::Application.to_string(), "application");
        assert_eq!(Scope::custom("flow", true).to_string(), "flow");
    }

    #[test]
    fn test_default_is_dependent() {
        assert_eq!(Scope::default(), Scope::Dependent);
    }

    #[test]
    #[should_panic(expected = "custom scope name must not be empty")]
    fn test_empty_custom_name_panics() {
        Scope::custom("", true);
    }
}
