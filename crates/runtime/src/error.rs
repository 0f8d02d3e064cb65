//! Error types for the container runtime.

use thiserror::Error;

use crate::qualifier::Qualifiers;
use crate::scope::Scope;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the container, its contexts, and typesafe resolution.
///
/// Unsupported-operation and context-not-active failures are fatal to the
/// calling code path and are never retried by the runtime itself.
#[derive(Debug, Error)]
pub enum Error {
    /// The target context does not support the requested operation.
    ///
    /// The dependent pseudo-scope signals this for `destroy`, `destroy_all`
    /// and `state`: the owning accumulator, not the context, is responsible
    /// for cascading destruction of everything it tracked.
    #[error("operation '{operation}' is not supported by the {scope} context")]
    UnsupportedOperation {
        /// Scope of the context that rejected the operation.
        scope: Scope,
        /// Name of the rejected operation.
        operation: &'static str,
    },

    /// No context is active for the scope on the current thread.
    #[error("no context is active for the {scope} scope")]
    ContextNotActive {
        /// The scope whose context was required.
        scope: Scope,
    },

    /// Typesafe resolution found no bean for the requested type/qualifiers.
    #[error("no bean matches type '{requested_type}' with qualifiers {qualifiers}")]
    UnsatisfiedDependency {
        /// The requested type name.
        requested_type: String,
        /// The required qualifiers, rendered for diagnostics.
        qualifiers: String,
    },

    /// Typesafe resolution found more than one candidate and arbitration
    /// could not pick a single winner.
    #[error("ambiguous dependency for type '{requested_type}', candidates: {candidates:?}")]
    AmbiguousDependency {
        /// The requested type name.
        requested_type: String,
        /// Labels of the surviving candidate beans.
        candidates: Vec<String>,
    },

    /// The container has been shut down (or was never fully built).
    #[error("container is not running")]
    ContainerNotRunning,

    /// A bean was re-entered while already under construction on this thread.
    #[error("circular dependency detected: {}", .chain.join(" -> "))]
    CircularDependency {
        /// Bean labels on the creation stack, oldest first, ending with the
        /// bean that closed the cycle.
        chain: Vec<String>,
    },

    /// A bean factory returned an error.
    #[error("creation of bean '{bean}' failed")]
    CreationFailed {
        /// Label of the failing bean.
        bean: String,
        /// The factory error.
        #[source]
        source: anyhow::Error,
    },

    /// A contextual instance could not be cast to the requested type.
    #[error("bean '{bean}' does not provide type '{requested_type}'")]
    TypeMismatch {
        /// Label of the bean.
        bean: String,
        /// The requested type name.
        requested_type: &'static str,
    },

    /// Two beans were registered with the same id or the same name.
    #[error("duplicate bean registration: {bean}")]
    DuplicateBean {
        /// Label of the offending bean.
        bean: String,
    },

    /// A context registration is invalid (built-in scope claimed by a custom
    /// context, two contexts for one scope, or a bean scope with no context).
    #[error("invalid context registration for the {scope} scope")]
    InvalidContextRegistration {
        /// The offending scope.
        scope: Scope,
    },

    /// A normal-scoped bean provides no type a client proxy could cast to.
    #[error("bean '{bean}' in the normal {scope} scope is not proxyable")]
    UnproxyableBean {
        /// Label of the offending bean.
        bean: String,
        /// The bean's normal scope.
        scope: Scope,
    },

    /// A managed context was activated while already active on this thread.
    #[error("a context for the {scope} scope is already active on this thread")]
    AlreadyActive {
        /// The scope being activated.
        scope: Scope,
    },

    /// A captured context state was re-activated after invalidation.
    #[error("the supplied state for the {scope} scope is no longer valid")]
    InvalidContextState {
        /// The scope the state belongs to.
        scope: Scope,
    },
}

impl Error {
    /// Unsupported-operation error for the given context scope.
    pub fn unsupported(scope: &Scope, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            scope: scope.clone(),
            operation,
        }
    }

    /// Context-not-active error for the given scope.
    pub fn not_active(scope: &Scope) -> Self {
        Self::ContextNotActive {
            scope: scope.clone(),
        }
    }

    /// Unsatisfied-dependency error for a typed lookup.
    pub fn unsatisfied(requested_type: &str, qualifiers: &Qualifiers) -> Self {
        Self::UnsatisfiedDependency {
            requested_type: requested_type.to_string(),
            qualifiers: qualifiers.to_string(),
        }
    }

    /// Ambiguous-dependency error listing the surviving candidates.
    pub fn ambiguous(requested_type: &str, candidates: Vec<String>) -> Self {
        Self::AmbiguousDependency {
            requested_type: requested_type.to_string(),
            candidates,
        }
    }

    /// Creation-failed error wrapping a factory error.
    pub fn creation_failed(bean: impl Into<String>, source: anyhow::Error) -> Self {
        Self::CreationFailed {
            bean: bean.into(),
            source,
        }
    }

    /// Type-mismatch error for a failed contextual-reference cast.
    pub fn type_mismatch(bean: impl Into<String>, requested_type: &'static str) -> Self {
        Self::TypeMismatch {
            bean: bean.into(),
            requested_type,
        }
    }

    /// True for [`Error::UnsupportedOperation`].
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation { .. })
    }

    /// True for [`Error::ContextNotActive`].
    #[must_use]
    pub fn is_context_not_active(&self) -> bool {
        matches!(self, Self::ContextNotActive { .. })
    }

    /// True for [`Error::UnsatisfiedDependency`].
    #[must_use]
    pub fn is_unsatisfied(&self) -> bool {
        matches!(self, Self::UnsatisfiedDependency { .. })
    }

    /// True for [`Error::AmbiguousDependency`].
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousDependency { .. })
    }

    /// True for [`Error::CircularDependency`].
    #[must_use]
    pub fn is_circular(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    /// True for [`Error::ContainerNotRunning`].
    #[must_use]
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::ContainerNotRunning)
    }
}
