//! Instance handles: the erased per-context record and the typed result of
//! a container lookup.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bean::{Bean, InstancePtr};
use crate::container::Container;
use crate::creational::CreationalContext;
use crate::error::Result;
use crate::proxy::ClientProxy;

/// Discriminates the two reference representations a lookup can produce.
/// An explicit tag, checkable without runtime type inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ReferenceKind {
    /// The contextual instance itself (dependent and other pseudo-scopes).
    ContextualInstance,
    /// A client proxy re-resolved against the active context per call
    /// (normal scopes).
    ContextualReference,
}

/// The erased record a context stores per contextual instance: the owning
/// bean, the instance, and the instance's own accumulator.
///
/// Cheap to clone; destruction runs at most once across all clones.
#[derive(Clone)]
pub struct ContextInstanceHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    bean: Arc<Bean>,
    instance: InstancePtr,
    creational: CreationalContext,
    destroyed: AtomicBool,
}

impl ContextInstanceHandle {
    pub(crate) fn new(bean: Arc<Bean>, instance: InstancePtr, creational: CreationalContext) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                bean,
                instance,
                creational,
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn bean(&self) -> &Arc<Bean> {
        &self.inner.bean
    }

    #[must_use]
    pub fn instance(&self) -> &InstancePtr {
        &self.inner.instance
    }

    /// The accumulator owning the instance's dependents.
    #[must_use]
    pub fn creational(&self) -> &CreationalContext {
        &self.inner.creational
    }

    /// Destroy the instance (pre-destroy callback, destroy closure) and
    /// release its accumulator. Subsequent calls are no-ops.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner
            .bean
            .destroy_instance(self.inner.instance.clone(), &self.inner.creational);
        self.inner.creational.release();
    }
}

impl fmt::Debug for ContextInstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextInstanceHandle")
            .field("bean", &self.inner.bean.label())
            .field("destroyed", &self.inner.destroyed.load(Ordering::Acquire))
            .finish()
    }
}

/// Releases a top-level dependent accumulator when dropped, cascading the
/// destruction of the instance and everything it transitively created.
struct DependentGuard {
    creational: CreationalContext,
}

impl Drop for DependentGuard {
    fn drop(&mut self) {
        self.creational.release();
    }
}

enum Repr<T> {
    /// A dependent instance owned by this handle; destroyed on drop.
    Dependent { value: Arc<T>, guard: DependentGuard },
    /// An instance owned by its context; destruction delegates there.
    Shared { value: Arc<T> },
    /// A client proxy; every `get` re-resolves.
    Proxy { proxy: ClientProxy<T> },
}

/// The typed result of a container lookup.
///
/// For a dependent-scoped bean the handle owns the instance: dropping the
/// handle (or calling [`destroy`](InstanceHandle::destroy)) tears down the
/// instance and its dependent-object tree. For other scopes the owning
/// context keeps responsibility and `destroy` delegates to it.
pub struct InstanceHandle<T> {
    bean: Arc<Bean>,
    container: Container,
    repr: Repr<T>,
}

impl<T: Send + Sync + 'static> InstanceHandle<T> {
    pub(crate) fn dependent(
        bean: Arc<Bean>,
        container: Container,
        value: Arc<T>,
        creational: CreationalContext,
    ) -> Self {
        Self {
            bean,
            container,
            repr: Repr::Dependent {
                value,
                guard: DependentGuard { creational },
            },
        }
    }

    pub(crate) fn shared(bean: Arc<Bean>, container: Container, value: Arc<T>) -> Self {
        Self {
            bean,
            container,
            repr: Repr::Shared { value },
        }
    }

    pub(crate) fn proxy(bean: Arc<Bean>, container: Container) -> Self {
        let proxy = ClientProxy::new(Arc::clone(&bean), container.clone());
        Self {
            bean,
            container,
            repr: Repr::Proxy { proxy },
        }
    }

    /// The contextual reference. For proxies this re-resolves against the
    /// currently active context and can fail accordingly; for instances it
    /// is infallible.
    pub fn get(&self) -> Result<Arc<T>> {
        match &self.repr {
            Repr::Dependent { value, .. } | Repr::Shared { value } => Ok(Arc::clone(value)),
            Repr::Proxy { proxy } => proxy.get(),
        }
    }

    /// Which representation this handle carries.
    #[must_use]
    pub fn kind(&self) -> ReferenceKind {
        match &self.repr {
            Repr::Dependent { .. } | Repr::Shared { .. } => ReferenceKind::ContextualInstance,
            Repr::Proxy { .. } => ReferenceKind::ContextualReference,
        }
    }

    /// Whether the handle carries a client proxy.
    #[must_use]
    pub fn is_proxy(&self) -> bool {
        self.kind() == ReferenceKind::ContextualReference
    }

    #[must_use]
    pub fn bean(&self) -> &Arc<Bean> {
        &self.bean
    }

    /// Destroy the underlying contextual instance now.
    ///
    /// For a dependent instance this releases its accumulator; for any
    /// other scope it asks the owning active context to destroy the bean's
    /// instance.
    pub fn destroy(self) -> Result<()> {
        match self.repr {
            Repr::Dependent { guard, .. } => {
                drop(guard);
                Ok(())
            }
            Repr::Shared { .. } | Repr::Proxy { .. } => {
                let ctx = self.container.context_for(self.bean.scope())?;
                ctx.destroy(&self.bean)
            }
        }
    }
}

impl<T> fmt::Debug for InstanceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.repr {
            Repr::Dependent { .. } => "dependent",
            Repr::Shared { .. } => "shared",
            Repr::Proxy { .. } => "proxy",
        };
        f.debug_struct("InstanceHandle")
            .field("bean", &self.bean.label())
            .field("repr", &kind)
            .finish()
    }
}
