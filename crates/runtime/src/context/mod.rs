//! The context SPI: injectable and managed contexts, plus the shareable
//! per-context state used by the managed implementations.

mod dependent;
mod request;
mod shared;

pub use dependent::DependentContext;
pub use request::RequestContext;
pub use shared::SharedContext;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::bean::{Bean, BeanId, Contextual, InstancePtr};
use crate::creational::CreationalContext;
use crate::error::Result;
use crate::handle::ContextInstanceHandle;
use crate::scope::Scope;

/// A context realizing one scope.
///
/// `get` with a creational context may create; `get` with `None` is a pure
/// lookup for managed contexts and a degenerate no-op for the dependent
/// pseudo-scope. For managed contexts the supplied accumulator only grants
/// permission to create: the instance's own dependents are owned by a
/// private accumulator stored alongside it. The dependent context instead
/// registers the new instance *into* the supplied accumulator (that
/// registration is what ties its lifetime to the requester).
pub trait InjectableContext: Send + Sync {
    /// The scope this context realizes.
    fn scope(&self) -> &Scope;

    /// Whether the context is active on the calling thread.
    fn is_active(&self) -> bool;

    /// Obtain (and possibly create) the contextual instance of `bean`.
    fn get(
        &self,
        bean: &Arc<Bean>,
        creational: Option<&CreationalContext>,
    ) -> Result<Option<InstancePtr>>;

    /// Destroy the existing contextual instance of `bean`, if any.
    fn destroy(&self, bean: &Arc<Bean>) -> Result<()>;

    /// Destroy all contextual instances held by this context.
    fn destroy_all(&self) -> Result<()>;

    /// A handle on the context's backing state.
    fn state(&self) -> Result<ContextState>;
}

/// A context with an explicit activation lifecycle.
pub trait ManagedContext: InjectableContext {
    /// Activate on the current thread, either with a fresh state (`None`)
    /// or by re-binding a previously captured one (propagation).
    fn activate(&self, state: Option<ContextState>) -> Result<()>;

    /// Unbind from the current thread without destroying instances.
    fn deactivate(&self);

    /// Destroy all instances, then deactivate.
    fn terminate(&self) -> Result<()>;
}

/// Cloneable handle over a context's backing store: contextual instances
/// keyed by bean id, in creation order, plus a validity flag.
///
/// A state captured from a request context can be re-activated on another
/// thread for propagation; it must never be concurrently active on two
/// threads. `destroy_all` invalidates the state.
#[derive(Clone, Default)]
pub struct ContextState {
    inner: Arc<StateInner>,
}

struct StateInner {
    instances: RwLock<IndexMap<BeanId, ContextInstanceHandle>>,
    valid: AtomicBool,
}

impl Default for StateInner {
    fn default() -> Self {
        Self {
            instances: RwLock::new(IndexMap::new()),
            valid: AtomicBool::new(true),
        }
    }
}

impl ContextState {
    /// Fresh, valid, empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the state may still be activated and read.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.inner.valid.load(Ordering::Acquire)
    }

    pub(crate) fn invalidate(&self) {
        self.inner.valid.store(false, Ordering::Release);
    }

    /// Snapshot of the currently held contextual instances.
    #[must_use]
    pub fn contextual_instances(&self) -> Vec<ContextInstanceHandle> {
        self.inner.instances.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.instances.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.instances.read().is_empty()
    }

    pub(crate) fn lookup(&self, id: BeanId) -> Option<ContextInstanceHandle> {
        self.inner.instances.read().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: BeanId) -> Option<ContextInstanceHandle> {
        self.inner.instances.write().shift_remove(&id)
    }

    /// Remove all handles, newest first.
    pub(crate) fn drain_newest_first(&self) -> Vec<ContextInstanceHandle> {
        let mut drained: Vec<ContextInstanceHandle> = Vec::new();
        let mut instances = self.inner.instances.write();
        while let Some((_, handle)) = instances.pop() {
            drained.push(handle);
        }
        drained
    }

    /// Create the instance of `bean` with a private accumulator and store
    /// it, unless a concurrent creation won the race; losers destroy their
    /// fresh instance and return the winner's.
    ///
    /// The store lock is never held across the factory call, so a factory
    /// resolving other beans from the same context cannot deadlock.
    pub(crate) fn create_into(&self, bean: &Arc<Bean>) -> Result<InstancePtr> {
        let creational = CreationalContext::root();
        let instance = bean.create(&creational)?;
        let handle = ContextInstanceHandle::new(Arc::clone(bean), instance.clone(), creational);
        let mut instances = self.inner.instances.write();
        if let Some(existing) = instances.get(&bean.id()) {
            let winner = existing.instance().clone();
            drop(instances);
            handle.destroy();
            return Ok(winner);
        }
        instances.insert(bean.id(), handle);
        Ok(instance)
    }
}

impl std::fmt::Debug for ContextState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextState")
            .field("instances", &self.len())
            .field("valid", &self.is_valid())
            .finish()
    }
}
