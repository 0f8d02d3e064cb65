//! Always-active shared contexts backing the singleton and application
//! scopes.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::bean::{Bean, BeanId, InstancePtr};
use crate::context::{ContextState, InjectableContext};
use crate::creational::CreationalContext;
use crate::error::Result;
use crate::scope::Scope;

/// A context holding one instance per bean for the container's lifetime.
///
/// Creation is double-checked behind a per-bean lock so concurrent callers
/// observe a single instance. `destroy_all` tears the store down newest
/// first and invalidates it; the context then reports inactive (the
/// container-shutdown path).
pub struct SharedContext {
    scope: Scope,
    state: ContextState,
    creating: DashMap<BeanId, Arc<Mutex<()>>>,
}

impl SharedContext {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            scope,
            state: ContextState::new(),
            creating: DashMap::new(),
        }
    }
}

impl InjectableContext for SharedContext {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.state.is_valid()
    }

    fn get(
        &self,
        bean: &Arc<Bean>,
        creational: Option<&CreationalContext>,
    ) -> Result<Option<InstancePtr>> {
        if !self.is_active() {
            return Err(crate::error::Error::not_active(&self.scope));
        }
        if let Some(handle) = self.state.lookup(bean.id()) {
            return Ok(Some(handle.instance().clone()));
        }
        if creational.is_none() {
            // Pure lookup: never create without an accumulator grant.
            return Ok(None);
        }
        // A same-thread re-entry must fail as a cycle before it can
        // self-deadlock on the per-bean creation lock.
        bean.cycle_check()?;
        let lock = Arc::clone(
            self.creating
                .entry(bean.id())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let _guard = lock.lock();
        if let Some(handle) = self.state.lookup(bean.id()) {
            return Ok(Some(handle.instance().clone()));
        }
        let instance = self.state.create_into(bean)?;
        self.creating.remove(&bean.id());
        Ok(Some(instance))
    }

    fn destroy(&self, bean: &Arc<Bean>) -> Result<()> {
        if let Some(handle) = self.state.remove(bean.id()) {
            handle.destroy();
        }
        Ok(())
    }

    fn destroy_all(&self) -> Result<()> {
        let drained = self.state.drain_newest_first();
        debug!(scope = %self.scope, count = drained.len(), "destroying shared context");
        for handle in drained {
            handle.destroy();
        }
        self.state.invalidate();
        Ok(())
    }

    fn state(&self) -> Result<ContextState> {
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    fn container() -> Container {
        Container::builder()
            .bean(
                Bean::builder(|_| Ok(Counter(CREATED.fetch_add(1, Ordering::SeqCst))))
                    .named("counter")
                    .singleton()
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn counter_bean(container: &Container) -> Arc<Bean> {
        container
            .beans()
            .into_iter()
            .find(|b| b.name() == Some("counter"))
            .unwrap()
    }

    #[test]
    fn test_repeated_get_returns_same_instance() {
        let container = container();
        let bean = counter_bean(&container);
        let ctx = container.context_for(&Scope::Singleton).unwrap();
        let cc = CreationalContext::root();

        let first = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        let second = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_get_without_creational_never_creates() {
        let container = container();
        let bean = counter_bean(&container);
        let ctx = container.context_for(&Scope::Singleton).unwrap();

        assert!(ctx.get(&bean, None).unwrap().is_none());
        let cc = CreationalContext::root();
        let created = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        let looked_up = ctx.get(&bean, None).unwrap().unwrap();
        assert!(Arc::ptr_eq(&created, &looked_up));
    }

    #[test]
    fn test_destroy_removes_instance() {
        let container = container();
        let bean = counter_bean(&container);
        let ctx = container.context_for(&Scope::Singleton).unwrap();
        let cc = CreationalContext::root();

        let first = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        ctx.destroy(&bean).unwrap();
        assert!(ctx.get(&bean, None).unwrap().is_none());
        let second = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_destroy_all_invalidates() {
        let ctx = SharedContext::new(Scope::Singleton);
        assert!(ctx.is_active());
        ctx.destroy_all().unwrap();
        assert!(!ctx.is_active());
    }
}
