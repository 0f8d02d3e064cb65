//! The built-in context for the dependent pseudo-scope.

use std::sync::Arc;

use crate::bean::{Bean, Contextual, InstancePtr};
use crate::context::{ContextState, InjectableContext};
use crate::creational::CreationalContext;
use crate::error::{Error, Result};
use crate::scope::Scope;

/// The dependent pseudo-scope: every lookup produces a brand-new instance
/// whose lifetime is bound to whoever requested it, with destruction
/// deferred until the requester is destroyed.
///
/// The context itself holds no instances and never destroys anything; the
/// accumulator supplied to [`get`](InjectableContext::get) is responsible
/// for cascading destruction of everything it tracked. Requesting an
/// instance without an accumulator while needing cleanup later silently
/// drops that cleanup responsibility; honoring it is the caller's contract.
#[derive(Debug)]
pub struct DependentContext {
    scope: Scope,
}

impl DependentContext {
    pub(crate) fn new() -> Self {
        Self {
            scope: Scope::Dependent,
        }
    }
}

impl InjectableContext for DependentContext {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Always true: the dependent scope has no activation lifecycle; it
    /// exists whenever the container exists.
    fn is_active(&self) -> bool {
        true
    }

    fn get(
        &self,
        bean: &Arc<Bean>,
        creational: Option<&CreationalContext>,
    ) -> Result<Option<InstancePtr>> {
        // Kept for interface-contract uniformity across scope
        // implementations; the dependent scope never reaches this state.
        if !self.is_active() {
            return Err(Error::not_active(&self.scope));
        }
        let Some(parent) = creational else {
            // No accumulator to host the instance: create nothing rather
            // than leak something un-destroyable.
            return Ok(None);
        };
        let own = parent.child();
        let instance = bean.create(&own)?;
        parent.add_dependent_instance(Arc::clone(bean), instance.clone(), own);
        Ok(Some(instance))
    }

    fn destroy(&self, _bean: &Arc<Bean>) -> Result<()> {
        Err(Error::unsupported(&self.scope, "destroy"))
    }

    fn destroy_all(&self) -> Result<()> {
        Err(Error::unsupported(&self.scope, "destroy_all"))
    }

    fn state(&self) -> Result<ContextState> {
        // Dependent instances are not enumerable independent of their
        // owning accumulators; there is no snapshot to capture.
        Err(Error::unsupported(&self.scope, "state"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    struct Widget;

    fn container() -> Container {
        Container::builder()
            .bean(Bean::builder(|_| Ok(Widget)).named("widget").build())
            .build()
            .unwrap()
    }

    fn widget_bean(container: &Container) -> Arc<Bean> {
        container
            .beans()
            .into_iter()
            .find(|b| b.name() == Some("widget"))
            .unwrap()
    }

    #[test]
    fn test_get_with_accumulator_registers_record() {
        let container = container();
        let bean = widget_bean(&container);
        let ctx = container.dependent_context();
        let cc = CreationalContext::root();

        let instance = ctx.get(&bean, Some(&cc)).unwrap();
        assert!(instance.is_some());
        assert_eq!(cc.dependent_count(), 1);
    }

    #[test]
    fn test_get_without_accumulator_creates_nothing() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let created = Arc::new(AtomicUsize::new(0));
        let c1 = Arc::clone(&created);
        let container = Container::builder()
            .bean(
                Bean::builder(move |_| {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(Widget)
                })
                .named("widget")
                .build(),
            )
            .build()
            .unwrap();
        let bean = widget_bean(&container);
        let ctx = container.dependent_context();

        let instance = ctx.get(&bean, None).unwrap();
        assert!(instance.is_none());
        // The factory must not have run at all.
        assert_eq!(created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_active_is_constant() {
        let container = container();
        let ctx = container.dependent_context();
        assert!(ctx.is_active());
        let _ = ctx.get(&widget_bean(&container), None);
        assert!(ctx.is_active());
    }

    #[test]
    fn test_destroy_operations_are_unsupported() {
        let container = container();
        let bean = widget_bean(&container);
        let ctx = container.dependent_context();

        assert!(ctx.destroy(&bean).unwrap_err().is_unsupported());
        assert!(ctx.destroy_all().unwrap_err().is_unsupported());
        assert!(ctx.state().unwrap_err().is_unsupported());
    }

    #[test]
    fn test_sequential_gets_produce_distinct_instances() {
        let container = container();
        let bean = widget_bean(&container);
        let ctx = container.dependent_context();
        let cc = CreationalContext::root();

        let first = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        let second = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cc.dependent_count(), 2);
    }
}
