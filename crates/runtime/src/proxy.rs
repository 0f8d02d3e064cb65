//! Client proxies for normal-scoped beans.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bean::Bean;
use crate::container::Container;
use crate::creational::CreationalContext;
use crate::error::{Error, Result};
use crate::scope::Scope;

/// A client proxy: the reference handed out for a normal-scoped bean.
///
/// Every [`get`](ClientProxy::get) re-resolves the backing instance against
/// the context currently active for the bean's scope, so one proxy observes
/// different instances across requests. Holds an explicit container handle;
/// nothing is resolved through ambient global state.
pub struct ClientProxy<T> {
    bean: Arc<Bean>,
    container: Container,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> ClientProxy<T> {
    pub(crate) fn new(bean: Arc<Bean>, container: Container) -> Self {
        Self {
            bean,
            container,
            _marker: PhantomData,
        }
    }

    /// The current contextual instance for the bean's scope, created on
    /// first access within the active context.
    ///
    /// Fails with [`Error::ContextNotActive`] when the scope has no active
    /// context and [`Error::ContainerNotRunning`] after shutdown.
    pub fn get(&self) -> Result<Arc<T>> {
        self.container.ensure_running()?;
        let ctx = self.container.context_for(self.bean.scope())?;
        // The accumulator only grants creation; the context owns the
        // instance's dependents through its own private accumulator.
        let grant = CreationalContext::root();
        let instance = ctx
            .get(&self.bean, Some(&grant))?
            .ok_or_else(|| Error::not_active(self.bean.scope()))?;
        self.bean.cast_to::<T>(&instance)
    }

    #[must_use]
    pub fn bean(&self) -> &Arc<Bean> {
        &self.bean
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        self.bean.scope()
    }
}

impl<T> Clone for ClientProxy<T> {
    fn clone(&self) -> Self {
        Self {
            bean: Arc::clone(&self.bean),
            container: self.container.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ClientProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("bean", &self.bean.label())
            .field("scope", self.bean.scope())
            .finish()
    }
}
