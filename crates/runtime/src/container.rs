//! The container: bean registry, typed lookup API, context access, events,
//! and shutdown.

use std::any::{TypeId, type_name};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bean::{Bean, BeanId, InstancePtr};
use crate::context::{DependentContext, InjectableContext, RequestContext, SharedContext};
use crate::creational::CreationalContext;
use crate::error::{Error, Result};
use crate::events::{EventNotifier, Observer, ScopeBeforeDestroyed, ScopeDestroyed, ScopeInitialized};
use crate::handle::InstanceHandle;
use crate::proxy::ClientProxy;
use crate::qualifier::{Qualifier, Qualifiers};
use crate::resolution::{self, ResolutionCache};
use crate::scope::Scope;

/// Container-wide configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContainerConfig {
    /// Strict compatibility mode: default beans participate in resolution
    /// like ordinary beans instead of being demoted.
    pub strict: bool,
    /// Whether scope lifecycle events are fired.
    pub lifecycle_events: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            strict: false,
            lifecycle_events: true,
        }
    }
}

impl ContainerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable strict compatibility mode.
    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable or disable scope lifecycle events.
    #[must_use]
    pub fn lifecycle_events(mut self, enabled: bool) -> Self {
        self.lifecycle_events = enabled;
        self
    }
}

/// Builder collecting beans, observers, custom contexts, and configuration.
#[derive(Default)]
pub struct ContainerBuilder {
    beans: Vec<Bean>,
    observers: Vec<Observer>,
    contexts: Vec<Arc<dyn InjectableContext>>,
    config: ContainerConfig,
}

impl ContainerBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bean.
    #[must_use]
    pub fn bean(mut self, bean: Bean) -> Self {
        self.beans.push(bean);
        self
    }

    /// Register an observer.
    #[must_use]
    pub fn observer(mut self, observer: Observer) -> Self {
        self.observers.push(observer);
        self
    }

    /// Register a custom context for a custom scope.
    #[must_use]
    pub fn context(mut self, context: Arc<dyn InjectableContext>) -> Self {
        self.contexts.push(context);
        self
    }

    /// Set the container configuration.
    #[must_use]
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the registrations and start the container.
    pub fn build(self) -> Result<Container> {
        let mut seen_ids: HashSet<BeanId> = HashSet::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        for bean in &self.beans {
            if !seen_ids.insert(bean.id()) {
                return Err(Error::DuplicateBean { bean: bean.label() });
            }
            if let Some(name) = bean.name() {
                if !seen_names.insert(name.to_string()) {
                    return Err(Error::DuplicateBean { bean: bean.label() });
                }
            }
        }

        let mut custom: HashMap<Scope, Arc<dyn InjectableContext>> = HashMap::new();
        for context in self.contexts {
            let scope = context.scope().clone();
            if scope.is_built_in() || custom.contains_key(&scope) {
                return Err(Error::InvalidContextRegistration { scope });
            }
            custom.insert(scope, context);
        }

        for bean in &self.beans {
            let scope = bean.scope();
            // Every bean needs a context for its scope.
            if !(scope.is_built_in() || custom.contains_key(scope)) {
                return Err(Error::InvalidContextRegistration {
                    scope: scope.clone(),
                });
            }
            // A normal-scoped bean must be castable through a proxy.
            if scope.is_normal() && !bean.is_proxyable() {
                return Err(Error::UnproxyableBean {
                    bean: bean.label(),
                    scope: scope.clone(),
                });
            }
        }

        let notifier = EventNotifier::new(self.observers, self.config.lifecycle_events);
        let beans: Vec<Arc<Bean>> = self.beans.into_iter().map(Arc::new).collect();
        let by_id = beans.iter().map(|b| (b.id(), Arc::clone(b))).collect();
        let by_name = beans
            .iter()
            .filter_map(|b| b.name().map(|n| (n.to_string(), Arc::clone(b))))
            .collect();

        let inner = Arc::new(ContainerInner {
            id: Uuid::new_v4(),
            config: self.config,
            registry: RwLock::new(Registry {
                beans,
                by_id,
                by_name,
            }),
            dependent: Arc::new(DependentContext::new()),
            singleton: Arc::new(SharedContext::new(Scope::Singleton)),
            application: Arc::new(SharedContext::new(Scope::Application)),
            request: Arc::new(RequestContext::new(notifier.clone())),
            custom,
            resolution: ResolutionCache::new(),
            notifier,
            running: AtomicBool::new(true),
        });

        {
            let weak = Arc::downgrade(&inner);
            let registry = inner.registry.read();
            for bean in &registry.beans {
                bean.attach(weak.clone());
            }
        }

        debug!(
            container = %inner.id,
            beans = inner.registry.read().beans.len(),
            "container started"
        );
        inner.notifier.fire_lifecycle(&ScopeInitialized {
            scope: Scope::Application,
        });
        Ok(Container { inner })
    }
}

struct Registry {
    beans: Vec<Arc<Bean>>,
    by_id: HashMap<BeanId, Arc<Bean>>,
    by_name: HashMap<String, Arc<Bean>>,
}

pub(crate) struct ContainerInner {
    id: Uuid,
    config: ContainerConfig,
    registry: RwLock<Registry>,
    dependent: Arc<DependentContext>,
    singleton: Arc<SharedContext>,
    application: Arc<SharedContext>,
    request: Arc<RequestContext>,
    custom: HashMap<Scope, Arc<dyn InjectableContext>>,
    resolution: ResolutionCache,
    notifier: EventNotifier,
    running: AtomicBool,
}

/// The container: a cheap-clone handle threaded explicitly through every
/// collaborator (proxies, creators, handles hold a clone). There is no
/// ambient singleton accessor.
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Start building a container.
    #[must_use]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub(crate) fn from_inner(inner: Arc<ContainerInner>) -> Self {
        Self { inner }
    }

    /// The container's unique id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    #[must_use]
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(Error::ContainerNotRunning)
        }
    }

    /// All registered beans, for diagnostics.
    #[must_use]
    pub fn beans(&self) -> Vec<Arc<Bean>> {
        self.inner.registry.read().beans.clone()
    }

    /// Look up the default instance of `T`.
    pub fn instance<T: Send + Sync + 'static>(&self) -> Result<InstanceHandle<T>> {
        self.instance_with(Qualifiers::new())
    }

    /// Look up an instance of `T` with the given required qualifiers.
    pub fn instance_with<T: Send + Sync + 'static>(
        &self,
        qualifiers: impl Into<Qualifiers>,
    ) -> Result<InstanceHandle<T>> {
        self.ensure_running()?;
        let required = qualifiers.into();
        let bean = self.resolve_bean(TypeId::of::<T>(), type_name::<T>(), &required)?;
        self.handle_for(bean)
    }

    /// Look up an instance of `T` by bean name.
    pub fn instance_by_name<T: Send + Sync + 'static>(
        &self,
        name: &str,
    ) -> Result<InstanceHandle<T>> {
        self.ensure_running()?;
        let bean = self
            .inner
            .registry
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| {
                Error::unsatisfied(
                    type_name::<T>(),
                    &Qualifiers::from(Qualifier::named(name)),
                )
            })?;
        self.handle_for(bean)
    }

    /// All beans matching `T` with the given qualifiers, priority-ordered.
    pub fn select<T: Send + Sync + 'static>(
        &self,
        qualifiers: impl Into<Qualifiers>,
    ) -> Result<Selection<T>> {
        self.ensure_running()?;
        let required = qualifiers.into();
        let registry = self.inner.registry.read();
        let beans = resolution::matching(&registry.beans, TypeId::of::<T>(), &required);
        drop(registry);
        Ok(Selection {
            container: self.clone(),
            beans,
            required,
            _marker: std::marker::PhantomData,
        })
    }

    /// The active context for `scope`, or [`Error::ContextNotActive`].
    pub fn context_for(&self, scope: &Scope) -> Result<Arc<dyn InjectableContext>> {
        let context: Arc<dyn InjectableContext> = match scope {
            Scope::Dependent => Arc::clone(&self.inner.dependent) as _,
            Scope::Singleton => Arc::clone(&self.inner.singleton) as _,
            Scope::Application => Arc::clone(&self.inner.application) as _,
            Scope::Request => Arc::clone(&self.inner.request) as _,
            custom => self
                .inner
                .custom
                .get(custom)
                .map(Arc::clone)
                .ok_or_else(|| Error::not_active(custom))?,
        };
        if context.is_active() {
            Ok(context)
        } else {
            Err(Error::not_active(scope))
        }
    }

    /// The built-in request context.
    #[must_use]
    pub fn request_context(&self) -> Arc<RequestContext> {
        Arc::clone(&self.inner.request)
    }

    /// The built-in dependent pseudo-scope context.
    #[must_use]
    pub fn dependent_context(&self) -> Arc<DependentContext> {
        Arc::clone(&self.inner.dependent)
    }

    /// Fire an event with no qualifiers.
    pub fn fire<E: 'static>(&self, event: &E) {
        self.inner.notifier.fire(event);
    }

    /// Fire an event with qualifiers.
    pub fn fire_with<E: 'static>(&self, event: &E, qualifiers: &Qualifiers) {
        self.inner.notifier.fire_with(event, qualifiers);
    }

    /// Shut the container down: fire the application lifecycle events,
    /// destroy the application and singleton contexts, clear the resolution
    /// cache and the bean registry. Idempotent; every lookup afterwards
    /// fails with [`Error::ContainerNotRunning`].
    pub fn shutdown(&self) -> Result<()> {
        if self.inner.running.swap(false, Ordering::AcqRel) {
            debug!(container = %self.inner.id, "shutting down container");
            self.inner.notifier.fire_lifecycle(&ScopeBeforeDestroyed {
                scope: Scope::Application,
            });
            self.inner.application.destroy_all()?;
            self.inner.singleton.destroy_all()?;
            self.inner.notifier.fire_lifecycle(&ScopeDestroyed {
                scope: Scope::Application,
            });
            self.inner.resolution.clear();
            let mut registry = self.inner.registry.write();
            registry.beans.clear();
            registry.by_id.clear();
            registry.by_name.clear();
        }
        Ok(())
    }

    fn resolve_bean(
        &self,
        type_id: TypeId,
        requested_type: &'static str,
        required: &Qualifiers,
    ) -> Result<Arc<Bean>> {
        if let Some(hit) = self.inner.resolution.lookup(type_id, required) {
            return Ok(hit);
        }
        let registry = self.inner.registry.read();
        let candidates = resolution::matching(&registry.beans, type_id, required);
        drop(registry);
        let bean = resolution::arbitrate(candidates, requested_type, required, self.inner.config.strict)?;
        self.inner
            .resolution
            .store(type_id, required, Arc::clone(&bean));
        Ok(bean)
    }

    /// Obtain a contextual instance for use as a dependency: dependent
    /// instances are recorded into the requester's accumulator, everything
    /// else is resolved through the scope's active context.
    pub(crate) fn obtain(
        &self,
        bean: &Arc<Bean>,
        creational: &CreationalContext,
    ) -> Result<InstancePtr> {
        match bean.scope() {
            Scope::Dependent => self
                .inner
                .dependent
                .get(bean, Some(creational))?
                .ok_or_else(|| Error::not_active(&Scope::Dependent)),
            scope => {
                let ctx = self.context_for(scope)?;
                let grant = CreationalContext::root();
                ctx.get(bean, Some(&grant))?
                    .ok_or_else(|| Error::not_active(scope))
            }
        }
    }

    fn handle_for<T: Send + Sync + 'static>(&self, bean: Arc<Bean>) -> Result<InstanceHandle<T>> {
        let scope = bean.scope().clone();
        match scope {
            Scope::Dependent => {
                let creational = CreationalContext::root();
                let instance = self
                    .inner
                    .dependent
                    .get(&bean, Some(&creational))?
                    .ok_or_else(|| Error::not_active(&Scope::Dependent))?;
                let value = bean.cast_to::<T>(&instance)?;
                Ok(InstanceHandle::dependent(
                    bean,
                    self.clone(),
                    value,
                    creational,
                ))
            }
            scope if scope.is_normal() => Ok(InstanceHandle::proxy(bean, self.clone())),
            scope => {
                let ctx = self.context_for(&scope)?;
                let grant = CreationalContext::root();
                let instance = ctx
                    .get(&bean, Some(&grant))?
                    .ok_or_else(|| Error::not_active(&scope))?;
                let value = bean.cast_to::<T>(&instance)?;
                Ok(InstanceHandle::shared(bean, self.clone(), value))
            }
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.id)
            .field("running", &self.is_running())
            .field("beans", &self.inner.registry.read().beans.len())
            .finish()
    }
}

/// Typed access to a bean's own dependencies during creation, handed to
/// bean factories. Dependent collaborators are recorded into the
/// requester's accumulator so their destruction cascades with it.
pub struct Creator<'a> {
    container: Container,
    creational: &'a CreationalContext,
}

impl<'a> Creator<'a> {
    pub(crate) fn new(container: Container, creational: &'a CreationalContext) -> Self {
        Self {
            container,
            creational,
        }
    }

    /// Resolve and obtain the default dependency of type `T`.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_with(Qualifiers::new())
    }

    /// Resolve and obtain a dependency of type `T` with qualifiers.
    pub fn get_with<T: Send + Sync + 'static>(
        &self,
        qualifiers: impl Into<Qualifiers>,
    ) -> Result<Arc<T>> {
        let required = qualifiers.into();
        let bean = self
            .container
            .resolve_bean(TypeId::of::<T>(), type_name::<T>(), &required)?;
        let instance = self.container.obtain(&bean, self.creational)?;
        bean.cast_to::<T>(&instance)
    }

    /// A lazily resolving client proxy for a normal-scoped dependency; each
    /// access re-resolves against the then-active context.
    pub fn proxy<T: Send + Sync + 'static>(&self) -> Result<ClientProxy<T>> {
        self.proxy_with(Qualifiers::new())
    }

    /// Like [`Creator::proxy`], with qualifiers.
    pub fn proxy_with<T: Send + Sync + 'static>(
        &self,
        qualifiers: impl Into<Qualifiers>,
    ) -> Result<ClientProxy<T>> {
        let required = qualifiers.into();
        let bean = self
            .container
            .resolve_bean(TypeId::of::<T>(), type_name::<T>(), &required)?;
        Ok(ClientProxy::new(bean, self.container.clone()))
    }

    /// The owning container.
    #[must_use]
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// The accumulator of the creation request being satisfied.
    #[must_use]
    pub fn creational(&self) -> &CreationalContext {
        self.creational
    }
}

impl fmt::Debug for Creator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Creator")
            .field("container", &self.container.id())
            .finish()
    }
}

/// The result of [`Container::select`]: every bean matching a lookup,
/// priority-ordered, with per-handle instantiation.
pub struct Selection<T> {
    container: Container,
    beans: Vec<Arc<Bean>>,
    required: Qualifiers,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Selection<T> {
    /// The matching beans, highest priority first.
    #[must_use]
    pub fn beans(&self) -> &[Arc<Bean>] {
        &self.beans
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.beans.len()
    }

    #[must_use]
    pub fn is_unsatisfied(&self) -> bool {
        self.beans.is_empty()
    }

    /// More than one candidate before arbitration.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.beans.len() > 1
    }

    /// Arbitrate to a single bean and obtain its handle.
    pub fn get(&self) -> Result<InstanceHandle<T>> {
        let bean = resolution::arbitrate(
            self.beans.clone(),
            type_name::<T>(),
            &self.required,
            self.container.inner.config.strict,
        )?;
        self.container.handle_for(bean)
    }

    /// A handle per matching bean, in priority order.
    pub fn handles(&self) -> impl Iterator<Item = Result<InstanceHandle<T>>> + '_ {
        self.beans
            .iter()
            .map(|bean| self.container.handle_for(Arc::clone(bean)))
    }
}

impl<T> fmt::Debug for Selection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selection")
            .field("count", &self.beans.len())
            .field("required", &self.required)
            .finish()
    }
}
