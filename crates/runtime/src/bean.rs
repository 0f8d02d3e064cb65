//! Bean definitions: erased create/destroy protocol, provided types,
//! qualifiers, and the per-thread creation-cycle guard.

use std::any::{Any, TypeId, type_name};
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use tracing::{debug, trace};
use uuid::Uuid;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::container::{Container, ContainerInner, Creator};
use crate::creational::CreationalContext;
use crate::error::{Error, Result};
use crate::qualifier::{Qualifier, Qualifiers};
use crate::scope::Scope;

/// The erased currency for contextual instances held by contexts and
/// accumulators.
pub type InstancePtr = Arc<dyn Any + Send + Sync>;

/// Stable identity of a bean.
///
/// The original protocol identifies a contextual by reference equality; a
/// uuid-backed id is the equivalent that survives cloning and erasure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BeanId(Uuid);

impl BeanId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BeanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a bean came to be defined. Metadata only; resolution and lifecycle
/// treat all kinds alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BeanKind {
    /// A plain class bean built from a factory.
    Class,
    /// A producer: the factory derives the instance from other beans.
    Producer,
    /// Registered programmatically by an extension.
    Synthetic,
}

/// An entity capable of producing and destroying instances for a scope.
pub trait Contextual: Send + Sync {
    /// Construct a new instance. Dependent instances of collaborators are
    /// recorded into `creational`.
    fn create(&self, creational: &CreationalContext) -> Result<InstancePtr>;

    /// Destroy an instance previously produced by this contextual.
    fn destroy(&self, instance: InstancePtr, creational: &CreationalContext);
}

type CreateFn = Box<dyn Fn(&Creator<'_>) -> anyhow::Result<InstancePtr> + Send + Sync>;
type DestroyFn = Box<dyn Fn(InstancePtr, &CreationalContext) + Send + Sync>;
type LifecycleFn = Box<dyn Fn(&InstancePtr) + Send + Sync>;
type CastFn = Arc<dyn Fn(&InstancePtr) -> Option<InstancePtr> + Send + Sync>;

/// A type a bean can be looked up as.
pub struct ProvidedType {
    type_id: TypeId,
    type_name: &'static str,
    /// `None` means the bean's own concrete type (identity downcast).
    cast: Option<CastFn>,
}

/// An erased bean definition: identity, provided types, qualifiers, scope,
/// arbitration metadata, and the create/destroy closures.
///
/// Built via [`Bean::builder`] and registered with a
/// [`ContainerBuilder`](crate::container::ContainerBuilder). The container
/// attaches itself to every registered bean at build time, so factories can
/// resolve their dependencies through an explicit [`Creator`] rather than
/// any ambient global state.
pub struct Bean {
    id: BeanId,
    name: Option<String>,
    types: Vec<ProvidedType>,
    qualifiers: Qualifiers,
    scope: Scope,
    kind: BeanKind,
    alternative: bool,
    priority: i32,
    default_bean: bool,
    create_fn: CreateFn,
    destroy_fn: Option<DestroyFn>,
    post_construct: Option<LifecycleFn>,
    pre_destroy: Option<LifecycleFn>,
    container: OnceLock<Weak<ContainerInner>>,
}

thread_local! {
    /// Bean ids currently under construction on this thread, oldest first.
    static CREATION_STACK: RefCell<Vec<(BeanId, String)>> = const { RefCell::new(Vec::new()) };
}

/// Pops the creation stack even if a factory panics.
struct CreationFrame;

impl CreationFrame {
    fn push(bean: &Bean) -> Self {
        CREATION_STACK.with(|stack| stack.borrow_mut().push((bean.id, bean.label())));
        Self
    }
}

impl Drop for CreationFrame {
    fn drop(&mut self) {
        CREATION_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

impl Bean {
    /// Start building a bean whose instances are produced by `factory`.
    pub fn builder<T, F>(factory: F) -> BeanBuilder<T>
    where
        T: Send + Sync + 'static,
        F: Fn(&Creator<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        BeanBuilder::new(factory)
    }

    #[must_use]
    pub fn id(&self) -> BeanId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn qualifiers(&self) -> &Qualifiers {
        &self.qualifiers
    }

    #[must_use]
    pub fn kind(&self) -> BeanKind {
        self.kind
    }

    #[must_use]
    pub fn is_alternative(&self) -> bool {
        self.alternative
    }

    /// Arbitration priority among alternatives; higher wins.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether this bean is demoted when any non-default candidate matches
    /// the same lookup.
    #[must_use]
    pub fn is_default_bean(&self) -> bool {
        self.default_bean
    }

    /// Whether the bean can be looked up as `type_id`.
    #[must_use]
    pub fn provides(&self, type_id: TypeId) -> bool {
        self.types.iter().any(|t| t.type_id == type_id)
    }

    /// Names of the provided types, for diagnostics.
    #[must_use]
    pub fn type_names(&self) -> Vec<&'static str> {
        self.types.iter().map(|t| t.type_name).collect()
    }

    /// Whether at least one provided type is registered. Always true for
    /// builder-built beans; checked at container build for normal scopes,
    /// whose references must be castable through a proxy.
    #[must_use]
    pub fn is_proxyable(&self) -> bool {
        !self.types.is_empty()
    }

    /// The bean's name, or its primary type name. Used in logs and errors.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self
                .types
                .first()
                .map(|t| t.type_name.to_string())
                .unwrap_or_else(|| self.id.to_string()),
        }
    }

    /// Cast a contextual instance to one of the bean's provided types.
    pub fn cast_to<T: Send + Sync + 'static>(&self, instance: &InstancePtr) -> Result<Arc<T>> {
        let provided = self
            .types
            .iter()
            .find(|t| t.type_id == TypeId::of::<T>())
            .ok_or_else(|| Error::type_mismatch(self.label(), type_name::<T>()))?;
        let ptr = match &provided.cast {
            None => instance.clone(),
            Some(cast) => {
                cast(instance).ok_or_else(|| Error::type_mismatch(self.label(), type_name::<T>()))?
            }
        };
        ptr.downcast::<T>()
            .map_err(|_| Error::type_mismatch(self.label(), type_name::<T>()))
    }

    /// Attach the owning container. Called once at container build.
    pub(crate) fn attach(&self, container: Weak<ContainerInner>) {
        let _ = self.container.set(container);
    }

    fn attached_container(&self) -> Result<Container> {
        self.container
            .get()
            .and_then(Weak::upgrade)
            .map(Container::from_inner)
            .ok_or(Error::ContainerNotRunning)
    }

    /// Fail with the full chain if this bean is already under construction
    /// on the current thread.
    pub(crate) fn cycle_check(&self) -> Result<()> {
        CREATION_STACK.with(|stack| {
            let stack = stack.borrow();
            if stack.iter().any(|(id, _)| *id == self.id) {
                let mut chain: Vec<String> = stack.iter().map(|(_, label)| label.clone()).collect();
                chain.push(self.label());
                Err(Error::CircularDependency { chain })
            } else {
                Ok(())
            }
        })
    }

    /// Run the pre-destroy callback and the destroy closure (or drop).
    pub(crate) fn destroy_instance(&self, instance: InstancePtr, creational: &CreationalContext) {
        trace!(bean = %self.label(), "destroying instance");
        if let Some(callback) = &self.pre_destroy {
            callback(&instance);
        }
        match &self.destroy_fn {
            Some(destroy) => destroy(instance, creational),
            None => drop(instance),
        }
    }
}

impl Contextual for Bean {
    fn create(&self, creational: &CreationalContext) -> Result<InstancePtr> {
        let container = self.attached_container()?;
        if !container.is_running() {
            return Err(Error::ContainerNotRunning);
        }
        self.cycle_check()?;
        let _frame = CreationFrame::push(self);
        let creator = Creator::new(container, creational);
        match (self.create_fn)(&creator) {
            Ok(instance) => {
                if let Some(callback) = &self.post_construct {
                    callback(&instance);
                }
                debug!(bean = %self.label(), scope = %self.scope, "created instance");
                Ok(instance)
            }
            // Runtime errors raised while resolving dependencies keep their
            // identity; only foreign factory errors are wrapped.
            Err(err) => match err.downcast::<Error>() {
                Ok(inner) => Err(inner),
                Err(foreign) => Err(Error::creation_failed(self.label(), foreign)),
            },
        }
    }

    fn destroy(&self, instance: InstancePtr, creational: &CreationalContext) {
        self.destroy_instance(instance, creational);
    }
}

impl fmt::Debug for Bean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bean")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("types", &self.type_names())
            .field("qualifiers", &self.qualifiers)
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .field("alternative", &self.alternative)
            .field("priority", &self.priority)
            .field("default_bean", &self.default_bean)
            .finish()
    }
}

/// Typed builder for [`Bean`].
pub struct BeanBuilder<T> {
    name: Option<String>,
    types: Vec<ProvidedType>,
    qualifiers: Qualifiers,
    scope: Scope,
    kind: BeanKind,
    alternative: bool,
    priority: i32,
    default_bean: bool,
    create_fn: CreateFn,
    destroy_fn: Option<DestroyFn>,
    post_construct: Option<LifecycleFn>,
    pre_destroy: Option<LifecycleFn>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> BeanBuilder<T> {
    fn new<F>(factory: F) -> Self
    where
        F: Fn(&Creator<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let create_fn: CreateFn = Box::new(move |creator| {
            let value = factory(creator)?;
            let ptr: InstancePtr = Arc::new(value);
            Ok(ptr)
        });
        Self {
            name: None,
            types: vec![ProvidedType {
                type_id: TypeId::of::<T>(),
                type_name: type_name::<T>(),
                cast: None,
            }],
            qualifiers: Qualifiers::new(),
            scope: Scope::default(),
            kind: BeanKind::Class,
            alternative: false,
            priority: 0,
            default_bean: false,
            create_fn,
            destroy_fn: None,
            post_construct: None,
            pre_destroy: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Set the bean name, which also attaches a `@Named` qualifier.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualifiers.add(Qualifier::named(name.clone()));
        self.name = Some(name);
        self
    }

    /// Attach a qualifier.
    #[must_use]
    pub fn qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.add(qualifier);
        self
    }

    /// Set the bean scope. Defaults to [`Scope::Dependent`].
    #[must_use]
    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Shorthand for `scope(Scope::Singleton)`.
    #[must_use]
    pub fn singleton(self) -> Self {
        self.scope(Scope::Singleton)
    }

    /// Shorthand for `scope(Scope::Application)`.
    #[must_use]
    pub fn application_scoped(self) -> Self {
        self.scope(Scope::Application)
    }

    /// Shorthand for `scope(Scope::Request)`.
    #[must_use]
    pub fn request_scoped(self) -> Self {
        self.scope(Scope::Request)
    }

    /// Mark the bean as an alternative with the given arbitration priority.
    #[must_use]
    pub fn alternative(mut self, priority: i32) -> Self {
        self.alternative = true;
        self.priority = priority;
        self
    }

    /// Mark the bean as a default bean, demoted whenever a non-default
    /// candidate matches the same lookup.
    #[must_use]
    pub fn default_bean(mut self) -> Self {
        self.default_bean = true;
        self
    }

    /// Mark the bean as a producer.
    #[must_use]
    pub fn producer(mut self) -> Self {
        self.kind = BeanKind::Producer;
        self
    }

    /// Mark the bean as synthetic.
    #[must_use]
    pub fn synthetic(mut self) -> Self {
        self.kind = BeanKind::Synthetic;
        self
    }

    /// Additionally provide type `U`, derived from the instance via `cast`.
    ///
    /// `cast` must be cheap and pure; it runs on every lookup of `U`.
    #[must_use]
    pub fn provides<U, F>(mut self, cast: F) -> Self
    where
        U: Send + Sync + 'static,
        F: Fn(&Arc<T>) -> Arc<U> + Send + Sync + 'static,
    {
        let cast: CastFn = Arc::new(move |ptr: &InstancePtr| {
            ptr.clone().downcast::<T>().ok().map(|t| {
                let u: InstancePtr = cast(&t);
                u
            })
        });
        self.types.push(ProvidedType {
            type_id: TypeId::of::<U>(),
            type_name: type_name::<U>(),
            cast: Some(cast),
        });
        self
    }

    /// Callback invoked right after a successful creation.
    #[must_use]
    pub fn post_construct<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.post_construct = Some(Box::new(move |ptr: &InstancePtr| {
            if let Ok(t) = ptr.clone().downcast::<T>() {
                callback(&t);
            }
        }));
        self
    }

    /// Callback invoked right before an instance is destroyed.
    #[must_use]
    pub fn pre_destroy<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Arc<T>) + Send + Sync + 'static,
    {
        self.pre_destroy = Some(Box::new(move |ptr: &InstancePtr| {
            if let Ok(t) = ptr.clone().downcast::<T>() {
                callback(&t);
            }
        }));
        self
    }

    /// Replace the default destruction (dropping the instance) with a
    /// custom closure.
    #[must_use]
    pub fn destroyer<F>(mut self, destroy: F) -> Self
    where
        F: Fn(Arc<T>, &CreationalContext) + Send + Sync + 'static,
    {
        self.destroy_fn = Some(Box::new(
            move |ptr: InstancePtr, creational: &CreationalContext| {
                if let Ok(t) = ptr.downcast::<T>() {
                    destroy(t, creational);
                }
            },
        ));
        self
    }

    /// Finalize the bean. Declared qualifiers are normalized: `@Any` is
    /// always added, `@Default` unless a custom qualifier was declared.
    #[must_use]
    pub fn build(mut self) -> Bean {
        self.qualifiers.normalize_declared();
        Bean {
            id: BeanId::new(),
            name: self.name,
            types: self.types,
            qualifiers: self.qualifiers,
            scope: self.scope,
            kind: self.kind,
            alternative: self.alternative,
            priority: self.priority,
            default_bean: self.default_bean,
            create_fn: self.create_fn,
            destroy_fn: self.destroy_fn,
            post_construct: self.post_construct,
            pre_destroy: self.pre_destroy,
            container: OnceLock::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter {
        greeting: String,
    }

    #[test]
    fn test_builder_defaults() {
        let bean = Bean::builder(|_| {
            Ok(Greeter {
                greeting: "hi".into(),
            })
        })
        .build();
        assert_eq!(bean.scope(), &Scope::Dependent);
        assert_eq!(bean.kind(), BeanKind::Class);
        assert!(!bean.is_alternative());
        assert!(bean.provides(TypeId::of::<Greeter>()));
        assert!(bean.qualifiers().contains(&Qualifier::Default));
        assert!(bean.qualifiers().contains(&Qualifier::Any));
    }

    #[test]
    fn test_named_bean_label_and_qualifier() {
        let bean = Bean::builder(|_| Ok(0u32)).named("answer").build();
        assert_eq!(bean.label(), "answer");
        assert_eq!(bean.name(), Some("answer"));
        assert!(bean.qualifiers().contains(&Qualifier::named("answer")));
    }

    #[test]
    fn test_cast_to_provided_type() {
        let bean = Bean::builder(|_| {
            Ok(Greeter {
                greeting: "hello".into(),
            })
        })
        .provides::<String, _>(|g| Arc::new(g.greeting.clone()))
        .build();

        let instance: InstancePtr = Arc::new(Greeter {
            greeting: "hello".into(),
        });
        let greeter: Arc<Greeter> = bean.cast_to(&instance).unwrap();
        assert_eq!(greeter.greeting, "hello");
        let s: Arc<String> = bean.cast_to(&instance).unwrap();
        assert_eq!(*s, "hello");

        let err = bean.cast_to::<u64>(&instance).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_create_without_container_fails() {
        let bean = Bean::builder(|_| Ok(1u8)).build();
        let err = bean.create(&CreationalContext::root()).unwrap_err();
        assert!(err.is_not_running());
    }

    #[test]
    fn test_destroy_runs_pre_destroy_then_destroyer() {
        use parking_lot::Mutex;
        let log = Arc::new(Mutex::new(Vec::new()));
        let (l1, l2) = (Arc::clone(&log), Arc::clone(&log));
        let bean = Bean::builder(|_| Ok(5i32))
            .pre_destroy(move |_| l1.lock().push("pre_destroy"))
            .destroyer(move |_, _| l2.lock().push("destroy"))
            .build();
        bean.destroy_instance(Arc::new(5i32), &CreationalContext::root());
        assert_eq!(*log.lock(), vec!["pre_destroy", "destroy"]);
    }
}
