//! The request scope: a managed context with thread-bound state.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::bean::{Bean, InstancePtr};
use crate::context::{ContextState, InjectableContext, ManagedContext};
use crate::creational::CreationalContext;
use crate::error::{Error, Result};
use crate::events::{EventNotifier, ScopeBeforeDestroyed, ScopeDestroyed, ScopeInitialized};
use crate::scope::Scope;

thread_local! {
    /// Active request states on this thread, keyed by context id so that
    /// request contexts of different containers never interfere.
    static ACTIVE: RefCell<HashMap<Uuid, ContextState>> = RefCell::new(HashMap::new());
}

/// A managed context whose state is bound to the activating thread.
///
/// `activate(None)` begins a fresh request and fires [`ScopeInitialized`];
/// `activate(Some(state))` re-binds a previously captured state (context
/// propagation) and fires nothing. A captured state may move to another
/// thread but must never be concurrently active on two threads.
pub struct RequestContext {
    scope: Scope,
    id: Uuid,
    notifier: EventNotifier,
}

impl RequestContext {
    pub(crate) fn new(notifier: EventNotifier) -> Self {
        Self {
            scope: Scope::Request,
            id: Uuid::new_v4(),
            notifier,
        }
    }

    fn current_state(&self) -> Option<ContextState> {
        ACTIVE.with(|active| active.borrow().get(&self.id).cloned())
    }

    /// Activate a fresh request, run `f`, then terminate; the scope-guard
    /// idiom for request-bounded work. If `f` unwinds, the request is
    /// terminated during unwinding so the thread is left unbound.
    pub fn with_active<R>(&self, f: impl FnOnce() -> R) -> Result<R> {
        self.activate(None)?;
        let mut guard = ActiveGuard {
            ctx: self,
            armed: true,
        };
        let out = f();
        guard.armed = false;
        drop(guard);
        self.terminate()?;
        Ok(out)
    }
}

/// Terminates the bound request when dropped while armed; disarmed on the
/// normal return path so termination errors can propagate there.
struct ActiveGuard<'a> {
    ctx: &'a RequestContext,
    armed: bool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.ctx.terminate();
        }
    }
}

impl InjectableContext for RequestContext {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.current_state().is_some()
    }

    fn get(
        &self,
        bean: &Arc<Bean>,
        creational: Option<&CreationalContext>,
    ) -> Result<Option<InstancePtr>> {
        let state = self
            .current_state()
            .ok_or_else(|| Error::not_active(&self.scope))?;
        if let Some(handle) = state.lookup(bean.id()) {
            return Ok(Some(handle.instance().clone()));
        }
        if creational.is_none() {
            return Ok(None);
        }
        Ok(Some(state.create_into(bean)?))
    }

    fn destroy(&self, bean: &Arc<Bean>) -> Result<()> {
        let state = self
            .current_state()
            .ok_or_else(|| Error::not_active(&self.scope))?;
        if let Some(handle) = state.remove(bean.id()) {
            handle.destroy();
        }
        Ok(())
    }

    fn destroy_all(&self) -> Result<()> {
        let state = self
            .current_state()
            .ok_or_else(|| Error::not_active(&self.scope))?;
        self.notifier.fire_lifecycle(&ScopeBeforeDestroyed {
            scope: self.scope.clone(),
        });
        let drained = state.drain_newest_first();
        debug!(count = drained.len(), "destroying request context");
        for handle in drained {
            handle.destroy();
        }
        self.notifier.fire_lifecycle(&ScopeDestroyed {
            scope: self.scope.clone(),
        });
        state.invalidate();
        Ok(())
    }

    fn state(&self) -> Result<ContextState> {
        self.current_state()
            .ok_or_else(|| Error::not_active(&self.scope))
    }
}

impl ManagedContext for RequestContext {
    fn activate(&self, state: Option<ContextState>) -> Result<()> {
        if self.is_active() {
            return Err(Error::AlreadyActive {
                scope: self.scope.clone(),
            });
        }
        match state {
            Some(state) => {
                if !state.is_valid() {
                    return Err(Error::InvalidContextState {
                        scope: self.scope.clone(),
                    });
                }
                ACTIVE.with(|active| active.borrow_mut().insert(self.id, state));
            }
            None => {
                ACTIVE.with(|active| active.borrow_mut().insert(self.id, ContextState::new()));
                self.notifier.fire_lifecycle(&ScopeInitialized {
                    scope: self.scope.clone(),
                });
            }
        }
        debug!("request context activated");
        Ok(())
    }

    fn deactivate(&self) {
        ACTIVE.with(|active| active.borrow_mut().remove(&self.id));
    }

    fn terminate(&self) -> Result<()> {
        self.destroy_all()?;
        self.deactivate();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    #[derive(Debug)]
    struct Session;

    fn container() -> Container {
        Container::builder()
            .bean(
                Bean::builder(|_| Ok(Session))
                    .named("session")
                    .request_scoped()
                    .build(),
            )
            .build()
            .unwrap()
    }

    fn session_bean(container: &Container) -> Arc<Bean> {
        container
            .beans()
            .into_iter()
            .find(|b| b.name() == Some("session"))
            .unwrap()
    }

    #[test]
    fn test_inactive_operations_fail() {
        let container = container();
        let ctx = container.request_context();
        let bean = session_bean(&container);

        assert!(!ctx.is_active());
        let cc = CreationalContext::root();
        assert!(ctx.get(&bean, Some(&cc)).unwrap_err().is_context_not_active());
        assert!(ctx.destroy(&bean).unwrap_err().is_context_not_active());
        assert!(ctx.destroy_all().unwrap_err().is_context_not_active());
        assert!(ctx.state().unwrap_err().is_context_not_active());
    }

    #[test]
    fn test_activation_is_per_thread_and_exclusive() {
        let container = container();
        let ctx = container.request_context();
        ctx.activate(None).unwrap();
        assert!(ctx.is_active());
        assert!(matches!(
            ctx.activate(None).unwrap_err(),
            Error::AlreadyActive { .. }
        ));

        let other = Arc::clone(&ctx);
        std::thread::spawn(move || assert!(!other.is_active()))
            .join()
            .unwrap();
        ctx.terminate().unwrap();
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_captured_state_propagates_across_threads() {
        let container = container();
        let ctx = container.request_context();
        let bean = session_bean(&container);

        ctx.activate(None).unwrap();
        let cc = CreationalContext::root();
        let original = ctx.get(&bean, Some(&cc)).unwrap().unwrap();
        let captured = ctx.state().unwrap();
        ctx.deactivate();

        let worker_ctx = Arc::clone(&ctx);
        let worker_bean = Arc::clone(&bean);
        let seen = std::thread::spawn(move || {
            worker_ctx.activate(Some(captured)).unwrap();
            let seen = worker_ctx.get(&worker_bean, None).unwrap().unwrap();
            worker_ctx.terminate().unwrap();
            seen
        })
        .join()
        .unwrap();
        assert!(Arc::ptr_eq(&original, &seen));
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_invalidated_state_cannot_be_reactivated() {
        let container = container();
        let ctx = container.request_context();

        ctx.activate(None).unwrap();
        let captured = ctx.state().unwrap();
        ctx.terminate().unwrap();

        assert!(!captured.is_valid());
        assert!(matches!(
            ctx.activate(Some(captured)).unwrap_err(),
            Error::InvalidContextState { .. }
        ));
    }

    #[test]
    fn test_with_active_terminates_after_closure() {
        let container = container();
        let ctx = container.request_context();
        let bean = session_bean(&container);

        let out = ctx
            .with_active(|| {
                let cc = CreationalContext::root();
                ctx.get(&bean, Some(&cc)).unwrap().is_some()
            })
            .unwrap();
        assert!(out);
        assert!(!ctx.is_active());
    }

    #[test]
    fn test_with_active_unbinds_after_panic() {
        let container = container();
        let ctx = container.request_context();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ctx.with_active(|| panic!("request handler failed"));
        }));
        assert!(outcome.is_err());
        assert!(!ctx.is_active());

        // The thread is usable for a fresh request afterwards.
        ctx.activate(None).unwrap();
        ctx.terminate().unwrap();
    }
}
