//! The creational-context accumulator: per-creation-request ownership of
//! dependent instances.

use std::fmt;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::bean::{Bean, InstancePtr};

/// A record tracked by a [`CreationalContext`]: a dependent instance created
/// transitively while satisfying some other object's dependencies.
struct DependentRecord {
    bean: Arc<Bean>,
    instance: InstancePtr,
    /// The accumulator owning the instance's *own* dependents.
    ctx: CreationalContext,
}

/// An exclusively-owned accumulator recording the dependent instances created
/// transitively while satisfying one top-level creation request, so they can
/// all be destroyed together when the top-level instance is destroyed.
///
/// Cheap to clone (shared interior). Every dependent instance is owned by
/// exactly one accumulator; accumulators form a tree rooted at the top-level
/// creation request, never a cycle, because a bean cannot be constructed
/// before its own dependencies.
///
/// A single accumulator must only be appended to by the single thread
/// executing its creation request's dependency-graph traversal. The internal
/// mutex keeps misuse memory-safe but concurrent appends remain outside the
/// contract.
#[derive(Clone, Default)]
pub struct CreationalContext {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Mutex<Vec<DependentRecord>>,
}

impl CreationalContext {
    /// Fresh accumulator for a top-level creation request.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Fresh accumulator for a transitively created instance.
    ///
    /// No back-pointer is kept: ownership flows strictly downward through
    /// the records of the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self::default()
    }

    /// Append-only registration of a dependent instance together with its
    /// own accumulator.
    pub fn add_dependent_instance(
        &self,
        bean: Arc<Bean>,
        instance: InstancePtr,
        own_ctx: CreationalContext,
    ) {
        trace!(bean = %bean.label(), "registering dependent instance");
        self.inner.records.lock().push(DependentRecord {
            bean,
            instance,
            ctx: own_ctx,
        });
    }

    /// Bulk destruction: drains records newest-first, destroying each
    /// instance through its bean and then releasing the record's own
    /// accumulator, cascading down the tree.
    ///
    /// A parent instance is therefore destroyed before its dependents, so
    /// pre-destroy callbacks still see their dependencies alive. A second
    /// `release` is a no-op.
    pub fn release(&self) {
        // Take the records out before destroying so a destroy callback that
        // reaches back into this accumulator sees it empty.
        let drained = mem::take(&mut *self.inner.records.lock());
        if drained.is_empty() {
            return;
        }
        trace!(count = drained.len(), "releasing dependent instances");
        for record in drained.into_iter().rev() {
            record.bean.destroy_instance(record.instance, &record.ctx);
            record.ctx.release();
        }
    }

    /// Number of directly tracked dependent instances.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner.records.lock().len()
    }

    /// Whether no dependent instances are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dependent_count() == 0
    }
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationalContext")
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::Bean;
    use parking_lot::Mutex as PlMutex;

    fn recording_bean(label: &str, log: Arc<PlMutex<Vec<String>>>) -> Arc<Bean> {
        let name = label.to_string();
        Arc::new(
            Bean::builder(|_| Ok(()))
                .named(label)
                .pre_destroy(move |_: &Arc<()>| log.lock().push(name.clone()))
                .build(),
        )
    }

    fn instance() -> InstancePtr {
        Arc::new(())
    }

    #[test]
    fn test_registration_is_observable() {
        let cc = CreationalContext::root();
        let log = Arc::new(PlMutex::new(Vec::new()));
        let bean = recording_bean("a", log);
        assert!(cc.is_empty());
        cc.add_dependent_instance(bean, instance(), cc.child());
        assert_eq!(cc.dependent_count(), 1);
    }

    #[test]
    fn test_release_destroys_newest_first() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let cc = CreationalContext::root();
        for label in ["first", "second", "third"] {
            let bean = recording_bean(label, Arc::clone(&log));
            cc.add_dependent_instance(bean, instance(), cc.child());
        }
        cc.release();
        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
    }

    #[test]
    fn test_release_cascades_into_child_accumulators() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let root = CreationalContext::root();
        let parent = recording_bean("parent", Arc::clone(&log));
        let child = recording_bean("child", Arc::clone(&log));

        let parent_ctx = root.child();
        parent_ctx.add_dependent_instance(child, instance(), parent_ctx.child());
        root.add_dependent_instance(parent, instance(), parent_ctx);

        root.release();
        // Parent is destroyed before its dependents cascade.
        assert_eq!(*log.lock(), vec!["parent", "child"]);
    }

    #[test]
    fn test_release_is_idempotent() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let cc = CreationalContext::root();
        cc.add_dependent_instance(recording_bean("a", Arc::clone(&log)), instance(), cc.child());
        cc.release();
        cc.release();
        assert_eq!(log.lock().len(), 1);
        assert!(cc.is_empty());
    }
}
