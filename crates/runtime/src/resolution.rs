//! Typesafe resolution: candidate matching, ambiguity arbitration, and the
//! resolution cache.

use std::any::TypeId;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::bean::Bean;
use crate::error::{Error, Result};
use crate::qualifier::{Qualifier, Qualifiers};

/// All beans providing `type_id` whose declared qualifiers satisfy
/// `required`, sorted by descending priority.
pub(crate) fn matching(
    beans: &[Arc<Bean>],
    type_id: TypeId,
    required: &Qualifiers,
) -> Vec<Arc<Bean>> {
    let mut out: Vec<Arc<Bean>> = beans
        .iter()
        .filter(|b| b.provides(type_id) && b.qualifiers().satisfies(required))
        .cloned()
        .collect();
    out.sort_by_key(|b| std::cmp::Reverse(b.priority()));
    out
}

/// Narrow a candidate set to a single bean.
///
/// Arbitration order: default beans are dropped when any non-default
/// candidate matches (unless `strict`); if alternatives remain, only they
/// compete and the highest priority wins, with a tie being ambiguous.
pub(crate) fn arbitrate(
    mut candidates: Vec<Arc<Bean>>,
    requested_type: &'static str,
    required: &Qualifiers,
    strict: bool,
) -> Result<Arc<Bean>> {
    if candidates.is_empty() {
        return Err(Error::unsatisfied(requested_type, required));
    }
    if !strict && candidates.iter().any(|b| !b.is_default_bean()) {
        candidates.retain(|b| !b.is_default_bean());
    }
    if candidates.iter().any(|b| b.is_alternative()) {
        candidates.retain(|b| b.is_alternative());
        // Already sorted by descending priority.
        if candidates.len() > 1 && candidates[0].priority() == candidates[1].priority() {
            return Err(Error::ambiguous(
                requested_type,
                candidates.iter().map(|b| b.label()).collect(),
            ));
        }
        return Ok(candidates.swap_remove(0));
    }
    match candidates.len() {
        1 => Ok(candidates.swap_remove(0)),
        _ => Err(Error::ambiguous(
            requested_type,
            candidates.iter().map(|b| b.label()).collect(),
        )),
    }
}

/// Memoizes successful single resolutions, keyed by requested type and the
/// sorted required qualifiers. Cleared on container shutdown.
#[derive(Default)]
pub(crate) struct ResolutionCache {
    cache: DashMap<(TypeId, Vec<Qualifier>), Arc<Bean>>,
}

impl ResolutionCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lookup(&self, type_id: TypeId, required: &Qualifiers) -> Option<Arc<Bean>> {
        self.cache
            .get(&(type_id, required.sorted()))
            .map(|entry| Arc::clone(entry.value()))
    }

    pub(crate) fn store(&self, type_id: TypeId, required: &Qualifiers, bean: Arc<Bean>) {
        trace!(bean = %bean.label(), "caching resolution");
        self.cache.insert((type_id, required.sorted()), bean);
    }

    pub(crate) fn clear(&self) {
        self.cache.clear();
    }
}
