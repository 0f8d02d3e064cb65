//! Qualifiers and the CDI-style matching rules used by typesafe resolution.

use std::fmt;

use smallvec::SmallVec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single qualifier attached to a bean or required by a lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Qualifier {
    /// The implicit qualifier every bean without custom qualifiers carries.
    Default,
    /// Matches every bean; never narrows a lookup.
    Any,
    /// A by-name qualifier; matches only a bean with the same name.
    Named(String),
    /// A user-defined marker qualifier, identified by its name.
    Custom(String),
}

impl Qualifier {
    /// Create a [`Qualifier::Named`].
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Create a [`Qualifier::Custom`].
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("@Default"),
            Self::Any => f.write_str("@Any"),
            Self::Named(name) => write!(f, "@Named({name})"),
            Self::Custom(name) => write!(f, "@{name}"),
        }
    }
}

/// A small set of qualifiers.
///
/// Order is insertion order; duplicates are ignored on insert. Most beans
/// carry two or three qualifiers, hence the inline capacity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Qualifiers(SmallVec<[Qualifier; 2]>);

impl Qualifiers {
    /// Empty qualifier set. For a lookup this means "the default bean"
    /// (see [`Qualifiers::satisfies`]).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, qualifier: Qualifier) -> Self {
        self.add(qualifier);
        self
    }

    /// Insert a qualifier, ignoring duplicates.
    pub fn add(&mut self, qualifier: Qualifier) {
        if !self.0.contains(&qualifier) {
            self.0.push(qualifier);
        }
    }

    /// Whether the set contains the given qualifier.
    #[must_use]
    pub fn contains(&self, qualifier: &Qualifier) -> bool {
        self.0.contains(qualifier)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Qualifier> {
        self.0.iter()
    }

    /// Whether this *declared* set satisfies a *required* set, per the
    /// typesafe-resolution rules:
    ///
    /// - an empty required set means `@Default`;
    /// - `@Any` in the required set matches every bean;
    /// - every other required qualifier must be present in the declared set
    ///   (`@Named` thereby requires name equality).
    #[must_use]
    pub fn satisfies(&self, required: &Qualifiers) -> bool {
        if required.is_empty() {
            return self.contains(&Qualifier::Default);
        }
        required
            .iter()
            .all(|q| matches!(q, Qualifier::Any) || self.contains(q))
    }

    /// Whether every qualifier in this set is present in `other`, treating
    /// `@Any` as always present. An empty set is a subset of everything.
    ///
    /// This is the event-observer rule: an observer with no qualifiers sees
    /// every event of its type.
    #[must_use]
    pub fn all_in(&self, other: &Qualifiers) -> bool {
        self.iter()
            .all(|q| matches!(q, Qualifier::Any) || other.contains(q))
    }

    /// The set as a sorted `Vec`, used as a resolution-cache key component.
    #[must_use]
    pub fn sorted(&self) -> Vec<Qualifier> {
        let mut out: Vec<Qualifier> = self.0.to_vec();
        out.sort();
        out
    }

    /// Normalize a bean's declared qualifiers: `@Any` is always added, and
    /// `@Default` is added unless a custom qualifier is declared (`@Named`
    /// alone does not suppress `@Default`).
    pub(crate) fn normalize_declared(&mut self) {
        let has_custom = self.iter().any(|q| matches!(q, Qualifier::Custom(_)));
        if !has_custom {
            self.add(Qualifier::Default);
        }
        self.add(Qualifier::Any);
    }
}

impl fmt::Display for Qualifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, q) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{q}")?;
        }
        f.write_str("]")
    }
}

impl From<Qualifier> for Qualifiers {
    fn from(qualifier: Qualifier) -> Self {
        Self::new().with(qualifier)
    }
}

impl FromIterator<Qualifier> for Qualifiers {
    fn from_iter<I: IntoIterator<Item = Qualifier>>(iter: I) -> Self {
        let mut out = Self::new();
        for q in iter {
            out.add(q);
        }
        out
    }
}
