//! Syntax node identities and syntax maps
//!
//! A [`SyntaxMap`] relates declaring syntax nodes of the previous generation
//! to nodes of the current one. It correlates locals, lambdas and closures
//! of an updated method body.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

/// Identity of a declaring syntax node within one generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SyntaxNodeId(pub u32);

impl Display for SyntaxNodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type MapFn = dyn Fn(SyntaxNodeId) -> Option<SyntaxNodeId> + Send + Sync;

/// Maps old syntax nodes to their new counterparts
#[derive(Clone)]
pub struct SyntaxMap {
    map: Arc<MapFn>,
}

impl SyntaxMap {
    /// Map backed by a function
    pub fn from_fn<F>(map: F) -> Self
    where
        F: Fn(SyntaxNodeId) -> Option<SyntaxNodeId> + Send + Sync + 'static,
    {
        Self { map: Arc::new(map) }
    }

    /// Map backed by explicit `(old, new)` pairs
    #[must_use]
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (SyntaxNodeId, SyntaxNodeId)>,
    {
        let table: HashMap<SyntaxNodeId, SyntaxNodeId> = pairs.into_iter().collect();
        Self::from_fn(move |old| table.get(&old).copied())
    }

    /// Every node maps to itself
    #[must_use]
    pub fn identity() -> Self {
        Self::from_fn(Some)
    }

    /// New node corresponding to `old`
    #[inline]
    #[must_use]
    pub fn map(&self, old: SyntaxNodeId) -> Option<SyntaxNodeId> {
        (self.map)(old)
    }

    /// Whether `old` maps to `new`
    #[inline]
    #[must_use]
    pub fn correlates(&self, old: SyntaxNodeId, new: SyntaxNodeId) -> bool {
        self.map(old) == Some(new)
    }
}

impl Debug for SyntaxMap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxMap").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_map_only_listed_nodes() {
        let map = SyntaxMap::from_pairs([(SyntaxNodeId(1), SyntaxNodeId(5))]);
        assert_eq!(map.map(SyntaxNodeId(1)), Some(SyntaxNodeId(5)));
        assert_eq!(map.map(SyntaxNodeId(2)), None);
        assert!(map.correlates(SyntaxNodeId(1), SyntaxNodeId(5)));
    }

    #[test]
    fn identity_maps_everything() {
        let map = SyntaxMap::identity();
        assert!(map.correlates(SyntaxNodeId(7), SyntaxNodeId(7)));
        assert_eq!(format!("{map:?}"), "SyntaxMap { .. }");
    }
}
