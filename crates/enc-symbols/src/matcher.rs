//! Cross-version symbol matching
//!
//! Provides [`SymbolMatcher`], which finds the declaration of the previous
//! program version that corresponds to a key. The exact identity is tried
//! first; otherwise a structural search over declarations of the same kind,
//! owner, name and arity must yield exactly one candidate.

use crate::key::DeclKey;
use crate::table::SymbolTable;

/// Matches keys against the declarations of a previous version
#[derive(Debug, Clone, Copy)]
pub struct SymbolMatcher<'a> {
    previous: &'a SymbolTable,
}

impl<'a> SymbolMatcher<'a> {
    #[inline]
    #[must_use]
    pub fn new(previous: &'a SymbolTable) -> Self {
        Self { previous }
    }

    /// Previous declaration matching `key`
    ///
    /// # Errors
    /// - [`MatchError::Unresolved`] when nothing matches
    /// - [`MatchError::Ambiguous`] when several structural candidates match
    pub fn resolve(&self, key: &DeclKey) -> Result<&'a DeclKey, MatchError> {
        if let Some(symbol) = self.previous.get(key) {
            return Ok(&symbol.key);
        }
        let candidates = self.previous.structural_candidates(key);
        match candidates.as_slice() {
            [] => Err(MatchError::Unresolved(key.to_string())),
            [single] => Ok(single),
            many => Err(MatchError::Ambiguous {
                symbol: key.to_string(),
                candidates: many.iter().map(ToString::to_string).collect(),
            }),
        }
    }

    /// Like [`resolve`](Self::resolve) but without the structural fallback
    #[must_use]
    pub fn resolve_exact(&self, key: &DeclKey) -> Option<&'a DeclKey> {
        self.previous.get(key).map(|s| &s.key)
    }
}

/// Failure to match a symbol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    /// No counterpart in the previous version
    #[error("symbol {0} has no counterpart in the previous version")]
    Unresolved(String),

    /// Several structural counterparts
    #[error("symbol {symbol} matches several previous declarations: {candidates:?}")]
    Ambiguous {
        symbol: String,
        candidates: Vec<String>,
    },
}
