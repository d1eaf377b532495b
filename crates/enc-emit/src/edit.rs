//! Semantic edits
//!
//! Provides [`SemanticEdit`], the classified change to one declaration as
//! supplied by the front end.

use crate::error::{Diagnostic, DiagnosticCode};
use enc_symbols::{DeclKey, SyntaxMap};
use std::collections::BTreeSet;

/// Change to one declaration between two program versions
#[derive(Debug, Clone)]
pub enum SemanticEdit {
    /// Declaration added in the new version
    Insert {
        /// Key in the new compilation
        new_symbol: DeclKey,
    },
    /// Declaration changed in place
    Update {
        /// Key in the previous compilation
        old_symbol: DeclKey,
        /// Key in the new compilation
        new_symbol: DeclKey,
        /// Correlates declaring syntax of locals, lambdas and closures
        syntax_map: Option<SyntaxMap>,
    },
    /// Declaration removed
    Delete {
        /// Key in the previous compilation
        old_symbol: DeclKey,
    },
    /// Type re-emitted under a new row
    Replace {
        /// Key in the new compilation
        new_symbol: DeclKey,
    },
}

impl SemanticEdit {
    #[must_use]
    pub fn insert(new_symbol: DeclKey) -> Self {
        Self::Insert { new_symbol }
    }

    /// Update without a syntax map
    #[must_use]
    pub fn update(symbol: DeclKey) -> Self {
        Self::Update {
            old_symbol: symbol.clone(),
            new_symbol: symbol,
            syntax_map: None,
        }
    }

    /// Update of a declaration whose key is unchanged
    #[must_use]
    pub fn update_with_map(symbol: DeclKey, syntax_map: SyntaxMap) -> Self {
        Self::Update {
            old_symbol: symbol.clone(),
            new_symbol: symbol,
            syntax_map: Some(syntax_map),
        }
    }

    #[must_use]
    pub fn delete(old_symbol: DeclKey) -> Self {
        Self::Delete { old_symbol }
    }

    #[must_use]
    pub fn replace(new_symbol: DeclKey) -> Self {
        Self::Replace { new_symbol }
    }

    /// Symbol the edit targets: the new symbol when present, the old one otherwise
    #[must_use]
    pub fn target(&self) -> &DeclKey {
        match self {
            Self::Insert { new_symbol }
            | Self::Update { new_symbol, .. }
            | Self::Replace { new_symbol } => new_symbol,
            Self::Delete { old_symbol } => old_symbol,
        }
    }

    /// Edit kind name
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Replace { .. } => "replace",
        }
    }
}

/// Report every symbol targeted by more than one edit
#[must_use]
pub fn duplicate_edits(edits: &[SemanticEdit]) -> Vec<Diagnostic> {
    let mut seen = BTreeSet::new();
    let mut reported = BTreeSet::new();
    let mut diagnostics = Vec::new();
    for edit in edits {
        let target = edit.target();
        if !seen.insert(target) && reported.insert(target) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticCode::DuplicateEdit,
                    format!("symbol '{target}' is targeted by more than one edit"),
                )
                .with_symbol(target.to_string()),
            );
        }
    }
    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_prefers_new_symbol() {
        let c = DeclKey::top_level("", "C", 0);
        let old = DeclKey::method(&c, "F", 0, "()");
        let new = DeclKey::method(&c, "G", 0, "()");
        let edit = SemanticEdit::Update {
            old_symbol: old.clone(),
            new_symbol: new.clone(),
            syntax_map: None,
        };
        assert_eq!(edit.target(), &new);
        assert_eq!(SemanticEdit::delete(old.clone()).target(), &old);
        assert_eq!(edit.kind(), "update");
    }

    #[test]
    fn duplicates_reported_once_per_symbol() {
        let c = DeclKey::top_level("", "C", 0);
        let f = DeclKey::method(&c, "F", 0, "()");
        let edits = vec![
            SemanticEdit::update(f.clone()),
            SemanticEdit::delete(f.clone()),
            SemanticEdit::insert(f.clone()),
            SemanticEdit::update(c),
        ];
        let diagnostics = duplicate_edits(&edits);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::DuplicateEdit);
        assert_eq!(diagnostics[0].symbol.as_deref(), Some("C.F()"));
    }
}
