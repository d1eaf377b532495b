//! Edit resolution
//!
//! Provides [`EditResolver`], which binds each [`SemanticEdit`] to baseline
//! rows. Lookups try the declaration identity first and fall back to the
//! structural [`SymbolMatcher`] over the baseline's program; failures are
//! collected as diagnostics for every edit before the diff is abandoned.

use crate::baseline::Baseline;
use crate::edit::SemanticEdit;
use crate::error::{Diagnostic, DiagnosticCode, EmitError};
use enc_metadata::Handle;
use enc_symbols::{DeclKey, DeclKind, MatchError, SymbolMatcher, SymbolTable, SyntaxMap};

/// Edit bound to baseline rows
#[derive(Debug, Clone)]
pub enum ResolvedEdit {
    /// Declaration without a row
    Insert { key: DeclKey },
    /// Previously deleted declaration coming back to its row
    Reinsert { key: DeclKey, handle: Handle },
    /// Declaration rewritten in place
    Update {
        old: DeclKey,
        new: DeclKey,
        handle: Handle,
        syntax_map: Option<SyntaxMap>,
    },
    /// Declaration removed; its row stays
    Delete { key: DeclKey, handle: Handle },
    /// Type re-emitted under a new row
    Replace { key: DeclKey, previous: Handle },
}

impl ResolvedEdit {
    /// Key in the new compilation, or the deleted key
    #[must_use]
    pub fn key(&self) -> &DeclKey {
        match self {
            Self::Insert { key }
            | Self::Reinsert { key, .. }
            | Self::Delete { key, .. }
            | Self::Replace { key, .. } => key,
            Self::Update { new, .. } => new,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Insert { .. } => "insert",
            Self::Reinsert { .. } => "reinsert",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Replace { .. } => "replace",
        }
    }
}

/// Resolved edits and the diagnostics that prevent emission
#[derive(Debug, Default)]
pub struct Resolution {
    pub edits: Vec<ResolvedEdit>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Binds edits to the rows of a baseline
#[derive(Debug, Clone, Copy)]
pub struct EditResolver<'a> {
    baseline: &'a Baseline,
    compilation: &'a SymbolTable,
}

impl<'a> EditResolver<'a> {
    /// Resolver for edits producing `compilation` from `baseline`
    #[must_use]
    pub fn new(baseline: &'a Baseline, compilation: &'a SymbolTable) -> Self {
        Self { baseline, compilation }
    }

    /// Resolve every edit, collecting diagnostics
    ///
    /// # Errors
    /// Returns error on an internal inconsistency such as inserting a
    /// declaration that already has a live row
    pub fn resolve_all(&self, edits: &[SemanticEdit]) -> Result<Resolution, EmitError> {
        let mut resolution = Resolution::default();
        for edit in edits {
            match self.resolve(edit) {
                Ok(resolved) => {
                    for r in &resolved {
                        tracing::debug!(edit = r.kind(), symbol = %r.key(), "resolved edit");
                    }
                    resolution.edits.extend(resolved);
                }
                Err(EmitError::Diagnostic(d)) => resolution.diagnostics.push(d),
                Err(e) => return Err(e),
            }
        }
        Ok(resolution)
    }

    /// Resolve one edit; a property rename that cannot keep its row expands
    /// into a delete and an insert
    ///
    /// # Errors
    /// Returns a diagnostic if a symbol cannot be bound, or an invariant
    /// violation
    pub fn resolve(&self, edit: &SemanticEdit) -> Result<Vec<ResolvedEdit>, EmitError> {
        match edit {
            SemanticEdit::Insert { new_symbol } => self.resolve_insert(new_symbol).map(|e| vec![e]),
            SemanticEdit::Update {
                old_symbol,
                new_symbol,
                syntax_map,
            } => self.resolve_update(old_symbol, new_symbol, syntax_map.clone()),
            SemanticEdit::Delete { old_symbol } => {
                let (key, handle) = self.baseline_row(old_symbol)?;
                if self.baseline.is_deleted(&key) {
                    tracing::debug!(symbol = %key, "already deleted");
                    return Ok(Vec::new());
                }
                Ok(vec![ResolvedEdit::Delete { key, handle }])
            }
            SemanticEdit::Replace { new_symbol } => {
                self.require_new(new_symbol)?;
                if new_symbol.kind() != DeclKind::Type {
                    return Err(EmitError::invariant(format!("replace edit on non-type {new_symbol}")));
                }
                let record = self
                    .baseline
                    .definition(new_symbol)
                    .ok_or_else(|| Diagnostic::unresolved(new_symbol))?;
                Ok(vec![ResolvedEdit::Replace {
                    key: new_symbol.clone(),
                    previous: record.handle,
                }])
            }
        }
    }

    fn resolve_insert(&self, key: &DeclKey) -> Result<ResolvedEdit, EmitError> {
        self.require_new(key)?;
        match self.baseline.definition(key) {
            Some(record) if self.baseline.is_deleted(key) => Ok(ResolvedEdit::Reinsert {
                key: key.clone(),
                handle: record.handle,
            }),
            Some(record) => Err(EmitError::invariant(format!(
                "inserted symbol {key} already has row {}",
                record.handle
            ))),
            None => Ok(ResolvedEdit::Insert { key: key.clone() }),
        }
    }

    fn resolve_update(
        &self,
        old: &DeclKey,
        new: &DeclKey,
        syntax_map: Option<SyntaxMap>,
    ) -> Result<Vec<ResolvedEdit>, EmitError> {
        self.require_new(new)?;
        let (old_key, handle) = self.baseline_row(old)?;
        if old_key.kind() == DeclKind::Property && old_key != *new && !self.accessors_match(&old_key, new) {
            let mut edits = vec![ResolvedEdit::Delete { key: old_key, handle }];
            edits.push(self.resolve_insert(new)?);
            return Ok(edits);
        }
        Ok(vec![ResolvedEdit::Update {
            old: old_key,
            new: new.clone(),
            handle,
            syntax_map,
        }])
    }

    /// Whether the renamed property's accessors are the old accessors' rows
    fn accessors_match(&self, old: &DeclKey, new: &DeclKey) -> bool {
        let rows = |table: &SymbolTable, key: &DeclKey| -> Option<Vec<Handle>> {
            table
                .get(key)?
                .accessors()
                .into_iter()
                .map(|a| self.baseline.definition(a).map(|r| r.handle))
                .collect()
        };
        match (rows(self.baseline.compilation(), old), rows(self.compilation, new)) {
            (Some(old_rows), Some(new_rows)) => !old_rows.is_empty() && old_rows == new_rows,
            _ => false,
        }
    }

    fn require_new(&self, key: &DeclKey) -> Result<(), Diagnostic> {
        if self.compilation.contains(key) {
            Ok(())
        } else {
            Err(Diagnostic::new(
                DiagnosticCode::UnresolvedSymbol,
                format!("symbol '{key}' is not declared in the new compilation"),
            )
            .with_symbol(key.to_string()))
        }
    }

    /// Baseline key and row of a previous declaration
    fn baseline_row(&self, key: &DeclKey) -> Result<(DeclKey, Handle), Diagnostic> {
        if let Some(record) = self.baseline.definition(key) {
            return Ok((key.clone(), record.handle));
        }
        let matched = SymbolMatcher::new(self.baseline.compilation())
            .resolve(key)
            .map_err(|e| match e {
                MatchError::Unresolved(_) => Diagnostic::unresolved(key),
                MatchError::Ambiguous { symbol, candidates } => Diagnostic::new(
                    DiagnosticCode::AmbiguousSymbol,
                    format!("symbol '{symbol}' matches several baseline declarations: {}", candidates.join(", ")),
                )
                .with_symbol(symbol),
            })?;
        let record = self
            .baseline
            .definition(matched)
            .ok_or_else(|| Diagnostic::unresolved(key))?;
        Ok((matched.clone(), record.handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::ModuleMetadata;
    use crate::debug_info::NoDebugInfo;
    use enc_metadata::TableIndex;
    use enc_symbols::{
        signature_string, MethodDetail, ParamDef, PropertyDetail, SymbolDef, SymbolDetail, TypeDetail, TypeSymbol,
    };
    use std::sync::Arc;

    fn c() -> DeclKey {
        DeclKey::top_level("", "C", 0)
    }

    fn method_def(key: &DeclKey, params: &[TypeSymbol], ret: TypeSymbol) -> SymbolDef {
        SymbolDef::new(
            key.clone(),
            SymbolDetail::Method(MethodDetail {
                params: params.iter().enumerate().map(|(i, t)| ParamDef::new(format!("p{i}"), t.clone())).collect(),
                return_type: ret,
                generic_params: Vec::new(),
                is_static: false,
                is_virtual: false,
                is_abstract: false,
                is_special_name: false,
            }),
        )
    }

    fn f(params: &[TypeSymbol]) -> DeclKey {
        DeclKey::method(&c(), "F", 0, signature_string(params))
    }

    fn table(symbols: Vec<SymbolDef>) -> SymbolTable {
        let mut builder = SymbolTable::builder();
        builder
            .add(SymbolDef::new(c(), SymbolDetail::Type(TypeDetail::default())))
            .unwrap();
        for s in symbols {
            builder.add(s).unwrap();
        }
        builder.build().unwrap()
    }

    fn baseline(previous: SymbolTable, rows: &[(DeclKey, Handle)]) -> Baseline {
        let mut builder = ModuleMetadata::builder();
        builder.definition(c(), Handle::new(TableIndex::TypeDef, 2));
        for (k, h) in rows {
            builder.definition(k.clone(), *h);
        }
        Baseline::initial(builder.build(), Arc::new(previous), Arc::new(NoDebugInfo)).unwrap()
    }

    fn m(row: u32) -> Handle {
        Handle::new(TableIndex::MethodDef, row)
    }

    #[test]
    fn update_binds_baseline_row() {
        let old = table(vec![method_def(&f(&[]), &[], TypeSymbol::VOID)]);
        let new = table(vec![method_def(&f(&[]), &[], TypeSymbol::VOID)]);
        let base = baseline(old, &[(f(&[]), m(1))]);
        let resolution = EditResolver::new(&base, &new)
            .resolve_all(&[SemanticEdit::update(f(&[]))])
            .unwrap();
        assert!(resolution.diagnostics.is_empty());
        assert!(matches!(&resolution.edits[..], [ResolvedEdit::Update { handle, .. }] if *handle == m(1)));
    }

    #[test]
    fn structural_fallback_finds_single_candidate() {
        let old_key = f(&[TypeSymbol::INT32]);
        let old = table(vec![method_def(&old_key, &[TypeSymbol::INT32], TypeSymbol::VOID)]);
        let new = table(vec![method_def(&f(&[TypeSymbol::INT64]), &[TypeSymbol::INT64], TypeSymbol::VOID)]);
        let base = baseline(old, &[(old_key.clone(), m(1))]);
        let edit = SemanticEdit::Update {
            old_symbol: f(&[TypeSymbol::INT64]),
            new_symbol: f(&[TypeSymbol::INT64]),
            syntax_map: None,
        };
        let edits = EditResolver::new(&base, &new).resolve(&edit).unwrap();
        assert!(matches!(&edits[..], [ResolvedEdit::Update { old, .. }] if *old == old_key));
    }

    #[test]
    fn ambiguous_and_unresolved_are_collected() {
        let a = f(&[TypeSymbol::INT32]);
        let b = f(&[TypeSymbol::STRING]);
        let old = table(vec![
            method_def(&a, &[TypeSymbol::INT32], TypeSymbol::VOID),
            method_def(&b, &[TypeSymbol::STRING], TypeSymbol::VOID),
        ]);
        let target = f(&[TypeSymbol::INT64]);
        let g = DeclKey::method(&c(), "G", 0, "()");
        let new = table(vec![
            method_def(&target, &[TypeSymbol::INT64], TypeSymbol::VOID),
            method_def(&g, &[], TypeSymbol::VOID),
        ]);
        let base = baseline(old, &[(a, m(1)), (b, m(2))]);
        let resolution = EditResolver::new(&base, &new)
            .resolve_all(&[SemanticEdit::update(target), SemanticEdit::update(g)])
            .unwrap();
        let codes: Vec<DiagnosticCode> = resolution.diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::AmbiguousSymbol, DiagnosticCode::UnresolvedSymbol]);
    }

    #[test]
    fn insert_of_deleted_member_is_reinsert() {
        let key = f(&[]);
        let old = table(vec![method_def(&key, &[], TypeSymbol::VOID)]);
        let new = table(vec![method_def(&key, &[], TypeSymbol::VOID)]);
        let mut base = baseline(old, &[(key.clone(), m(1))]);
        base.deleted.insert(
            key.clone(),
            crate::baseline::DeletedMemberRecord {
                token: m(1).token(),
                stub_body_generated: true,
                generation: 1,
            },
        );
        let edits = EditResolver::new(&base, &new).resolve(&SemanticEdit::insert(key)).unwrap();
        assert!(matches!(&edits[..], [ResolvedEdit::Reinsert { handle, .. }] if *handle == m(1)));
    }

    #[test]
    fn insert_of_live_member_is_invariant_violation() {
        let key = f(&[]);
        let old = table(vec![method_def(&key, &[], TypeSymbol::VOID)]);
        let new = table(vec![method_def(&key, &[], TypeSymbol::VOID)]);
        let base = baseline(old, &[(key.clone(), m(1))]);
        let err = EditResolver::new(&base, &new).resolve(&SemanticEdit::insert(key)).unwrap_err();
        assert!(matches!(err, EmitError::InvariantViolation(_)));
    }

    fn property(name: &str, getter: &DeclKey) -> SymbolDef {
        SymbolDef::new(
            DeclKey::property(&c(), name, "()"),
            SymbolDetail::Property(PropertyDetail {
                ty: TypeSymbol::INT32,
                params: Vec::new(),
                getter: Some(getter.clone()),
                setter: None,
                is_static: false,
            }),
        )
    }

    #[test]
    fn renamed_property_keeps_row_only_with_same_accessors() {
        let get_p = DeclKey::method(&c(), "get_P", 0, "()");
        let get_q = DeclKey::method(&c(), "get_Q", 0, "()");
        let p = DeclKey::property(&c(), "P", "()");
        let q = DeclKey::property(&c(), "Q", "()");
        let old = table(vec![method_def(&get_p, &[], TypeSymbol::INT32), property("P", &get_p)]);
        let rows = [(get_p.clone(), m(1)), (p.clone(), Handle::new(TableIndex::Property, 1))];

        let same_accessor = table(vec![method_def(&get_p, &[], TypeSymbol::INT32), property("Q", &get_p)]);
        let base = baseline(old, &rows);
        let edit = SemanticEdit::Update {
            old_symbol: p.clone(),
            new_symbol: q.clone(),
            syntax_map: None,
        };
        let edits = EditResolver::new(&base, &same_accessor).resolve(&edit).unwrap();
        assert!(matches!(&edits[..], [ResolvedEdit::Update { .. }]));

        let new_accessor = table(vec![method_def(&get_q, &[], TypeSymbol::INT32), property("Q", &get_q)]);
        let edits = EditResolver::new(&base, &new_accessor).resolve(&edit).unwrap();
        assert!(matches!(&edits[..], [ResolvedEdit::Delete { .. }, ResolvedEdit::Insert { .. }]));
    }
}
