//! Validation of symbol tables
//!
//! Provides [`TableValidator`], which checks that the declarations of a
//! compilation are internally consistent before the engine relies on them.

use crate::key::{DeclKey, DeclKind};
use crate::symbol::SymbolDetail;
use crate::table::SymbolTable;
use crate::types::signature_string;

/// Consistency checks over a [`SymbolTable`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TableValidator;

impl TableValidator {
    /// Create new validator instance
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate every declaration of `table`
    ///
    /// # Errors
    /// Returns the first inconsistency found
    pub fn validate(&self, table: &SymbolTable) -> Result<(), ValidationError> {
        for symbol in table.iter() {
            let key = &symbol.key;
            Self::validate_shape(key, &symbol.detail)?;

            if let Some(owner) = key.owner() {
                match table.get(owner) {
                    Some(o) if o.key.kind() == DeclKind::Type => {}
                    _ => {
                        return Err(ValidationError::MissingOwner {
                            symbol: key.to_string(),
                            owner: owner.to_string(),
                        })
                    }
                }
            }

            for accessor in symbol.accessors() {
                let valid = accessor.owner() == key.owner()
                    && table.get(accessor).is_some_and(|a| a.as_method().is_some());
                if !valid {
                    return Err(ValidationError::InvalidAccessor {
                        member: key.to_string(),
                        accessor: accessor.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_shape(key: &DeclKey, detail: &SymbolDetail) -> Result<(), ValidationError> {
        let kind_matches = matches!(
            (key.kind(), detail),
            (DeclKind::Type, SymbolDetail::Type(_))
                | (DeclKind::Field, SymbolDetail::Field(_))
                | (DeclKind::Method, SymbolDetail::Method(_))
                | (DeclKind::Property, SymbolDetail::Property(_))
                | (DeclKind::Event, SymbolDetail::Event(_))
        );
        if !kind_matches {
            return Err(ValidationError::KindMismatch {
                symbol: key.to_string(),
                kind: key.kind().to_string(),
            });
        }

        match (key, detail) {
            (DeclKey::Method { signature, arity, .. }, SymbolDetail::Method(m)) => {
                let expected = signature_string(&m.param_types());
                if *signature != expected {
                    return Err(ValidationError::SignatureMismatch {
                        symbol: key.to_string(),
                        expected,
                    });
                }
                if m.params.len() > usize::from(u16::MAX) - 1 {
                    return Err(ValidationError::TooManyParameters(key.to_string()));
                }
                if *arity as usize != m.generic_params.len() {
                    return Err(ValidationError::ArityMismatch(key.to_string()));
                }
            }
            (DeclKey::Property { signature, .. }, SymbolDetail::Property(p)) => {
                let expected = signature_string(&p.params);
                if *signature != expected {
                    return Err(ValidationError::SignatureMismatch {
                        symbol: key.to_string(),
                        expected,
                    });
                }
            }
            (DeclKey::Type { arity, .. }, SymbolDetail::Type(t)) => {
                if *arity as usize != t.generic_params.len() {
                    return Err(ValidationError::ArityMismatch(key.to_string()));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Inconsistencies detected in a symbol table
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Owner of a member is not a declared type
    #[error("{symbol}: owner {owner} is not a declared type")]
    MissingOwner { symbol: String, owner: String },

    /// Key kind and detail kind differ
    #[error("{symbol}: declaration is not a {kind}")]
    KindMismatch { symbol: String, kind: String },

    /// Key signature does not match the declared parameter types
    #[error("{symbol}: key signature does not match parameters {expected}")]
    SignatureMismatch { symbol: String, expected: String },

    /// Generic arity of the key differs from the declared parameters
    #[error("{0}: generic arity does not match generic parameters")]
    ArityMismatch(String),

    /// Parameter sequence numbers would overflow
    #[error("{0}: too many parameters")]
    TooManyParameters(String),

    /// Accessor is not a method of the same type
    #[error("{member}: accessor {accessor} is not a method of the same type")]
    InvalidAccessor { member: String, accessor: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{MethodDetail, ParamDef, SymbolDef, TypeDetail};
    use crate::table::SymbolError;
    use crate::types::TypeSymbol;

    fn method(params: Vec<ParamDef>) -> SymbolDetail {
        SymbolDetail::Method(MethodDetail {
            params,
            return_type: TypeSymbol::VOID,
            generic_params: Vec::new(),
            is_static: false,
            is_virtual: false,
            is_abstract: false,
            is_special_name: false,
        })
    }

    #[test]
    fn member_without_owner_is_rejected() {
        let c = DeclKey::top_level("", "C", 0);
        let mut builder = SymbolTable::builder();
        builder
            .add(SymbolDef::new(DeclKey::method(&c, "F", 0, "()"), method(Vec::new())))
            .unwrap();
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            SymbolError::Invalid(ValidationError::MissingOwner { .. })
        ));
    }

    #[test]
    fn signature_must_match_parameters() {
        let c = DeclKey::top_level("", "C", 0);
        let mut builder = SymbolTable::builder();
        builder
            .add(SymbolDef::new(c.clone(), SymbolDetail::Type(TypeDetail::default())))
            .unwrap();
        builder
            .add(SymbolDef::new(
                DeclKey::method(&c, "F", 0, "()"),
                method(vec![ParamDef::new("x", TypeSymbol::INT32)]),
            ))
            .unwrap();
        let err = builder.build().unwrap_err();
        assert!(matches!(
            err,
            SymbolError::Invalid(ValidationError::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn consistent_table_passes() {
        let c = DeclKey::top_level("", "C", 0);
        let mut builder = SymbolTable::builder();
        builder
            .add(SymbolDef::new(c.clone(), SymbolDetail::Type(TypeDetail::default())))
            .unwrap();
        builder
            .add(SymbolDef::new(
                DeclKey::method(&c, "F", 0, "(int32)"),
                method(vec![ParamDef::new("x", TypeSymbol::INT32)]),
            ))
            .unwrap();
        assert!(builder.build().is_ok());
    }
}
