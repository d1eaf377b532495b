//! Symbol table of one program version
//!
//! Provides [`SymbolTable`], the declarations of a compilation indexed by
//! [`DeclKey`] with a radix trie for subtree queries, and [`ReferenceSet`],
//! the types and members available from referenced assemblies.

use crate::key::{DeclKey, DeclKind};
use crate::symbol::SymbolDef;
use crate::types::TypeSymbol;
use crate::validation::{TableValidator, ValidationError};
use indexmap::IndexMap;
use radix_trie::{Trie, TrieCommon};

/// Member of a referenced type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalMember {
    Method {
        name: String,
        params: Vec<TypeSymbol>,
        return_type: TypeSymbol,
        is_static: bool,
    },
    Field {
        name: String,
        ty: TypeSymbol,
        is_static: bool,
    },
}

impl ExternalMember {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Method { name, .. } | Self::Field { name, .. } => name,
        }
    }
}

/// Type defined in a referenced assembly
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalType {
    pub full_name: String,
    pub assembly: String,
    pub base: Option<String>,
    pub value_type: bool,
    /// Interop type that would be embedded into the module (NoPIA)
    pub embedded_interop: bool,
    pub members: Vec<ExternalMember>,
}

impl ExternalType {
    #[must_use]
    pub fn new(full_name: impl Into<String>, assembly: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            assembly: assembly.into(),
            base: None,
            value_type: false,
            embedded_interop: false,
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    #[must_use]
    pub fn with_value_type(mut self) -> Self {
        self.value_type = true;
        self
    }

    #[must_use]
    pub fn with_embedded_interop(mut self) -> Self {
        self.embedded_interop = true;
        self
    }

    #[must_use]
    pub fn with_method(mut self, name: impl Into<String>, params: Vec<TypeSymbol>, return_type: TypeSymbol) -> Self {
        self.members.push(ExternalMember::Method {
            name: name.into(),
            params,
            return_type,
            is_static: false,
        });
        self
    }

    #[must_use]
    pub fn with_static_method(mut self, name: impl Into<String>, params: Vec<TypeSymbol>, return_type: TypeSymbol) -> Self {
        self.members.push(ExternalMember::Method {
            name: name.into(),
            params,
            return_type,
            is_static: true,
        });
        self
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, ty: TypeSymbol) -> Self {
        self.members.push(ExternalMember::Field {
            name: name.into(),
            ty,
            is_static: false,
        });
        self
    }

    /// Method with the given name and parameter types
    #[must_use]
    pub fn find_method(&self, name: &str, params: &[TypeSymbol]) -> Option<&ExternalMember> {
        self.members.iter().find(|m| match m {
            ExternalMember::Method { name: n, params: p, .. } => n == name && p.as_slice() == params,
            ExternalMember::Field { .. } => false,
        })
    }

    /// Field with the given name
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&ExternalMember> {
        self.members
            .iter()
            .find(|m| matches!(m, ExternalMember::Field { name: n, .. } if n == name))
    }
}

/// Types visible from referenced assemblies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceSet {
    types: IndexMap<String, ExternalType>,
}

impl ReferenceSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a referenced type
    pub fn insert(&mut self, ty: ExternalType) {
        self.types.insert(ty.full_name.clone(), ty);
    }

    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<&ExternalType> {
        self.types.get(full_name)
    }

    #[must_use]
    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalType> {
        self.types.values()
    }

    /// Distinct assembly names, in first-use order
    #[must_use]
    pub fn assemblies(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for ty in self.types.values() {
            if !out.contains(&ty.assembly.as_str()) {
                out.push(&ty.assembly);
            }
        }
        out
    }

    /// Whether `derived` is or inherits from `base`
    #[must_use]
    pub fn derives_from(&self, derived: &str, base: &str) -> bool {
        let mut current = Some(derived);
        let mut depth = 0;
        while let Some(name) = current {
            if name == base {
                return true;
            }
            depth += 1;
            if depth > self.types.len() {
                return false;
            }
            current = self.types.get(name).and_then(|t| t.base.as_deref());
        }
        false
    }
}

/// Declarations of one program version
///
/// Declaration order is preserved; it drives row order when a whole type is
/// laid out.
#[derive(Debug)]
pub struct SymbolTable {
    symbols: IndexMap<DeclKey, SymbolDef>,
    trie: Trie<String, DeclKey>,
    references: ReferenceSet,
}

impl SymbolTable {
    /// Start building a table
    #[must_use]
    pub fn builder() -> SymbolTableBuilder {
        SymbolTableBuilder::default()
    }

    /// Table with no declarations
    #[must_use]
    pub fn empty() -> Self {
        Self {
            symbols: IndexMap::new(),
            trie: Trie::new(),
            references: ReferenceSet::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &DeclKey) -> Option<&SymbolDef> {
        self.symbols.get(key)
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &DeclKey) -> bool {
        self.symbols.contains_key(key)
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// All declarations in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &SymbolDef> {
        self.symbols.values()
    }

    /// Declarations of one kind, in declaration order
    pub fn of_kind(&self, kind: DeclKind) -> impl Iterator<Item = &SymbolDef> {
        self.symbols.values().filter(move |s| s.key.kind() == kind)
    }

    /// Direct members (and nested types) of a type, in declaration order
    #[must_use]
    pub fn members_of(&self, ty: &DeclKey) -> Vec<&SymbolDef> {
        self.symbols
            .values()
            .filter(|s| s.key.owner() == Some(ty))
            .collect()
    }

    /// Every declaration nested under `key` (members, nested types and their
    /// members), excluding `key` itself
    #[must_use]
    pub fn descendants(&self, key: &DeclKey) -> Vec<&SymbolDef> {
        let prefix = format!("{}/", key.to_trie_key());
        let mut keys: Vec<&DeclKey> = self
            .trie
            .get_raw_descendant(&prefix)
            .map(|sub| {
                sub.iter()
                    .filter(|(k, _)| k.starts_with(&prefix))
                    .map(|(_, v)| v)
                    .collect()
            })
            .unwrap_or_default();
        keys.sort_by_key(|k| self.symbols.get_index_of(*k));
        keys.into_iter().filter_map(|k| self.symbols.get(k)).collect()
    }

    /// Declarations of the same kind, owner, name and arity as `key`
    #[must_use]
    pub fn structural_candidates(&self, key: &DeclKey) -> Vec<&DeclKey> {
        self.symbols
            .keys()
            .filter(|k| {
                k.kind() == key.kind()
                    && k.owner() == key.owner()
                    && k.name() == key.name()
                    && k.arity() == key.arity()
            })
            .collect()
    }

    /// Ordinal of a method among the methods of its type
    #[must_use]
    pub fn method_ordinal(&self, method: &DeclKey) -> Option<u32> {
        let owner = method.owner()?;
        self.symbols
            .keys()
            .filter(|k| k.kind() == DeclKind::Method && k.owner() == Some(owner))
            .position(|k| k == method)
            .and_then(|p| u32::try_from(p).ok())
    }

    /// Property or event whose accessor is `method`
    #[must_use]
    pub fn associated_member(&self, method: &DeclKey) -> Option<&SymbolDef> {
        let owner = method.owner()?;
        self.members_of(owner)
            .into_iter()
            .find(|s| s.accessors().contains(&method))
    }

    #[inline]
    #[must_use]
    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }
}

/// Builder for [`SymbolTable`]
#[derive(Debug, Default)]
pub struct SymbolTableBuilder {
    symbols: IndexMap<DeclKey, SymbolDef>,
    references: ReferenceSet,
}

impl SymbolTableBuilder {
    /// Add a declaration
    ///
    /// # Errors
    /// Returns error if the key is already declared
    pub fn add(&mut self, symbol: SymbolDef) -> Result<&mut Self, SymbolError> {
        if self.symbols.contains_key(&symbol.key) {
            return Err(SymbolError::Duplicate(symbol.key.to_string()));
        }
        self.symbols.insert(symbol.key.clone(), symbol);
        Ok(self)
    }

    /// Add a referenced type
    pub fn reference(&mut self, ty: ExternalType) -> &mut Self {
        self.references.insert(ty);
        self
    }

    /// Validate and index the declarations
    ///
    /// # Errors
    /// Returns error if the declarations are inconsistent
    pub fn build(self) -> Result<SymbolTable, SymbolError> {
        let mut trie = Trie::new();
        for key in self.symbols.keys() {
            trie.insert(key.to_trie_key(), key.clone());
        }
        let table = SymbolTable {
            symbols: self.symbols,
            trie,
            references: self.references,
        };
        TableValidator::new().validate(&table)?;
        Ok(table)
    }
}

/// Errors raised while building a symbol table
#[derive(Debug, thiserror::Error)]
pub enum SymbolError {
    /// Key declared twice
    #[error("duplicate declaration: {0}")]
    Duplicate(String),

    /// Declarations are inconsistent
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{FieldDetail, MethodDetail, SymbolDetail, TypeDetail};

    fn type_def(key: &DeclKey) -> SymbolDef {
        SymbolDef::new(key.clone(), SymbolDetail::Type(TypeDetail::default()))
    }

    fn method_def(key: &DeclKey) -> SymbolDef {
        SymbolDef::new(
            key.clone(),
            SymbolDetail::Method(MethodDetail {
                params: Vec::new(),
                return_type: TypeSymbol::VOID,
                generic_params: Vec::new(),
                is_static: false,
                is_virtual: false,
                is_abstract: false,
                is_special_name: false,
            }),
        )
    }

    fn field_def(key: &DeclKey) -> SymbolDef {
        SymbolDef::new(
            key.clone(),
            SymbolDetail::Field(FieldDetail {
                ty: TypeSymbol::INT32,
                is_static: false,
                is_readonly: false,
            }),
        )
    }

    #[test]
    fn descendants_cover_nested_types() {
        let c = DeclKey::top_level("", "C", 0);
        let c2 = DeclKey::top_level("", "C2", 0);
        let d = DeclKey::nested(&c, "D", 0);
        let mut builder = SymbolTable::builder();
        builder.add(type_def(&c)).unwrap();
        builder.add(type_def(&c2)).unwrap();
        builder.add(method_def(&DeclKey::method(&c, "F", 0, "()"))).unwrap();
        builder.add(type_def(&d)).unwrap();
        builder.add(field_def(&DeclKey::field(&d, "x"))).unwrap();
        builder.add(method_def(&DeclKey::method(&c2, "G", 0, "()"))).unwrap();
        let table = builder.build().unwrap();

        let names: Vec<String> = table.descendants(&c).iter().map(|s| s.key.to_string()).collect();
        assert_eq!(names, vec!["C.F()", "C+D", "C+D.x"]);
        assert_eq!(table.members_of(&c).len(), 2);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let c = DeclKey::top_level("", "C", 0);
        let mut builder = SymbolTable::builder();
        builder.add(type_def(&c)).unwrap();
        assert!(matches!(builder.add(type_def(&c)), Err(SymbolError::Duplicate(_))));
    }

    #[test]
    fn method_ordinal_counts_methods_only() {
        let c = DeclKey::top_level("", "C", 0);
        let f = DeclKey::method(&c, "F", 0, "()");
        let g = DeclKey::method(&c, "G", 0, "()");
        let mut builder = SymbolTable::builder();
        builder.add(type_def(&c)).unwrap();
        builder.add(method_def(&f)).unwrap();
        builder.add(field_def(&DeclKey::field(&c, "x"))).unwrap();
        builder.add(method_def(&g)).unwrap();
        let table = builder.build().unwrap();
        assert_eq!(table.method_ordinal(&f), Some(0));
        assert_eq!(table.method_ordinal(&g), Some(1));
    }

    #[test]
    fn reference_set_inheritance() {
        let mut refs = ReferenceSet::new();
        refs.insert(ExternalType::new("System.Object", "mscorlib"));
        refs.insert(ExternalType::new("System.Exception", "mscorlib").with_base("System.Object"));
        refs.insert(ExternalType::new("My.Error", "lib").with_base("System.Exception"));
        assert!(refs.derives_from("My.Error", "System.Object"));
        assert!(!refs.derives_from("System.Object", "System.Exception"));
        assert_eq!(refs.assemblies(), vec!["mscorlib", "lib"]);
    }
}
