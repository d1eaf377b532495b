//! Well-known symbol resolution
//!
//! Provides the [`WellKnownSymbolResolver`] capability the engine uses to
//! find runtime support types (exception base, marker attributes, delegate
//! base) and [`CompilationResolver`], which looks in the compilation first and
//! then in its referenced assemblies.

use crate::codegen::MemberTarget;
use crate::error::MissingSymbolError;
use enc_symbols::{signature_string, DeclKey, DeclKind, SymbolTable, TypeSymbol};

/// Runtime support types the engine may need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    Object,
    Exception,
    CompilerGeneratedAttribute,
    EmbeddedAttribute,
    MetadataUpdateDeletedAttribute,
    HotReloadException,
    MulticastDelegate,
}

impl WellKnownType {
    /// Full metadata name
    #[must_use]
    pub const fn full_name(self) -> &'static str {
        match self {
            Self::Object => "System.Object",
            Self::Exception => "System.Exception",
            Self::CompilerGeneratedAttribute => "System.Runtime.CompilerServices.CompilerGeneratedAttribute",
            Self::EmbeddedAttribute => "Microsoft.CodeAnalysis.EmbeddedAttribute",
            Self::MetadataUpdateDeletedAttribute => "System.Runtime.CompilerServices.MetadataUpdateDeletedAttribute",
            Self::HotReloadException => "System.Runtime.CompilerServices.HotReloadException",
            Self::MulticastDelegate => "System.MulticastDelegate",
        }
    }

    /// Namespace and simple name
    #[must_use]
    pub fn split_name(self) -> (&'static str, &'static str) {
        self.full_name().rsplit_once('.').unwrap_or(("", self.full_name()))
    }
}

/// Finds runtime support types and constructors
pub trait WellKnownSymbolResolver {
    /// Resolve a type
    ///
    /// # Errors
    /// Returns error naming the type if it is not available
    fn resolve_type(&self, ty: WellKnownType) -> Result<TypeSymbol, MissingSymbolError>;

    /// Resolve the instance constructor of `ty` with the given parameters
    ///
    /// # Errors
    /// Returns error naming the constructor if the type or constructor is missing
    fn resolve_constructor(&self, ty: WellKnownType, params: &[TypeSymbol]) -> Result<MemberTarget, MissingSymbolError>;

    /// Whether `ty` is or derives from `base`
    fn derives_from(&self, ty: &TypeSymbol, base: WellKnownType) -> bool;
}

/// Resolves against a compilation and its references
#[derive(Debug, Clone, Copy)]
pub struct CompilationResolver<'a> {
    compilation: &'a SymbolTable,
}

const MAX_BASE_DEPTH: usize = 64;

impl<'a> CompilationResolver<'a> {
    #[must_use]
    pub fn new(compilation: &'a SymbolTable) -> Self {
        Self { compilation }
    }

    fn defined(&self, ty: WellKnownType) -> Option<&'a DeclKey> {
        let (namespace, name) = ty.split_name();
        self.compilation
            .of_kind(DeclKind::Type)
            .map(|s| &s.key)
            .find(|k| k.owner().is_none() && k.arity() == 0 && k.namespace() == namespace && k.name() == name)
    }

    /// `HotReloadException` provided by the program or a reference, if it has
    /// the `(string, int32)` constructor and derives from `System.Exception`
    #[must_use]
    pub fn existing_hot_reload_exception(&self) -> Option<MemberTarget> {
        let ty = self.resolve_type(WellKnownType::HotReloadException).ok()?;
        if !self.derives_from(&ty, WellKnownType::Exception) {
            return None;
        }
        self.resolve_constructor(
            WellKnownType::HotReloadException,
            &[TypeSymbol::STRING, TypeSymbol::INT32],
        )
        .ok()
    }
}

impl WellKnownSymbolResolver for CompilationResolver<'_> {
    fn resolve_type(&self, ty: WellKnownType) -> Result<TypeSymbol, MissingSymbolError> {
        if let Some(key) = self.defined(ty) {
            return Ok(TypeSymbol::Defined(key.clone()));
        }
        if self.compilation.references().contains(ty.full_name()) {
            return Ok(TypeSymbol::external(ty.full_name()));
        }
        Err(MissingSymbolError::new(ty.full_name()))
    }

    fn resolve_constructor(&self, ty: WellKnownType, params: &[TypeSymbol]) -> Result<MemberTarget, MissingSymbolError> {
        let missing = || MissingSymbolError::new(format!("{}..ctor{}", ty.full_name(), signature_string(params)));
        match self.resolve_type(ty)? {
            TypeSymbol::Defined(key) => {
                let ctor = DeclKey::method(&key, ".ctor", 0, signature_string(params));
                self.compilation
                    .contains(&ctor)
                    .then_some(MemberTarget::Definition(ctor))
                    .ok_or_else(missing)
            }
            owner @ TypeSymbol::External(_) => {
                let external = self.compilation.references().get(ty.full_name()).ok_or_else(missing)?;
                external.find_method(".ctor", params).ok_or_else(missing)?;
                Ok(MemberTarget::external_method(owner, ".ctor", params.to_vec(), TypeSymbol::VOID, false))
            }
            _ => Err(missing()),
        }
    }

    fn derives_from(&self, ty: &TypeSymbol, base: WellKnownType) -> bool {
        let mut current = ty.clone();
        for _ in 0..MAX_BASE_DEPTH {
            match current {
                TypeSymbol::External(name) => {
                    return self.compilation.references().derives_from(&name, base.full_name());
                }
                TypeSymbol::Defined(key) => {
                    let (namespace, name) = base.split_name();
                    if key.owner().is_none() && key.namespace() == namespace && key.name() == name {
                        return true;
                    }
                    match self.compilation.get(&key).and_then(|s| s.as_type()).and_then(|t| t.base.clone()) {
                        Some(next) => current = next,
                        None => return false,
                    }
                }
                _ => return false,
            }
        }
        false
    }
}
