//! Symbol definitions
//!
//! Provides [`SymbolDef`], one declaration of the program with its kind-specific
//! [`SymbolDetail`], and [`AttributeData`] for applied custom attributes.

use crate::key::DeclKey;
use crate::types::TypeSymbol;
use enc_metadata::CustomAttributeArgument;
use serde::{Deserialize, Serialize};

/// Declared accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Accessibility {
    #[default]
    Private,
    Internal,
    Protected,
    Public,
}

/// An applied custom attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeData {
    /// Attribute class
    pub attribute_type: TypeSymbol,
    /// Parameter types of the constructor used
    pub constructor_params: Vec<TypeSymbol>,
    /// Fixed constructor arguments
    pub arguments: Vec<CustomAttributeArgument>,
}

impl AttributeData {
    /// Attribute applied through its parameterless constructor
    #[must_use]
    pub fn simple(attribute_type: TypeSymbol) -> Self {
        Self {
            attribute_type,
            constructor_params: Vec::new(),
            arguments: Vec::new(),
        }
    }

    /// Add a fixed argument of the given parameter type
    #[must_use]
    pub fn with_argument(mut self, param: TypeSymbol, argument: CustomAttributeArgument) -> Self {
        self.constructor_params.push(param);
        self.arguments.push(argument);
        self
    }
}

/// Type category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TypeKind {
    #[default]
    Class,
    Struct,
    Interface,
}

/// Type declaration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeDetail {
    pub kind: TypeKind,
    pub base: Option<TypeSymbol>,
    pub generic_params: Vec<String>,
    pub is_abstract: bool,
    pub is_sealed: bool,
    /// Local copy of an interop type embedded from a referenced assembly
    pub embedded_interop: bool,
}

/// Field declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDetail {
    pub ty: TypeSymbol,
    pub is_static: bool,
    pub is_readonly: bool,
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub ty: TypeSymbol,
    pub attributes: Vec<AttributeData>,
}

impl ParamDef {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeSymbol) -> Self {
        Self {
            name: name.into(),
            ty,
            attributes: Vec::new(),
        }
    }
}

/// Method declaration (constructors are methods named `.ctor`/`.cctor`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDetail {
    pub params: Vec<ParamDef>,
    pub return_type: TypeSymbol,
    pub generic_params: Vec<String>,
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_abstract: bool,
    /// Accessor or operator
    pub is_special_name: bool,
}

impl MethodDetail {
    /// Whether the method has IL (not abstract)
    #[inline]
    #[must_use]
    pub fn has_body(&self) -> bool {
        !self.is_abstract
    }

    /// Parameter types in order
    #[must_use]
    pub fn param_types(&self) -> Vec<TypeSymbol> {
        self.params.iter().map(|p| p.ty.clone()).collect()
    }
}

/// Property declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDetail {
    pub ty: TypeSymbol,
    pub params: Vec<TypeSymbol>,
    pub getter: Option<DeclKey>,
    pub setter: Option<DeclKey>,
    pub is_static: bool,
}

impl PropertyDetail {
    /// Accessors in getter, setter order
    pub fn accessors(&self) -> impl Iterator<Item = &DeclKey> {
        self.getter.iter().chain(self.setter.iter())
    }
}

/// Event declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetail {
    pub ty: TypeSymbol,
    pub adder: Option<DeclKey>,
    pub remover: Option<DeclKey>,
}

impl EventDetail {
    /// Accessors in add, remove order
    pub fn accessors(&self) -> impl Iterator<Item = &DeclKey> {
        self.adder.iter().chain(self.remover.iter())
    }
}

/// Kind-specific part of a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolDetail {
    Type(TypeDetail),
    Field(FieldDetail),
    Method(MethodDetail),
    Property(PropertyDetail),
    Event(EventDetail),
}

/// One declaration of a program version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
    pub key: DeclKey,
    pub accessibility: Accessibility,
    pub attributes: Vec<AttributeData>,
    pub detail: SymbolDetail,
}

impl SymbolDef {
    #[must_use]
    pub fn new(key: DeclKey, detail: SymbolDetail) -> Self {
        Self {
            key,
            accessibility: Accessibility::default(),
            attributes: Vec::new(),
            detail,
        }
    }

    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = accessibility;
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeData) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[inline]
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeDetail> {
        match &self.detail {
            SymbolDetail::Type(t) => Some(t),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_field(&self) -> Option<&FieldDetail> {
        match &self.detail {
            SymbolDetail::Field(f) => Some(f),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_method(&self) -> Option<&MethodDetail> {
        match &self.detail {
            SymbolDetail::Method(m) => Some(m),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_property(&self) -> Option<&PropertyDetail> {
        match &self.detail {
            SymbolDetail::Property(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_event(&self) -> Option<&EventDetail> {
        match &self.detail {
            SymbolDetail::Event(e) => Some(e),
            _ => None,
        }
    }

    /// Accessor methods of a property or event
    #[must_use]
    pub fn accessors(&self) -> Vec<&DeclKey> {
        match &self.detail {
            SymbolDetail::Property(p) => p.accessors().collect(),
            SymbolDetail::Event(e) => e.accessors().collect(),
            _ => Vec::new(),
        }
    }

    /// Every type mentioned by the declaration's signature
    #[must_use]
    pub fn signature_types(&self) -> Vec<&TypeSymbol> {
        match &self.detail {
            SymbolDetail::Type(t) => t.base.iter().collect(),
            SymbolDetail::Field(f) => vec![&f.ty],
            SymbolDetail::Method(m) => std::iter::once(&m.return_type)
                .chain(m.params.iter().map(|p| &p.ty))
                .collect(),
            SymbolDetail::Property(p) => std::iter::once(&p.ty).chain(p.params.iter()).collect(),
            SymbolDetail::Event(e) => vec![&e.ty],
        }
    }
}
