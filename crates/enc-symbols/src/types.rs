//! Type symbols
//!
//! Provides [`TypeSymbol`], the language-level type used in declarations,
//! locals and member references, and the structural shapes of anonymous
//! types and delegates.

use crate::key::DeclKey;
use enc_metadata::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Built-in types with a dedicated signature encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Void,
    Bool,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    IntPtr,
}

impl PrimitiveType {
    /// ILDASM spelling
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::Char => "char",
            Self::I1 => "int8",
            Self::U1 => "uint8",
            Self::I2 => "int16",
            Self::U2 => "uint16",
            Self::I4 => "int32",
            Self::U4 => "uint32",
            Self::I8 => "int64",
            Self::U8 => "uint64",
            Self::R4 => "float32",
            Self::R8 => "float64",
            Self::String => "string",
            Self::Object => "object",
            Self::IntPtr => "native int",
        }
    }

    #[must_use]
    pub const fn is_value_type(self) -> bool {
        !matches!(self, Self::String | Self::Object)
    }
}

/// A type as seen by the front end
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TypeSymbol {
    Primitive(PrimitiveType),
    /// Type declared in this module
    Defined(DeclKey),
    /// Type of a referenced assembly, by full metadata name
    External(String),
    /// Instantiation of a generic definition
    Generic {
        definition: Box<TypeSymbol>,
        args: Vec<TypeSymbol>,
    },
    Array(Box<TypeSymbol>),
    /// Type parameter of the enclosing type
    TypeParam(u32),
    /// Type parameter of the method
    MethodTypeParam(u32),
    Anonymous(AnonymousTypeShape),
    Delegate(DelegateShape),
}

impl TypeSymbol {
    pub const VOID: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::Void);
    pub const BOOL: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::Bool);
    pub const INT32: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::I4);
    pub const INT64: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::I8);
    pub const STRING: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::String);
    pub const OBJECT: TypeSymbol = TypeSymbol::Primitive(PrimitiveType::Object);

    /// Referenced type by full name
    #[must_use]
    pub fn external(full_name: impl Into<String>) -> Self {
        Self::External(full_name.into())
    }

    /// Single-dimensional array of `element`
    #[must_use]
    pub fn array(element: TypeSymbol) -> Self {
        Self::Array(Box::new(element))
    }

    /// Generic instantiation
    #[must_use]
    pub fn generic(definition: TypeSymbol, args: Vec<TypeSymbol>) -> Self {
        Self::Generic {
            definition: Box::new(definition),
            args,
        }
    }

    /// Whether the type (or any component) is an anonymous type or delegate
    #[must_use]
    pub fn contains_synthesized(&self) -> bool {
        match self {
            Self::Anonymous(_) | Self::Delegate(_) => true,
            Self::Generic { definition, args } => {
                definition.contains_synthesized() || args.iter().any(Self::contains_synthesized)
            }
            Self::Array(element) => element.contains_synthesized(),
            _ => false,
        }
    }

    /// Visit this type and every component type
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a TypeSymbol)) {
        visit(self);
        match self {
            Self::Generic { definition, args } => {
                definition.walk(visit);
                for arg in args {
                    arg.walk(visit);
                }
            }
            Self::Array(element) => element.walk(visit),
            Self::Anonymous(shape) => {
                for (_, ty) in &shape.members {
                    ty.walk(visit);
                }
            }
            Self::Delegate(shape) => {
                for param in &shape.params {
                    param.walk(visit);
                }
                shape.return_type.walk(visit);
            }
            _ => {}
        }
    }
}

impl From<PrimitiveType> for TypeSymbol {
    fn from(primitive: PrimitiveType) -> Self {
        Self::Primitive(primitive)
    }
}

impl Display for TypeSymbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(p) => f.write_str(p.name()),
            Self::Defined(key) => write!(f, "{key}"),
            Self::External(name) => f.write_str(name),
            Self::Generic { definition, args } => {
                write!(f, "{definition}<")?;
                write_list(f, args)?;
                f.write_str(">")
            }
            Self::Array(element) => write!(f, "{element}[]"),
            Self::TypeParam(n) => write!(f, "!{n}"),
            Self::MethodTypeParam(n) => write!(f, "!!{n}"),
            Self::Anonymous(shape) => write!(f, "{shape}"),
            Self::Delegate(shape) => write!(f, "{shape}"),
        }
    }
}

fn write_list(f: &mut Formatter<'_>, items: &[TypeSymbol]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Canonical parameter list used in method and property keys: `(int32,string)`
#[must_use]
pub fn signature_string(params: &[TypeSymbol]) -> String {
    let items: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("({})", items.join(","))
}

/// Member names and types of an anonymous type, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnonymousTypeShape {
    pub members: Vec<(String, TypeSymbol)>,
}

impl AnonymousTypeShape {
    #[must_use]
    pub fn new(members: Vec<(String, TypeSymbol)>) -> Self {
        Self { members }
    }

    /// Structural key; identical shapes share a key across generations
    #[must_use]
    pub fn key(&self) -> ContentHash {
        ContentHash::of_parts(
            std::iter::once("anonymous-type".to_owned())
                .chain(self.members.iter().flat_map(|(n, t)| [n.clone(), t.to_string()])),
        )
    }
}

impl Display for AnonymousTypeShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("<anonymous {")?;
        for (i, (name, ty)) in self.members.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {name}: {ty}")?;
        }
        f.write_str(" }>")
    }
}

/// Parameter and return types of a synthesized delegate
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DelegateShape {
    pub params: Vec<TypeSymbol>,
    pub return_type: Box<TypeSymbol>,
}

impl DelegateShape {
    #[must_use]
    pub fn new(params: Vec<TypeSymbol>, return_type: TypeSymbol) -> Self {
        Self {
            params,
            return_type: Box::new(return_type),
        }
    }

    /// Structural key; identical shapes share a key across generations
    #[must_use]
    pub fn key(&self) -> ContentHash {
        ContentHash::of_parts(
            ["delegate".to_owned(), self.return_type.to_string()]
                .into_iter()
                .chain(self.params.iter().map(ToString::to_string)),
        )
    }
}

impl Display for DelegateShape {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("<delegate (")?;
        write_list(f, &self.params)?;
        write!(f, ") {}>", self.return_type)
    }
}
