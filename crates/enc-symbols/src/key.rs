//! Declaration keys - stable identities of declarations
//!
//! Provides [`DeclKey`], which identifies a declaration independently of its
//! position in the program so the same member can be found in two versions.

use enc_metadata::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Declaration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeclKind {
    Type,
    Field,
    Method,
    Property,
    Event,
    Parameter,
    GenericParam,
}

impl Display for DeclKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Type => "type",
            Self::Field => "field",
            Self::Method => "method",
            Self::Property => "property",
            Self::Event => "event",
            Self::Parameter => "parameter",
            Self::GenericParam => "generic parameter",
        };
        f.write_str(name)
    }
}

/// Identity of a declaration
///
/// # Identity rules
/// - types: namespace, name, generic arity and enclosing type
/// - methods: owner, name, generic arity, parameter type list and the
///   implemented interface for explicit implementations
/// - properties: owner, name and indexer parameter list
/// - parameters: owning method and one-based sequence (not the name)
/// - generic parameters: owner, ordinal and name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DeclKey {
    Type {
        namespace: String,
        name: String,
        arity: u32,
        enclosing: Option<Box<DeclKey>>,
    },
    Field {
        owner: Box<DeclKey>,
        name: String,
    },
    Method {
        owner: Box<DeclKey>,
        name: String,
        arity: u32,
        /// Canonical parameter type list, e.g. `(int32,string)`
        signature: String,
        explicit_interface: Option<String>,
    },
    Property {
        owner: Box<DeclKey>,
        name: String,
        signature: String,
    },
    Event {
        owner: Box<DeclKey>,
        name: String,
    },
    Parameter {
        method: Box<DeclKey>,
        sequence: u16,
    },
    GenericParam {
        owner: Box<DeclKey>,
        ordinal: u16,
        name: String,
    },
}

impl DeclKey {
    /// Top-level type
    #[must_use]
    pub fn top_level(namespace: impl Into<String>, name: impl Into<String>, arity: u32) -> Self {
        Self::Type {
            namespace: namespace.into(),
            name: name.into(),
            arity,
            enclosing: None,
        }
    }

    /// Type nested in `enclosing`
    #[must_use]
    pub fn nested(enclosing: &DeclKey, name: impl Into<String>, arity: u32) -> Self {
        Self::Type {
            namespace: String::new(),
            name: name.into(),
            arity,
            enclosing: Some(Box::new(enclosing.clone())),
        }
    }

    #[must_use]
    pub fn field(owner: &DeclKey, name: impl Into<String>) -> Self {
        Self::Field {
            owner: Box::new(owner.clone()),
            name: name.into(),
        }
    }

    #[must_use]
    pub fn method(owner: &DeclKey, name: impl Into<String>, arity: u32, signature: impl Into<String>) -> Self {
        Self::Method {
            owner: Box::new(owner.clone()),
            name: name.into(),
            arity,
            signature: signature.into(),
            explicit_interface: None,
        }
    }

    /// Explicit implementation of a member of `interface`
    #[must_use]
    pub fn explicit_method(
        owner: &DeclKey,
        interface: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self::Method {
            owner: Box::new(owner.clone()),
            name: name.into(),
            arity: 0,
            signature: signature.into(),
            explicit_interface: Some(interface.into()),
        }
    }

    #[must_use]
    pub fn property(owner: &DeclKey, name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self::Property {
            owner: Box::new(owner.clone()),
            name: name.into(),
            signature: signature.into(),
        }
    }

    #[must_use]
    pub fn event(owner: &DeclKey, name: impl Into<String>) -> Self {
        Self::Event {
            owner: Box::new(owner.clone()),
            name: name.into(),
        }
    }

    /// Parameter `sequence` (one-based) of `method`
    #[must_use]
    pub fn parameter(method: &DeclKey, sequence: u16) -> Self {
        Self::Parameter {
            method: Box::new(method.clone()),
            sequence,
        }
    }

    #[must_use]
    pub fn generic_param(owner: &DeclKey, ordinal: u16, name: impl Into<String>) -> Self {
        Self::GenericParam {
            owner: Box::new(owner.clone()),
            ordinal,
            name: name.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> DeclKind {
        match self {
            Self::Type { .. } => DeclKind::Type,
            Self::Field { .. } => DeclKind::Field,
            Self::Method { .. } => DeclKind::Method,
            Self::Property { .. } => DeclKind::Property,
            Self::Event { .. } => DeclKind::Event,
            Self::Parameter { .. } => DeclKind::Parameter,
            Self::GenericParam { .. } => DeclKind::GenericParam,
        }
    }

    /// Containing declaration (enclosing type, owning type or method)
    #[must_use]
    pub fn owner(&self) -> Option<&DeclKey> {
        match self {
            Self::Type { enclosing, .. } => enclosing.as_deref(),
            Self::Field { owner, .. }
            | Self::Method { owner, .. }
            | Self::Property { owner, .. }
            | Self::Event { owner, .. }
            | Self::GenericParam { owner, .. } => Some(owner),
            Self::Parameter { method, .. } => Some(method),
        }
    }

    /// Simple name (empty for parameters, which are identified by sequence)
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Type { name, .. }
            | Self::Field { name, .. }
            | Self::Method { name, .. }
            | Self::Property { name, .. }
            | Self::Event { name, .. }
            | Self::GenericParam { name, .. } => name,
            Self::Parameter { .. } => "",
        }
    }

    /// Generic arity of types and methods, zero otherwise
    #[must_use]
    pub const fn arity(&self) -> u32 {
        match self {
            Self::Type { arity, .. } | Self::Method { arity, .. } => *arity,
            _ => 0,
        }
    }

    /// Namespace of the outermost enclosing type
    #[must_use]
    pub fn namespace(&self) -> &str {
        match self {
            Self::Type {
                namespace,
                enclosing: None,
                ..
            } => namespace,
            other => other.owner().map_or("", DeclKey::namespace),
        }
    }

    /// Nearest enclosing type (the key itself for types)
    #[must_use]
    pub fn containing_type(&self) -> Option<&DeclKey> {
        match self {
            Self::Type { .. } => Some(self),
            other => other.owner().and_then(DeclKey::containing_type),
        }
    }

    /// Metadata name: generic types carry a `` `n `` arity suffix
    #[must_use]
    pub fn metadata_name(&self) -> String {
        match self {
            Self::Type { name, arity, .. } if *arity > 0 => format!("{name}`{arity}"),
            Self::Method {
                name,
                explicit_interface: Some(interface),
                ..
            } => format!("{interface}.{name}"),
            other => other.name().to_owned(),
        }
    }

    /// Key in the radix index: `/`-separated path from the outermost type
    #[must_use]
    pub fn to_trie_key(&self) -> String {
        let segment = match self {
            Self::Type {
                namespace,
                enclosing: None,
                ..
            } if !namespace.is_empty() => format!("{namespace}.{}", self.metadata_name()),
            Self::Type { .. } | Self::Field { .. } | Self::Event { .. } => self.metadata_name(),
            Self::Method {
                arity, signature, ..
            } => format!("{}``{arity}{signature}", self.metadata_name()),
            Self::Property { name, signature, .. } => format!("{name}{signature}"),
            Self::Parameter { sequence, .. } => format!("#{sequence}"),
            Self::GenericParam { ordinal, name, .. } => format!("!{ordinal}:{name}"),
        };
        match self.owner() {
            Some(owner) => format!("{}/{segment}", owner.to_trie_key()),
            None => segment,
        }
    }

    /// Content hash of the identity
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        ContentHash::of_parts([self.kind().to_string(), self.to_trie_key()])
    }
}

impl Display for DeclKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type {
                namespace,
                enclosing: None,
                ..
            } if !namespace.is_empty() => write!(f, "{namespace}.{}", self.metadata_name()),
            Self::Type {
                enclosing: Some(outer),
                ..
            } => write!(f, "{outer}+{}", self.metadata_name()),
            Self::Type { .. } => f.write_str(&self.metadata_name()),
            Self::Method { owner, signature, .. } => {
                write!(f, "{owner}.{}{signature}", self.metadata_name())
            }
            Self::Property {
                owner,
                name,
                signature,
            } if !signature.is_empty() && signature != "()" => write!(f, "{owner}.{name}{signature}"),
            Self::Field { owner, name }
            | Self::Property { owner, name, .. }
            | Self::Event { owner, name } => write!(f, "{owner}.{name}"),
            Self::Parameter { method, sequence } => write!(f, "{method}#{sequence}"),
            Self::GenericParam { owner, name, .. } => write!(f, "{owner}<{name}>"),
        }
    }
}
