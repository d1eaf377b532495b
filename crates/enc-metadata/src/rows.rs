//! Row contents of the tables a delta writes
//!
//! Names are kept as strings and blobs as bytes; the delta stream stores
//! them inline rather than through heap offsets.

use crate::table::{TableIndex, Token};
use serde::{Deserialize, Serialize};

/// Attribute flags of a TypeDef row (subset)
pub mod type_flags {
    pub const PUBLIC: u32 = 0x0000_0001;
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    pub const INTERFACE: u32 = 0x0000_0020;
    pub const ABSTRACT: u32 = 0x0000_0080;
    pub const SEALED: u32 = 0x0000_0100;
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

/// Attribute flags of a MethodDef row (subset)
pub mod method_flags {
    pub const PRIVATE: u16 = 0x0001;
    pub const ASSEMBLY: u16 = 0x0003;
    pub const FAMILY: u16 = 0x0004;
    pub const PUBLIC: u16 = 0x0006;
    pub const STATIC: u16 = 0x0010;
    pub const FINAL: u16 = 0x0020;
    pub const VIRTUAL: u16 = 0x0040;
    pub const HIDE_BY_SIG: u16 = 0x0080;
    pub const NEW_SLOT: u16 = 0x0100;
    pub const ABSTRACT: u16 = 0x0400;
    pub const SPECIAL_NAME: u16 = 0x0800;
    pub const RT_SPECIAL_NAME: u16 = 0x1000;
}

/// Implementation flags of a MethodDef row (subset)
pub mod method_impl_flags {
    pub const IL: u16 = 0x0000;
    pub const RUNTIME: u16 = 0x0003;
}

/// Attribute flags of a Field row (subset)
pub mod field_flags {
    pub const PRIVATE: u16 = 0x0001;
    pub const ASSEMBLY: u16 = 0x0003;
    pub const FAMILY: u16 = 0x0004;
    pub const PUBLIC: u16 = 0x0006;
    pub const STATIC: u16 = 0x0010;
    pub const INIT_ONLY: u16 = 0x0020;
}

/// MethodSemantics attributes
pub mod semantics {
    pub const SETTER: u16 = 0x0001;
    pub const GETTER: u16 = 0x0002;
    pub const ADD_ON: u16 = 0x0008;
    pub const REMOVE_ON: u16 = 0x0010;
}

/// Contents of one table row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowData {
    AssemblyRef {
        name: String,
        version: [u16; 4],
    },
    TypeRef {
        /// AssemblyRef token, or enclosing TypeRef for nested types
        scope: Token,
        namespace: String,
        name: String,
    },
    TypeDef {
        flags: u32,
        namespace: String,
        name: String,
        extends: Option<Token>,
    },
    Field {
        flags: u16,
        name: String,
        signature: Vec<u8>,
    },
    MethodDef {
        /// Offset of the body in the delta's IL stream
        rva: Option<u32>,
        impl_flags: u16,
        flags: u16,
        name: String,
        signature: Vec<u8>,
    },
    Param {
        flags: u16,
        sequence: u16,
        name: String,
    },
    MemberRef {
        parent: Token,
        name: String,
        signature: Vec<u8>,
    },
    CustomAttribute {
        /// `None` is the row-0 sentinel of a retired attribute row
        parent: Option<Token>,
        constructor: Token,
        value: Vec<u8>,
    },
    StandAloneSig {
        signature: Vec<u8>,
    },
    TypeSpec {
        signature: Vec<u8>,
    },
    EventMap {
        parent: Token,
    },
    Event {
        flags: u16,
        name: String,
        event_type: Token,
    },
    PropertyMap {
        parent: Token,
    },
    Property {
        flags: u16,
        name: String,
        signature: Vec<u8>,
    },
    MethodSemantics {
        semantics: u16,
        method: Token,
        association: Token,
    },
    NestedClass {
        nested: Token,
        enclosing: Token,
    },
    GenericParam {
        number: u16,
        flags: u16,
        owner: Token,
        name: String,
    },
}

impl RowData {
    /// Table the row belongs to
    #[must_use]
    pub const fn table(&self) -> TableIndex {
        match self {
            Self::AssemblyRef { .. } => TableIndex::AssemblyRef,
            Self::TypeRef { .. } => TableIndex::TypeRef,
            Self::TypeDef { .. } => TableIndex::TypeDef,
            Self::Field { .. } => TableIndex::Field,
            Self::MethodDef { .. } => TableIndex::MethodDef,
            Self::Param { .. } => TableIndex::Param,
            Self::MemberRef { .. } => TableIndex::MemberRef,
            Self::CustomAttribute { .. } => TableIndex::CustomAttribute,
            Self::StandAloneSig { .. } => TableIndex::StandAloneSig,
            Self::TypeSpec { .. } => TableIndex::TypeSpec,
            Self::EventMap { .. } => TableIndex::EventMap,
            Self::Event { .. } => TableIndex::Event,
            Self::PropertyMap { .. } => TableIndex::PropertyMap,
            Self::Property { .. } => TableIndex::Property,
            Self::MethodSemantics { .. } => TableIndex::MethodSemantics,
            Self::NestedClass { .. } => TableIndex::NestedClass,
            Self::GenericParam { .. } => TableIndex::GenericParam,
        }
    }

    /// Name column, for rows that have one
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::AssemblyRef { name, .. }
            | Self::TypeRef { name, .. }
            | Self::TypeDef { name, .. }
            | Self::Field { name, .. }
            | Self::MethodDef { name, .. }
            | Self::Param { name, .. }
            | Self::MemberRef { name, .. }
            | Self::Event { name, .. }
            | Self::Property { name, .. }
            | Self::GenericParam { name, .. } => Some(name),
            _ => None,
        }
    }
}
