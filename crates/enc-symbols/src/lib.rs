//! ENC Symbols
//!
//! Symbol graph of one program version.
//!
//! # Overview
//!
//! The symbol system provides:
//! - **DeclKey**: stable declaration identities that survive edits
//! - **SymbolTable**: declarations of a compilation with a radix tree index
//! - **SyntaxMap**: correlation of declaring syntax across two versions
//! - **SymbolMatcher**: exact and structural matching against a previous version
//!
//! # Example
//!
//! ```rust
//! use enc_symbols::{DeclKey, SymbolDef, SymbolDetail, SymbolTable, TypeDetail};
//!
//! let c = DeclKey::top_level("N", "C", 0);
//! let mut builder = SymbolTable::builder();
//! builder
//!     .add(SymbolDef::new(c.clone(), SymbolDetail::Type(TypeDetail::default())))
//!     .unwrap();
//! let table = builder.build().unwrap();
//! assert!(table.contains(&c));
//! ```

#![allow(missing_docs)]

pub mod key;
pub mod matcher;
pub mod symbol;
pub mod syntax;
pub mod table;
pub mod types;
pub mod validation;

// Re-exports
pub use key::{DeclKey, DeclKind};
pub use matcher::{MatchError, SymbolMatcher};
pub use symbol::{
    Accessibility, AttributeData, EventDetail, FieldDetail, MethodDetail, ParamDef, PropertyDetail,
    SymbolDef, SymbolDetail, TypeDetail, TypeKind,
};
pub use syntax::{SyntaxMap, SyntaxNodeId};
pub use table::{ExternalMember, ExternalType, ReferenceSet, SymbolError, SymbolTable, SymbolTableBuilder};
pub use types::{signature_string, AnonymousTypeShape, DelegateShape, PrimitiveType, TypeSymbol};
pub use validation::{TableValidator, ValidationError};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building and querying symbol tables
    pub use crate::{
        AttributeData, DeclKey, DeclKind, MethodDetail, ParamDef, SymbolDef, SymbolDetail,
        SymbolTable, SyntaxMap, SyntaxNodeId, TypeSymbol,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
