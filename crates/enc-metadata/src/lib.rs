//! ENC Metadata
//!
//! ECMA-335 vocabulary for incremental metadata deltas.
//!
//! # Core Concepts
//!
//! - [`TableIndex`], [`Handle`], [`Token`]: table rows and their tokens
//! - [`EncLogBuilder`], [`EncLog`], [`EncMap`]: the edit-and-continue log and
//!   map in canonical order
//! - [`SignatureType`] and the blob encoders for signatures and attribute values
//! - [`IlBuilder`], [`MethodBody`], [`IlStream`]: instruction encoding and body layout
//! - [`RowData`], [`MetadataDelta`]: table rows of one generation and their stream codec
//! - [`ContentHash`]: Blake3 digest keying structural shapes
//!
//! # Example
//!
//! ```rust,ignore
//! use enc_metadata::{EncLogBuilder, EncMap, Handle, TableIndex};
//!
//! let mut log = EncLogBuilder::new();
//! log.add(Handle::new(TableIndex::TypeDef, 2), Handle::new(TableIndex::MethodDef, 4))?;
//! let log = log.build();
//! let map = EncMap::from_log(&log);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod body;
mod delta;
mod enc;
mod hash;
mod heap;
mod il;
mod rows;
mod signature;
mod table;

pub use body::{IlStream, MethodBody};
pub use delta::{DeltaError, MetadataDelta};
pub use enc::{EncLog, EncLogBuilder, EncLogEntry, EncMap, EncOperation};
pub use hash::{ContentHash, HashError};
pub use heap::UserStringHeap;
pub use il::{disassemble, listing, IlBuilder, IlError, Instruction, Label, OpCode, Operand, OperandKind};
pub use rows::{field_flags, method_flags, method_impl_flags, semantics, type_flags, RowData};
pub use signature::{
    compress_u32, decompress_u32, encode_custom_attribute, encode_field_signature,
    encode_local_signature, encode_property_signature, BlobWriter, CustomAttributeArgument,
    MethodSignature, SignatureError, SignatureType, MAX_COMPRESSED,
};
pub use table::{Handle, TableIndex, TableSizes, Token, TABLE_COUNT};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
