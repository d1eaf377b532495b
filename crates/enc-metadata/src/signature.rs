//! Signature and custom attribute blob encoding
//!
//! Provides [`SignatureType`] (a type already resolved to metadata tokens),
//! [`BlobWriter`] and the encoders for local, method, field and property
//! signatures plus custom attribute values (ECMA-335 II.23.2, II.23.3).

use crate::table::{TableIndex, Token};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt::{self, Display, Formatter};

/// Largest value a compressed unsigned integer can hold
pub const MAX_COMPRESSED: u32 = 0x1FFF_FFFF;

mod element {
    pub(super) const VOID: u8 = 0x01;
    pub(super) const BOOLEAN: u8 = 0x02;
    pub(super) const CHAR: u8 = 0x03;
    pub(super) const I1: u8 = 0x04;
    pub(super) const U1: u8 = 0x05;
    pub(super) const I2: u8 = 0x06;
    pub(super) const U2: u8 = 0x07;
    pub(super) const I4: u8 = 0x08;
    pub(super) const U4: u8 = 0x09;
    pub(super) const I8: u8 = 0x0a;
    pub(super) const U8: u8 = 0x0b;
    pub(super) const R4: u8 = 0x0c;
    pub(super) const R8: u8 = 0x0d;
    pub(super) const STRING: u8 = 0x0e;
    pub(super) const VALUETYPE: u8 = 0x11;
    pub(super) const CLASS: u8 = 0x12;
    pub(super) const VAR: u8 = 0x13;
    pub(super) const GENERICINST: u8 = 0x15;
    pub(super) const I: u8 = 0x18;
    pub(super) const OBJECT: u8 = 0x1c;
    pub(super) const SZARRAY: u8 = 0x1d;
    pub(super) const MVAR: u8 = 0x1e;
}

const CALLCONV_HASTHIS: u8 = 0x20;
const CALLCONV_GENERIC: u8 = 0x10;
const SIG_FIELD: u8 = 0x06;
const SIG_LOCAL: u8 = 0x07;
const SIG_PROPERTY: u8 = 0x08;

/// A type as it appears in a signature blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureType {
    Void,
    Boolean,
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
    /// Reference type defined by a TypeDef/TypeRef/TypeSpec token
    Class(Token),
    /// Value type defined by a TypeDef/TypeRef token
    ValueType(Token),
    GenericInst {
        value_type: bool,
        definition: Token,
        args: Vec<SignatureType>,
    },
    SzArray(Box<SignatureType>),
    /// Type parameter of the enclosing type
    Var(u32),
    /// Type parameter of the method
    MVar(u32),
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Boolean => f.write_str("bool"),
            Self::Char => f.write_str("char"),
            Self::I1 => f.write_str("int8"),
            Self::U1 => f.write_str("uint8"),
            Self::I2 => f.write_str("int16"),
            Self::U2 => f.write_str("uint16"),
            Self::I4 => f.write_str("int32"),
            Self::U4 => f.write_str("uint32"),
            Self::I8 => f.write_str("int64"),
            Self::U8 => f.write_str("uint64"),
            Self::R4 => f.write_str("float32"),
            Self::R8 => f.write_str("float64"),
            Self::String => f.write_str("string"),
            Self::Object => f.write_str("object"),
            Self::IntPtr => f.write_str("native int"),
            Self::Class(token) => write!(f, "class {token}"),
            Self::ValueType(token) => write!(f, "valuetype {token}"),
            Self::GenericInst { definition, args, .. } => {
                write!(f, "{definition}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            Self::SzArray(element) => write!(f, "{element}[]"),
            Self::Var(n) => write!(f, "!{n}"),
            Self::MVar(n) => write!(f, "!!{n}"),
        }
    }
}

/// Compress an unsigned integer into 1, 2 or 4 bytes
///
/// # Errors
/// Returns error if `value` exceeds [`MAX_COMPRESSED`]
pub fn compress_u32(value: u32) -> Result<SmallVec<[u8; 4]>, SignatureError> {
    let mut out = SmallVec::new();
    match value {
        0..=0x7F => out.push(value as u8),
        0x80..=0x3FFF => {
            out.push(0x80 | (value >> 8) as u8);
            out.push(value as u8);
        }
        0x4000..=MAX_COMPRESSED => {
            out.push(0xC0 | (value >> 24) as u8);
            out.push((value >> 16) as u8);
            out.push((value >> 8) as u8);
            out.push(value as u8);
        }
        _ => return Err(SignatureError::CompressedOverflow(value)),
    }
    Ok(out)
}

/// Read a compressed unsigned integer; returns the value and bytes consumed
///
/// # Errors
/// Returns error on truncated or malformed input
pub fn decompress_u32(bytes: &[u8]) -> Result<(u32, usize), SignatureError> {
    let first = *bytes.first().ok_or(SignatureError::Truncated)?;
    let width = match first {
        b if b & 0x80 == 0 => 1,
        b if b & 0xC0 == 0x80 => 2,
        b if b & 0xE0 == 0xC0 => 4,
        _ => return Err(SignatureError::MalformedCompressed(first)),
    };
    let raw = bytes.get(..width).ok_or(SignatureError::Truncated)?;
    let value = match width {
        1 => u32::from(raw[0]),
        2 => (u32::from(raw[0] & 0x3F) << 8) | u32::from(raw[1]),
        _ => {
            (u32::from(raw[0] & 0x1F) << 24)
                | (u32::from(raw[1]) << 16)
                | (u32::from(raw[2]) << 8)
                | u32::from(raw[3])
        }
    };
    Ok((value, width))
}

/// Growable blob with signature-aware writers
#[derive(Debug, Clone, Default)]
pub struct BlobWriter {
    bytes: Vec<u8>,
}

impl BlobWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// # Errors
    /// Returns error if `value` does not fit a compressed integer
    pub fn write_compressed(&mut self, value: u32) -> Result<(), SignatureError> {
        self.bytes.extend_from_slice(&compress_u32(value)?);
        Ok(())
    }

    /// Count prefix for a list
    ///
    /// # Errors
    /// Returns error if `len` does not fit a compressed integer
    pub fn write_count(&mut self, len: usize) -> Result<(), SignatureError> {
        let len = u32::try_from(len).map_err(|_| SignatureError::CompressedOverflow(u32::MAX))?;
        self.write_compressed(len)
    }

    /// TypeDefOrRef coded index (II.23.2.8)
    ///
    /// # Errors
    /// Returns error if `token` is not a TypeDef, TypeRef or TypeSpec
    pub fn write_type_def_or_ref(&mut self, token: Token) -> Result<(), SignatureError> {
        let tag = match token.table() {
            Some(TableIndex::TypeDef) => 0,
            Some(TableIndex::TypeRef) => 1,
            Some(TableIndex::TypeSpec) => 2,
            _ => return Err(SignatureError::NotATypeToken(token)),
        };
        self.write_compressed(token.row() << 2 | tag)
    }

    /// # Errors
    /// Returns error if a nested token or count cannot be encoded
    pub fn write_type(&mut self, ty: &SignatureType) -> Result<(), SignatureError> {
        use self::element as e;
        let simple = match ty {
            SignatureType::Void => Some(e::VOID),
            SignatureType::Boolean => Some(e::BOOLEAN),
            SignatureType::Char => Some(e::CHAR),
            SignatureType::I1 => Some(e::I1),
            SignatureType::U1 => Some(e::U1),
            SignatureType::I2 => Some(e::I2),
            SignatureType::U2 => Some(e::U2),
            SignatureType::I4 => Some(e::I4),
            SignatureType::U4 => Some(e::U4),
            SignatureType::I8 => Some(e::I8),
            SignatureType::U8 => Some(e::U8),
            SignatureType::R4 => Some(e::R4),
            SignatureType::R8 => Some(e::R8),
            SignatureType::String => Some(e::STRING),
            SignatureType::Object => Some(e::OBJECT),
            SignatureType::IntPtr => Some(e::I),
            _ => None,
        };
        if let Some(code) = simple {
            self.write_u8(code);
            return Ok(());
        }
        match ty {
            SignatureType::Class(token) => {
                self.write_u8(e::CLASS);
                self.write_type_def_or_ref(*token)
            }
            SignatureType::ValueType(token) => {
                self.write_u8(e::VALUETYPE);
                self.write_type_def_or_ref(*token)
            }
            SignatureType::GenericInst {
                value_type,
                definition,
                args,
            } => {
                self.write_u8(e::GENERICINST);
                self.write_u8(if *value_type { e::VALUETYPE } else { e::CLASS });
                self.write_type_def_or_ref(*definition)?;
                self.write_count(args.len())?;
                args.iter().try_for_each(|arg| self.write_type(arg))
            }
            SignatureType::SzArray(element) => {
                self.write_u8(e::SZARRAY);
                self.write_type(element)
            }
            SignatureType::Var(n) => {
                self.write_u8(e::VAR);
                self.write_compressed(*n)
            }
            SignatureType::MVar(n) => {
                self.write_u8(e::MVAR);
                self.write_compressed(*n)
            }
            _ => Ok(()),
        }
    }

    /// SerString: 0xFF for null, otherwise compressed length and UTF-8
    ///
    /// # Errors
    /// Returns error if the string is too long
    pub fn write_ser_string(&mut self, value: Option<&str>) -> Result<(), SignatureError> {
        match value {
            None => {
                self.write_u8(0xFF);
                Ok(())
            }
            Some(text) => {
                self.write_count(text.len())?;
                self.bytes.extend_from_slice(text.as_bytes());
                Ok(())
            }
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// MethodDefSig / MethodRefSig
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodSignature {
    pub has_this: bool,
    pub generic_arity: u32,
    pub return_type: SignatureType,
    pub params: Vec<SignatureType>,
}

impl MethodSignature {
    /// Instance method signature with no generic parameters
    #[must_use]
    pub fn instance(return_type: SignatureType, params: Vec<SignatureType>) -> Self {
        Self {
            has_this: true,
            generic_arity: 0,
            return_type,
            params,
        }
    }

    /// Static method signature with no generic parameters
    #[must_use]
    pub fn static_method(return_type: SignatureType, params: Vec<SignatureType>) -> Self {
        Self {
            has_this: false,
            generic_arity: 0,
            return_type,
            params,
        }
    }

    /// # Errors
    /// Returns error if any component cannot be encoded
    pub fn encode(&self) -> Result<Vec<u8>, SignatureError> {
        let mut blob = BlobWriter::new();
        let mut conv = 0u8;
        if self.has_this {
            conv |= CALLCONV_HASTHIS;
        }
        if self.generic_arity > 0 {
            conv |= CALLCONV_GENERIC;
        }
        blob.write_u8(conv);
        if self.generic_arity > 0 {
            blob.write_compressed(self.generic_arity)?;
        }
        blob.write_count(self.params.len())?;
        blob.write_type(&self.return_type)?;
        for param in &self.params {
            blob.write_type(param)?;
        }
        Ok(blob.into_bytes())
    }
}

/// FieldSig
///
/// # Errors
/// Returns error if the type cannot be encoded
pub fn encode_field_signature(ty: &SignatureType) -> Result<Vec<u8>, SignatureError> {
    let mut blob = BlobWriter::new();
    blob.write_u8(SIG_FIELD);
    blob.write_type(ty)?;
    Ok(blob.into_bytes())
}

/// PropertySig
///
/// # Errors
/// Returns error if any component cannot be encoded
pub fn encode_property_signature(
    has_this: bool,
    ty: &SignatureType,
    params: &[SignatureType],
) -> Result<Vec<u8>, SignatureError> {
    let mut blob = BlobWriter::new();
    blob.write_u8(if has_this {
        SIG_PROPERTY | CALLCONV_HASTHIS
    } else {
        SIG_PROPERTY
    });
    blob.write_count(params.len())?;
    blob.write_type(ty)?;
    for param in params {
        blob.write_type(param)?;
    }
    Ok(blob.into_bytes())
}

/// LocalVarSig
///
/// # Errors
/// Returns error if any slot type cannot be encoded
pub fn encode_local_signature(slots: &[SignatureType]) -> Result<Vec<u8>, SignatureError> {
    let mut blob = BlobWriter::new();
    blob.write_u8(SIG_LOCAL);
    blob.write_count(slots.len())?;
    for slot in slots {
        blob.write_type(slot)?;
    }
    Ok(blob.into_bytes())
}

/// Fixed argument of a custom attribute
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomAttributeArgument {
    Bool(bool),
    I4(i32),
    String(Option<String>),
}

/// Custom attribute value blob: prolog, fixed arguments, zero named arguments
///
/// # Errors
/// Returns error if a string argument is too long
pub fn encode_custom_attribute(args: &[CustomAttributeArgument]) -> Result<Vec<u8>, SignatureError> {
    let mut blob = BlobWriter::new();
    blob.write_u16(0x0001);
    for arg in args {
        match arg {
            CustomAttributeArgument::Bool(value) => blob.write_u8(u8::from(*value)),
            CustomAttributeArgument::I4(value) => blob.write_i32(*value),
            CustomAttributeArgument::String(value) => blob.write_ser_string(value.as_deref())?,
        }
    }
    blob.write_u16(0x0000);
    Ok(blob.into_bytes())
}

/// Errors raised while encoding signature blobs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// Value too large for compressed encoding
    #[error("value {0:#x} does not fit a compressed integer")]
    CompressedOverflow(u32),

    /// Leading byte is not a valid compressed integer prefix
    #[error("malformed compressed integer prefix {0:#04x}")]
    MalformedCompressed(u8),

    /// Blob ended early
    #[error("truncated signature blob")]
    Truncated,

    /// Token cannot appear as a TypeDefOrRef coded index
    #[error("token {0} is not a TypeDef, TypeRef or TypeSpec")]
    NotATypeToken(Token),
}
