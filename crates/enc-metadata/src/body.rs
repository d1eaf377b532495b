//! Method body headers and the IL stream
//!
//! Provides [`MethodBody`] with the tiny/fat header codec (ECMA-335 II.25.4)
//! and [`IlStream`], which lays bodies out 4-byte aligned.

use crate::il::IlError;
use crate::table::Token;
use serde::{Deserialize, Serialize};

const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u16 = 0x3;
const INIT_LOCALS: u16 = 0x10;
const FAT_HEADER_WORDS: u16 = 3;
const TINY_MAX_CODE: usize = 64;
const TINY_MAX_STACK: u16 = 8;

/// An encoded method body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    pub code: Vec<u8>,
    pub max_stack: u16,
    /// StandAloneSig token of the local signature, if any slot exists
    pub local_signature: Option<Token>,
    pub init_locals: bool,
}

impl MethodBody {
    /// Body without locals
    #[must_use]
    pub fn new(code: Vec<u8>, max_stack: u16) -> Self {
        Self {
            code,
            max_stack,
            local_signature: None,
            init_locals: false,
        }
    }

    /// Attach a local signature (locals are zero-initialised)
    #[must_use]
    pub fn with_locals(mut self, signature: Token) -> Self {
        self.local_signature = Some(signature);
        self.init_locals = true;
        self
    }

    /// Whether the tiny header format applies
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.code.len() < TINY_MAX_CODE
            && self.max_stack <= TINY_MAX_STACK
            && self.local_signature.is_none()
    }

    /// Header followed by code
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.code.len() + 12);
        if self.is_tiny() {
            out.push(((self.code.len() as u8) << 2) | TINY_FORMAT);
        } else {
            let mut flags = FAT_FORMAT | FAT_HEADER_WORDS << 12;
            if self.init_locals {
                flags |= INIT_LOCALS;
            }
            out.extend_from_slice(&flags.to_le_bytes());
            out.extend_from_slice(&self.max_stack.to_le_bytes());
            out.extend_from_slice(&(self.code.len() as u32).to_le_bytes());
            let sig = self.local_signature.map_or(0, Token::raw);
            out.extend_from_slice(&sig.to_le_bytes());
        }
        out.extend_from_slice(&self.code);
        out
    }

    /// Decode a body at the start of `bytes`; returns the body and its length
    ///
    /// # Errors
    /// Returns error if the header is invalid or the code is truncated
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), IlError> {
        let first = *bytes.first().ok_or(IlError::Truncated(0))?;
        match first & 0x3 {
            0x2 => {
                let len = usize::from(first >> 2);
                let code = bytes.get(1..=len).ok_or(IlError::Truncated(1))?.to_vec();
                Ok((Self::new(code, TINY_MAX_STACK), 1 + len))
            }
            0x3 => {
                let header = bytes.get(..12).ok_or(IlError::Truncated(0))?;
                let flags = u16::from_le_bytes([header[0], header[1]]);
                let max_stack = u16::from_le_bytes([header[2], header[3]]);
                let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
                let sig = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
                let code = bytes.get(12..12 + len).ok_or(IlError::Truncated(12))?.to_vec();
                let body = Self {
                    code,
                    max_stack,
                    local_signature: (sig != 0).then(|| Token::from_raw(sig)),
                    init_locals: flags & INIT_LOCALS != 0,
                };
                Ok((body, 12 + len))
            }
            _ => Err(IlError::InvalidHeader(first)),
        }
    }
}

/// Concatenated method bodies of one delta
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IlStream {
    bytes: Vec<u8>,
}

impl IlStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a body at the next 4-byte boundary; returns its offset
    pub fn append(&mut self, body: &MethodBody) -> u32 {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(&body.encode());
        offset
    }

    /// Body stored at `offset`
    ///
    /// # Errors
    /// Returns error if no valid body starts there
    pub fn body_at(&self, offset: u32) -> Result<MethodBody, IlError> {
        let start = offset as usize;
        let slice = self.bytes.get(start..).ok_or(IlError::Truncated(start))?;
        MethodBody::decode(slice).map(|(body, _)| body)
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{Handle, TableIndex};

    #[test]
    fn small_body_uses_tiny_header() {
        let body = MethodBody::new(vec![0x00, 0x2A], 1);
        let encoded = body.encode();
        assert_eq!(encoded, vec![(2 << 2) | 0x2, 0x00, 0x2A]);
        let (decoded, len) = MethodBody::decode(&encoded).unwrap();
        assert_eq!(len, 3);
        assert_eq!(decoded.code, body.code);
    }

    #[test]
    fn locals_force_fat_header() {
        let sig = Handle::new(TableIndex::StandAloneSig, 2).token();
        let body = MethodBody::new(vec![0x2A], 1).with_locals(sig);
        let encoded = body.encode();
        assert_eq!(&encoded[..2], &0x3013u16.to_le_bytes());
        assert_eq!(&encoded[8..12], &0x1100_0002u32.to_le_bytes());
        assert_eq!(MethodBody::decode(&encoded).unwrap().0, body);
    }

    #[test]
    fn deep_stack_forces_fat_header() {
        let body = MethodBody::new(vec![0x2A], 9);
        assert!(!body.is_tiny());
        assert_eq!(&body.encode()[..2], &0x3003u16.to_le_bytes());
    }

    #[test]
    fn stream_aligns_bodies() {
        let mut stream = IlStream::new();
        let a = stream.append(&MethodBody::new(vec![0x2A], 1));
        let b = stream.append(&MethodBody::new(vec![0x00, 0x2A], 1));
        assert_eq!(a, 0);
        assert_eq!(b, 4);
        assert_eq!(stream.body_at(b).unwrap().code, vec![0x00, 0x2A]);
    }

    #[test]
    fn invalid_header_is_rejected() {
        assert_eq!(MethodBody::decode(&[0x01]), Err(IlError::InvalidHeader(0x01)));
    }
}
