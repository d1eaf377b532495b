//! User-string heap continuation
//!
//! Each delta appends to the heap aggregated over all previous generations,
//! so `ldstr` tokens of a delta start at the baseline's heap size.

use crate::delta::DeltaError;
use crate::signature::compress_u32;
use crate::table::{Handle, Token};
use indexmap::IndexMap;

/// User strings added by one delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStringHeap {
    start: u32,
    size: u32,
    strings: IndexMap<String, u32>,
}

impl UserStringHeap {
    /// Continue a heap of `start` bytes; an empty heap reserves offset 0
    #[must_use]
    pub fn new(start: u32) -> Self {
        let start = start.max(1);
        Self {
            start,
            size: start,
            strings: IndexMap::new(),
        }
    }

    /// Offset of `value`, appending it on first use
    ///
    /// # Errors
    /// Returns error if the heap would exceed the token offset range
    pub fn intern(&mut self, value: &str) -> Result<Token, DeltaError> {
        if let Some(offset) = self.strings.get(value) {
            return Ok(Token::user_string(*offset));
        }
        let units = value.encode_utf16().count() as u32;
        let byte_len = units * 2 + 1;
        let prefix = compress_u32(byte_len)
            .map_err(|_| DeltaError::HeapOverflow)?
            .len() as u32;
        let offset = self.size;
        let next = offset
            .checked_add(prefix + byte_len)
            .filter(|n| *n <= Handle::MAX_ROW)
            .ok_or(DeltaError::HeapOverflow)?;
        self.strings.insert(value.to_owned(), offset);
        self.size = next;
        Ok(Token::user_string(offset))
    }

    /// Heap size before this delta
    #[inline]
    #[must_use]
    pub const fn start(&self) -> u32 {
        self.start
    }

    /// Aggregated heap size after this delta
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Strings added by this delta with their offsets, in insertion order
    pub fn entries(&self) -> impl Iterator<Item = (u32, &str)> {
        self.strings.iter().map(|(s, offset)| (*offset, s.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_string_skips_reserved_offset() {
        let mut heap = UserStringHeap::new(0);
        assert_eq!(heap.intern("ab").unwrap(), Token::user_string(1));
        // 1 length byte + 4 bytes of UTF-16 + terminal byte
        assert_eq!(heap.size(), 1 + 6);
    }

    #[test]
    fn continues_from_baseline_size() {
        let mut heap = UserStringHeap::new(0x40);
        let a = heap.intern("x").unwrap();
        let b = heap.intern("y").unwrap();
        assert_eq!(a.row(), 0x40);
        assert_eq!(b.row(), 0x44);
        assert_eq!(heap.intern("x").unwrap(), a);
        assert_eq!(heap.entries().count(), 2);
    }
}
