//! Row allocation
//!
//! Provides [`RowAllocator`], which hands out the next row of each table
//! after the baseline's last row, and [`ReferenceKey`], the identity of a
//! reference-table row reused across generations.

use crate::error::EmitError;
use enc_metadata::{Handle, TableIndex, TableSizes, Token};

/// Identity of a reference row (AssemblyRef, TypeRef, MemberRef, TypeSpec)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReferenceKey {
    /// Referenced assembly by name
    Assembly(String),
    /// Referenced type by full metadata name
    Type(String),
    /// Member of a referenced or instantiated type
    Member {
        parent: Token,
        name: String,
        signature: Vec<u8>,
    },
    /// Type instantiation by signature blob
    TypeSpec(Vec<u8>),
}

/// Monotonic per-table row allocator
#[derive(Debug, Clone)]
pub struct RowAllocator {
    sizes: TableSizes,
    max_rows: u32,
}

impl RowAllocator {
    /// Continue after the rows in `sizes`, refusing rows beyond `max_rows`
    #[must_use]
    pub fn new(sizes: TableSizes, max_rows: u32) -> Self {
        Self {
            sizes,
            max_rows: max_rows.min(Handle::MAX_ROW),
        }
    }

    /// Next row of `table`
    ///
    /// # Errors
    /// Returns an invariant violation when the table is exhausted
    pub fn allocate(&mut self, table: TableIndex) -> Result<Handle, EmitError> {
        let next = self.sizes.get(table) + 1;
        if next > self.max_rows {
            return Err(EmitError::invariant(format!(
                "table {table} exhausted: row {next} exceeds the limit of {} rows",
                self.max_rows
            )));
        }
        self.sizes.set(table, next);
        tracing::trace!(table = %table, row = next, "allocated row");
        Ok(Handle::new(table, next))
    }

    /// Row counts including every allocation so far
    #[inline]
    #[must_use]
    pub const fn sizes(&self) -> TableSizes {
        self.sizes
    }

    /// Number of rows allocated beyond `base`
    #[must_use]
    pub fn allocated_since(&self, base: TableSizes) -> u32 {
        TableIndex::ALL
            .iter()
            .map(|&t| self.sizes.get(t).saturating_sub(base.get(t)))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_continue_after_baseline() {
        let sizes = TableSizes::empty().with(TableIndex::MethodDef, 4);
        let mut allocator = RowAllocator::new(sizes, Handle::MAX_ROW);
        assert_eq!(allocator.allocate(TableIndex::MethodDef).unwrap(), Handle::new(TableIndex::MethodDef, 5));
        assert_eq!(allocator.allocate(TableIndex::MethodDef).unwrap(), Handle::new(TableIndex::MethodDef, 6));
        assert_eq!(allocator.allocate(TableIndex::Field).unwrap(), Handle::new(TableIndex::Field, 1));
        assert_eq!(allocator.allocated_since(sizes), 3);
    }

    #[test]
    fn limit_is_an_invariant_violation() {
        let sizes = TableSizes::empty().with(TableIndex::TypeDef, 2);
        let mut allocator = RowAllocator::new(sizes, 3);
        assert!(allocator.allocate(TableIndex::TypeDef).is_ok());
        let err = allocator.allocate(TableIndex::TypeDef).unwrap_err();
        assert!(matches!(err, EmitError::InvariantViolation(ref m) if m.contains("TypeDef")));
    }

    #[test]
    fn limit_never_exceeds_token_range() {
        let sizes = TableSizes::empty().with(TableIndex::Param, Handle::MAX_ROW);
        let mut allocator = RowAllocator::new(sizes, u32::MAX);
        assert!(allocator.allocate(TableIndex::Param).is_err());
    }
}
