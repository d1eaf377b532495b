//! Table delta writer
//!
//! Provides [`DeltaTableWriter`], which collects the rows, EncLog entries,
//! user strings and method bodies of one generation and assembles the
//! [`MetadataDelta`].

use crate::error::EmitError;
use enc_metadata::{
    EncLogBuilder, Handle, IlStream, MetadataDelta, MethodBody, RowData, TableIndex, Token, UserStringHeap,
};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Output of [`DeltaTableWriter::finish`]
#[derive(Debug)]
pub struct WrittenDelta {
    pub metadata: MetadataDelta,
    pub il: Vec<u8>,
    /// Aggregated user-string heap size after this delta
    pub user_string_size: u32,
}

/// Rows and bodies of one generation
#[derive(Debug)]
pub struct DeltaTableWriter {
    rows: BTreeMap<Handle, RowData>,
    log: EncLogBuilder,
    heap: UserStringHeap,
    il: IlStream,
}

fn check_table(handle: Handle, row: &RowData) -> Result<(), EmitError> {
    if row.table() == handle.table() {
        Ok(())
    } else {
        Err(EmitError::invariant(format!("{} row written to {handle}", row.table())))
    }
}

impl DeltaTableWriter {
    /// Writer continuing a user-string heap of `user_string_size` bytes
    #[must_use]
    pub fn new(user_string_size: u32) -> Self {
        Self {
            rows: BTreeMap::new(),
            log: EncLogBuilder::new(),
            heap: UserStringHeap::new(user_string_size),
            il: IlStream::new(),
        }
    }

    /// Write a row in place (`Default` entry)
    ///
    /// # Errors
    /// Returns error if the row does not belong to the handle's table
    pub fn update(&mut self, handle: Handle, row: RowData) -> Result<(), EmitError> {
        check_table(handle, &row)?;
        self.log.update(handle);
        self.rows.insert(handle, row);
        Ok(())
    }

    /// Write a new member row added to `parent` (`Add*` then `Default`)
    ///
    /// # Errors
    /// Returns error if the row does not belong to the handle's table or the
    /// table is not added through a parent
    pub fn add(&mut self, parent: Handle, handle: Handle, row: RowData) -> Result<(), EmitError> {
        check_table(handle, &row)?;
        self.log.add(parent, handle)?;
        self.rows.insert(handle, row);
        Ok(())
    }

    /// Point a MethodDef row at a body in this delta's IL stream
    ///
    /// # Errors
    /// Returns error if the method row has not been written
    pub fn set_rva(&mut self, method: Handle, offset: u32) -> Result<(), EmitError> {
        match self.rows.get_mut(&method) {
            Some(RowData::MethodDef { rva, .. }) => {
                *rva = Some(offset);
                Ok(())
            }
            _ => Err(EmitError::invariant(format!("no MethodDef row {method} to attach a body to"))),
        }
    }

    #[must_use]
    pub fn row(&self, handle: Handle) -> Option<&RowData> {
        self.rows.get(&handle)
    }

    /// Whether the row is part of the delta
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.log.contains(handle)
    }

    /// `ldstr` token of `value`
    ///
    /// # Errors
    /// Returns error if the heap overflows
    pub fn intern(&mut self, value: &str) -> Result<Token, EmitError> {
        Ok(self.heap.intern(value)?)
    }

    /// Lay out a body in the IL stream; returns its offset
    pub fn append_body(&mut self, body: &MethodBody) -> u32 {
        self.il.append(body)
    }

    /// Number of rows written so far
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.log.row_count()
    }

    /// Number of rows of one table written so far
    #[must_use]
    pub fn table_row_count(&self, table: TableIndex) -> usize {
        self.rows.keys().filter(|h| h.table() == table).count()
    }

    /// Assemble the delta
    ///
    /// # Errors
    /// Returns error if the log and rows disagree
    pub fn finish(self, generation: u32, enc_id: Uuid, enc_base_id: Uuid) -> Result<WrittenDelta, EmitError> {
        let user_string_size = self.heap.size();
        let user_strings = self.heap.entries().map(|(o, s)| (o, s.to_owned())).collect();
        let metadata = MetadataDelta::new(generation, enc_id, enc_base_id, self.log.build(), self.rows, user_strings)?;
        Ok(WrittenDelta {
            metadata,
            il: self.il.as_bytes().to_vec(),
            user_string_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enc_metadata::{method_flags, EncOperation};
    use pretty_assertions::assert_eq;

    fn method(name: &str) -> RowData {
        RowData::MethodDef {
            rva: None,
            impl_flags: 0,
            flags: method_flags::PUBLIC,
            name: name.into(),
            signature: vec![0x20, 0x00, 0x01],
        }
    }

    #[test]
    fn added_member_logs_parent_first() {
        let ty = Handle::new(TableIndex::TypeDef, 2);
        let m = Handle::new(TableIndex::MethodDef, 3);
        let mut writer = DeltaTableWriter::new(0);
        writer.add(ty, m, method("G")).unwrap();
        writer.set_rva(m, 0).unwrap();
        let delta = writer.finish(1, Uuid::new_v4(), Uuid::nil()).unwrap().metadata;
        let ops: Vec<(Handle, EncOperation)> = delta.enc_log().iter().map(|e| (e.handle, e.operation)).collect();
        assert_eq!(ops, vec![(ty, EncOperation::AddMethod), (m, EncOperation::Default)]);
        assert_eq!(delta.enc_map().handles(), &[m]);
    }

    #[test]
    fn wrong_table_is_rejected() {
        let mut writer = DeltaTableWriter::new(0);
        let err = writer.update(Handle::new(TableIndex::Field, 1), method("F")).unwrap_err();
        assert!(matches!(err, EmitError::InvariantViolation(_)));
    }

    #[test]
    fn rva_needs_method_row() {
        let mut writer = DeltaTableWriter::new(0);
        assert!(writer.set_rva(Handle::new(TableIndex::MethodDef, 1), 0).is_err());
    }

    #[test]
    fn user_strings_continue_heap() {
        let mut writer = DeltaTableWriter::new(0x20);
        let token = writer.intern("hello").unwrap();
        assert_eq!(token.row(), 0x20);
        let written = writer.finish(1, Uuid::new_v4(), Uuid::nil()).unwrap();
        assert_eq!(written.metadata.user_string(token), Some("hello"));
        assert!(written.user_string_size > 0x20);
    }
}
