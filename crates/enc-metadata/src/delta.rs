//! Metadata deltas
//!
//! Provides [`MetadataDelta`], the table patch of one generation, and its
//! binary stream codec.
//!
//! # Stream layout
//!
//! ```text
//! "ENCD" u16:version u32:generation [16]:enc_id [16]:enc_base_id
//! u32:n  n * (u32:token u32:operation)          EncLog
//! u32:n  n * u32:token                          EncMap
//! u32:n  n * (u32:token u32:len [len]:json)     rows
//! u32:n  n * (u32:offset u32:len [len]:utf16le) user strings
//! ```

use crate::enc::{EncLog, EncLogEntry, EncMap, EncOperation};
use crate::rows::RowData;
use crate::table::{Handle, TableIndex, Token};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use uuid::Uuid;

const MAGIC: &[u8; 4] = b"ENCD";
const FORMAT_VERSION: u16 = 1;

/// Table patch of one generation
///
/// # Invariants
/// - every EncMap handle has a row, and every row is in the EncMap
/// - rows are keyed by handle, so no handle appears twice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataDelta {
    generation: u32,
    enc_id: Uuid,
    enc_base_id: Uuid,
    enc_log: EncLog,
    enc_map: EncMap,
    rows: BTreeMap<Handle, RowData>,
    user_strings: Vec<(u32, String)>,
}

impl MetadataDelta {
    /// Assemble a delta, checking that map and rows agree
    ///
    /// # Errors
    /// Returns error if a mapped handle has no row, a row is not mapped, or a
    /// row is stored under a handle of another table
    pub fn new(
        generation: u32,
        enc_id: Uuid,
        enc_base_id: Uuid,
        enc_log: EncLog,
        rows: BTreeMap<Handle, RowData>,
        user_strings: Vec<(u32, String)>,
    ) -> Result<Self, DeltaError> {
        let enc_map = EncMap::from_log(&enc_log);
        for handle in enc_map.handles() {
            if !rows.contains_key(handle) {
                return Err(DeltaError::MissingRow(*handle));
            }
        }
        for (handle, row) in &rows {
            if row.table() != handle.table() {
                return Err(DeltaError::TableMismatch {
                    handle: *handle,
                    actual: row.table(),
                });
            }
            if !enc_map.contains(*handle) {
                return Err(DeltaError::UnmappedRow(*handle));
            }
        }
        Ok(Self {
            generation,
            enc_id,
            enc_base_id,
            enc_log,
            enc_map,
            rows,
            user_strings,
        })
    }

    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Id of this delta
    #[inline]
    #[must_use]
    pub const fn enc_id(&self) -> Uuid {
        self.enc_id
    }

    /// Id of the delta (or module) this one applies to
    #[inline]
    #[must_use]
    pub const fn enc_base_id(&self) -> Uuid {
        self.enc_base_id
    }

    #[inline]
    #[must_use]
    pub fn enc_log(&self) -> &EncLog {
        &self.enc_log
    }

    #[inline]
    #[must_use]
    pub fn enc_map(&self) -> &EncMap {
        &self.enc_map
    }

    #[must_use]
    pub fn row(&self, handle: Handle) -> Option<&RowData> {
        self.rows.get(&handle)
    }

    /// Rows of one table in row order
    pub fn rows_of(&self, table: TableIndex) -> impl Iterator<Item = (Handle, &RowData)> {
        self.rows
            .range(Handle::new(table, 0)..=Handle::new(table, u32::MAX))
            .map(|(h, r)| (*h, r))
    }

    /// All rows in (table, row) order
    pub fn rows(&self) -> impl Iterator<Item = (Handle, &RowData)> {
        self.rows.iter().map(|(h, r)| (*h, r))
    }

    #[inline]
    #[must_use]
    pub fn user_strings(&self) -> &[(u32, String)] {
        &self.user_strings
    }

    /// User string stored at a `ldstr` token
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&str> {
        self.user_strings
            .iter()
            .find(|(offset, _)| *offset == token.row())
            .map(|(_, s)| s.as_str())
    }

    fn names(&self, table: TableIndex) -> Vec<&str> {
        self.rows_of(table).filter_map(|(_, r)| r.name()).collect()
    }

    /// Names of TypeDef rows in this delta
    #[must_use]
    pub fn type_def_names(&self) -> Vec<&str> {
        self.names(TableIndex::TypeDef)
    }

    /// Names of MethodDef rows in this delta
    #[must_use]
    pub fn method_def_names(&self) -> Vec<&str> {
        self.names(TableIndex::MethodDef)
    }

    /// Names of Field rows in this delta
    #[must_use]
    pub fn field_def_names(&self) -> Vec<&str> {
        self.names(TableIndex::Field)
    }

    /// Names of Property rows in this delta
    #[must_use]
    pub fn property_def_names(&self) -> Vec<&str> {
        self.names(TableIndex::Property)
    }

    /// Names of Event rows in this delta
    #[must_use]
    pub fn event_def_names(&self) -> Vec<&str> {
        self.names(TableIndex::Event)
    }

    /// Names of TypeRef rows in this delta
    #[must_use]
    pub fn type_ref_names(&self) -> Vec<&str> {
        self.names(TableIndex::TypeRef)
    }

    /// Names of MemberRef rows in this delta
    #[must_use]
    pub fn member_ref_names(&self) -> Vec<&str> {
        self.names(TableIndex::MemberRef)
    }

    /// `(attribute row, parent, constructor)` for every CustomAttribute row
    #[must_use]
    pub fn custom_attributes(&self) -> Vec<(Handle, Option<Token>, Token)> {
        self.rows_of(TableIndex::CustomAttribute)
            .filter_map(|(h, r)| match r {
                RowData::CustomAttribute {
                    parent,
                    constructor,
                    ..
                } => Some((h, *parent, *constructor)),
                _ => None,
            })
            .collect()
    }

    /// Serialize the delta to `out`
    ///
    /// # Errors
    /// Returns error on I/O failure or if a row cannot be serialized
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<(), DeltaError> {
        out.write_all(MAGIC)?;
        out.write_all(&FORMAT_VERSION.to_le_bytes())?;
        out.write_all(&self.generation.to_le_bytes())?;
        out.write_all(self.enc_id.as_bytes())?;
        out.write_all(self.enc_base_id.as_bytes())?;

        write_len(out, self.enc_log.len())?;
        for entry in self.enc_log.iter() {
            out.write_all(&entry.handle.token().raw().to_le_bytes())?;
            out.write_all(&entry.operation.code().to_le_bytes())?;
        }

        write_len(out, self.enc_map.len())?;
        for handle in self.enc_map.handles() {
            out.write_all(&handle.token().raw().to_le_bytes())?;
        }

        write_len(out, self.rows.len())?;
        for (handle, row) in &self.rows {
            let json = serde_json::to_vec(row)?;
            out.write_all(&handle.token().raw().to_le_bytes())?;
            write_len(out, json.len())?;
            out.write_all(&json)?;
        }

        write_len(out, self.user_strings.len())?;
        for (offset, value) in &self.user_strings {
            let utf16: Vec<u8> = value.encode_utf16().flat_map(u16::to_le_bytes).collect();
            out.write_all(&offset.to_le_bytes())?;
            write_len(out, utf16.len())?;
            out.write_all(&utf16)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Read a delta previously written with [`write_to`](Self::write_to)
    ///
    /// # Errors
    /// Returns error on I/O failure, bad magic/version or malformed content
    pub fn read_from<R: Read + ?Sized>(input: &mut R) -> Result<Self, DeltaError> {
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(DeltaError::BadMagic);
        }
        let version = u16::from_le_bytes(read_array(input)?);
        if version != FORMAT_VERSION {
            return Err(DeltaError::UnsupportedVersion(version));
        }
        let generation = read_u32(input)?;
        let enc_id = Uuid::from_bytes(read_array(input)?);
        let enc_base_id = Uuid::from_bytes(read_array(input)?);

        let mut entries = Vec::new();
        for _ in 0..read_u32(input)? {
            let handle = read_handle(input)?;
            let code = read_u32(input)?;
            let operation = EncOperation::from_code(code).ok_or(DeltaError::BadOperation(code))?;
            entries.push(EncLogEntry::new(handle, operation));
        }
        let enc_log = EncLog::from_entries(entries);

        let map_len = read_u32(input)?;
        let mut mapped = Vec::new();
        for _ in 0..map_len {
            mapped.push(read_handle(input)?);
        }

        let mut rows = BTreeMap::new();
        for _ in 0..read_u32(input)? {
            let handle = read_handle(input)?;
            let json = read_bytes(input)?;
            rows.insert(handle, serde_json::from_slice(&json)?);
        }

        let mut user_strings = Vec::new();
        for _ in 0..read_u32(input)? {
            let offset = read_u32(input)?;
            let bytes = read_bytes(input)?;
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            let value = String::from_utf16(&units).map_err(|_| DeltaError::BadUserString(offset))?;
            user_strings.push((offset, value));
        }

        let delta = Self::new(generation, enc_id, enc_base_id, enc_log, rows, user_strings)?;
        if delta.enc_map.handles() != mapped.as_slice() {
            return Err(DeltaError::MapMismatch);
        }
        Ok(delta)
    }
}

fn write_len<W: Write + ?Sized>(out: &mut W, len: usize) -> Result<(), DeltaError> {
    let len = u32::try_from(len).map_err(|_| DeltaError::TooLarge(len))?;
    out.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn read_array<R: Read + ?Sized, const N: usize>(input: &mut R) -> Result<[u8; N], DeltaError> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read + ?Sized>(input: &mut R) -> Result<u32, DeltaError> {
    Ok(u32::from_le_bytes(read_array(input)?))
}

fn read_handle<R: Read + ?Sized>(input: &mut R) -> Result<Handle, DeltaError> {
    let token = Token::from_raw(read_u32(input)?);
    token.handle().ok_or(DeltaError::BadToken(token))
}

fn read_bytes<R: Read + ?Sized>(input: &mut R) -> Result<Vec<u8>, DeltaError> {
    let len = read_u32(input)? as usize;
    let mut buf = vec![0u8; len];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

/// Errors raised while assembling or (de)serializing deltas
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// EncMap lists a row the delta does not carry
    #[error("EncMap lists {0} but the delta has no such row")]
    MissingRow(Handle),

    /// Row carried without an EncMap entry
    #[error("row {0} is not listed in the EncMap")]
    UnmappedRow(Handle),

    /// Row stored under a handle of another table
    #[error("row of table {actual} stored under {handle}")]
    TableMismatch { handle: Handle, actual: TableIndex },

    /// `Add*` logged for a table that is not added through a parent
    #[error("rows of table {table} are not added through a parent")]
    NotAddable { table: TableIndex },

    /// User-string heap exceeds the token offset range
    #[error("user-string heap overflow")]
    HeapOverflow,

    /// Section too large for the stream format
    #[error("section of {0} entries too large")]
    TooLarge(usize),

    /// Stream does not start with the delta magic
    #[error("not a metadata delta stream")]
    BadMagic,

    /// Unknown stream format version
    #[error("unsupported delta format version {0}")]
    UnsupportedVersion(u16),

    /// Unknown EncLog operation code
    #[error("unknown EncLog operation {0}")]
    BadOperation(u32),

    /// Token does not designate a known table
    #[error("token {0} does not designate a table row")]
    BadToken(Token),

    /// User string is not valid UTF-16
    #[error("user string at offset {0:#x} is not valid UTF-16")]
    BadUserString(u32),

    /// Stored EncMap differs from the one derived from the log
    #[error("stored EncMap does not match the EncLog")]
    MapMismatch,

    /// Row serialization error
    #[error("row serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enc::EncLogBuilder;
    use pretty_assertions::assert_eq;

    fn method_row(name: &str) -> RowData {
        RowData::MethodDef {
            rva: Some(0),
            impl_flags: 0,
            flags: 0,
            name: name.into(),
            signature: vec![0x20, 0x00, 0x01],
        }
    }

    fn sample() -> MetadataDelta {
        let mut log = EncLogBuilder::new();
        let ty = Handle::new(TableIndex::TypeDef, 2);
        let m1 = Handle::new(TableIndex::MethodDef, 1);
        let m3 = Handle::new(TableIndex::MethodDef, 3);
        log.update(m1);
        log.add(ty, m3).unwrap();
        let mut rows = BTreeMap::new();
        rows.insert(m1, method_row("F"));
        rows.insert(m3, method_row("G"));
        MetadataDelta::new(
            1,
            Uuid::new_v4(),
            Uuid::new_v4(),
            log.build(),
            rows,
            vec![(1, "hello".into())],
        )
        .unwrap()
    }

    #[test]
    fn names_follow_row_order() {
        let delta = sample();
        assert_eq!(delta.method_def_names(), vec!["F", "G"]);
        assert!(delta.type_def_names().is_empty());
        assert_eq!(delta.user_string(Token::user_string(1)), Some("hello"));
    }

    #[test]
    fn new_rejects_missing_row() {
        let mut log = EncLogBuilder::new();
        log.update(Handle::new(TableIndex::Field, 1));
        let err = MetadataDelta::new(1, Uuid::nil(), Uuid::nil(), log.build(), BTreeMap::new(), vec![])
            .unwrap_err();
        assert!(matches!(err, DeltaError::MissingRow(_)));
    }

    #[test]
    fn new_rejects_unmapped_row() {
        let mut rows = BTreeMap::new();
        rows.insert(Handle::new(TableIndex::MethodDef, 1), method_row("F"));
        let err = MetadataDelta::new(1, Uuid::nil(), Uuid::nil(), EncLog::default(), rows, vec![])
            .unwrap_err();
        assert!(matches!(err, DeltaError::UnmappedRow(_)));
    }

    #[test]
    fn stream_round_trip() {
        let delta = sample();
        let mut bytes = Vec::new();
        delta.write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"ENCD");
        let back = MetadataDelta::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(back, delta);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = MetadataDelta::read_from(&mut &b"NOPE"[..]).unwrap_err();
        assert!(matches!(err, DeltaError::BadMagic));
    }
}
