//! Metadata tables, handles and tokens
//!
//! [`TableIndex`] follows the ECMA-335 II.22 numbering; its derived `Ord`
//! is the canonical table order used by the EncMap.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Number of table slots addressable by a token's high byte.
pub const TABLE_COUNT: usize = 0x2D;

/// ECMA-335 metadata table index
///
/// Only the tables an incremental delta can touch are listed. Variants are
/// declared in ascending code order so the derived ordering is canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TableIndex {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    Field = 0x04,
    MethodDef = 0x06,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    Event = 0x14,
    PropertyMap = 0x15,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    AssemblyRef = 0x23,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableIndex {
    /// Every known table in canonical order
    pub const ALL: [TableIndex; 31] = [
        Self::Module,
        Self::TypeRef,
        Self::TypeDef,
        Self::Field,
        Self::MethodDef,
        Self::Param,
        Self::InterfaceImpl,
        Self::MemberRef,
        Self::Constant,
        Self::CustomAttribute,
        Self::DeclSecurity,
        Self::ClassLayout,
        Self::FieldLayout,
        Self::StandAloneSig,
        Self::EventMap,
        Self::Event,
        Self::PropertyMap,
        Self::Property,
        Self::MethodSemantics,
        Self::MethodImpl,
        Self::ModuleRef,
        Self::TypeSpec,
        Self::ImplMap,
        Self::FieldRva,
        Self::EncLog,
        Self::EncMap,
        Self::AssemblyRef,
        Self::NestedClass,
        Self::GenericParam,
        Self::MethodSpec,
        Self::GenericParamConstraint,
    ];

    /// Raw table code (token high byte)
    #[inline]
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Table for a raw code
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Reference tables describe entities of other modules or blobs shared by
    /// definitions; every delta re-emits the ones it needs.
    #[inline]
    #[must_use]
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            Self::AssemblyRef
                | Self::ModuleRef
                | Self::TypeRef
                | Self::MemberRef
                | Self::TypeSpec
                | Self::MethodSpec
        )
    }

    /// Table name as used by ECMA-335
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Module => "Module",
            Self::TypeRef => "TypeRef",
            Self::TypeDef => "TypeDef",
            Self::Field => "Field",
            Self::MethodDef => "MethodDef",
            Self::Param => "Param",
            Self::InterfaceImpl => "InterfaceImpl",
            Self::MemberRef => "MemberRef",
            Self::Constant => "Constant",
            Self::CustomAttribute => "CustomAttribute",
            Self::DeclSecurity => "DeclSecurity",
            Self::ClassLayout => "ClassLayout",
            Self::FieldLayout => "FieldLayout",
            Self::StandAloneSig => "StandAloneSig",
            Self::EventMap => "EventMap",
            Self::Event => "Event",
            Self::PropertyMap => "PropertyMap",
            Self::Property => "Property",
            Self::MethodSemantics => "MethodSemantics",
            Self::MethodImpl => "MethodImpl",
            Self::ModuleRef => "ModuleRef",
            Self::TypeSpec => "TypeSpec",
            Self::ImplMap => "ImplMap",
            Self::FieldRva => "FieldRva",
            Self::EncLog => "EncLog",
            Self::EncMap => "EncMap",
            Self::AssemblyRef => "AssemblyRef",
            Self::NestedClass => "NestedClass",
            Self::GenericParam => "GenericParam",
            Self::MethodSpec => "MethodSpec",
            Self::GenericParamConstraint => "GenericParamConstraint",
        }
    }
}

impl Display for TableIndex {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A row of a metadata table
///
/// Ordering is (table, row), i.e. the EncMap order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Handle {
    table: TableIndex,
    row: u32,
}

impl Handle {
    /// Largest row number a token can carry
    pub const MAX_ROW: u32 = 0x00FF_FFFF;

    /// Create a handle
    #[inline]
    #[must_use]
    pub const fn new(table: TableIndex, row: u32) -> Self {
        Self { table, row }
    }

    /// Table of this handle
    #[inline]
    #[must_use]
    pub const fn table(&self) -> TableIndex {
        self.table
    }

    /// One-based row number
    #[inline]
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Metadata token for this handle
    #[inline]
    #[must_use]
    pub const fn token(&self) -> Token {
        Token((self.table as u32) << 24 | (self.row & Self::MAX_ROW))
    }
}

impl Display for Handle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.table, self.row)
    }
}

/// A 32-bit metadata token: table code in the high byte, row below
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Token(u32);

impl Token {
    /// High byte tagging user-string heap offsets
    pub const USER_STRING_TAG: u32 = 0x70;

    /// The null token
    pub const NIL: Token = Token(0);

    /// Wrap a raw token value
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Token addressing a user-string heap offset (`ldstr` operand)
    #[inline]
    #[must_use]
    pub const fn user_string(offset: u32) -> Self {
        Self(Self::USER_STRING_TAG << 24 | (offset & Handle::MAX_ROW))
    }

    /// Raw 32-bit value
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Row (or heap offset) part
    #[inline]
    #[must_use]
    pub const fn row(self) -> u32 {
        self.0 & Handle::MAX_ROW
    }

    /// Table of the token, if it designates a table row
    #[must_use]
    pub fn table(self) -> Option<TableIndex> {
        TableIndex::from_code((self.0 >> 24) as u8)
    }

    /// Handle of the token, if it designates a table row
    #[must_use]
    pub fn handle(self) -> Option<Handle> {
        self.table().map(|t| Handle::new(t, self.row()))
    }

    /// True for the nil token
    #[inline]
    #[must_use]
    pub const fn is_nil(self) -> bool {
        self.0 == 0
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<Handle> for Token {
    fn from(handle: Handle) -> Self {
        handle.token()
    }
}

/// Row counts for every table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSizes([u32; TABLE_COUNT]);

impl TableSizes {
    /// All tables empty
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self([0; TABLE_COUNT])
    }

    /// Number of rows in a table
    #[inline]
    #[must_use]
    pub fn get(&self, table: TableIndex) -> u32 {
        self.0[table.code() as usize]
    }

    /// Set the row count of a table
    #[inline]
    pub fn set(&mut self, table: TableIndex, rows: u32) {
        self.0[table.code() as usize] = rows;
    }

    /// Builder-style row count
    #[inline]
    #[must_use]
    pub fn with(mut self, table: TableIndex, rows: u32) -> Self {
        self.set(table, rows);
        self
    }

    /// Tables with at least one row, in canonical order
    pub fn non_empty(&self) -> impl Iterator<Item = (TableIndex, u32)> + '_ {
        TableIndex::ALL
            .iter()
            .copied()
            .map(|t| (t, self.get(t)))
            .filter(|(_, rows)| *rows > 0)
    }
}

impl Default for TableSizes {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_is_numeric() {
        let mut sorted = TableIndex::ALL;
        sorted.sort_by_key(|t| t.code());
        assert_eq!(sorted, TableIndex::ALL);
        assert!(TableIndex::TypeRef < TableIndex::MethodDef);
        assert!(TableIndex::AssemblyRef < TableIndex::NestedClass);
    }

    #[test]
    fn from_code_round_trips_known_tables() {
        for table in TableIndex::ALL {
            assert_eq!(TableIndex::from_code(table.code()), Some(table));
        }
        assert_eq!(TableIndex::from_code(0x03), None);
    }

    #[test]
    fn handle_token_layout() {
        let handle = Handle::new(TableIndex::MethodDef, 5);
        assert_eq!(handle.token().raw(), 0x0600_0005);
        assert_eq!(handle.token().handle(), Some(handle));
        assert_eq!(handle.token().to_string(), "0x06000005");
        assert_eq!(handle.to_string(), "MethodDef(5)");
    }

    #[test]
    fn user_string_token_has_no_table() {
        let token = Token::user_string(0x1d);
        assert_eq!(token.raw(), 0x7000_001d);
        assert!(token.table().is_none());
    }

    #[test]
    fn handles_sort_by_table_then_row() {
        let mut handles = vec![
            Handle::new(TableIndex::Param, 1),
            Handle::new(TableIndex::TypeRef, 9),
            Handle::new(TableIndex::MethodDef, 2),
            Handle::new(TableIndex::TypeRef, 4),
        ];
        handles.sort();
        assert_eq!(
            handles,
            vec![
                Handle::new(TableIndex::TypeRef, 4),
                Handle::new(TableIndex::TypeRef, 9),
                Handle::new(TableIndex::MethodDef, 2),
                Handle::new(TableIndex::Param, 1),
            ]
        );
    }

    #[test]
    fn reference_tables() {
        assert!(TableIndex::TypeRef.is_reference());
        assert!(TableIndex::AssemblyRef.is_reference());
        assert!(!TableIndex::StandAloneSig.is_reference());
        assert!(!TableIndex::MethodDef.is_reference());
    }

    #[test]
    fn table_sizes_track_rows() {
        let sizes = TableSizes::empty()
            .with(TableIndex::TypeDef, 2)
            .with(TableIndex::MethodDef, 3);
        assert_eq!(sizes.get(TableIndex::TypeDef), 2);
        assert_eq!(sizes.get(TableIndex::Field), 0);
        assert_eq!(sizes.non_empty().count(), 2);
    }
}
