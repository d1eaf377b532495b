//! Edit-and-continue log and map
//!
//! Provides [`EncLogBuilder`], which collects the rows touched by a delta and
//! lays them out in the canonical EncLog order, and [`EncMap`], the sorted
//! set of rows a delta carries.

use crate::delta::DeltaError;
use crate::table::{Handle, TableIndex};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Operation code of an EncLog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum EncOperation {
    Default = 0,
    AddMethod = 1,
    AddField = 2,
    AddParameter = 3,
    AddProperty = 4,
    AddEvent = 5,
}

impl EncOperation {
    /// Raw function code
    #[inline]
    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Operation for a raw function code
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Default),
            1 => Some(Self::AddMethod),
            2 => Some(Self::AddField),
            3 => Some(Self::AddParameter),
            4 => Some(Self::AddProperty),
            5 => Some(Self::AddEvent),
            _ => None,
        }
    }

    /// The `Add*` operation logged on the parent of a new row of `table`
    #[must_use]
    pub const fn for_added(table: TableIndex) -> Option<Self> {
        match table {
            TableIndex::MethodDef => Some(Self::AddMethod),
            TableIndex::Field => Some(Self::AddField),
            TableIndex::Param => Some(Self::AddParameter),
            TableIndex::Property => Some(Self::AddProperty),
            TableIndex::Event => Some(Self::AddEvent),
            _ => None,
        }
    }
}

impl Display for EncOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "Default",
            Self::AddMethod => "AddMethod",
            Self::AddField => "AddField",
            Self::AddParameter => "AddParameter",
            Self::AddProperty => "AddProperty",
            Self::AddEvent => "AddEvent",
        };
        f.write_str(name)
    }
}

/// One EncLog row
///
/// For `Add*` operations the handle is the parent row receiving the member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncLogEntry {
    pub handle: Handle,
    pub operation: EncOperation,
}

impl EncLogEntry {
    #[inline]
    #[must_use]
    pub const fn new(handle: Handle, operation: EncOperation) -> Self {
        Self { handle, operation }
    }
}

impl Display for EncLogEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Row({}, {}, {})", self.handle.row(), self.handle.table(), self.operation)
    }
}

/// Ordered EncLog of a delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncLog(Vec<EncLogEntry>);

impl EncLog {
    /// Wrap entries that are already in log order
    #[must_use]
    pub fn from_entries(entries: Vec<EncLogEntry>) -> Self {
        Self(entries)
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[EncLogEntry] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncLogEntry> {
        self.0.iter()
    }

    /// Entries on definition tables (reference tables filtered out)
    #[must_use]
    pub fn definitions(&self) -> Vec<EncLogEntry> {
        self.0
            .iter()
            .filter(|e| !e.handle.table().is_reference())
            .copied()
            .collect()
    }
}

/// Sorted, duplicate-free set of rows carried by a delta
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncMap(Vec<Handle>);

impl EncMap {
    /// Every handle with a `Default` log entry, sorted by (table, row)
    #[must_use]
    pub fn from_log(log: &EncLog) -> Self {
        let mut handles: Vec<Handle> = log
            .iter()
            .filter(|e| e.operation == EncOperation::Default)
            .map(|e| e.handle)
            .collect();
        handles.sort_unstable();
        handles.dedup();
        Self(handles)
    }

    #[inline]
    #[must_use]
    pub fn handles(&self) -> &[Handle] {
        &self.0
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether the map lists `handle`
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.0.binary_search(&handle).is_ok()
    }

    /// Handles on definition tables (reference tables filtered out)
    #[must_use]
    pub fn definitions(&self) -> Vec<Handle> {
        self.0
            .iter()
            .filter(|h| !h.table().is_reference())
            .copied()
            .collect()
    }
}

/// Log layout: groups of tables emitted in this order, rows ascending
/// within each table.
const LOG_SECTIONS: &[&[TableIndex]] = &[
    &[
        TableIndex::AssemblyRef,
        TableIndex::ModuleRef,
        TableIndex::MemberRef,
        TableIndex::MethodSpec,
        TableIndex::TypeRef,
        TableIndex::TypeSpec,
        TableIndex::StandAloneSig,
    ],
    &[TableIndex::TypeDef],
    &[TableIndex::EventMap, TableIndex::Event],
    &[TableIndex::PropertyMap, TableIndex::Property],
    &[TableIndex::Field],
    &[TableIndex::MethodDef],
    &[TableIndex::Param],
    &[
        TableIndex::InterfaceImpl,
        TableIndex::Constant,
        TableIndex::CustomAttribute,
        TableIndex::DeclSecurity,
        TableIndex::ClassLayout,
        TableIndex::FieldLayout,
        TableIndex::MethodSemantics,
        TableIndex::MethodImpl,
        TableIndex::ImplMap,
        TableIndex::FieldRva,
        TableIndex::NestedClass,
        TableIndex::GenericParam,
        TableIndex::GenericParamConstraint,
    ],
];

/// Collects touched rows and produces the canonical EncLog
///
/// A row is either updated in place ([`update`](Self::update)) or added to a
/// parent ([`add`](Self::add)); the parent's `Add*` entry is emitted right
/// before the new row's `Default` entry.
#[derive(Debug, Clone, Default)]
pub struct EncLogBuilder {
    rows: BTreeMap<Handle, Option<Handle>>,
}

impl EncLogBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a row written in place (or a new row without a member parent)
    pub fn update(&mut self, handle: Handle) {
        self.rows.entry(handle).or_insert(None);
    }

    /// Record a new member row added to `parent`
    ///
    /// # Errors
    /// Returns error if `handle` is not a table that is added through its
    /// parent (Field, MethodDef, Param, Property, Event).
    pub fn add(&mut self, parent: Handle, handle: Handle) -> Result<(), DeltaError> {
        if EncOperation::for_added(handle.table()).is_none() {
            return Err(DeltaError::NotAddable {
                table: handle.table(),
            });
        }
        self.rows.insert(handle, Some(parent));
        Ok(())
    }

    /// Whether `handle` has been recorded
    #[must_use]
    pub fn contains(&self, handle: Handle) -> bool {
        self.rows.contains_key(&handle)
    }

    /// Number of distinct rows recorded
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Lay the recorded rows out in log order
    #[must_use]
    pub fn build(&self) -> EncLog {
        let mut entries = Vec::with_capacity(self.rows.len() * 2);
        for section in LOG_SECTIONS {
            for &table in *section {
                let start = Handle::new(table, 0);
                let end = Handle::new(table, u32::MAX);
                for (&handle, parent) in self.rows.range(start..=end) {
                    if let (Some(parent), Some(op)) = (parent, EncOperation::for_added(table)) {
                        entries.push(EncLogEntry::new(*parent, op));
                    }
                    entries.push(EncLogEntry::new(handle, EncOperation::Default));
                }
            }
        }
        EncLog(entries)
    }
}
