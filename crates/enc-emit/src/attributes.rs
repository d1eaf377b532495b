//! Custom attribute reconciliation
//!
//! Provides [`reconcile_attributes`], which maps the attributes a parent
//! should carry onto the CustomAttribute rows reserved for it:
//!
//! 1. an application equal to a live row keeps that row, with no log entry
//! 2. remaining applications take unclaimed rows of the parent (live or
//!    retired) in ascending row order
//! 3. applications still without a row get new rows
//! 4. live rows nobody claimed are retired: their parent becomes the row-0
//!    sentinel and they stay reserved for the parent

use crate::error::EmitError;
use enc_metadata::Handle;
use enc_symbols::AttributeData;

/// CustomAttribute row reserved for a parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub handle: Handle,
    /// Applied attribute; `None` while the row is retired
    pub data: Option<AttributeData>,
}

impl AttributeRow {
    #[must_use]
    pub fn live(handle: Handle, data: AttributeData) -> Self {
        Self {
            handle,
            data: Some(data),
        }
    }

    #[must_use]
    pub fn retired(handle: Handle) -> Self {
        Self { handle, data: None }
    }

    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.data.is_some()
    }
}

/// Row write produced by reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeWrite {
    /// Row now carries `data`; `new` when the row was just allocated
    Assign {
        handle: Handle,
        data: AttributeData,
        new: bool,
    },
    /// Row detached from its parent; `previous` keeps its constructor
    Retire { handle: Handle, previous: AttributeData },
}

/// Result of reconciling one parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Rows reserved for the parent afterwards, in row order
    pub rows: Vec<AttributeRow>,
    /// Rows to write, in row order
    pub writes: Vec<AttributeWrite>,
}

impl Reconciliation {
    /// Whether nothing changed
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Reconcile `desired` applications against the parent's `existing` rows
///
/// # Errors
/// Returns error if `allocate` cannot provide a new row
pub fn reconcile_attributes(
    existing: &[AttributeRow],
    desired: &[AttributeData],
    mut allocate: impl FnMut() -> Result<Handle, EmitError>,
) -> Result<Reconciliation, EmitError> {
    let mut rows: Vec<AttributeRow> = existing.to_vec();
    rows.sort_by_key(|r| r.handle);
    let mut claimed = vec![false; rows.len()];
    let mut placed = vec![false; desired.len()];

    for (d, data) in desired.iter().enumerate() {
        if let Some(i) = (0..rows.len()).find(|&i| !claimed[i] && rows[i].data.as_ref() == Some(data)) {
            claimed[i] = true;
            placed[d] = true;
        }
    }

    let mut writes = Vec::new();
    for (d, data) in desired.iter().enumerate() {
        if placed[d] {
            continue;
        }
        match (0..rows.len()).find(|&i| !claimed[i]) {
            Some(i) => {
                claimed[i] = true;
                rows[i].data = Some(data.clone());
                writes.push(AttributeWrite::Assign {
                    handle: rows[i].handle,
                    data: data.clone(),
                    new: false,
                });
            }
            None => {
                let handle = allocate()?;
                rows.push(AttributeRow::live(handle, data.clone()));
                claimed.push(true);
                writes.push(AttributeWrite::Assign {
                    handle,
                    data: data.clone(),
                    new: true,
                });
            }
        }
    }

    for (row, claimed) in rows.iter_mut().zip(&claimed) {
        if !claimed {
            if let Some(previous) = row.data.take() {
                writes.push(AttributeWrite::Retire {
                    handle: row.handle,
                    previous,
                });
            }
        }
    }

    rows.sort_by_key(|r| r.handle);
    writes.sort_by_key(|w| match w {
        AttributeWrite::Assign { handle, .. } | AttributeWrite::Retire { handle, .. } => *handle,
    });
    Ok(Reconciliation { rows, writes })
}
