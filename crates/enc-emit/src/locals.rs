//! Local slot preservation
//!
//! Provides [`LocalSlotPreserver`], which assigns the locals of a re-emitted
//! body to slots so that every local surviving the edit keeps its slot index.
//!
//! # Rules
//! - a new local takes the live old slot with the same name and kind when the
//!   syntax map correlates the declaring nodes and the types are equivalent
//! - otherwise it gets a new slot appended after all existing slots
//! - old slots nobody takes are retired and keep their old type; they are
//!   never handed to another local

use crate::codegen::{LocalDef, LocalKind};
use crate::error::EmitError;
use enc_symbols::{SyntaxMap, SyntaxNodeId, TypeSymbol};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Whether a slot is still used by the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    Live,
    Retired,
}

/// One local variable slot of a method body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSlot {
    pub ty: TypeSymbol,
    pub name: Option<String>,
    pub kind: LocalKind,
    /// Declaring syntax node in the generation that last used the slot
    pub syntax: Option<SyntaxNodeId>,
    pub state: SlotState,
}

impl LocalSlot {
    /// Live slot for a declared local
    #[must_use]
    pub fn live(local: &LocalDef) -> Self {
        Self {
            ty: local.ty.clone(),
            name: local.name.clone(),
            kind: local.kind,
            syntax: local.syntax,
            state: SlotState::Live,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state == SlotState::Live
    }
}

/// Slot layout of one method body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSlotMap {
    slots: Vec<LocalSlot>,
}

impl LocalSlotMap {
    #[must_use]
    pub fn new(slots: Vec<LocalSlot>) -> Self {
        Self { slots }
    }

    #[inline]
    #[must_use]
    pub fn slots(&self) -> &[LocalSlot] {
        &self.slots
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot types in slot order, as encoded in the local signature
    pub fn types(&self) -> impl Iterator<Item = &TypeSymbol> {
        self.slots.iter().map(|s| &s.ty)
    }

    /// Listing such as `int32 V_0 //x` and `[unchanged] V_1`
    #[must_use]
    pub fn descriptions(&self) -> Vec<String> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| SlotDescription { index: i, slot }.to_string())
            .collect()
    }
}

struct SlotDescription<'a> {
    index: usize,
    slot: &'a LocalSlot,
}

impl Display for SlotDescription<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.slot.state, &self.slot.name) {
            (SlotState::Retired, _) => write!(f, "[unchanged] V_{}", self.index),
            (SlotState::Live, Some(name)) => write!(f, "{} V_{} //{name}", self.slot.ty, self.index),
            (SlotState::Live, None) => write!(f, "{} V_{}", self.slot.ty, self.index),
        }
    }
}

/// Decides whether an old slot type can hold a new local
pub trait SlotTypeEquivalence {
    fn equivalent(&self, old: &TypeSymbol, new: &TypeSymbol) -> bool;
}

/// Plain structural equality
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralEquivalence;

impl SlotTypeEquivalence for StructuralEquivalence {
    fn equivalent(&self, old: &TypeSymbol, new: &TypeSymbol) -> bool {
        old == new
    }
}

/// Result of mapping a body's locals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotAssignment {
    /// New slot layout
    pub map: LocalSlotMap,
    /// Slot index of each declared local, in declaration order
    pub indices: Vec<u16>,
}

/// Maps the locals of a new body onto the slots of the previous one
pub struct LocalSlotPreserver<'a> {
    previous: Option<&'a LocalSlotMap>,
    syntax_map: Option<&'a SyntaxMap>,
    equivalence: &'a dyn SlotTypeEquivalence,
}

impl<'a> LocalSlotPreserver<'a> {
    #[must_use]
    pub fn new(
        previous: Option<&'a LocalSlotMap>,
        syntax_map: Option<&'a SyntaxMap>,
        equivalence: &'a dyn SlotTypeEquivalence,
    ) -> Self {
        Self {
            previous,
            syntax_map,
            equivalence,
        }
    }

    /// Assign slots to `locals`
    ///
    /// # Errors
    /// Returns error if the body needs more slots than a local index can address
    pub fn assign(&self, locals: &[LocalDef]) -> Result<SlotAssignment, EmitError> {
        let mut slots: Vec<LocalSlot> = self.previous.map(|p| p.slots.clone()).unwrap_or_default();
        let mut taken = vec![false; slots.len()];
        let mut indices = Vec::with_capacity(locals.len());

        for local in locals {
            let index = match self.find_previous(&slots, &taken, local) {
                Some(i) => {
                    taken[i] = true;
                    slots[i] = LocalSlot::live(local);
                    i
                }
                None => {
                    slots.push(LocalSlot::live(local));
                    taken.push(true);
                    slots.len() - 1
                }
            };
            indices.push(
                u16::try_from(index).map_err(|_| EmitError::invariant("method body exceeds the local slot limit"))?,
            );
        }

        for (slot, taken) in slots.iter_mut().zip(&taken) {
            if !taken {
                slot.state = SlotState::Retired;
            }
        }

        Ok(SlotAssignment {
            map: LocalSlotMap::new(slots),
            indices,
        })
    }

    fn find_previous(&self, slots: &[LocalSlot], taken: &[bool], local: &LocalDef) -> Option<usize> {
        let (syntax_map, new_syntax) = (self.syntax_map?, local.syntax?);
        let previous_len = self.previous.map_or(0, LocalSlotMap::len);
        (0..previous_len).find(|&i| {
            let old = &slots[i];
            !taken[i]
                && old.is_live()
                && old.kind == local.kind
                && old.name == local.name
                && old.syntax.is_some_and(|s| syntax_map.correlates(s, new_syntax))
                && self.equivalence.equivalent(&old.ty, &local.ty)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn previous(locals: &[LocalDef]) -> LocalSlotMap {
        LocalSlotMap::new(locals.iter().map(LocalSlot::live).collect())
    }

    fn named(name: &str, ty: TypeSymbol, node: u32) -> LocalDef {
        LocalDef::named(name, ty, SyntaxNodeId(node))
    }

    #[test]
    fn correlated_local_keeps_slot() {
        let old = previous(&[named("x", TypeSymbol::INT32, 1), named("y", TypeSymbol::STRING, 2)]);
        let map = SyntaxMap::from_pairs([(SyntaxNodeId(1), SyntaxNodeId(11)), (SyntaxNodeId(2), SyntaxNodeId(12))]);
        let preserver = LocalSlotPreserver::new(Some(&old), Some(&map), &StructuralEquivalence);
        let new = [named("y", TypeSymbol::STRING, 12), named("x", TypeSymbol::INT32, 11)];
        let assignment = preserver.assign(&new).unwrap();
        assert_eq!(assignment.indices, vec![1, 0]);
        assert_eq!(assignment.map.descriptions(), vec!["int32 V_0 //x", "string V_1 //y"]);
    }

    #[test]
    fn type_change_gets_new_slot_and_retires_old() {
        let old = previous(&[named("x", TypeSymbol::INT32, 1)]);
        let map = SyntaxMap::identity();
        let preserver = LocalSlotPreserver::new(Some(&old), Some(&map), &StructuralEquivalence);
        let assignment = preserver.assign(&[named("x", TypeSymbol::INT64, 1)]).unwrap();
        assert_eq!(assignment.indices, vec![1]);
        assert_eq!(assignment.map.descriptions(), vec!["[unchanged] V_0", "int64 V_1 //x"]);
        assert_eq!(assignment.map.slots()[0].ty, TypeSymbol::INT32);
    }

    #[test]
    fn without_syntax_map_nothing_is_reused() {
        let old = previous(&[named("x", TypeSymbol::INT32, 1)]);
        let preserver = LocalSlotPreserver::new(Some(&old), None, &StructuralEquivalence);
        let assignment = preserver.assign(&[named("x", TypeSymbol::INT32, 1)]).unwrap();
        assert_eq!(assignment.indices, vec![1]);
    }

    #[test]
    fn retired_slot_is_not_revived() {
        let mut old = previous(&[named("x", TypeSymbol::INT32, 1)]);
        old.slots[0].state = SlotState::Retired;
        let map = SyntaxMap::identity();
        let preserver = LocalSlotPreserver::new(Some(&old), Some(&map), &StructuralEquivalence);
        let assignment = preserver.assign(&[named("x", TypeSymbol::INT32, 1)]).unwrap();
        assert_eq!(assignment.indices, vec![1]);
    }

    #[test]
    fn temps_always_get_fresh_slots() {
        let old = previous(&[LocalDef::temp(TypeSymbol::INT32)]);
        let map = SyntaxMap::identity();
        let preserver = LocalSlotPreserver::new(Some(&old), Some(&map), &StructuralEquivalence);
        let assignment = preserver.assign(&[LocalDef::temp(TypeSymbol::INT32)]).unwrap();
        assert_eq!(assignment.map.descriptions(), vec!["[unchanged] V_0", "int32 V_1"]);
    }

    proptest! {
        #[test]
        fn surviving_locals_keep_their_slots(
            count in 1usize..12,
            removed in proptest::collection::vec(any::<bool>(), 12),
            added in 0usize..4,
        ) {
            let old_locals: Vec<LocalDef> = (0..count)
                .map(|i| named(&format!("v{i}"), TypeSymbol::INT32, i as u32))
                .collect();
            let old = previous(&old_locals);
            let map = SyntaxMap::identity();
            let preserver = LocalSlotPreserver::new(Some(&old), Some(&map), &StructuralEquivalence);

            let mut new_locals: Vec<LocalDef> = old_locals
                .iter()
                .enumerate()
                .filter(|(i, _)| !removed[*i])
                .map(|(_, l)| l.clone())
                .collect();
            for j in 0..added {
                new_locals.push(named(&format!("n{j}"), TypeSymbol::STRING, 100 + j as u32));
            }

            let assignment = preserver.assign(&new_locals).unwrap();
            let mut expected_new = count;
            for (local, index) in new_locals.iter().zip(&assignment.indices) {
                let name = local.name.as_deref().unwrap_or_default();
                if let Some(i) = name.strip_prefix('v') {
                    prop_assert_eq!(usize::from(*index), i.parse::<usize>().unwrap());
                } else {
                    prop_assert_eq!(usize::from(*index), expected_new);
                    expected_new += 1;
                }
            }
            for (i, slot) in assignment.map.slots().iter().take(count).enumerate() {
                prop_assert_eq!(slot.is_live(), !removed[i]);
            }
        }
    }
}
