//! Field schemas: the fixed slot layout shared by every row buffer of one
//! query level. All keyed lookups are O(1); iteration is O(slots).

use std::collections::HashMap;

/// What a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// A fetched scalar column.
    Scalar,
    /// A nested collection of child rows.
    Collection,
    /// A computed output, filled during the transform step.
    Computed,
}

/// One slot: where the value comes from and how it appears in output.
#[derive(Debug, Clone)]
pub struct FieldSlot {
    /// Dot-joined entity field path relative to the schema's entity.
    pub entity_path: String,
    /// DTO-visible dot path; doubles as the select alias.
    pub dto_path: String,
    /// Internal slots (ids, join-back references) are selected but never
    /// serialized.
    pub internal: bool,
    /// DTO path segments when the output nests, e.g. `address.city`.
    pub nested: Option<Vec<String>>,
    pub kind: SlotKind,
}

/// Ordered slot array with entity-path and dto-path indices, plus the list
/// of collection slots and their DTO-visible names.
#[derive(Debug)]
pub struct FieldSchema {
    slots: Vec<FieldSlot>,
    by_entity_path: HashMap<String, usize>,
    by_dto_path: HashMap<String, usize>,
    collection_slots: Vec<(usize, String)>,
}

impl FieldSchema {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[FieldSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> &FieldSlot {
        &self.slots[index]
    }

    pub fn slot_by_entity_path(&self, path: &str) -> Option<usize> {
        self.by_entity_path.get(path).copied()
    }

    /// Slot index plus its is-collection flag.
    pub fn slot_by_dto_path(&self, path: &str) -> Option<(usize, bool)> {
        self.by_dto_path
            .get(path)
            .map(|&index| (index, self.slots[index].kind == SlotKind::Collection))
    }

    pub fn collection_slots(&self) -> &[(usize, String)] {
        &self.collection_slots
    }

    /// Slots the query's select list covers, in slot order.
    pub fn select_slots(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.kind == SlotKind::Scalar)
            .map(|(index, _)| index)
            .collect()
    }
}

/// Mutable schema assembly used by the planner.
#[derive(Debug, Default)]
pub struct FieldSchemaBuilder {
    slots: Vec<FieldSlot>,
}

impl FieldSchemaBuilder {
    pub fn new() -> Self {
        FieldSchemaBuilder::default()
    }

    /// Add a scalar slot, deduplicating on entity path. A slot added hidden
    /// and projected again later stays visible.
    pub fn scalar(&mut self, entity_path: &str, dto_path: &str, internal: bool) -> usize {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.kind == SlotKind::Scalar && slot.entity_path == entity_path)
        {
            if !internal {
                self.slots[index].internal = false;
            }
            return index;
        }
        self.slots.push(FieldSlot {
            entity_path: entity_path.to_string(),
            dto_path: dto_path.to_string(),
            internal,
            nested: nested_segments(dto_path),
            kind: SlotKind::Scalar,
        });
        self.slots.len() - 1
    }

    pub fn collection(&mut self, dto_name: &str) -> usize {
        if let Some(index) = self
            .slots
            .iter()
            .position(|slot| slot.kind == SlotKind::Collection && slot.dto_path == dto_name)
        {
            return index;
        }
        self.slots.push(FieldSlot {
            entity_path: String::new(),
            dto_path: dto_name.to_string(),
            internal: false,
            nested: None,
            kind: SlotKind::Collection,
        });
        self.slots.len() - 1
    }

    pub fn computed(&mut self, dto_name: &str) -> usize {
        self.slots.push(FieldSlot {
            entity_path: String::new(),
            dto_path: dto_name.to_string(),
            internal: false,
            nested: None,
            kind: SlotKind::Computed,
        });
        self.slots.len() - 1
    }

    pub fn contains_entity_path(&self, entity_path: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.kind == SlotKind::Scalar && slot.entity_path == entity_path)
    }

    pub fn build(self) -> FieldSchema {
        let mut by_entity_path = HashMap::new();
        let mut by_dto_path = HashMap::new();
        let mut collection_slots = Vec::new();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.kind == SlotKind::Scalar {
                by_entity_path.insert(slot.entity_path.clone(), index);
            }
            by_dto_path.insert(slot.dto_path.clone(), index);
            if slot.kind == SlotKind::Collection {
                collection_slots.push((index, slot.dto_path.clone()));
            }
        }
        FieldSchema {
            slots: self.slots,
            by_entity_path,
            by_dto_path,
            collection_slots,
        }
    }
}

fn nested_segments(dto_path: &str) -> Option<Vec<String>> {
    if dto_path.contains('.') {
        Some(dto_path.split('.').map(str::to_string).collect())
    } else {
        None
    }
}
