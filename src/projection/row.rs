//! Row buffers: fixed-shape records keyed by a [`FieldSchema`], mutable only
//! while their owning plan level is being executed.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::projection::schema::{FieldSchema, SlotKind};

#[derive(Debug, Clone)]
enum Cell {
    Empty,
    Scalar(Value),
    Collection(Vec<RowBuffer>),
}

/// One materialized row: a cell per schema slot.
#[derive(Debug, Clone)]
pub struct RowBuffer {
    schema: Arc<FieldSchema>,
    cells: Vec<Cell>,
}

impl RowBuffer {
    pub fn new(schema: Arc<FieldSchema>) -> Self {
        let cells = vec![Cell::Empty; schema.len()];
        RowBuffer { schema, cells }
    }

    pub fn schema(&self) -> &Arc<FieldSchema> {
        &self.schema
    }

    pub fn set(&mut self, slot: usize, value: Value) {
        self.cells[slot] = Cell::Scalar(value);
    }

    pub fn get(&self, slot: usize) -> Option<&Value> {
        match &self.cells[slot] {
            Cell::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Prepare an empty collection cell; parents without children serialize
    /// to an empty array rather than null.
    pub fn init_collection(&mut self, slot: usize) {
        self.cells[slot] = Cell::Collection(Vec::new());
    }

    pub fn set_collection(&mut self, slot: usize, children: Vec<RowBuffer>) {
        self.cells[slot] = Cell::Collection(children);
    }

    pub fn push_child(&mut self, slot: usize, child: RowBuffer) {
        match &mut self.cells[slot] {
            Cell::Collection(children) => children.push(child),
            other => {
                *other = Cell::Collection(vec![child]);
            }
        }
    }

    pub fn collection(&self, slot: usize) -> Option<&[RowBuffer]> {
        match &self.cells[slot] {
            Cell::Collection(children) => Some(children),
            _ => None,
        }
    }

    /// Ordered values of several slots, nulls for empty cells. Used for
    /// composite id keys.
    pub fn values_at(&self, slots: &[usize]) -> Vec<Value> {
        slots
            .iter()
            .map(|&slot| self.get(slot).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Serialize to a nested map honoring DTO names and dot-paths. Internal
    /// slots and the explicitly excluded ones never appear; collection cells
    /// recurse into their children.
    pub fn to_map(&self, excluded: &HashSet<usize>) -> Map<String, Value> {
        let mut out = Map::new();
        for (index, slot) in self.schema.slots().iter().enumerate() {
            if slot.internal || excluded.contains(&index) {
                continue;
            }
            let value = match &self.cells[index] {
                Cell::Empty => {
                    if slot.kind == SlotKind::Collection {
                        Value::Array(Vec::new())
                    } else {
                        Value::Null
                    }
                }
                Cell::Scalar(value) => value.clone(),
                Cell::Collection(children) => Value::Array(
                    children
                        .iter()
                        .map(|child| Value::Object(child.to_map(&HashSet::new())))
                        .collect(),
                ),
            };
            match &slot.nested {
                None => {
                    out.insert(slot.dto_path.clone(), value);
                }
                Some(segments) => insert_nested(&mut out, segments, value),
            }
        }
        out
    }
}

fn insert_nested(out: &mut Map<String, Value>, segments: &[String], value: Value) {
    let mut current = out;
    for segment in &segments[..segments.len() - 1] {
        let entry = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            _ => return,
        }
    }
    if let Some(last) = segments.last() {
        current.insert(last.clone(), value);
    }
}
