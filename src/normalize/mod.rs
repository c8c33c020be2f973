//! Structural normalization: turning a simplified expression plus its filter
//! definitions into a canonical, value-independent cache key.
//!
//! Every distinct `(property, operator)` pair becomes a structural slot
//! `p0`, `p1`, ... in order of first appearance; identifiers are rewritten to
//! their slot alias and the stream is re-simplified so filters sharing a pair
//! collapse together. The key is the aliased postfix plus the slot binding
//! table, so filter names and literal values never reach it:
//!
//! ```text
//! p0 p1 & p2 ! p3 & p0 & | :: p0=A:EQ p1=B:EQ p2=C:EQ p3=A:NE
//! ```
//!
//! Expressions that simplify to a constant short-circuit to the fixed keys
//! `⊤` / `⊥`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dsl::errors::DslSyntaxError;
use crate::dsl::{render_postfix, Token};
use crate::model::{FilterDefinition, Operator, PropertyRef};
use crate::simplify::{self, SimplifyMode};

/// One distinct `(property, operator)` pair referenced by the expression.
#[derive(Debug, Clone)]
pub struct StructuralSlot {
    pub property: Arc<dyn PropertyRef>,
    pub operator: Operator,
    /// The `PROP:OP` token this slot contributes to the key.
    pub token: String,
}

/// Normalization result: the cache key, the aliased postfix the condition
/// builder consumes, the slot table and the filter-name bindings used to
/// install argument values at execution time.
#[derive(Debug, Clone)]
pub struct NormalizedFilter {
    pub key: String,
    pub postfix: Vec<Token>,
    pub slots: Vec<StructuralSlot>,
    /// `(filter name, slot index)` for every filter the expression uses.
    pub bindings: Vec<(String, usize)>,
}

impl NormalizedFilter {
    fn constant(token: Token) -> Self {
        NormalizedFilter {
            key: token.to_string(),
            postfix: vec![token],
            slots: Vec::new(),
            bindings: Vec::new(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Argument key for a structural slot.
pub fn slot_alias(index: usize) -> String {
    format!("p{index}")
}

/// Normalize a parsed expression against its filter definitions.
///
/// Fails with [`DslSyntaxError::UndefinedFilter`] when the expression
/// references a name absent from `filters`.
pub fn normalize(
    postfix: &[Token],
    filters: &[(String, FilterDefinition)],
    mode: SimplifyMode,
) -> Result<NormalizedFilter, DslSyntaxError> {
    let simplified = simplify::simplify_postfix(postfix, mode)?;
    if let Some(constant) = as_constant(&simplified) {
        return Ok(NormalizedFilter::constant(constant));
    }

    // First pass: one slot per distinct (property, operator) pair, in order
    // of first appearance; identifiers become slot aliases.
    let mut slots: Vec<StructuralSlot> = Vec::new();
    let mut slot_by_token: HashMap<String, usize> = HashMap::new();
    let mut bindings: Vec<(String, usize)> = Vec::new();
    let mut aliased: Vec<Token> = Vec::with_capacity(simplified.len());

    for token in &simplified {
        match token {
            Token::Ident(name) => {
                let definition = filters
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, d)| d)
                    .ok_or_else(|| DslSyntaxError::UndefinedFilter {
                        name: name.clone(),
                        available: filters.iter().map(|(n, _)| n.clone()).collect(),
                    })?;
                let pair = definition.structural_token();
                let index = *slot_by_token.entry(pair.clone()).or_insert_with(|| {
                    slots.push(StructuralSlot {
                        property: definition.property().clone(),
                        operator: definition.operator().clone(),
                        token: pair.clone(),
                    });
                    slots.len() - 1
                });
                if !bindings.iter().any(|(n, _)| n == name) {
                    bindings.push((name.clone(), index));
                }
                aliased.push(Token::Ident(slot_alias(index)));
            }
            other => aliased.push(other.clone()),
        }
    }

    // Filters sharing a pair now carry the same alias; re-simplifying
    // collapses the duplicates (`p0 & p0` -> `p0`).
    let collapsed = simplify::simplify_postfix(&aliased, mode)?;
    if let Some(constant) = as_constant(&collapsed) {
        return Ok(NormalizedFilter::constant(constant));
    }

    // Renumber slots by first appearance in the collapsed stream; slots that
    // simplified away are dropped along with their bindings.
    let mut alias_order: Vec<String> = Vec::new();
    for token in &collapsed {
        if let Token::Ident(name) = token {
            if !alias_order.contains(name) {
                alias_order.push(name.clone());
            }
        }
    }
    let remap: HashMap<&str, usize> = alias_order
        .iter()
        .enumerate()
        .map(|(new, old)| (old.as_str(), new))
        .collect();

    let final_postfix: Vec<Token> = collapsed
        .iter()
        .map(|token| match token {
            Token::Ident(name) => Token::Ident(slot_alias(remap[name.as_str()])),
            other => other.clone(),
        })
        .collect();
    let old_index: HashMap<String, usize> = (0..slots.len())
        .map(|i| (slot_alias(i), i))
        .collect();
    let final_slots: Vec<StructuralSlot> = alias_order
        .iter()
        .map(|old| slots[old_index[old]].clone())
        .collect();
    let final_bindings: Vec<(String, usize)> = bindings
        .into_iter()
        .filter_map(|(name, old)| {
            remap.get(slot_alias(old).as_str()).map(|new| (name, *new))
        })
        .collect();

    let binding_section = final_slots
        .iter()
        .enumerate()
        .map(|(i, slot)| format!("{}={}", slot_alias(i), slot.token))
        .collect::<Vec<_>>()
        .join(" ");
    let key = format!("{} :: {}", render_postfix(&final_postfix), binding_section);
    log::trace!("normalized structural key `{key}`");

    Ok(NormalizedFilter {
        key,
        postfix: final_postfix,
        slots: final_slots,
        bindings: final_bindings,
    })
}

fn as_constant(postfix: &[Token]) -> Option<Token> {
    match postfix {
        [Token::True] => Some(Token::True),
        [Token::False] => Some(Token::False),
        _ => None,
    }
}
