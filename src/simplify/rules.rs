//! Rewrite rules applied by the simplifier.
//!
//! Each rule rewrites one node at a time; the shared driver walks the tree
//! bottom-up so a rule always sees already-rewritten children. Rules report
//! whether they changed anything through the [`Transformed`] wrapper so the
//! fixed-point loop knows when to stop.

use crate::simplify::expr::BoolExpr;

/// Result of applying a rewrite: the (possibly unchanged) expression plus a
/// change flag.
#[derive(Debug)]
pub enum Transformed<T> {
    Yes(T),
    No(T),
}

impl<T> Transformed<T> {
    pub fn is_changed(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Transformed::Yes(inner) | Transformed::No(inner) => inner,
        }
    }
}

pub trait RewriteRule {
    fn name(&self) -> &'static str;

    /// Rewrite a single node whose children have already been processed.
    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr>;

    fn apply(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        bottom_up(expr, &|node| self.rewrite_node(node))
    }
}

fn bottom_up<F>(expr: BoolExpr, f: &F) -> Transformed<BoolExpr>
where
    F: Fn(BoolExpr) -> Transformed<BoolExpr>,
{
    let (rebuilt, child_changed) = match expr {
        BoolExpr::Not(inner) => {
            let t = bottom_up(*inner, f);
            let changed = t.is_changed();
            (BoolExpr::Not(Box::new(t.into_inner())), changed)
        }
        BoolExpr::And(operands) => {
            let mut changed = false;
            let operands = operands
                .into_iter()
                .map(|operand| {
                    let t = bottom_up(operand, f);
                    changed |= t.is_changed();
                    t.into_inner()
                })
                .collect();
            (BoolExpr::And(operands), changed)
        }
        BoolExpr::Or(operands) => {
            let mut changed = false;
            let operands = operands
                .into_iter()
                .map(|operand| {
                    let t = bottom_up(operand, f);
                    changed |= t.is_changed();
                    t.into_inner()
                })
                .collect();
            (BoolExpr::Or(operands), changed)
        }
        leaf => (leaf, false),
    };

    let t = f(rebuilt);
    if child_changed {
        Transformed::Yes(t.into_inner())
    } else {
        t
    }
}

/// `x & (y & z)` -> `x & y & z`, and the same for `|`.
pub struct FlattenAssociative;

impl RewriteRule for FlattenAssociative {
    fn name(&self) -> &'static str {
        "flatten-associative"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::And(operands) if operands.iter().any(|o| matches!(o, BoolExpr::And(_))) => {
                let mut flat = Vec::with_capacity(operands.len());
                for operand in operands {
                    match operand {
                        BoolExpr::And(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                Transformed::Yes(BoolExpr::And(flat))
            }
            BoolExpr::Or(operands) if operands.iter().any(|o| matches!(o, BoolExpr::Or(_))) => {
                let mut flat = Vec::with_capacity(operands.len());
                for operand in operands {
                    match operand {
                        BoolExpr::Or(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                Transformed::Yes(BoolExpr::Or(flat))
            }
            other => Transformed::No(other),
        }
    }
}

/// `!!x` -> `x`.
pub struct Involution;

impl RewriteRule for Involution {
    fn name(&self) -> &'static str {
        "involution"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::Not(inner) => match *inner {
                BoolExpr::Not(x) => Transformed::Yes(*x),
                other => Transformed::No(BoolExpr::Not(Box::new(other))),
            },
            other => Transformed::No(other),
        }
    }
}

/// `!⊤` -> `⊥`, `!⊥` -> `⊤`.
pub struct ConstantNegation;

impl RewriteRule for ConstantNegation {
    fn name(&self) -> &'static str {
        "constant-negation"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::Not(inner) => match *inner {
                BoolExpr::True => Transformed::Yes(BoolExpr::False),
                BoolExpr::False => Transformed::Yes(BoolExpr::True),
                other => Transformed::No(BoolExpr::Not(Box::new(other))),
            },
            other => Transformed::No(other),
        }
    }
}

/// `x & ⊥` -> `⊥`, `x | ⊤` -> `⊤`.
pub struct Annihilation;

impl RewriteRule for Annihilation {
    fn name(&self) -> &'static str {
        "annihilation"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::And(operands) if operands.iter().any(|o| *o == BoolExpr::False) => {
                Transformed::Yes(BoolExpr::False)
            }
            BoolExpr::Or(operands) if operands.iter().any(|o| *o == BoolExpr::True) => {
                Transformed::Yes(BoolExpr::True)
            }
            other => Transformed::No(other),
        }
    }
}

/// `x & ⊤` -> `x`, `x | ⊥` -> `x`. An operand list reduced to nothing
/// collapses to the neutral constant.
pub struct Identity;

impl RewriteRule for Identity {
    fn name(&self) -> &'static str {
        "identity"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::And(operands) if operands.iter().any(|o| *o == BoolExpr::True) => {
                let kept: Vec<BoolExpr> =
                    operands.into_iter().filter(|o| *o != BoolExpr::True).collect();
                Transformed::Yes(if kept.is_empty() {
                    BoolExpr::True
                } else {
                    BoolExpr::And(kept)
                })
            }
            BoolExpr::Or(operands) if operands.iter().any(|o| *o == BoolExpr::False) => {
                let kept: Vec<BoolExpr> =
                    operands.into_iter().filter(|o| *o != BoolExpr::False).collect();
                Transformed::Yes(if kept.is_empty() {
                    BoolExpr::False
                } else {
                    BoolExpr::Or(kept)
                })
            }
            other => Transformed::No(other),
        }
    }
}

/// `x & !x` -> `⊥`, `x | !x` -> `⊤`, detected on both operand orderings.
pub struct Complement;

impl Complement {
    fn has_complementary_pair(operands: &[BoolExpr]) -> bool {
        operands.iter().any(|candidate| {
            let negated = match candidate {
                BoolExpr::Not(inner) => (**inner).clone(),
                other => BoolExpr::Not(Box::new(other.clone())),
            };
            operands.contains(&negated)
        })
    }
}

impl RewriteRule for Complement {
    fn name(&self) -> &'static str {
        "complement"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::And(operands) if Self::has_complementary_pair(&operands) => {
                Transformed::Yes(BoolExpr::False)
            }
            BoolExpr::Or(operands) if Self::has_complementary_pair(&operands) => {
                Transformed::Yes(BoolExpr::True)
            }
            other => Transformed::No(other),
        }
    }
}

/// `x & x` -> `x`, `x | x` -> `x`; keeps the first occurrence of each
/// operand so evaluation order survives.
pub struct Idempotence;

impl RewriteRule for Idempotence {
    fn name(&self) -> &'static str {
        "idempotence"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        let dedupe = |operands: Vec<BoolExpr>| {
            let mut kept: Vec<BoolExpr> = Vec::with_capacity(operands.len());
            for operand in operands {
                if !kept.contains(&operand) {
                    kept.push(operand);
                }
            }
            kept
        };
        match expr {
            BoolExpr::And(operands) => {
                let before = operands.len();
                let kept = dedupe(operands);
                if kept.len() < before {
                    Transformed::Yes(BoolExpr::And(kept))
                } else {
                    Transformed::No(BoolExpr::And(kept))
                }
            }
            BoolExpr::Or(operands) => {
                let before = operands.len();
                let kept = dedupe(operands);
                if kept.len() < before {
                    Transformed::Yes(BoolExpr::Or(kept))
                } else {
                    Transformed::No(BoolExpr::Or(kept))
                }
            }
            other => Transformed::No(other),
        }
    }
}

/// Unwrap `And`/`Or` nodes left with a single operand.
pub struct UnwrapSingleton;

impl RewriteRule for UnwrapSingleton {
    fn name(&self) -> &'static str {
        "unwrap-singleton"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        match expr {
            BoolExpr::And(mut operands) if operands.len() == 1 => {
                Transformed::Yes(operands.remove(0))
            }
            BoolExpr::Or(mut operands) if operands.len() == 1 => {
                Transformed::Yes(operands.remove(0))
            }
            other => Transformed::No(other),
        }
    }
}

/// Commutative ordering: sort n-ary operands by canonical string. Only part
/// of the canonical-structure mode; the evaluation-preserving mode keeps
/// user-visible short-circuit order.
pub struct CommutativeOrder;

impl RewriteRule for CommutativeOrder {
    fn name(&self) -> &'static str {
        "commutative-order"
    }

    fn rewrite_node(&self, expr: BoolExpr) -> Transformed<BoolExpr> {
        let sort = |mut operands: Vec<BoolExpr>| {
            let before: Vec<String> = operands.iter().map(BoolExpr::canonical).collect();
            operands.sort_by_key(BoolExpr::canonical);
            let changed = operands
                .iter()
                .map(BoolExpr::canonical)
                .collect::<Vec<_>>()
                != before;
            (operands, changed)
        };
        match expr {
            BoolExpr::And(operands) => {
                let (operands, changed) = sort(operands);
                if changed {
                    Transformed::Yes(BoolExpr::And(operands))
                } else {
                    Transformed::No(BoolExpr::And(operands))
                }
            }
            BoolExpr::Or(operands) => {
                let (operands, changed) = sort(operands);
                if changed {
                    Transformed::Yes(BoolExpr::Or(operands))
                } else {
                    Transformed::No(BoolExpr::Or(operands))
                }
            }
            other => Transformed::No(other),
        }
    }
}
