//! Boolean simplifier: a fixed-point rewrite system over postfix form.
//!
//! Applies involution, complementation, idempotence, identity, annihilation,
//! associative flattening and (in canonical-structure mode) commutative
//! ordering until a pass produces no change. Constants `⊤`/`⊥` introduced by
//! the rules may appear in the output stream.

pub mod expr;
pub mod rules;

pub use expr::BoolExpr;
pub use rules::{RewriteRule, Transformed};

use crate::dsl::errors::DslSyntaxError;
use crate::dsl::Token;
use rules::{
    Annihilation, Complement, CommutativeOrder, ConstantNegation, FlattenAssociative, Identity,
    Idempotence, Involution, UnwrapSingleton,
};

/// Operand-ordering behavior of the simplifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimplifyMode {
    /// Sort n-ary operands into a stable canonical order. Produces the
    /// smallest key space but discards user-visible short-circuit order.
    CanonicalStructure,
    /// Keep operand order as written. This is the mode the structural cache
    /// key uses, so backends can rely on left-to-right operand order.
    EvaluationPreserving,
}

fn rules_for(mode: SimplifyMode) -> Vec<Box<dyn RewriteRule>> {
    let mut rules: Vec<Box<dyn RewriteRule>> = vec![
        Box::new(FlattenAssociative),
        Box::new(Involution),
        Box::new(ConstantNegation),
        Box::new(Annihilation),
        Box::new(Identity),
        Box::new(Complement),
        Box::new(Idempotence),
        Box::new(UnwrapSingleton),
    ];
    if mode == SimplifyMode::CanonicalStructure {
        rules.push(Box::new(CommutativeOrder));
    }
    rules
}

/// Simplify an expression tree to a fixed point.
pub fn simplify_expr(mut expr: BoolExpr, mode: SimplifyMode) -> BoolExpr {
    let rules = rules_for(mode);
    loop {
        let mut changed = false;
        for rule in &rules {
            let t = rule.apply(expr);
            if t.is_changed() {
                changed = true;
                log::trace!("simplify: {} rewrote expression", rule.name());
            }
            expr = t.into_inner();
        }
        if !changed {
            return expr;
        }
    }
}

/// Simplify a postfix token stream, returning canonical postfix.
pub fn simplify_postfix(
    postfix: &[Token],
    mode: SimplifyMode,
) -> Result<Vec<Token>, DslSyntaxError> {
    let expr = BoolExpr::from_postfix(postfix)?;
    Ok(simplify_expr(expr, mode).to_postfix())
}
