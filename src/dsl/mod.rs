//! The filter DSL: tokenizer, policy validation and postfix conversion.
//!
//! Grammar (precedence low to high):
//!
//! ```text
//! expr := or
//! or   := and ('|' and)*
//! and  := not ('&' not)*
//! not  := '!' not | atom
//! atom := IDENT | '(' expr ')'
//! ```

pub mod ast;
pub mod errors;
mod shunting_yard;
mod token;
mod tokenizer;

pub use ast::ExprAst;
pub use errors::DslSyntaxError;
pub use token::{render_postfix, Token};

use crate::config::DslPolicy;

/// Parse result: the lexed tokens, the postfix stream and the validated tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    pub tokens: Vec<Token>,
    pub postfix: Vec<Token>,
    pub ast: ExprAst,
}

/// Parse and validate a filter expression against a policy.
///
/// Policy checks run early: the length limit before lexing, the token count
/// right after, identifier patterns before any grammar work.
pub fn parse(expression: &str, policy: &DslPolicy) -> Result<ParsedExpression, DslSyntaxError> {
    if expression.trim().is_empty() {
        return Err(DslSyntaxError::EmptyExpression);
    }
    if expression.len() > policy.max_expression_length {
        return Err(DslSyntaxError::ExpressionTooLong {
            length: expression.len(),
            limit: policy.max_expression_length,
        });
    }

    let positioned = tokenizer::tokenize(expression)?;
    if positioned.len() > policy.max_tokens {
        return Err(DslSyntaxError::TooManyTokens {
            count: positioned.len(),
            limit: policy.max_tokens,
        });
    }
    for (token, position) in &positioned {
        if let Token::Ident(name) = token {
            if !policy.identifier_pattern.is_match(name) {
                return Err(DslSyntaxError::IdentifierRejected {
                    identifier: name.clone(),
                    position: *position,
                });
            }
        }
    }

    let postfix = shunting_yard::to_postfix(&positioned, policy)?;
    let ast = ExprAst::from_postfix(&postfix)?;
    log::trace!("parsed `{}` -> `{}`", expression, render_postfix(&postfix));

    Ok(ParsedExpression {
        tokens: positioned.into_iter().map(|(t, _)| t).collect(),
        postfix,
        ast,
    })
}

/// Expand the single-token shortcuts `AND`, `OR` and `NOT` against the
/// request's filter names: a conjunction, a disjunction, or a negated
/// conjunction of every filter in insertion order.
///
/// Returns `None` when the expression is not a bare shortcut (the words stay
/// ordinary identifiers inside complex expressions) or when there are no
/// filter names to expand against.
pub fn expand_shorthand(expression: &str, filter_names: &[String]) -> Option<String> {
    if filter_names.is_empty() {
        return None;
    }
    match expression.trim() {
        "AND" => Some(filter_names.join(" & ")),
        "OR" => Some(filter_names.join(" | ")),
        "NOT" => {
            if filter_names.len() == 1 {
                Some(format!("!{}", filter_names[0]))
            } else {
                Some(format!("!({})", filter_names.join(" & ")))
            }
        }
        _ => None,
    }
}
