//! Postfix condition building: a single-pass stack evaluation of the token
//! stream against a filter context. The builder composes predicates; it
//! never executes them.

use std::sync::Arc;

use crate::condition::context::FilterContext;
use crate::condition::{Condition, QueryBackend};
use crate::dsl::errors::DslSyntaxError;
use crate::dsl::Token;
use crate::errors::Error;
use crate::model::{Operator, PropertyRef};

/// Build a condition tree from postfix tokens. `definitions` maps each
/// identifier in the stream to its `(property, operator)` pair; constants
/// from the simplifier become the constant conditions.
pub fn build_condition<B: QueryBackend>(
    postfix: &[Token],
    definitions: &[(String, (Arc<dyn PropertyRef>, Operator))],
    context: &dyn FilterContext<B>,
) -> Result<Condition<B>, Error> {
    let mut stack: Vec<Condition<B>> = Vec::new();

    for token in postfix {
        match token {
            Token::Ident(name) => {
                let (property, operator) = definitions
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, pair)| pair)
                    .ok_or_else(|| DslSyntaxError::UndefinedFilter {
                        name: name.clone(),
                        available: definitions.iter().map(|(n, _)| n.clone()).collect(),
                    })?;
                stack.push(context.to_condition(name, property, operator)?);
            }
            Token::True => stack.push(Condition::AlwaysTrue),
            Token::False => stack.push(Condition::AlwaysFalse),
            Token::Not => {
                let operand = stack
                    .pop()
                    .ok_or(DslSyntaxError::BadArity { stack_depth: 0 })?;
                stack.push(operand.negate());
            }
            Token::And | Token::Or => {
                let b = stack.pop();
                let a = stack.pop();
                match (a, b) {
                    (Some(a), Some(b)) => stack.push(if *token == Token::And {
                        a.and(b)
                    } else {
                        a.or(b)
                    }),
                    (_, b) => {
                        return Err(DslSyntaxError::BadArity {
                            stack_depth: usize::from(b.is_some()),
                        }
                        .into())
                    }
                }
            }
            Token::LParen | Token::RParen => {
                return Err(DslSyntaxError::UnexpectedToken {
                    token: token.to_string(),
                    position: 0,
                }
                .into())
            }
        }
    }

    if stack.len() != 1 {
        return Err(DslSyntaxError::BadArity {
            stack_depth: stack.len(),
        }
        .into());
    }
    Ok(stack.remove(0))
}
