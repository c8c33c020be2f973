//! Infix to postfix conversion.
//!
//! Classic shunting-yard over the lexed token stream, with grammar
//! validation folded into the same pass via an expect-operand state machine.
//! Precedence: `!` > `&` > `|`; `&` and `|` are left-associative, `!` is a
//! right-associative prefix.

use crate::config::DslPolicy;
use crate::dsl::errors::DslSyntaxError;
use crate::dsl::token::Token;

fn precedence(token: &Token) -> u8 {
    match token {
        Token::Not => 3,
        Token::And => 2,
        Token::Or => 1,
        _ => 0,
    }
}

/// Convert lexed tokens to postfix, enforcing grammar and the policy's
/// nesting-depth limit.
pub fn to_postfix(
    tokens: &[(Token, usize)],
    policy: &DslPolicy,
) -> Result<Vec<Token>, DslSyntaxError> {
    if tokens.is_empty() {
        return Err(DslSyntaxError::EmptyExpression);
    }

    let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<(Token, usize)> = Vec::new();
    let mut expect_operand = true;
    let mut depth: usize = 0;

    for (token, position) in tokens {
        match token {
            Token::Ident(_) | Token::True | Token::False => {
                if !expect_operand {
                    return Err(unexpected(token, *position));
                }
                output.push(token.clone());
                expect_operand = false;
            }
            Token::Not => {
                if !expect_operand {
                    return Err(unexpected(token, *position));
                }
                stack.push((Token::Not, *position));
            }
            Token::And | Token::Or => {
                if expect_operand {
                    return Err(unexpected(token, *position));
                }
                while let Some((top, _)) = stack.last() {
                    if precedence(top) >= precedence(token) && *top != Token::LParen {
                        output.push(stack.pop().map(|(t, _)| t).ok_or(
                            DslSyntaxError::BadArity {
                                stack_depth: output.len(),
                            },
                        )?);
                    } else {
                        break;
                    }
                }
                stack.push((token.clone(), *position));
                expect_operand = true;
            }
            Token::LParen => {
                if !expect_operand {
                    return Err(unexpected(token, *position));
                }
                depth += 1;
                if depth > policy.max_depth {
                    return Err(DslSyntaxError::TooDeep {
                        depth,
                        limit: policy.max_depth,
                    });
                }
                stack.push((Token::LParen, *position));
            }
            Token::RParen => {
                if expect_operand {
                    return Err(unexpected(token, *position));
                }
                loop {
                    match stack.pop() {
                        Some((Token::LParen, _)) => break,
                        Some((op, _)) => output.push(op),
                        None => {
                            return Err(DslSyntaxError::UnbalancedParenthesis {
                                position: *position,
                            })
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
        }
    }

    if expect_operand {
        // The expression ended while an operand was still required, e.g.
        // a trailing `&` or a bare `!`.
        let (token, position) = &tokens[tokens.len() - 1];
        return Err(unexpected(token, *position));
    }

    while let Some((op, position)) = stack.pop() {
        if op == Token::LParen {
            return Err(DslSyntaxError::UnbalancedParenthesis { position });
        }
        output.push(op);
    }

    Ok(output)
}

fn unexpected(token: &Token, position: usize) -> DslSyntaxError {
    DslSyntaxError::UnexpectedToken {
        token: token.to_string(),
        position,
    }
}
