use std::collections::HashMap;

use crate::dsl::errors::DslSyntaxError;
use crate::dsl::{render_postfix, Token};

/// Boolean expression in n-ary form. `And`/`Or` hold two or more operands
/// once flattening has run; construction from postfix produces binary nodes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum BoolExpr {
    True,
    False,
    Ident(String),
    Not(Box<BoolExpr>),
    And(Vec<BoolExpr>),
    Or(Vec<BoolExpr>),
}

impl BoolExpr {
    pub fn from_postfix(tokens: &[Token]) -> Result<BoolExpr, DslSyntaxError> {
        let mut stack: Vec<BoolExpr> = Vec::new();
        for token in tokens {
            match token {
                Token::Ident(name) => stack.push(BoolExpr::Ident(name.clone())),
                Token::True => stack.push(BoolExpr::True),
                Token::False => stack.push(BoolExpr::False),
                Token::Not => {
                    let operand = stack.pop().ok_or(DslSyntaxError::BadArity { stack_depth: 0 })?;
                    stack.push(BoolExpr::Not(Box::new(operand)));
                }
                Token::And | Token::Or => {
                    let b = stack.pop();
                    let a = stack.pop();
                    match (a, b) {
                        (Some(a), Some(b)) => {
                            let operands = vec![a, b];
                            stack.push(if *token == Token::And {
                                BoolExpr::And(operands)
                            } else {
                                BoolExpr::Or(operands)
                            });
                        }
                        (_, b) => {
                            return Err(DslSyntaxError::BadArity {
                                stack_depth: usize::from(b.is_some()),
                            })
                        }
                    }
                }
                Token::LParen | Token::RParen => {
                    return Err(DslSyntaxError::UnexpectedToken {
                        token: token.to_string(),
                        position: 0,
                    })
                }
            }
        }
        if stack.len() != 1 {
            return Err(DslSyntaxError::BadArity {
                stack_depth: stack.len(),
            });
        }
        Ok(stack.remove(0))
    }

    /// Emit postfix tokens; n-ary nodes fold left, so `And[a, b, c]` becomes
    /// `a b & c &`.
    pub fn to_postfix(&self) -> Vec<Token> {
        let mut out = Vec::new();
        self.emit(&mut out);
        out
    }

    fn emit(&self, out: &mut Vec<Token>) {
        match self {
            BoolExpr::True => out.push(Token::True),
            BoolExpr::False => out.push(Token::False),
            BoolExpr::Ident(name) => out.push(Token::Ident(name.clone())),
            BoolExpr::Not(inner) => {
                inner.emit(out);
                out.push(Token::Not);
            }
            BoolExpr::And(ops) | BoolExpr::Or(ops) => {
                let op_token = if matches!(self, BoolExpr::And(_)) {
                    Token::And
                } else {
                    Token::Or
                };
                for (i, operand) in ops.iter().enumerate() {
                    operand.emit(out);
                    if i > 0 {
                        out.push(op_token.clone());
                    }
                }
            }
        }
    }

    /// Canonical string form: the space-joined postfix.
    pub fn canonical(&self) -> String {
        render_postfix(&self.to_postfix())
    }

    /// Evaluate under a truth assignment. Unassigned identifiers read false.
    pub fn eval(&self, assignment: &HashMap<String, bool>) -> bool {
        match self {
            BoolExpr::True => true,
            BoolExpr::False => false,
            BoolExpr::Ident(name) => assignment.get(name).copied().unwrap_or(false),
            BoolExpr::Not(inner) => !inner.eval(assignment),
            BoolExpr::And(ops) => ops.iter().all(|op| op.eval(assignment)),
            BoolExpr::Or(ops) => ops.iter().any(|op| op.eval(assignment)),
        }
    }
}
