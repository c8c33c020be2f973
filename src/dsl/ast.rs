use std::collections::BTreeSet;
use std::fmt;

use crate::dsl::errors::DslSyntaxError;
use crate::dsl::token::Token;

/// Validated infix expression tree, reconstructed from the postfix stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprAst {
    True,
    False,
    Ident(String),
    Not(Box<ExprAst>),
    And(Box<ExprAst>, Box<ExprAst>),
    Or(Box<ExprAst>, Box<ExprAst>),
}

impl ExprAst {
    /// Rebuild the tree from postfix tokens. Operand underflow or a
    /// non-singleton final stack is a malformed stream.
    pub fn from_postfix(tokens: &[Token]) -> Result<ExprAst, DslSyntaxError> {
        let mut stack: Vec<ExprAst> = Vec::new();
        for token in tokens {
            match token {
                Token::Ident(name) => stack.push(ExprAst::Ident(name.clone())),
                Token::True => stack.push(ExprAst::True),
                Token::False => stack.push(ExprAst::False),
                Token::Not => {
                    let operand = stack.pop().ok_or(DslSyntaxError::BadArity {
                        stack_depth: 0,
                    })?;
                    stack.push(ExprAst::Not(Box::new(operand)));
                }
                Token::And | Token::Or => {
                    let b = stack.pop();
                    let a = stack.pop();
                    match (a, b) {
                        (Some(a), Some(b)) => stack.push(if *token == Token::And {
                            ExprAst::And(Box::new(a), Box::new(b))
                        } else {
                            ExprAst::Or(Box::new(a), Box::new(b))
                        }),
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

    /// The set of identifiers referenced by the expression.
    pub fn free_identifiers(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers(&self, out: &mut BTreeSet<String>) {
        match self {
            ExprAst::Ident(name) => {
                out.insert(name.clone());
            }
            ExprAst::Not(inner) => inner.collect_identifiers(out),
            ExprAst::And(a, b) | ExprAst::Or(a, b) => {
                a.collect_identifiers(out);
                b.collect_identifiers(out);
            }
            ExprAst::True | ExprAst::False => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            ExprAst::Or(_, _) => 1,
            ExprAst::And(_, _) => 2,
            _ => 3,
        }
    }

    fn fmt_child(&self, child: &ExprAst, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if child.precedence() < self.precedence() {
            write!(f, "({child})")
        } else {
            write!(f, "{child}")
        }
    }
}

impl fmt::Display for ExprAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprAst::True => f.write_str("\u{22a4}"),
            ExprAst::False => f.write_str("\u{22a5}"),
            ExprAst::Ident(name) => f.write_str(name),
            ExprAst::Not(inner) => {
                f.write_str("!")?;
                if inner.precedence() < 3 {
                    write!(f, "({inner})")
                } else {
                    write!(f, "{inner}")
                }
            }
            ExprAst::And(a, b) => {
                self.fmt_child(a, f)?;
                f.write_str(" & ")?;
                self.fmt_child(b, f)
            }
            ExprAst::Or(a, b) => {
                self.fmt_child(a, f)?;
                f.write_str(" | ")?;
                self.fmt_child(b, f)
            }
        }
    }
}
