use std::fmt;

/// Lexical token of the filter DSL.
///
/// `True` and `False` never come out of the tokenizer; the simplifier
/// introduces them and the condition builder consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Token {
    Ident(String),
    And,
    Or,
    Not,
    LParen,
    RParen,
    True,
    False,
}

impl Token {
    pub fn is_operand(&self) -> bool {
        matches!(self, Token::Ident(_) | Token::True | Token::False)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(name) => f.write_str(name),
            Token::And => f.write_str("&"),
            Token::Or => f.write_str("|"),
            Token::Not => f.write_str("!"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::True => f.write_str("\u{22a4}"),
            Token::False => f.write_str("\u{22a5}"),
        }
    }
}

/// Render a postfix token stream as the canonical space-joined string.
pub fn render_postfix(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
