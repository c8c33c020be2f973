use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, value},
    IResult, Parser,
};

use crate::dsl::errors::DslSyntaxError;
use crate::dsl::token::Token;

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn token_at(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::And, char('&')),
        value(Token::Or, char('|')),
        value(Token::Not, char('!')),
        value(Token::LParen, char('(')),
        value(Token::RParen, char(')')),
        map(take_while1(is_word_char), |word: &str| {
            Token::Ident(word.to_string())
        }),
    ))
    .parse(input)
}

/// Lex an expression into tokens with their byte offsets. Whitespace is
/// insignificant. Any character outside the token alphabet fails with its
/// position.
pub fn tokenize(expression: &str) -> Result<Vec<(Token, usize)>, DslSyntaxError> {
    let mut tokens = Vec::new();
    let mut rest = expression;
    loop {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            break;
        }
        let position = expression.len() - trimmed.len();
        match token_at(trimmed) {
            Ok((next, token)) => {
                tokens.push((token, position));
                rest = next;
            }
            Err(_) => {
                let found = trimmed.chars().next().map(String::from).unwrap_or_default();
                return Err(DslSyntaxError::UnknownOperator { found, position });
            }
        }
    }
    Ok(tokens)
}
