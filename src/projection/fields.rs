//! Projection path expansion.
//!
//! Requested DTO paths support dot nesting, compact sibling enumeration and
//! bracketed collection options:
//!
//! ```text
//! name
//! address.(city, street)
//! orders[limit=10,offset=0,sort=date:desc].(productName, quantity)
//! ```
//!
//! Expansion turns every spec into plain dot paths and collects the
//! collection options under the collection's dot path.

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt},
    error::ParseError,
    multi::separated_list1,
    sequence::{delimited, preceded},
    IResult, Parser,
};

use crate::model::{SortDirection, SortSpec};
use crate::projection::errors::ProjectionDefinitionError;

fn ws<'a, O, E: ParseError<&'a str>, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = E>
where
    F: Parser<&'a str, Output = O, Error = E>,
{
    delimited(multispace0, inner, multispace0)
}

/// Pagination and ordering of one collection, straight from the brackets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionOptions {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub sort: Vec<SortSpec>,
}

/// Expansion result: flat dot paths in request order plus per-collection
/// options.
#[derive(Debug, Clone, Default)]
pub struct ExpandedPaths {
    pub paths: Vec<String>,
    pub options: HashMap<String, CollectionOptions>,
}

#[derive(Debug)]
struct Segment<'a> {
    name: &'a str,
    options: Option<CollectionOptions>,
}

fn identifier(input: &str) -> IResult<&str, &str> {
    nom::bytes::complete::take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')
        .parse(input)
}

fn integer(input: &str) -> IResult<&str, u64> {
    map_res(digit1, str::parse).parse(input)
}

fn sort_key(input: &str) -> IResult<&str, SortSpec> {
    let (input, field) = identifier(input)?;
    let (input, direction) = opt(preceded(
        char(':'),
        alt((
            map(tag("asc"), |_| SortDirection::Asc),
            map(tag("desc"), |_| SortDirection::Desc),
        )),
    ))
    .parse(input)?;
    Ok((
        input,
        SortSpec {
            field: field.to_string(),
            direction: direction.unwrap_or(SortDirection::Asc),
        },
    ))
}

enum RawOption {
    Limit(u64),
    Offset(u64),
    Sort(SortSpec),
}

fn option(input: &str) -> IResult<&str, RawOption> {
    alt((
        map(preceded(tag("limit="), integer), RawOption::Limit),
        map(preceded(tag("offset="), integer), RawOption::Offset),
        map(preceded(tag("sort="), sort_key), RawOption::Sort),
    ))
    .parse(input)
}

fn options_block(input: &str) -> IResult<&str, CollectionOptions> {
    let (input, raw) = delimited(
        char('['),
        separated_list1(ws(char(',')), option),
        char(']'),
    )
    .parse(input)?;
    let mut options = CollectionOptions::default();
    for entry in raw {
        match entry {
            RawOption::Limit(limit) => options.limit = Some(limit),
            RawOption::Offset(offset) => options.offset = Some(offset),
            RawOption::Sort(sort) => options.sort.push(sort),
        }
    }
    Ok((input, options))
}

fn segment(input: &str) -> IResult<&str, Segment<'_>> {
    let (input, name) = identifier(input)?;
    let (input, options) = opt(options_block).parse(input)?;
    Ok((input, Segment { name, options }))
}

/// `(a, b.c, d)` — plain dot paths, no brackets inside groups.
fn group(input: &str) -> IResult<&str, Vec<Vec<&str>>> {
    delimited(
        char('('),
        separated_list1(
            ws(char(',')),
            separated_list1(char('.'), ws(identifier)),
        ),
        char(')'),
    )
    .parse(input)
}

fn malformed(path: &str, reason: impl Into<String>) -> ProjectionDefinitionError {
    ProjectionDefinitionError::MalformedPath {
        path: path.to_string(),
        reason: reason.into(),
    }
}

fn expand_one(spec: &str, out: &mut ExpandedPaths) -> Result<(), ProjectionDefinitionError> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(malformed(spec, "empty path"));
    }

    let mut prefix: Vec<String> = Vec::new();
    let mut rest = trimmed;
    loop {
        if rest.starts_with('(') {
            // Compact sibling enumeration; must close out the spec.
            let (after, items) =
                group(rest).map_err(|_| malformed(spec, "unclosed or empty group"))?;
            if !after.trim().is_empty() {
                return Err(malformed(spec, "a group must end the path"));
            }
            if prefix.is_empty() {
                return Err(malformed(spec, "a group needs a parent path"));
            }
            for item in items {
                let mut path = prefix.clone();
                path.extend(item.iter().map(|s| s.to_string()));
                out.paths.push(path.join("."));
            }
            return Ok(());
        }

        let (after, parsed) = segment(rest).map_err(|_| malformed(spec, "expected a field name"))?;
        prefix.push(parsed.name.to_string());
        if let Some(options) = parsed.options {
            out.options.insert(prefix.join("."), options);
        }

        if after.is_empty() {
            out.paths.push(prefix.join("."));
            return Ok(());
        }
        rest = after
            .strip_prefix('.')
            .ok_or_else(|| malformed(spec, format!("unexpected `{after}`")))?;
    }
}

/// Expand every requested path spec, preserving request order.
pub fn expand(specs: &[String]) -> Result<ExpandedPaths, ProjectionDefinitionError> {
    let mut out = ExpandedPaths::default();
    for spec in specs {
        expand_one(spec, &mut out)?;
    }
    Ok(out)
}
