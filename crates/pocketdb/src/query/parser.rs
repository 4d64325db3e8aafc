//! Dotted field path parser using nom
//!
//! Grammar:
//! ```text
//! path    := segment ("." segment)*
//! segment := bare | quoted
//! bare    := [^."]+
//! quoted  := '"' [^"]* '"'
//! ```
//!
//! Quoting lets a segment contain dots: `address."zip.code"`.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::all_consuming,
    multi::separated_list1,
    sequence::delimited,
    IResult,
};

use crate::error::{Error, Result};

fn bare(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != '.' && c != '"')(input)
}

fn quoted(input: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(input)
}

fn segments(input: &str) -> IResult<&str, Vec<&str>> {
    separated_list1(char('.'), alt((quoted, bare)))(input)
}

/// Split a dotted path into its field names
pub fn parse_path(input: &str) -> Result<Vec<String>> {
    if input.is_empty() {
        return Err(Error::usage("field path is empty"));
    }

    let (_, parts) = all_consuming(segments)(input)?;

    if parts.iter().any(|p| p.is_empty()) {
        return Err(Error::usage(format!("field path {:?} has an empty segment", input)));
    }

    Ok(parts.into_iter().map(str::to_string).collect())
}
