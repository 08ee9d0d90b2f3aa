use crate::Direction;
use chrono::{DateTime, Utc};
use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{digit1, space1},
    combinator::map_res,
    sequence::delimited,
};

/// Metadata carried by the log prefix of a new logical entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LinePrefix {
    pub timestamp: DateTime<Utc>,
    pub host: String,
    pub session_id: u64,
    pub direction: Direction,
}

/// Classification of one physical line.
///
/// A line is a new entry iff it matches
/// `<ISO8601> <level>: [<host>] Session <n>: <Sending|Received> message:<remainder>`.
/// Anything else (including a line whose timestamp token fails to parse)
/// is a continuation of whatever entry is currently open.
#[derive(Debug, Clone, PartialEq)]
pub enum LineKind<'a> {
    NewEntry {
        prefix: LinePrefix,
        remainder: &'a str,
    },
    Continuation(&'a str),
}

pub fn classify(line: &str) -> LineKind<'_> {
    match parse_prefix(line) {
        Ok((remainder, prefix)) => LineKind::NewEntry { prefix, remainder },
        Err(_) => LineKind::Continuation(line),
    }
}

fn parse_timestamp(input: &str) -> IResult<&str, DateTime<Utc>> {
    let (rest, ts) = take_while1(|c: char| !c.is_whitespace())(input)?;
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => Ok((rest, dt.with_timezone(&Utc))),
        Err(_) => Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Verify,
        ))),
    }
}

fn parse_prefix(input: &str) -> IResult<&str, LinePrefix> {
    let (input, timestamp) = parse_timestamp(input)?;
    let (input, _) = space1(input)?;
    // Log level token ("Dbg" in captured logs); value is not retained.
    let (input, _level) = take_while1(|c: char| c.is_alphanumeric())(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, _) = space1(input)?;
    let (input, host) = delimited(tag("["), take_until("]"), tag("]"))(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("Session")(input)?;
    let (input, _) = space1(input)?;
    let (input, session_id) = map_res(digit1, |s: &str| s.parse::<u64>())(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, _) = space1(input)?;
    let (input, keyword) = alt((tag("Sending"), tag("Received")))(input)?;
    let (input, _) = space1(input)?;
    let (input, _) = tag("message:")(input)?;

    let direction = if keyword == "Sending" {
        Direction::DuToRu
    } else {
        Direction::RuToDu
    };

    Ok((
        input,
        LinePrefix {
            timestamp,
            host: host.to_string(),
            session_id,
            direction,
        },
    ))
}
