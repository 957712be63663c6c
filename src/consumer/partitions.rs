//! Partition selection expressions.
//!
//! A viewer session can be pinned to an explicit set of partitions using a
//! compact, human-written expression such as `0-3,5,7-9`.
//!
//! # Grammar
//!
//! - Tokens are separated by `,`
//! - A token is either a single partition (`5`) or an inclusive range (`0-3`)
//! - Spaces are ignored everywhere
//! - A reversed range (`5-2`) yields no partitions
//! - A range with no upper bound (`5-`) yields no partitions
//!
//! # Examples
//!
//! ```
//! use kafka_viewer::consumer::partitions::parse_partitions;
//!
//! let partitions = parse_partitions("0-3, 5").unwrap().unwrap();
//! assert_eq!(partitions.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 5]);
//!
//! // Blank input means "no selection", i.e. all partitions.
//! assert!(parse_partitions("   ").unwrap().is_none());
//! ```

use std::collections::BTreeSet;
use thiserror::Error;

/// Rendering of an empty selection. A reversed range parses back to an empty
/// set, whereas a blank expression would mean all partitions.
pub const EMPTY_SELECTION: &str = "1-0";

/// Errors produced while parsing a partition expression.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionParseError {
    /// A character outside `[0-9,- ]` was found.
    #[error("Unexpected character '{character}' at position {position} in partitions expression")]
    UnexpectedCharacter {
        /// The offending character
        character: char,
        /// Byte offset of the character in the trimmed expression
        position: usize,
    },

    /// A partition number does not fit in a partition id.
    #[error("Partition number out of range: {0}")]
    OutOfRange(String),
}

/// Parse a partition expression into a sorted, de-duplicated set.
///
/// # Arguments
///
/// * `expression` - The partition expression, e.g. `"0-3,5,7-9"`
///
/// # Returns
///
/// Returns `Ok(None)` for empty or all-whitespace input so that callers can
/// tell "all partitions" apart from "zero partitions". Otherwise returns the
/// selected partitions in ascending order (possibly empty, e.g. for `"5-2"`).
///
/// # Errors
///
/// Returns `PartitionParseError::UnexpectedCharacter` for any character
/// outside `[0-9,- ]`, and `PartitionParseError::OutOfRange` when a number
/// overflows a partition id.
pub fn parse_partitions(expression: &str) -> Result<Option<BTreeSet<i32>>, PartitionParseError> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Ok(None);
    }

    let mut result = BTreeSet::new();
    let mut from = String::new();
    // `None` until a '-' is seen in the current token
    let mut to: Option<String> = None;

    for (position, c) in expression.char_indices() {
        match c {
            ' ' => continue,
            ',' => {
                add_token(&mut result, &from, to.as_deref())?;
                from.clear();
                to = None;
            }
            '-' => to = Some(String::new()),
            '0'..='9' => match to.as_mut() {
                Some(upper) => upper.push(c),
                None => from.push(c),
            },
            _ => {
                return Err(PartitionParseError::UnexpectedCharacter {
                    character: c,
                    position,
                })
            }
        }
    }
    add_token(&mut result, &from, to.as_deref())?;

    Ok(Some(result))
}

fn add_token(
    result: &mut BTreeSet<i32>,
    from: &str,
    to: Option<&str>,
) -> Result<(), PartitionParseError> {
    if from.is_empty() {
        return Ok(());
    }
    let lower = parse_number(from)?;
    let upper = match to {
        None => lower,
        // Incomplete range such as "5-": nothing is added
        Some("") => return Ok(()),
        Some(upper) => parse_number(upper)?,
    };
    if lower <= upper {
        result.extend(lower..=upper);
    }
    Ok(())
}

fn parse_number(digits: &str) -> Result<i32, PartitionParseError> {
    digits
        .parse::<i32>()
        .map_err(|_| PartitionParseError::OutOfRange(digits.to_string()))
}

/// Render a partition set as a compact expression.
///
/// Consecutive partitions collapse into ranges, so `{0,1,2,3,5,7,8,9}`
/// renders as `"0-3,5,7-9"`. Parsing the rendered expression yields the
/// same set again; an empty set renders as [`EMPTY_SELECTION`].
pub fn render_partitions(partitions: &BTreeSet<i32>) -> String {
    if partitions.is_empty() {
        return EMPTY_SELECTION.to_string();
    }

    let mut ranges: Vec<(i32, i32)> = Vec::new();
    for &partition in partitions {
        match ranges.last_mut() {
            Some((_, end)) if end.checked_add(1) == Some(partition) => *end = partition,
            _ => ranges.push((partition, partition)),
        }
    }

    ranges
        .iter()
        .map(|(start, end)| {
            if start == end {
                start.to_string()
            } else {
                format!("{}-{}", start, end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
