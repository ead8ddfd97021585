//! Anchored-prefix extraction for `$regex` predicates.
//!
//! A regex that begins with an anchored literal prefix `p` can be answered
//! with the index range `[p, p++1)`, where `p++1` increments the final byte
//! of `p` (carrying past `0xFF`). When the whole pattern is the anchored
//! literal, the range alone is sufficient and the caller may skip the regex
//! post-filter (`pure_prefix`).

use super::QueryError;

/// Result of prefix extraction.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimpleRegex {
    /// Anchored literal prefix; empty when none could be extracted.
    pub prefix: String,
    /// `true` when the range `[prefix, prefix++1)` captures the regex
    /// exactly and no post-filter is needed.
    pub pure_prefix: bool,
}

/// Extracts the anchored literal prefix of `pattern`, if any.
///
/// Flags: `m` is tolerated only with a `\A` anchor (where multiline cannot
/// move the anchor), `x` enables extended mode (whitespace and `#` comments
/// ignored); any other flag (notably `i`) defeats extraction.
///
/// # Errors
///
/// Returns [`QueryError::BadQuery`] when the pattern does not compile.
pub fn simple_regex(pattern: &str, options: &str) -> Result<SimpleRegex, QueryError> {
    regex::Regex::new(pattern)
        .map_err(|e| QueryError::BadQuery(format!("invalid regex: {e}")))?;

    let bytes = pattern.as_bytes();
    let (rest, multiline_ok) = if bytes.starts_with(b"\\A") {
        (&pattern[2..], true)
    } else if bytes.starts_with(b"^") {
        (&pattern[1..], false)
    } else {
        return Ok(SimpleRegex::default());
    };

    let mut extended = false;
    for flag in options.chars() {
        match flag {
            'm' if multiline_ok => {}
            'm' => return Ok(SimpleRegex::default()),
            'x' => extended = true,
            _ => return Ok(SimpleRegex::default()),
        }
    }

    let mut prefix = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            // Alternation invalidates any prefix: "^abc|^xyz" matches
            // strings outside ["abc", "abd").
            '|' => return Ok(SimpleRegex::default()),
            // These make the preceding char optional.
            '*' | '?' => {
                prefix.pop();
                return Ok(SimpleRegex {
                    prefix,
                    pure_prefix: false,
                });
            }
            '\\' => match chars.next() {
                // A class escape (\d, \w, \S, ...) ends the literal run.
                Some(e) if e.is_ascii_alphanumeric() => {
                    return Ok(SimpleRegex {
                        prefix,
                        pure_prefix: false,
                    })
                }
                // Escaped metacharacter: the char itself.
                Some(e) => prefix.push(e),
                None => {
                    return Ok(SimpleRegex {
                        prefix,
                        pure_prefix: false,
                    })
                }
            },
            '^' | '$' | '.' | '[' | '(' | ')' | '+' | '{' => {
                return Ok(SimpleRegex {
                    prefix,
                    pure_prefix: false,
                })
            }
            '#' if extended => {
                return Ok(SimpleRegex {
                    prefix,
                    pure_prefix: false,
                })
            }
            c if extended && c.is_whitespace() => {}
            c => prefix.push(c),
        }
    }

    // Consumed the whole pattern as a literal: the range captures it fully.
    let pure_prefix = !prefix.is_empty();
    Ok(SimpleRegex {
        prefix,
        pure_prefix,
    })
}

/// The exclusive upper bound of the range matching `prefix`: the prefix with
/// its final byte incremented, carrying past `0xFF` by dropping trailing
/// `0xFF` bytes. Returns `None` when no finite bound exists (all bytes are
/// `0xFF`, or the increment does not land on a UTF-8 boundary).
#[must_use]
pub fn simple_regex_end(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while bytes.last() == Some(&0xFF) {
        bytes.pop();
    }
    let last = bytes.last_mut()?;
    *last += 1;
    String::from_utf8(bytes).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
