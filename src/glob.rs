//! Shell-style pattern matching for remote paths.
//!
//! [`matches`] checks one pattern against one name, where `/` is only ever
//! matched literally. Metacharacters are `*` (any run of non-separator
//! characters), `?` (one non-separator character) and `[...]` / `[^...]`
//! character classes with ranges and backslash escapes. The session-level
//! [`glob`](crate::FtpClient::glob) additionally expands `**` across path
//! segments.

use crate::error::{FtpError, FtpResult};

/// Reports whether `name` matches the shell pattern. Malformed patterns
/// produce [`FtpError::BadPattern`].
pub fn matches(pattern: &str, name: &str) -> FtpResult<bool> {
    let mut pattern = pattern;
    let mut name = name;

    'pattern: while !pattern.is_empty() {
        let (star, chunk, rest) = scan_chunk(pattern);
        pattern = rest;

        if star && chunk.is_empty() {
            // Trailing * matches the rest of the name unless it crosses a
            // path separator.
            return Ok(!name.contains('/'));
        }

        // Look for a match at the current position.
        match match_chunk(chunk, name)? {
            Some(t) if t.is_empty() || !pattern.is_empty() => {
                name = t;
                continue 'pattern;
            }
            _ => {}
        }

        if star {
            // Look for a match skipping one more character each round.
            let mut skipped = name.char_indices();
            for (i, c) in &mut skipped {
                if c == '/' {
                    break;
                }
                let from = i + c.len_utf8();
                if let Some(t) = match_chunk(chunk, &name[from..])? {
                    if pattern.is_empty() && !t.is_empty() {
                        continue;
                    }
                    name = t;
                    continue 'pattern;
                }
            }
        }

        return Ok(false);
    }

    Ok(name.is_empty())
}

/// Splits the pattern into a leading star, the chunk up to the next
/// unbracketed star, and the remainder.
fn scan_chunk(mut pattern: &str) -> (bool, &str, &str) {
    let mut star = false;
    while let Some(rest) = pattern.strip_prefix('*') {
        pattern = rest;
        star = true;
    }

    let bytes = pattern.as_bytes();
    let mut in_range = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                // Malformed trailing escapes are diagnosed in match_chunk.
                if i + 1 < bytes.len() {
                    i += 1;
                }
            }
            b'[' => in_range = true,
            b']' => in_range = false,
            b'*' if !in_range => break,
            _ => {}
        }
        i += 1;
    }

    (star, &pattern[..i], &pattern[i..])
}

/// Matches the chunk against the start of `s`. Returns the unmatched tail
/// on success, `None` on a mismatch, and an error for malformed patterns.
fn match_chunk<'a>(mut chunk: &str, mut s: &'a str) -> FtpResult<Option<&'a str>> {
    while !chunk.is_empty() {
        let mut s_chars = s.chars();
        let Some(r) = s_chars.next() else {
            return Ok(None);
        };

        let c = chunk.as_bytes()[0];
        match c {
            b'[' => {
                s = s_chars.as_str();
                chunk = &chunk[1..];

                let negated = if let Some(rest) = chunk.strip_prefix('^') {
                    chunk = rest;
                    true
                } else {
                    false
                };

                let mut matched = false;
                let mut nrange = 0;
                loop {
                    if chunk.starts_with(']') && nrange > 0 {
                        chunk = &chunk[1..];
                        break;
                    }
                    let lo;
                    (lo, chunk) = get_escaped(chunk)?;
                    let mut hi = lo;
                    if chunk.starts_with('-') {
                        (hi, chunk) = get_escaped(&chunk[1..])?;
                    }
                    if lo <= r && r <= hi {
                        matched = true;
                    }
                    nrange += 1;
                }
                if matched == negated {
                    return Ok(None);
                }
            }
            b'?' => {
                if r == '/' {
                    return Ok(None);
                }
                s = s_chars.as_str();
                chunk = &chunk[1..];
            }
            b'\\' => {
                chunk = &chunk[1..];
                let Some(esc) = chunk.chars().next() else {
                    return Err(FtpError::BadPattern);
                };
                if esc != r {
                    return Ok(None);
                }
                s = s_chars.as_str();
                chunk = &chunk[esc.len_utf8()..];
            }
            _ => {
                let expected = chunk.chars().next().unwrap();
                if expected != r {
                    return Ok(None);
                }
                s = s_chars.as_str();
                chunk = &chunk[expected.len_utf8()..];
            }
        }
    }
    Ok(Some(s))
}

/// Reads one possibly escaped character of a class. `-` and `]` are not
/// valid endpoints, and a class may not end after one.
fn get_escaped(chunk: &str) -> FtpResult<(char, &str)> {
    let mut chars = chunk.chars();
    let mut c = match chars.next() {
        None | Some('-') | Some(']') => return Err(FtpError::BadPattern),
        Some(c) => c,
    };
    if c == '\\' {
        c = match chars.next() {
            None => return Err(FtpError::BadPattern),
            Some(c) => c,
        };
    }
    let rest = chars.as_str();
    if rest.is_empty() {
        return Err(FtpError::BadPattern);
    }
    Ok((c, rest))
}

/// Checks a pattern for well-formedness without matching anything:
/// bracket classes must be closed and ranges valid, escapes complete.
pub(crate) fn validate(pattern: &str) -> FtpResult<()> {
    for segment in pattern.split('/') {
        if segment == "**" {
            continue;
        }
        let mut rest = segment;
        loop {
            let (_, chunk, tail) = scan_chunk(rest);
            validate_chunk(chunk)?;
            if tail.is_empty() {
                break;
            }
            rest = tail;
        }
    }
    Ok(())
}

fn validate_chunk(mut chunk: &str) -> FtpResult<()> {
    while !chunk.is_empty() {
        let c = chunk.as_bytes()[0];
        match c {
            b'[' => {
                chunk = &chunk[1..];
                if let Some(rest) = chunk.strip_prefix('^') {
                    chunk = rest;
                }
                let mut nrange = 0;
                loop {
                    if chunk.starts_with(']') && nrange > 0 {
                        chunk = &chunk[1..];
                        break;
                    }
                    let (_, rest) = get_escaped(chunk)?;
                    chunk = rest;
                    if chunk.starts_with('-') {
                        let (_, rest) = get_escaped(&chunk[1..])?;
                        chunk = rest;
                    }
                    nrange += 1;
                }
            }
            b'\\' => {
                let mut chars = chunk[1..].chars();
                match chars.next() {
                    None => return Err(FtpError::BadPattern),
                    Some(_) => chunk = chars.as_str(),
                }
            }
            b'?' => chunk = &chunk[1..],
            _ => {
                let ch = chunk.chars().next().unwrap();
                chunk = &chunk[ch.len_utf8()..];
            }
        }
    }
    Ok(())
}

/// Matches a full slash-separated path against a pattern whose segments may
/// include `**`, which spans any number of path segments (including none).
pub(crate) fn path_matches(pattern: &str, path: &str) -> FtpResult<bool> {
    let pat: Vec<&str> = pattern.split('/').collect();
    let segs: Vec<&str> = path.split('/').collect();
    segments_match(&pat, &segs)
}

fn segments_match(pat: &[&str], segs: &[&str]) -> FtpResult<bool> {
    match pat.split_first() {
        None => Ok(segs.is_empty()),
        Some((&"**", rest)) => {
            for skip in 0..=segs.len() {
                if segments_match(rest, &segs[skip..])? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Some((first, rest)) => match segs.split_first() {
            None => Ok(false),
            Some((seg, seg_rest)) => {
                if matches(first, seg)? {
                    segments_match(rest, seg_rest)
                } else {
                    Ok(false)
                }
            }
        },
    }
}
