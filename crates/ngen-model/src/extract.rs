//! Lexical extractor for multi-line declaration blocks

use crate::error::{ModelError, Result};

/// What the caller expects each statement to look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclMode {
    /// `name = value [: flags]` lines
    Parameters,
    /// `lhs = rhs [: flags]` lines where lhs may be `d<name>/dt`
    Equations,
}

/// One flag token after the trailing colon: a bare name or `name=value`
#[derive(Debug, Clone, PartialEq)]
pub struct FlagToken {
    /// Flag name
    pub name: String,
    /// Optional value; parenthesized expressions are kept verbatim
    pub value: Option<String>,
}

/// One extracted statement
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Left-hand side, trimmed
    pub lhs: String,
    /// Assignment operator: `=`, `+=`, `-=`, `*=` or `/=`
    pub op: String,
    /// Right-hand side, trimmed
    pub rhs: String,
    /// Flags after the trailing colon
    pub flags: Vec<FlagToken>,
}

/// Split a declaration block into one record per statement.
///
/// Statements are separated by newlines or semicolons. Blank lines and lines
/// starting with `#` are discarded. A trailing `:` introduces a
/// comma-separated flag list; colons inside parentheses do not count.
pub fn extract_declarations(text: &str, mode: DeclMode) -> Result<Vec<Declaration>> {
    let mut out = Vec::new();
    for raw in text.split(['\n', ';']) {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        out.push(extract_statement(line, mode)?);
    }
    Ok(out)
}

fn extract_statement(line: &str, mode: DeclMode) -> Result<Declaration> {
    if !delimiters_balanced(line) {
        return Err(ModelError::malformed(line, "unbalanced delimiters"));
    }

    // Separate the flag list on the first top-level colon.
    let (body, flags_text) = match find_top_level(line, ':') {
        Some(pos) => (&line[..pos], Some(&line[pos + 1..])),
        None => (line, None),
    };

    let eq_pos = find_top_level(body, '=').ok_or_else(|| {
        let what = match mode {
            DeclMode::Parameters => "parameter",
            DeclMode::Equations => "equation",
        };
        ModelError::malformed(line, format!("a {} statement requires '='", what))
    })?;
    // Reject '==' straddling the split point
    if body[eq_pos + 1..].starts_with('=') {
        return Err(ModelError::malformed(line, "expected assignment, found comparison"));
    }

    // Compound assignments (`u += d`) are legal in reset-style blocks
    let bytes = body.as_bytes();
    let (lhs_end, op) = match bytes.get(eq_pos.wrapping_sub(1)) {
        Some(&c @ (b'+' | b'-' | b'*' | b'/')) if eq_pos > 0 => {
            (eq_pos - 1, format!("{}=", c as char))
        }
        _ => (eq_pos, "=".to_string()),
    };

    let lhs = body[..lhs_end].trim().to_string();
    let rhs = body[eq_pos + 1..].trim().to_string();
    if lhs.is_empty() {
        return Err(ModelError::malformed(line, "empty left-hand side"));
    }
    if rhs.is_empty() {
        return Err(ModelError::malformed(line, "empty right-hand side"));
    }

    let mut flags = Vec::new();
    if let Some(ftext) = flags_text {
        for token in split_top_level(ftext, ',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            flags.push(parse_flag_token(line, token)?);
        }
    }

    Ok(Declaration { lhs, op, rhs, flags })
}

fn parse_flag_token(line: &str, token: &str) -> Result<FlagToken> {
    match find_top_level(token, '=') {
        Some(pos) => {
            let name = token[..pos].trim().to_string();
            let value = token[pos + 1..].trim().to_string();
            if name.is_empty() || value.is_empty() {
                return Err(ModelError::malformed(line, format!("bad flag token '{}'", token)));
            }
            Ok(FlagToken { name, value: Some(value) })
        }
        None => {
            if !token.chars().all(|c| c.is_alphanumeric() || c == '_') {
                return Err(ModelError::malformed(line, format!("bad flag token '{}'", token)));
            }
            Ok(FlagToken { name: token.to_string(), value: None })
        }
    }
}

/// Position of the first occurrence of `needle` outside parentheses, skipping
/// comparison operators when searching for '='.
fn find_top_level(s: &str, needle: char) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && c == needle => {
                if needle == '=' {
                    // skip <=, >=, ==, !=
                    let prev = if i > 0 { bytes[i - 1] } else { 0 };
                    let next = bytes.get(i + 1).copied().unwrap_or(0);
                    if matches!(prev, b'<' | b'>' | b'=' | b'!') || next == b'=' {
                        continue;
                    }
                }
                return Some(i);
            }
            _ => {}
        }
    }
    None
}

/// Split on a delimiter at parenthesis depth zero
pub fn split_top_level(s: &str, delim: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 && c == delim => {
                parts.push(s[start..i].to_string());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].to_string());
    parts
}

fn delimiters_balanced(s: &str) -> bool {
    let mut depth = 0i32;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
