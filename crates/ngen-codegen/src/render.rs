//! Tag-based template filling with leak detection.
//!
//! Templates carry `%(name)s` tags. Every tag must be bound before an
//! artifact leaves the emitter; a leftover tag is an emitter bug, never a
//! user error.

use crate::error::{EmitError, Result};

/// Fill every `%(key)s` tag from the pairs
pub fn fill(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("%({})s", key), value);
    }
    out
}

/// Verify no tag survived rendering
pub fn check_complete(artifact: &str, text: &str) -> Result<()> {
    if let Some(pos) = text.find("%(") {
        let tail: String = text[pos..].chars().take(40).collect();
        return Err(EmitError::bug(
            artifact,
            format!("unbound template tag near '{}'", tail),
        ));
    }
    Ok(())
}

/// Indent every non-empty line by `n` spaces
pub fn indent(text: &str, n: usize) -> String {
    let pad = " ".repeat(n);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_every_occurrence() {
        let out = fill("%(name)s = %(name)s + 1;", &[("name", "r")]);
        assert_eq!(out, "r = r + 1;");
    }

    #[test]
    fn leftover_tags_are_detected() {
        assert!(check_complete("test", "int x = 0;").is_ok());
        let err = check_complete("test", "x%(local_index)s = 0;").unwrap_err();
        assert!(format!("{}", err).contains("local_index"));
    }

    #[test]
    fn indentation_skips_empty_lines() {
        assert_eq!(indent("a\n\nb", 4), "    a\n\n    b");
    }
}
