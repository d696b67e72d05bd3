//! Line-format stage.
//!
//! Every non-blank line of a `.rist` unit carries a trailing `;`. The
//! terminators are checked and stripped here, before the tokenizer sees
//! the text. Indentation is ignored for the check but kept in the output
//! because the host language reads it as block structure.

use crate::error::CoreError;

pub const TERMINATOR: char = ';';

/// Validate terminators and return the text with them removed.
pub fn strip_terminators(source: &str, file: &str) -> Result<String, CoreError> {
    let mut lines = Vec::new();
    for (index, line) in source.lines().enumerate() {
        let content = line.trim_end();
        if content.trim_start_matches([' ', '\t']).is_empty() {
            lines.push(line);
            continue;
        }
        if !content.ends_with(TERMINATOR) {
            return Err(CoreError::LineFormat {
                file: file.to_string(),
                line: index + 1,
                offset: content.chars().count(),
                found: content.chars().last().unwrap_or(' '),
                text: line.to_string(),
            });
        }
        lines.push(content.trim_end_matches(TERMINATOR));
    }
    Ok(lines.join("\n"))
}
