//! Statement splitting for SQL scripts.
//!
//! Splits a script on `;` terminators while leaving terminators inside string
//! literals and `--` line comments alone. The scan is deliberately lenient:
//! unterminated strings or comments never produce an error, whatever was
//! accumulated becomes the final statement.

/// Scanner mode at the current position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexState {
    Normal,
    InLineComment,
    InString(char),
}

/// Splits `text` into trimmed, non-empty statements in script order.
///
/// Comment markers, the newline ending a comment and the quotes of string
/// literals are kept in the statement text; only top-level `;` are removed.
pub fn split_statements(text: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = LexState::Normal;
    let mut prev: Option<char> = None;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            LexState::Normal => match c {
                '-' if chars.peek() == Some(&'-') => state = LexState::InLineComment,
                '\'' | '"' => state = LexState::InString(c),
                ';' => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    prev = Some(c);
                    continue;
                }
                _ => {}
            },
            LexState::InLineComment => {
                if c == '\n' {
                    state = LexState::Normal;
                }
            }
            LexState::InString(delim) => {
                if c == delim && prev != Some('\\') {
                    state = LexState::Normal;
                }
            }
        }

        current.push(c);
        prev = Some(c);
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, buffer: &str) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
}
