//! Statement kind detection.
//!
//! Uses the sqlparser tokenizer with the SQL Server dialect to look at the
//! keywords of a statement outside parentheses, skipping whitespace and
//! comments.

use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

/// How a statement should be run to capture its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces (or may produce) a result set.
    RowReturning,
    /// Changes rows without returning them: INSERT/UPDATE/DELETE/MERGE
    /// without an OUTPUT clause (also behind a CTE) and SELECT ... INTO.
    Modification,
    /// DDL, session and transaction control.
    Command,
}

const MODIFICATION_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "MERGE"];

const COMMAND_KEYWORDS: &[&str] = &[
    "CREATE", "ALTER", "DROP", "TRUNCATE", "GRANT", "REVOKE", "DENY", "USE", "SET", "DECLARE",
    "BEGIN", "COMMIT", "ROLLBACK", "SAVE", "PRINT",
];

/// An unquoted keyword or identifier and its parenthesis depth.
struct Word {
    value: String,
    depth: usize,
}

/// Classifies a statement by its leading keyword.
///
/// A `WITH` prefix is skipped so the statement after the common table
/// expressions decides. Statements the tokenizer cannot read are treated as
/// row-returning.
pub fn statement_kind(sql: &str) -> StatementKind {
    let dialect = MsSqlDialect {};
    let Ok(tokens) = Tokenizer::new(&dialect, sql).tokenize() else {
        return StatementKind::RowReturning;
    };

    let words = words_with_depth(&tokens);
    let Some(leading) = words.first() else {
        return StatementKind::RowReturning;
    };

    if COMMAND_KEYWORDS.contains(&leading.value.as_str()) {
        return StatementKind::Command;
    }

    let main = if leading.value == "WITH" {
        words
            .iter()
            .position(|w| w.depth == 0 && is_main_verb(&w.value))
    } else {
        Some(0)
    };
    let Some(main) = main else {
        return StatementKind::RowReturning;
    };

    let verb = words[main].value.as_str();
    let rest = &words[main + 1..];

    if MODIFICATION_KEYWORDS.contains(&verb) {
        match rest.iter().position(|w| w.value == "OUTPUT") {
            // OUTPUT ... INTO writes to a table instead of returning rows
            Some(output) if rest[output + 1..].iter().any(|w| w.depth == 0 && w.value == "INTO") => {
                StatementKind::Modification
            }
            Some(_) => StatementKind::RowReturning,
            None => StatementKind::Modification,
        }
    } else if verb == "SELECT" && selects_into(rest) {
        StatementKind::Modification
    } else {
        StatementKind::RowReturning
    }
}

fn is_main_verb(word: &str) -> bool {
    word == "SELECT" || MODIFICATION_KEYWORDS.contains(&word)
}

/// Whether a SELECT list is followed by a top-level INTO before FROM.
fn selects_into(after_select: &[Word]) -> bool {
    after_select
        .iter()
        .filter(|w| w.depth == 0)
        .take_while(|w| w.value != "FROM" && w.value != "UNION")
        .any(|w| w.value == "INTO")
}

fn words_with_depth(tokens: &[Token]) -> Vec<Word> {
    let mut depth = 0usize;
    let mut words = Vec::new();
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Word(word) if word.quote_style.is_none() => words.push(Word {
                value: word.value.to_uppercase(),
                depth,
            }),
            _ => {}
        }
    }
    words
}
