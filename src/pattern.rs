//! Shell-style glob matching over task names, and the small grammar used to parse a single
//! composite `Step` entry into an include/exclude/bare reference.

use chumsky::prelude::*;

use crate::error::Error;

/// A composite step, lexically classified but not yet resolved against the task table.
///
/// Whether a [`StepToken::Bare`] entry is an inline command or a task reference/pattern is a
/// semantic decision made by the resolver (exact match against the task table wins), not a
/// lexical one - see the Open Question recorded in `DESIGN.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepToken {
    /// an entry prefixed with `+`: adds matches of `text` to the composite's accumulator
    Include(String),
    /// an entry prefixed with `-` or `!`: removes matches of `text` from the accumulator
    Exclude(String),
    /// an entry with no sigil: either a task reference/pattern, or an inline command
    Bare(String),
}

/// parser for a single composite step entry
fn step_parser() -> impl Parser<char, StepToken, Error = Simple<char>> {
    let sigil = one_of::<_, _, Simple<char>>("+-!").or_not();
    let rest = any().repeated().at_least(1).collect::<String>();
    sigil.then(rest).then_ignore(end()).map(|(sigil, text)| match sigil {
        Some('+') => StepToken::Include(text),
        Some('-' | '!') => StepToken::Exclude(text),
        _ => StepToken::Bare(text),
    })
}

/// Lexically classifies a single composite step entry.
///
/// # Errors
///
/// Returns [`Error::BadStep`] if `entry` is empty, or has a sigil with nothing following it.
pub fn parse_step(entry: &str) -> Result<StepToken, Error> {
    step_parser().parse(entry).map_err(|errs| Error::BadStep {
        step: entry.to_string(),
        detail: errs
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    })
}

/// True if `text` contains any glob metacharacter (`*` or `?`).
#[must_use]
pub fn is_pattern(text: &str) -> bool {
    text.contains('*') || text.contains('?')
}

/// Matches `name` against a shell-style glob `pattern` where `*` matches any run of characters
/// (including none) and `?` matches exactly one character. No character classes, no path
/// separators are involved since task names are flat identifiers.
#[must_use]
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    glob_match_inner(&pattern, &name)
}

fn glob_match_inner(pattern: &[char], name: &[char]) -> bool {
    match pattern.first() {
        None => name.is_empty(),
        Some('*') => {
            glob_match_inner(&pattern[1..], name)
                || (!name.is_empty() && glob_match_inner(pattern, &name[1..]))
        }
        Some('?') => !name.is_empty() && glob_match_inner(&pattern[1..], &name[1..]),
        Some(c) => name.first() == Some(c) && glob_match_inner(&pattern[1..], &name[1..]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_include_exclude_and_bare_entries() {
        assert_eq!(
            parse_step("+ruff-fmt").unwrap(),
            StepToken::Include("ruff-fmt".to_string())
        );
        assert_eq!(
            parse_step("-ruff-docs").unwrap(),
            StepToken::Exclude("ruff-docs".to_string())
        );
        assert_eq!(
            parse_step("!ruff-docs").unwrap(),
            StepToken::Exclude("ruff-docs".to_string())
        );
        assert_eq!(
            parse_step("ruff-*").unwrap(),
            StepToken::Bare("ruff-*".to_string())
        );
    }

    #[test]
    fn empty_step_is_an_error() {
        assert!(parse_step("").is_err());
    }

    #[test]
    fn glob_match_supports_star_and_question_mark() {
        assert!(glob_match("ruff-*", "ruff-fmt"));
        assert!(glob_match("ruff-*", "ruff-"));
        assert!(!glob_match("ruff-*", "lint-fmt"));
        assert!(glob_match("b?ild", "build"));
        assert!(!glob_match("b?ild", "biuild"));
        assert!(glob_match("*", "anything"));
    }

    #[test]
    fn is_pattern_detects_glob_metacharacters() {
        assert!(is_pattern("ruff-*"));
        assert!(is_pattern("b?ild"));
        assert!(!is_pattern("ruff-fmt"));
    }
}
