//! Shell-style positional placeholder parsing and interpolation.
//!
//! Recognizes `$1`..`$N`, `${N:-default}`, `$@`/`$*` and the `$$` escape. Implemented as an
//! explicit scanner over the template's `CharIndices` rather than a regular expression, so the
//! `${N:-default}` case (whose default may itself contain whitespace) and the `$$` escape stay
//! unambiguous.

use std::collections::BTreeSet;

use crate::error::Error;

/// The result of interpolating a template against an argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpolated {
    /// the interpolated text
    pub text: String,
    /// 1-based argument indices that were consumed by an explicit `$N`/`${N:-default}` token
    pub consumed: BTreeSet<usize>,
    /// whether `$@` or `$*` appeared anywhere in the template
    pub used_all: bool,
}

impl Interpolated {
    /// true if the template referenced no positional arguments at all (neither indexed
    /// placeholders nor `$@`/`$*`), meaning the caller's unused args should be auto-appended
    #[must_use]
    pub fn forwards_nothing(&self) -> bool {
        self.consumed.is_empty() && !self.used_all
    }
}

/// the 1-based index of an argument, or `None` if it was absent
fn arg_at(args: &[String], index: usize) -> Option<&str> {
    if index == 0 {
        return None;
    }
    args.get(index.checked_sub(1)?).map(String::as_str)
}

/// parses an unsigned decimal number starting at `chars`'s current position, returning the
/// number and how many characters were consumed
fn scan_number(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_digit() {
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Interpolates `template` against `args`, per the placeholder table in the module docs.
///
/// # Errors
///
/// Returns [`Error::BadPlaceholder`] if the template contains a `$` followed by a form that is
/// not one of `$N`, `${N:-default}`, `$@`, `$*` or `$$`.
pub fn interpolate(template: &str, args: &[String]) -> Result<Interpolated, Error> {
    let mut out = String::new();
    let mut consumed = BTreeSet::new();
    let mut used_all = false;

    let mut chars = template.char_indices().peekable();
    while let Some(&(byte_offset, c)) = chars.peek() {
        if c != '$' {
            out.push(c);
            chars.next();
            continue;
        }
        chars.next(); // consume '$'

        match chars.peek().copied() {
            Some((_, '$')) => {
                chars.next();
                out.push('$');
            }
            Some((_, '@' | '*')) => {
                chars.next();
                used_all = true;
                out.push_str(&args.join(" "));
            }
            Some((_, c)) if c.is_ascii_digit() => {
                let Some(n) = scan_number(&mut chars) else {
                    return Err(Error::BadPlaceholder {
                        template: template.to_string(),
                        offset: byte_offset,
                    });
                };
                consumed.insert(n);
                out.push_str(arg_at(args, n).unwrap_or(""));
            }
            Some((_, '{')) => {
                chars.next(); // consume '{'
                let Some(n) = scan_number(&mut chars) else {
                    return Err(Error::BadPlaceholder {
                        template: template.to_string(),
                        offset: byte_offset,
                    });
                };
                consumed.insert(n);
                match chars.peek().copied() {
                    Some((_, '}')) => {
                        chars.next();
                        out.push_str(arg_at(args, n).unwrap_or(""));
                    }
                    Some((_, ':')) => {
                        chars.next();
                        if chars.next().map(|(_, c)| c) != Some('-') {
                            return Err(Error::BadPlaceholder {
                                template: template.to_string(),
                                offset: byte_offset,
                            });
                        }
                        let mut default = String::new();
                        let mut closed = false;
                        for (_, c) in chars.by_ref() {
                            if c == '}' {
                                closed = true;
                                break;
                            }
                            default.push(c);
                        }
                        if !closed {
                            return Err(Error::BadPlaceholder {
                                template: template.to_string(),
                                offset: byte_offset,
                            });
                        }
                        match arg_at(args, n) {
                            Some(value) if !value.is_empty() => out.push_str(value),
                            _ => out.push_str(&default),
                        }
                    }
                    _ => {
                        return Err(Error::BadPlaceholder {
                            template: template.to_string(),
                            offset: byte_offset,
                        });
                    }
                }
            }
            _ => {
                return Err(Error::BadPlaceholder {
                    template: template.to_string(),
                    offset: byte_offset,
                });
            }
        }
    }

    Ok(Interpolated {
        text: out,
        consumed,
        used_all,
    })
}
