//! Tokenizer for path expressions.
//!
//! A path is a chain of steps separated by `/` or `.`:
//!
//! - `key` or `'quoted key'` / `"quoted key"`
//! - `[n]` index (negative from the end), `[a:b]` slice
//! - `*` or `[*]` wildcard
//! - `..key` or `//key` recursive descent; `..` alone steps to the parent
//! - `[@name]` user-function invocation
//! - `[?( expr )]` predicate filter (see [`crate::filter`])

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::filter::{self, Expr};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathOp {
    Key(String),
    Index(i64),
    Slice {
        start: Option<i64>,
        end: Option<i64>,
    },
    Wildcard,
    Recursive(String),
    Parent,
    Func(String),
    /// Predicate, parsed at tokenize time so syntax errors surface from
    /// `query` before any evaluation starts.
    Filter(Arc<Expr>),
}

pub(crate) fn tokenize(path: &str) -> Result<Vec<PathOp>> {
    let chars: Vec<char> = path.chars().collect();
    let mut ops = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '/' => {
                if chars.get(i + 1) == Some(&'/') {
                    i += 2;
                    let (name, next) = name(&chars, i)?;
                    ops.push(PathOp::Recursive(name));
                    i = next;
                } else {
                    i += 1;
                }
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    i += 2;
                    match chars.get(i) {
                        Some(&c) if is_key_char(c) || c == '\'' || c == '"' => {
                            let (name, next) = name(&chars, i)?;
                            ops.push(PathOp::Recursive(name));
                            i = next;
                        }
                        _ => ops.push(PathOp::Parent),
                    }
                } else {
                    i += 1;
                }
            }
            '*' => {
                ops.push(PathOp::Wildcard);
                i += 1;
            }
            '[' => {
                let (op, next) = bracket(&chars, i)?;
                ops.push(op);
                i = next;
            }
            '\'' | '"' => {
                let (key, next) = quoted(&chars, i)?;
                ops.push(PathOp::Key(key));
                i = next;
            }
            ']' => return Err(err(i, "unexpected `]`")),
            c if c.is_whitespace() => i += 1,
            _ => {
                let (key, next) = ident(&chars, i);
                ops.push(PathOp::Key(key));
                i = next;
            }
        }
    }
    Ok(ops)
}

/// A bare identifier step: everything up to the next reserved character.
fn ident(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut buf = String::new();
    while let Some(&c) = chars.get(i) {
        if is_key_char(c) {
            buf.push(c);
            i += 1;
        } else {
            break;
        }
    }
    (buf, i)
}

fn is_key_char(c: char) -> bool {
    !matches!(c, '/' | '.' | '[' | ']' | '*' | '\'' | '"') && !c.is_whitespace()
}

/// Identifier or quoted name after `..` / `//`.
fn name(chars: &[char], start: usize) -> Result<(String, usize)> {
    match chars.get(start) {
        Some(&('\'' | '"')) => quoted(chars, start),
        Some(&c) if is_key_char(c) => Ok(ident(chars, start)),
        _ => Err(err(start, "expected a key after recursive descent")),
    }
}

/// Quoted key with `\\` and quote escapes, so keys may contain any
/// reserved character.
fn quoted(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut buf = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(err(start, "unclosed quoted key")),
            Some(&c) if c == quote => return Ok((buf, i + 1)),
            Some(&'\\') => match chars.get(i + 1) {
                Some(&c @ ('\\' | '\'' | '"')) => {
                    buf.push(c);
                    i += 2;
                }
                _ => return Err(err(i, "invalid escape in quoted key")),
            },
            Some(&c) => {
                buf.push(c);
                i += 1;
            }
        }
    }
}

/// Everything bracketed: `[n]`, `[a:b]`, `[*]`, `['key']`, `[@name]`,
/// `[?( expr )]`.
fn bracket(chars: &[char], start: usize) -> Result<(PathOp, usize)> {
    let mut i = skip_space(chars, start + 1);
    match chars.get(i) {
        None => Err(err(start, "unclosed `[`")),
        Some(&'@') => {
            let (fn_name, next) = ident(chars, i + 1);
            if fn_name.is_empty() {
                return Err(err(i, "expected a function name after `[@`"));
            }
            let close = skip_space(chars, next);
            expect_close(chars, close, start)?;
            Ok((PathOp::Func(fn_name), close + 1))
        }
        Some(&'?') => {
            if chars.get(i + 1) != Some(&'(') {
                return Err(err(i, "expected `(` after `[?`"));
            }
            let (expr, next) = filter_body(chars, i + 2)?;
            let close = skip_space(chars, next);
            expect_close(chars, close, start)?;
            Ok((PathOp::Filter(Arc::new(expr)), close + 1))
        }
        Some(&'*') => {
            let close = skip_space(chars, i + 1);
            expect_close(chars, close, start)?;
            Ok((PathOp::Wildcard, close + 1))
        }
        Some(&('\'' | '"')) => {
            let (key, next) = quoted(chars, i)?;
            let close = skip_space(chars, next);
            expect_close(chars, close, start)?;
            Ok((PathOp::Key(key), close + 1))
        }
        Some(_) => {
            // Index or slice: signed integers around an optional `:`.
            let mut text = String::new();
            while let Some(&c) = chars.get(i) {
                if c == ']' {
                    break;
                }
                text.push(c);
                i += 1;
            }
            expect_close(chars, i, start)?;
            let op = index_or_slice(text.trim(), start)?;
            Ok((op, i + 1))
        }
    }
}

/// The raw text of a `[?( … )]` predicate: balanced parentheses, string
/// literals skipped. Returns the parsed expression and the position just
/// past the closing `)`.
fn filter_body(chars: &[char], start: usize) -> Result<(Expr, usize)> {
    let mut depth = 1usize;
    let mut i = start;
    while let Some(&c) = chars.get(i) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let text: String = chars[start..i].iter().collect();
                    let expr = filter::parse(&text)?;
                    return Ok((expr, i + 1));
                }
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err(i, "unterminated string in filter")),
                        Some(&'\\') => i += 2,
                        Some(&c) if c == quote => break,
                        Some(_) => i += 1,
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(err(start, "unclosed `[?(` filter"))
}

fn index_or_slice(text: &str, at: usize) -> Result<PathOp> {
    let parse_bound = |s: &str| -> Result<Option<i64>> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(None);
        }
        s.parse::<i64>()
            .map(Some)
            .map_err(|_| err(at, &format!("invalid index `{s}`")))
    };
    match text.split_once(':') {
        Some((start, end)) => {
            if end.contains(':') {
                return Err(err(at, "too many `:` in slice"));
            }
            Ok(PathOp::Slice {
                start: parse_bound(start)?,
                end: parse_bound(end)?,
            })
        }
        None => match parse_bound(text)? {
            Some(i) => Ok(PathOp::Index(i)),
            None => Err(err(at, "empty `[]` step")),
        },
    }
}

fn skip_space(chars: &[char], mut i: usize) -> usize {
    while matches!(chars.get(i), Some(c) if c.is_whitespace()) {
        i += 1;
    }
    i
}

fn expect_close(chars: &[char], i: usize, open: usize) -> Result<()> {
    if chars.get(i) == Some(&']') {
        Ok(())
    } else {
        Err(err(open, "unclosed `[`"))
    }
}

fn err(column: usize, message: &str) -> Error {
    Error::Path {
        column,
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slash_and_dot_chains() {
        assert_eq!(
            tokenize("store/book.title").unwrap(),
            vec![
                PathOp::Key("store".into()),
                PathOp::Key("book".into()),
                PathOp::Key("title".into()),
            ]
        );
        assert_eq!(tokenize("/leading/slash").unwrap().len(), 2);
    }

    #[test]
    fn quoted_keys_carry_reserved_characters() {
        assert_eq!(
            tokenize(r#"['data/user-profile']/name"#).unwrap(),
            vec![
                PathOp::Key("data/user-profile".into()),
                PathOp::Key("name".into()),
            ]
        );
        assert_eq!(
            tokenize(r#""api/v1/users"[0]"#).unwrap(),
            vec![PathOp::Key("api/v1/users".into()), PathOp::Index(0)]
        );
        assert_eq!(
            tokenize(r#"'it\'s [weird]'"#).unwrap(),
            vec![PathOp::Key("it's [weird]".into())]
        );
    }

    #[test]
    fn indices_and_slices() {
        assert_eq!(tokenize("xs[-2]").unwrap()[1], PathOp::Index(-2));
        assert_eq!(
            tokenize("xs[1:-1]").unwrap()[1],
            PathOp::Slice {
                start: Some(1),
                end: Some(-1),
            }
        );
        assert_eq!(
            tokenize("xs[:2]").unwrap()[1],
            PathOp::Slice {
                start: None,
                end: Some(2),
            }
        );
        assert_eq!(
            tokenize("xs[1:]").unwrap()[1],
            PathOp::Slice {
                start: Some(1),
                end: None,
            }
        );
        assert_eq!(
            tokenize("xs[:]").unwrap()[1],
            PathOp::Slice {
                start: None,
                end: None,
            }
        );
    }

    #[test]
    fn wildcards_in_both_spellings() {
        assert_eq!(
            tokenize("a.*.b").unwrap(),
            vec![
                PathOp::Key("a".into()),
                PathOp::Wildcard,
                PathOp::Key("b".into()),
            ]
        );
        assert_eq!(tokenize("a[*]").unwrap()[1], PathOp::Wildcard);
    }

    #[test]
    fn recursive_descent_and_parent() {
        assert_eq!(
            tokenize("store..price").unwrap(),
            vec![
                PathOp::Key("store".into()),
                PathOp::Recursive("price".into()),
            ]
        );
        assert_eq!(
            tokenize("//price").unwrap(),
            vec![PathOp::Recursive("price".into())]
        );
        assert_eq!(
            tokenize("a/../b").unwrap(),
            vec![
                PathOp::Key("a".into()),
                PathOp::Parent,
                PathOp::Key("b".into()),
            ]
        );
        assert_eq!(tokenize("..").unwrap(), vec![PathOp::Parent]);
        assert_eq!(
            tokenize("..'quoted name'").unwrap(),
            vec![PathOp::Recursive("quoted name".into())]
        );
    }

    #[test]
    fn function_steps() {
        assert_eq!(
            tokenize("/books[@cheap]/price").unwrap(),
            vec![
                PathOp::Key("books".into()),
                PathOp::Func("cheap".into()),
                PathOp::Key("price".into()),
            ]
        );
    }

    #[test]
    fn filter_steps_parse_eagerly() {
        let ops = tokenize("products[?(@.price < 100 && @.inStock == true)]").unwrap();
        assert_eq!(ops.len(), 2);
        assert!(matches!(ops[1], PathOp::Filter(_)));
        // Parens and brackets inside string literals do not confuse the
        // balancing scan.
        let ops = tokenize(r#"xs[?(@.name == ')]' || @.ok == true)]"#).unwrap();
        assert!(matches!(ops[1], PathOp::Filter(_)));
    }

    #[test]
    fn syntax_errors_are_reported() {
        assert!(tokenize("a[1").is_err());
        assert!(tokenize("a['unclosed]").is_err());
        assert!(tokenize("a[]").is_err());
        assert!(tokenize("a[1:2:3]").is_err());
        assert!(tokenize("a[?(@.x == 1]").is_err());
        assert!(tokenize("a[?(@.x ==)]").is_err());
        assert!(tokenize("a[@]").is_err());
        assert!(tokenize("a]").is_err());
        assert!(tokenize("a[zz]").is_err());
    }
}
