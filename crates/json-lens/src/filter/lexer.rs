//! Tokenizer for the predicate mini-language inside `[?( … )]`.

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Number(serde_json::Number),
    Str(String),
    At,     // @
    Dollar, // $
    Dot,    // .
    Slash,  // /
    LParen,
    RParen,
    Comma,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Eof,
}

/// Tokenize a whole predicate expression up front. Positions are char
/// columns, reported in error messages only.
pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\r' | '\n' => i += 1,
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            '$' => {
                tokens.push(Token::Dollar);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(err(i, "expected `&&`"));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(err(i, "expected `||`"));
                }
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::EqEq);
                    i += 2;
                } else {
                    return Err(err(i, "expected `==`"));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let (s, next) = string(&chars, i)?;
                tokens.push(Token::Str(s));
                i = next;
            }
            '-' | '0'..='9' => {
                let (n, next) = number(&chars, i)?;
                tokens.push(Token::Number(n));
                i = next;
            }
            c if is_ident_start(c) => {
                let mut buf = String::new();
                while let Some(&c) = chars.get(i) {
                    if is_ident_char(c) {
                        buf.push(c);
                        i += 1;
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(buf));
            }
            c => return Err(err(i, &format!("unexpected character `{c}`"))),
        }
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// String literal in either quote style, JSON-style escapes plus `\'`.
fn string(chars: &[char], start: usize) -> Result<(String, usize)> {
    let quote = chars[start];
    let mut buf = String::new();
    let mut i = start + 1;
    loop {
        match chars.get(i) {
            None => return Err(err(start, "unterminated string literal")),
            Some(&c) if c == quote => return Ok((buf, i + 1)),
            Some(&'\\') => {
                let esc = *chars
                    .get(i + 1)
                    .ok_or_else(|| err(i, "unterminated escape sequence"))?;
                i += 2;
                match esc {
                    '"' => buf.push('"'),
                    '\'' => buf.push('\''),
                    '\\' => buf.push('\\'),
                    '/' => buf.push('/'),
                    'b' => buf.push('\u{0008}'),
                    'f' => buf.push('\u{000C}'),
                    'n' => buf.push('\n'),
                    'r' => buf.push('\r'),
                    't' => buf.push('\t'),
                    'u' => {
                        let hex: String = chars.get(i..i + 4).map(|s| s.iter().collect()).ok_or_else(
                            || err(i, "truncated \\u escape"),
                        )?;
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| err(i, "non-hex digits in \\u escape"))?;
                        i += 4;
                        buf.push(
                            char::from_u32(code)
                                .ok_or_else(|| err(i, "invalid \\u escape"))?,
                        );
                    }
                    other => {
                        return Err(err(i, &format!("invalid escape character `{other}`")))
                    }
                }
            }
            Some(&c) => {
                buf.push(c);
                i += 1;
            }
        }
    }
}

/// Integer or float literal, parsed through `serde_json::Number` so the
/// evaluator sees the same numeric domain as document values.
fn number(chars: &[char], start: usize) -> Result<(serde_json::Number, usize)> {
    let mut i = start;
    if chars.get(i) == Some(&'-') {
        i += 1;
    }
    while matches!(chars.get(i), Some(&('0'..='9'))) {
        i += 1;
    }
    if chars.get(i) == Some(&'.') && matches!(chars.get(i + 1), Some(&('0'..='9'))) {
        i += 1;
        while matches!(chars.get(i), Some(&('0'..='9'))) {
            i += 1;
        }
    }
    if matches!(chars.get(i), Some(&('e' | 'E'))) {
        i += 1;
        if matches!(chars.get(i), Some(&('+' | '-'))) {
            i += 1;
        }
        while matches!(chars.get(i), Some(&('0'..='9'))) {
            i += 1;
        }
    }
    let lexeme: String = chars[start..i].iter().collect();
    let n = serde_json::from_str(&lexeme)
        .map_err(|_| err(start, &format!("invalid number literal `{lexeme}`")))?;
    Ok((n, i))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn err(column: usize, message: &str) -> Error {
    Error::Filter(format!("{message} (column {column})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_a_comparison_chain() {
        let tokens = tokenize("@.price < 100 && @.inStock == true").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::At,
                Token::Dot,
                Token::Ident("price".into()),
                Token::Lt,
                Token::Number(100.into()),
                Token::AndAnd,
                Token::At,
                Token::Dot,
                Token::Ident("inStock".into()),
                Token::EqEq,
                Token::Ident("true".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn lexes_strings_in_both_quote_styles() {
        let tokens = tokenize(r#"@.name == 'it''s' || @.name == "a\"b""#).unwrap();
        let strings: Vec<_> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(strings, vec!["it".to_owned(), "s".to_owned(), "a\"b".to_owned()]);
    }

    #[test]
    fn lexes_negative_and_float_numbers() {
        let tokens = tokenize("-2 <= 1.5e2").unwrap();
        assert_eq!(tokens[0], Token::Number((-2).into()));
        assert_eq!(tokens[1], Token::Le);
        match &tokens[2] {
            Token::Number(n) => assert_eq!(n.as_f64().unwrap(), 150.0),
            other => panic!("expected number, got {other:?}"),
        }
    }

    #[test]
    fn rejects_stray_operators() {
        assert!(tokenize("a = b").is_err());
        assert!(tokenize("a & b").is_err());
        assert!(tokenize("'unterminated").is_err());
    }
}
