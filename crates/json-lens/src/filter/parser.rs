//! Pratt parser for predicate expressions.
//!
//! Precedence, lowest to highest: `||`, `&&`, comparisons, unary `!`,
//! primary. Comparisons associate left like everything else; chaining them
//! is legal but rarely meaningful.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::filter::lexer::{self, Token};
use crate::limit::LimitTracker;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Path(PathExpr),
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A path inside a predicate: `@.a.b`, `$.x`, or a bare `a.b` which is
/// relative to the current item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PathExpr {
    pub(crate) head: PathHead,
    pub(crate) segs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PathHead {
    /// `@`, the item under test.
    Current,
    /// `$`, the query root.
    Root,
}

impl Expr {
    /// Whether evaluation will need the materialized root (`$` anywhere).
    pub(crate) fn uses_root(&self) -> bool {
        match self {
            Expr::Literal(_) => false,
            Expr::Path(p) => p.head == PathHead::Root,
            Expr::Call { args, .. } => args.iter().any(Expr::uses_root),
            Expr::Not(e) => e.uses_root(),
            Expr::Binary { lhs, rhs, .. } => lhs.uses_root() || rhs.uses_root(),
        }
    }
}

pub(crate) fn parse(input: &str) -> Result<Expr> {
    let tokens = lexer::tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        limit: LimitTracker::default(),
    };
    let expr = parser.expr_bp(0)?;
    parser.expect(Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    limit: LimitTracker,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let t = self.peek().clone();
        self.pos += 1;
        t
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        let got = self.bump();
        if got == want {
            Ok(())
        } else {
            Err(Error::Filter(format!("expected {want:?}, found {got:?}")))
        }
    }

    fn expr_bp(&mut self, min_bp: u8) -> Result<Expr> {
        self.limit
            .consume()
            .map_err(|_| Error::Filter("expression nests too deeply".into()))?;
        let mut lhs = self.primary()?;

        loop {
            let (op, l_bp, r_bp) = match self.peek() {
                Token::OrOr => (BinaryOp::Or, 1, 2),
                Token::AndAnd => (BinaryOp::And, 3, 4),
                Token::EqEq => (BinaryOp::Eq, 5, 6),
                Token::NotEq => (BinaryOp::Ne, 5, 6),
                Token::Lt => (BinaryOp::Lt, 5, 6),
                Token::Le => (BinaryOp::Le, 5, 6),
                Token::Gt => (BinaryOp::Gt, 5, 6),
                Token::Ge => (BinaryOp::Ge, 5, 6),
                _ => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.bump();
            let rhs = self.expr_bp(r_bp)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.limit.release();
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.bump() {
            Token::Bang => {
                // `!` binds tighter than any binary operator.
                let inner = self.expr_bp(7)?;
                Ok(Expr::Not(Box::new(inner)))
            }
            Token::LParen => {
                let inner = self.expr_bp(0)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            Token::Str(s) => Ok(Expr::Literal(Value::String(s))),
            Token::At => Ok(Expr::Path(PathExpr {
                head: PathHead::Current,
                segs: self.segments()?,
            })),
            Token::Dollar => Ok(Expr::Path(PathExpr {
                head: PathHead::Root,
                segs: self.segments()?,
            })),
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if *self.peek() == Token::LParen => {
                    self.bump();
                    let args = self.call_args()?;
                    Ok(Expr::Call { name, args })
                }
                _ => {
                    // Bare identifier: path relative to the current item.
                    let mut segs = vec![name];
                    segs.extend(self.segments()?);
                    Ok(Expr::Path(PathExpr {
                        head: PathHead::Current,
                        segs,
                    }))
                }
            },
            other => Err(Error::Filter(format!(
                "expected an expression, found {other:?}"
            ))),
        }
    }

    /// Path continuation: `(.|/) segment` repeated. A segment is an
    /// identifier or a non-negative integer (array index).
    fn segments(&mut self) -> Result<Vec<String>> {
        let mut segs = Vec::new();
        while matches!(self.peek(), Token::Dot | Token::Slash) {
            self.bump();
            match self.bump() {
                Token::Ident(s) => segs.push(s),
                Token::Number(n) if n.is_u64() => segs.push(n.to_string()),
                other => {
                    return Err(Error::Filter(format!(
                        "expected a path segment, found {other:?}"
                    )))
                }
            }
        }
        Ok(segs)
    }

    fn call_args(&mut self) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if *self.peek() == Token::RParen {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.expr_bp(0)?);
            match self.bump() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    return Err(Error::Filter(format!(
                        "expected `,` or `)` in arguments, found {other:?}"
                    )))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(head: PathHead, segs: &[&str]) -> Expr {
        Expr::Path(PathExpr {
            head,
            segs: segs.iter().map(|s| s.to_string()).collect(),
        })
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let expr = parse("a == 1 || b == 2 && c == 3").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::Or,
                rhs,
                ..
            } => assert!(matches!(
                *rhs,
                Expr::Binary {
                    op: BinaryOp::And,
                    ..
                }
            )),
            other => panic!("expected `||` at the top, got {other:?}"),
        }
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let expr = parse("@.price < 100 && @.inStock == true").unwrap();
        match expr {
            Expr::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => {
                assert_eq!(
                    *lhs,
                    Expr::Binary {
                        op: BinaryOp::Lt,
                        lhs: Box::new(path(PathHead::Current, &["price"])),
                        rhs: Box::new(Expr::Literal(json!(100))),
                    }
                );
                assert_eq!(
                    *rhs,
                    Expr::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(path(PathHead::Current, &["inStock"])),
                        rhs: Box::new(Expr::Literal(json!(true))),
                    }
                );
            }
            other => panic!("expected `&&` at the top, got {other:?}"),
        }
    }

    #[test]
    fn parses_calls_paths_and_not() {
        assert_eq!(
            parse("!exists(@.deleted)").unwrap(),
            Expr::Not(Box::new(Expr::Call {
                name: "exists".into(),
                args: vec![path(PathHead::Current, &["deleted"])],
            }))
        );
        assert_eq!(parse("$.limit").unwrap(), path(PathHead::Root, &["limit"]));
        assert_eq!(
            parse("@.items.0").unwrap(),
            path(PathHead::Current, &["items", "0"])
        );
        assert_eq!(
            parse("position() <= last()").unwrap(),
            Expr::Binary {
                op: BinaryOp::Le,
                lhs: Box::new(Expr::Call {
                    name: "position".into(),
                    args: vec![],
                }),
                rhs: Box::new(Expr::Call {
                    name: "last".into(),
                    args: vec![],
                }),
            }
        );
    }

    #[test]
    fn parenthesized_groups_override_precedence() {
        let expr = parse("(a == 1 || b == 2) && c == 3").unwrap();
        assert!(matches!(
            expr,
            Expr::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn rejects_trailing_tokens_and_dangling_operators() {
        assert!(parse("a == ").is_err());
        assert!(parse("a == 1 extra").is_err());
        assert!(parse("(a == 1").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn root_usage_is_detected() {
        assert!(parse("$.max > @.price").unwrap().uses_root());
        assert!(!parse("@.price > 3").unwrap().uses_root());
        assert!(parse("includes($.tags, 'x')").unwrap().uses_root());
    }
}
