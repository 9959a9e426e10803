//! Recursive descent parser for boolean SQL fragments.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or_expr   := and_expr ( OR and_expr )*
//! and_expr  := not_expr ( AND not_expr )*
//! not_expr  := NOT not_expr | primary
//! primary   := '(' or_expr ')' | predicate
//! predicate := operand ( cmp_op operand
//!                      | [NOT] IN '(' [ operand ( ',' operand )* ] ')'
//!                      | IS [NOT] NULL
//!                      | [NOT] LIKE string )
//!            | TRUE | FALSE
//! operand   := identifier | integer | float | string | NULL | TRUE | FALSE
//! ```
//!
//! The tautologies `1 = 1` and `1 = 0` parse to [`FilterExpr::True`] and
//! [`FilterExpr::False`], matching how those nodes display.

use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::span::Span;
use datascope_proto::{CompareOp, FilterExpr, Operand, Value};

/// Parser for filter fragments.
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    source: &'source str,
}

impl<'source> Parser<'source> {
    /// Create a new parser for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            lexer: Lexer::new(source),
            source,
        }
    }

    /// Parse a complete fragment, rejecting trailing input.
    pub fn parse_fragment(&mut self) -> Result<FilterExpr, ParseError> {
        let expr = self.parse_or_expr()?;
        if let Some(next) = self.lexer.next_token() {
            let tok = next.map_err(|span| ParseError::invalid_input(self.source, span))?;
            return Err(ParseError::new(
                format!("unexpected {} after complete condition", tok.token.describe()),
                tok.span,
            )
            .with_hint("join conditions with AND or OR"));
        }
        Ok(expr)
    }

    /// Parse OR conditions.
    fn parse_or_expr(&mut self) -> Result<FilterExpr, ParseError> {
        let mut left = self.parse_and_expr()?;

        while self.lexer.peek_is(&Token::Or) {
            self.next_token("OR")?;

            let right = self.parse_and_expr()?;
            left = match left {
                FilterExpr::Or(mut conditions) => {
                    conditions.push(right);
                    FilterExpr::Or(conditions)
                }
                _ => FilterExpr::Or(vec![left, right]),
            };
        }

        Ok(left)
    }

    /// Parse AND conditions.
    fn parse_and_expr(&mut self) -> Result<FilterExpr, ParseError> {
        let mut left = self.parse_not_expr()?;

        while self.lexer.peek_is(&Token::And) {
            self.next_token("AND")?;

            let right = self.parse_not_expr()?;
            left = match left {
                FilterExpr::And(mut conditions) => {
                    conditions.push(right);
                    FilterExpr::And(conditions)
                }
                _ => FilterExpr::And(vec![left, right]),
            };
        }

        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<FilterExpr, ParseError> {
        if self.lexer.peek_is(&Token::Not) {
            self.next_token("NOT")?;
            let inner = self.parse_not_expr()?;
            return Ok(FilterExpr::not(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterExpr, ParseError> {
        if self.lexer.peek_is(&Token::LParen) {
            self.next_token("'('")?;
            let inner = self.parse_or_expr()?;
            self.expect_token(Token::RParen)?;
            return Ok(FilterExpr::group(inner));
        }
        self.parse_predicate()
    }

    /// Parse a predicate (comparison, IN, IS NULL, LIKE) or a bare boolean.
    fn parse_predicate(&mut self) -> Result<FilterExpr, ParseError> {
        let (left, left_span) = self.parse_operand()?;

        let Some(op_tok) = self.lexer.peek() else {
            // A bare TRUE/FALSE is a complete condition.
            return match left {
                Operand::Literal(Value::Bool(true)) => Ok(FilterExpr::True),
                Operand::Literal(Value::Bool(false)) => Ok(FilterExpr::False),
                // Either the input ended or the lexer hit unrecognized text.
                _ => Err(match self.lexer.next_token() {
                    Some(Err(span)) => ParseError::invalid_input(self.source, span),
                    _ => ParseError::unexpected_end(self.source, "comparison operator"),
                }),
            };
        };

        match &op_tok.token {
            Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge => {
                let op = match self.next_token("comparison operator")?.token {
                    Token::Eq => CompareOp::Eq,
                    Token::Ne => CompareOp::Ne,
                    Token::Lt => CompareOp::Lt,
                    Token::Le => CompareOp::Le,
                    Token::Gt => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                let (right, _) = self.parse_operand()?;
                Ok(normalize_compare(left, op, right))
            }

            // IS NULL / IS NOT NULL
            Token::Is => {
                self.next_token("IS")?;
                let negated = self.consume_not()?;
                let null_tok = self.next_token("NULL")?;
                if null_tok.token != Token::Null {
                    return Err(ParseError::new(
                        format!("expected 'NULL' after 'IS', found {}", null_tok.token.describe()),
                        null_tok.span,
                    ));
                }
                Ok(FilterExpr::IsNull {
                    operand: left,
                    negated,
                })
            }

            Token::In => {
                self.next_token("IN")?;
                let values = self.parse_operand_list()?;
                Ok(FilterExpr::In {
                    operand: left,
                    values,
                    negated: false,
                })
            }

            Token::Like => {
                self.next_token("LIKE")?;
                let pattern = self.parse_string_literal()?;
                Ok(FilterExpr::Like {
                    operand: left,
                    pattern,
                    negated: false,
                })
            }

            Token::Not => {
                self.next_token("NOT")?;
                let next = self.next_token("'IN' or 'LIKE'")?;
                match next.token {
                    Token::In => {
                        let values = self.parse_operand_list()?;
                        Ok(FilterExpr::In {
                            operand: left,
                            values,
                            negated: true,
                        })
                    }
                    Token::Like => {
                        let pattern = self.parse_string_literal()?;
                        Ok(FilterExpr::Like {
                            operand: left,
                            pattern,
                            negated: true,
                        })
                    }
                    other => Err(ParseError::new(
                        format!("expected 'IN' or 'LIKE' after 'NOT', found {}", other.describe()),
                        next.span,
                    )),
                }
            }

            _ => match left {
                Operand::Literal(Value::Bool(true)) => Ok(FilterExpr::True),
                Operand::Literal(Value::Bool(false)) => Ok(FilterExpr::False),
                _ => Err(ParseError::new(
                    format!("expected comparison operator, found {}", op_tok.token.describe()),
                    op_tok.span,
                )
                .with_hint(format!(
                    "a condition on '{}' needs an operator such as '=' or IN",
                    self.source.get(left_span.start..left_span.end).unwrap_or_default()
                ))),
            },
        }
    }

    /// Parse a parenthesized, comma-separated operand list.
    fn parse_operand_list(&mut self) -> Result<Vec<Operand>, ParseError> {
        self.expect_token(Token::LParen)?;
        let mut values = Vec::new();

        if self.lexer.peek_is(&Token::RParen) {
            self.next_token("')'")?;
            return Ok(values);
        }

        values.push(self.parse_operand()?.0);
        while self.lexer.peek_is(&Token::Comma) {
            self.next_token("','")?;
            values.push(self.parse_operand()?.0);
        }

        self.expect_token(Token::RParen)?;
        Ok(values)
    }

    fn parse_operand(&mut self) -> Result<(Operand, Span), ParseError> {
        let tok = self.next_token("operand")?;
        let operand = match tok.token {
            Token::Ident(name) => Operand::Column(name),
            Token::Null => Operand::Literal(Value::Null),
            Token::True => Operand::Literal(Value::Bool(true)),
            Token::False => Operand::Literal(Value::Bool(false)),
            Token::Int(i) => Operand::Literal(Value::Int64(i)),
            Token::Float(x) => Operand::Literal(Value::Float64(x)),
            Token::String(s) => Operand::Literal(Value::String(s)),
            other => {
                return Err(ParseError::new(
                    format!("expected column or literal, found {}", other.describe()),
                    tok.span,
                ))
            }
        };
        Ok((operand, tok.span))
    }

    fn parse_string_literal(&mut self) -> Result<String, ParseError> {
        let tok = self.next_token("string literal")?;
        match tok.token {
            Token::String(s) => Ok(s),
            other => Err(ParseError::new(
                format!("expected string literal, found {}", other.describe()),
                tok.span,
            )
            .with_hint("LIKE patterns are single-quoted")),
        }
    }

    fn consume_not(&mut self) -> Result<bool, ParseError> {
        if self.lexer.peek_is(&Token::Not) {
            self.next_token("NOT")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Expect and consume a specific token.
    fn expect_token(&mut self, expected: Token) -> Result<SpannedToken, ParseError> {
        let tok = self.next_token(&expected.describe())?;
        if std::mem::discriminant(&tok.token) == std::mem::discriminant(&expected) {
            Ok(tok)
        } else {
            Err(ParseError::new(
                format!("expected {}, found {}", expected.describe(), tok.token.describe()),
                tok.span,
            ))
        }
    }

    /// Get the next token or error at end of input or on unrecognized input.
    fn next_token(&mut self, expected: &str) -> Result<SpannedToken, ParseError> {
        match self.lexer.next_token() {
            Some(Ok(tok)) => Ok(tok),
            Some(Err(span)) => Err(ParseError::invalid_input(self.source, span)),
            None => Err(ParseError::unexpected_end(self.source, expected)),
        }
    }
}

fn normalize_compare(left: Operand, op: CompareOp, right: Operand) -> FilterExpr {
    match (&left, op, &right) {
        (
            Operand::Literal(Value::Int64(1)),
            CompareOp::Eq,
            Operand::Literal(Value::Int64(1)),
        ) => FilterExpr::True,
        (
            Operand::Literal(Value::Int64(1)),
            CompareOp::Eq,
            Operand::Literal(Value::Int64(0)),
        ) => FilterExpr::False,
        _ => FilterExpr::compare(left, op, right),
    }
}

/// Parse a fragment source string into a filter expression.
pub fn parse(source: &str) -> Result<FilterExpr, ParseError> {
    let mut parser = Parser::new(source);
    parser.parse_fragment()
}
