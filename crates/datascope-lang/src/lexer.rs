//! Lexer for boolean SQL fragments using logos.

use crate::error::ParseError;
use crate::span::Span;
use logos::Logos;

/// Token types for filter fragments.
///
/// Keywords are case-insensitive. Identifiers may be dot-qualified
/// (`d.dept_id`) and are returned as a single token.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Logical keywords
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,
    #[token("not", ignore(ascii_case))]
    Not,

    // Predicate keywords
    #[token("in", ignore(ascii_case))]
    In,
    #[token("is", ignore(ascii_case))]
    Is,
    #[token("like", ignore(ascii_case))]
    Like,

    // Literal keywords
    #[token("null", ignore(ascii_case))]
    Null,
    #[token("true", ignore(ascii_case))]
    True,
    #[token("false", ignore(ascii_case))]
    False,

    // Comparison operators
    #[token("=")]
    Eq,
    #[token("!=")]
    #[token("<>")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,

    // Column identifier, optionally qualified
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*", |lex| lex.slice().to_string())]
    Ident(String),

    // String literal, SQL style: '' inside the quotes is an escaped quote
    #[regex(r"'([^']|'')*'", |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].replace("''", "'")
    })]
    String(String),

    // Integer literal
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    // Float literal
    #[regex(r"-?[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),

    // Punctuation
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
}

impl Token {
    /// Short human-readable description used in parse errors.
    pub fn describe(&self) -> String {
        match self {
            Token::And => "'AND'".into(),
            Token::Or => "'OR'".into(),
            Token::Not => "'NOT'".into(),
            Token::In => "'IN'".into(),
            Token::Is => "'IS'".into(),
            Token::Like => "'LIKE'".into(),
            Token::Null => "'NULL'".into(),
            Token::True => "'TRUE'".into(),
            Token::False => "'FALSE'".into(),
            Token::Eq => "'='".into(),
            Token::Ne => "'!='".into(),
            Token::Le => "'<='".into(),
            Token::Ge => "'>='".into(),
            Token::Lt => "'<'".into(),
            Token::Gt => "'>'".into(),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::String(_) => "string literal".into(),
            Token::Int(i) => format!("integer {i}"),
            Token::Float(x) => format!("number {x}"),
            Token::Comma => "','".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
        }
    }
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Result of lexing one token: the token, or the span of unrecognized input.
pub type LexResult = Result<SpannedToken, Span>;

/// Lexer that produces spanned tokens with one token of lookahead.
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
    peeked: Option<Option<LexResult>>,
}

impl<'source> Lexer<'source> {
    /// Create a new lexer for the given source.
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
            peeked: None,
        }
    }

    /// Peek at the next token without consuming it.
    ///
    /// Unrecognized input peeks as `None`; the following
    /// [`next_token`](Self::next_token) call reports it.
    pub fn peek(&mut self) -> Option<&SpannedToken> {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_inner());
        }
        self.peeked
            .as_ref()
            .and_then(|o| o.as_ref())
            .and_then(|r| r.as_ref().ok())
    }

    /// Check whether the next token is `expected`, without consuming it.
    pub fn peek_is(&mut self, expected: &Token) -> bool {
        self.peek().is_some_and(|t| &t.token == expected)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Option<LexResult> {
        if let Some(peeked) = self.peeked.take() {
            peeked
        } else {
            self.next_inner()
        }
    }

    fn next_inner(&mut self) -> Option<LexResult> {
        let result = self.inner.next()?;
        let span: Span = self.inner.span().into();
        Some(match result {
            Ok(token) => Ok(SpannedToken { token, span }),
            Err(()) => Err(span),
        })
    }

    /// Get the source string.
    pub fn source(&self) -> &'source str {
        self.inner.source()
    }
}

/// Tokenize a source string into a vector of spanned tokens.
///
/// Fails on the first piece of input that is not a valid token.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    while let Some(next) = lexer.next_token() {
        tokens.push(next.map_err(|span| ParseError::invalid_input(source, span))?);
    }
    Ok(tokens)
}
