//! Error type for fragment and template parsing.

use crate::span::{offset_to_line_col, Span};
use thiserror::Error;

/// Error while lexing or parsing a fragment or template.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Input that is not a valid token.
    pub fn invalid_input(source: &str, span: Span) -> Self {
        let text = source.get(span.start..span.end).unwrap_or_default();
        Self::new(format!("unexpected input '{text}'"), span)
    }

    /// End of input where more was required.
    pub fn unexpected_end(source: &str, expected: &str) -> Self {
        Self::new(
            format!("unexpected end of input, expected {expected}"),
            Span::new(source.len(), source.len()),
        )
    }

    /// Format the error with source context.
    pub fn format_with_source(&self, source: &str) -> String {
        let (line, col) = offset_to_line_col(source, self.span.start);
        let mut result = format!("error: {}\n", self.message);
        result.push_str(&format!("  --> line {}:{}\n", line, col));

        if let Some(source_line) = source.lines().nth(line - 1) {
            result.push_str(&format!("   |\n{:3}| {}\n   |", line, source_line));

            for _ in 0..col {
                result.push(' ');
            }
            result.push('^');

            let span_len = self.span.end.saturating_sub(self.span.start);
            let room = (source_line.len() + 1).saturating_sub(col);
            for _ in 1..span_len.min(room) {
                result.push('~');
            }
            result.push('\n');
        }

        if let Some(hint) = &self.hint {
            result.push_str(&format!("   = hint: {}\n", hint));
        }

        result
    }
}
