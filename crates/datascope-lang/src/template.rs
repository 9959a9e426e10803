//! Scope templates: fragment text with `$variable` placeholders.
//!
//! A placeholder is `$` followed by an identifier, optionally extended with
//! dot-separated segments (`$user.deptId`). Everything else is copied
//! through verbatim when the template is rendered.

use crate::error::ParseError;
use crate::span::Span;
use std::collections::BTreeSet;

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Literal fragment text.
    Text(String),
    /// A `$name` placeholder.
    Variable { name: String, span: Span },
}

/// Text produced by rendering a template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderedFragment {
    /// The rendered fragment.
    pub text: String,
    /// Placeholders that had no binding and were replaced by the sentinel.
    pub unresolved: BTreeSet<String>,
}

impl RenderedFragment {
    /// Whether every placeholder had a binding.
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// A parsed scope template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text, splitting out its placeholders.
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut segments = Vec::new();
        let mut text_start = 0;
        let bytes = source.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            if bytes[i] != b'$' {
                i += 1;
                continue;
            }
            if text_start < i {
                segments.push(Segment::Text(source[text_start..i].to_string()));
            }
            let name_end = scan_variable(bytes, i + 1);
            if name_end == i + 1 {
                return Err(ParseError::new(
                    "expected variable name after '$'",
                    Span::new(i, i + 1),
                )
                .with_hint("placeholders look like $deptName or $user.deptId"));
            }
            segments.push(Segment::Variable {
                name: source[i + 1..name_end].to_string(),
                span: Span::new(i, name_end),
            });
            i = name_end;
            text_start = i;
        }
        if text_start < bytes.len() {
            segments.push(Segment::Text(source[text_start..].to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The original template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed segments, in order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for segment in &self.segments {
            if let Segment::Variable { name, .. } = segment {
                if !seen.contains(&name.as_str()) {
                    seen.push(name.as_str());
                }
            }
        }
        seen
    }

    /// Render the template, resolving each placeholder through `resolve`.
    ///
    /// Placeholders that resolve to `None` are replaced by `placeholder` and
    /// reported in [`RenderedFragment::unresolved`]. Rendering never fails.
    pub fn render<F>(&self, mut resolve: F, placeholder: &str) -> RenderedFragment
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut rendered = RenderedFragment::default();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => rendered.text.push_str(text),
                Segment::Variable { name, .. } => match resolve(name) {
                    Some(value) => rendered.text.push_str(&value),
                    None => {
                        rendered.text.push_str(placeholder);
                        rendered.unresolved.insert(name.clone());
                    }
                },
            }
        }
        rendered
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Return the end offset of a variable name starting at `start`.
fn scan_variable(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    if end >= bytes.len() || !is_ident_start(bytes[end]) {
        return start;
    }
    loop {
        while end < bytes.len() && is_ident_continue(bytes[end]) {
            end += 1;
        }
        // A dot continues the name only when another identifier follows.
        if end + 1 < bytes.len() && bytes[end] == b'.' && is_ident_start(bytes[end + 1]) {
            end += 1;
        } else {
            return end;
        }
    }
}
