//! Fragment language for the datascope engine.
//!
//! Scope templates are written as boolean SQL fragments with `$variable`
//! placeholders. This crate scans templates for their placeholders and parses
//! rendered fragments back into a [`FilterExpr`] so they can be composed as a
//! tree instead of concatenated as text.
//!
//! # Fragment Syntax
//!
//! ```text
//! dept_id = 103
//! d.dept_id IN ( 100, 101, 105 )
//! create_by = 'admin' OR dept_id IN ( 100 )
//! (status = '0' AND del_flag = '0') OR NOT email IS NULL
//! name NOT LIKE 'test%'
//! 1 = 0
//! ```
//!
//! # Usage
//!
//! ```rust
//! use datascope_lang::{parse_filter, Template};
//!
//! let template = Template::parse("$deptName = $user.deptId").unwrap();
//! let rendered = template.render(
//!     |name| match name {
//!         "deptName" => Some("dept_id".to_string()),
//!         "user.deptId" => Some("103".to_string()),
//!         _ => None,
//!     },
//!     "-1",
//! );
//! let filter = parse_filter(&rendered.text).unwrap();
//! assert_eq!(filter.to_string(), "dept_id = 103");
//! ```

pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod template;

pub use datascope_proto::FilterExpr;
pub use error::ParseError;
pub use span::Span;
pub use template::{RenderedFragment, Segment, Template};

/// Parse a boolean fragment into a filter expression.
///
/// # Example
///
/// ```rust
/// use datascope_lang::parse_filter;
///
/// let filter = parse_filter("dept_id IN ( 100, 101 )").unwrap();
/// ```
pub fn parse_filter(source: &str) -> Result<FilterExpr, ParseError> {
    parser::parse(source)
}

/// Tokenize a source string (for debugging/testing).
///
/// # Example
///
/// ```rust
/// use datascope_lang::tokenize;
///
/// let tokens = tokenize("dept_id = 103").unwrap();
/// assert_eq!(tokens.len(), 3);
/// ```
pub fn tokenize(source: &str) -> Result<Vec<lexer::SpannedToken>, ParseError> {
    lexer::tokenize(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datascope_proto::Value;

    #[test]
    fn test_render_then_parse() {
        let template =
            Template::parse("$deptName IN ( $scopeIds ) OR $userName = $user.userId").unwrap();
        let rendered = template.render(
            |name| match name {
                "deptName" => Some("d.dept_id".into()),
                "userName" => Some("create_by".into()),
                "scopeIds" => Some(Value::Int64Array(vec![100, 101]).to_string()),
                "user.userId" => Some(Value::from("admin").to_string()),
                _ => None,
            },
            "-1",
        );
        assert!(rendered.is_complete());
        let filter = parse_filter(&rendered.text).unwrap();
        assert_eq!(
            filter.to_string(),
            "d.dept_id IN (100, 101) OR create_by = 'admin'"
        );
    }

    #[test]
    fn test_error_with_source_context() {
        let source = "dept_id == 103";
        let err = parse_filter(source).unwrap_err();
        let formatted = err.format_with_source(source);
        assert!(formatted.contains("line 1"));
        assert!(formatted.contains("error"));
    }

    #[test]
    fn test_sentinel_render_is_well_formed() {
        let template = Template::parse("$deptName IN ( $scopeIds )").unwrap();
        let rendered = template.render(|_| None, "-1");
        assert_eq!(rendered.text, "-1 IN ( -1 )");
        assert!(parse_filter(&rendered.text).is_ok());
        assert_eq!(rendered.unresolved.len(), 2);
    }
}
