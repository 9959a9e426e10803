//! Template rendering against variable bindings.

use crate::config::DEFAULT_PLACEHOLDER;
use crate::error::Result;
use datascope_lang::{parse_filter, RenderedFragment, Template};
use datascope_proto::{FilterExpr, Value};
use std::collections::HashMap;

/// A value bound to a template variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// A column identifier, rendered verbatim. Only validated identifiers
    /// (see [`crate::rule::is_valid_column`]) are bound this way.
    Column(String),
    /// A value, rendered as a SQL literal.
    Value(Value),
    /// A list of values, rendered as comma-separated literals.
    List(Vec<Value>),
}

impl Binding {
    /// Render the binding as fragment text.
    ///
    /// An empty list or array renders as `placeholder`.
    pub fn render(&self, placeholder: &str) -> String {
        match self {
            Binding::Column(column) => column.clone(),
            Binding::Value(value) if value.is_empty_array() => placeholder.to_string(),
            Binding::Value(value) => value.to_string(),
            Binding::List(values) if values.is_empty() => placeholder.to_string(),
            Binding::List(values) => values
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

impl From<Value> for Binding {
    fn from(value: Value) -> Self {
        Binding::Value(value)
    }
}

/// Named variable bindings.
pub type Bindings = HashMap<String, Binding>;

/// Renders scope templates with a fail-closed placeholder.
#[derive(Debug, Clone)]
pub struct ExpressionEvaluator {
    placeholder: String,
}

impl ExpressionEvaluator {
    pub fn new(placeholder: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
        }
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    /// Render `template` against layered bindings; earlier layers win.
    ///
    /// Never fails: unbound variables become the placeholder and are listed
    /// in [`RenderedFragment::unresolved`].
    pub fn render(&self, template: &Template, vars: &[&Bindings]) -> RenderedFragment {
        template.render(
            |name| {
                vars.iter()
                    .find_map(|layer| layer.get(name))
                    .map(|binding| binding.render(&self.placeholder))
            },
            &self.placeholder,
        )
    }

    /// Render and parse `template`.
    ///
    /// A fragment with any unresolved variable is replaced by
    /// [`FilterExpr::False`] so a missing binding can never widen access.
    pub fn evaluate(&self, template: &Template, vars: &[&Bindings]) -> Result<FilterExpr> {
        let rendered = self.render(template, vars);
        if !rendered.is_complete() {
            tracing::debug!(
                template = template.source(),
                unresolved = ?rendered.unresolved,
                "Unresolved template variables, fragment denies all rows"
            );
            return Ok(FilterExpr::False);
        }
        Ok(parse_filter(&rendered.text)?)
    }
}

impl Default for ExpressionEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEHOLDER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Binding)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_binding_rendering() {
        assert_eq!(Binding::Column("d.dept_id".into()).render("-1"), "d.dept_id");
        assert_eq!(Binding::Value(Value::from("u'1")).render("-1"), "'u''1'");
        assert_eq!(Binding::List(vec![]).render("-1"), "-1");
        assert_eq!(Binding::Value(Value::Int64Array(vec![])).render("-1"), "-1");
        assert_eq!(
            Binding::List(vec![Value::Int64(100), Value::Int64(101)]).render("-1"),
            "100, 101"
        );
    }

    #[test]
    fn test_render_layers_first_wins() {
        let evaluator = ExpressionEvaluator::default();
        let template = Template::parse("$deptName = $user.deptId").unwrap();
        let mapping = bindings(&[("deptName", Binding::Column("dept_id".into()))]);
        let user = bindings(&[
            ("user.deptId", Binding::Value(Value::Int64(103))),
            ("deptName", Binding::Column("ignored".into())),
        ]);

        let rendered = evaluator.render(&template, &[&mapping, &user]);
        assert_eq!(rendered.text, "dept_id = 103");
        assert!(rendered.is_complete());
    }

    #[test]
    fn test_unresolved_uses_placeholder() {
        let evaluator = ExpressionEvaluator::new("-1");
        let template = Template::parse("$deptName IN ( $scopeIds )").unwrap();
        let mapping = bindings(&[("deptName", Binding::Column("dept_id".into()))]);

        let rendered = evaluator.render(&template, &[&mapping]);
        assert_eq!(rendered.text, "dept_id IN ( -1 )");
        assert!(rendered.unresolved.contains("scopeIds"));
    }

    #[test]
    fn test_evaluate_fails_closed() {
        let evaluator = ExpressionEvaluator::default();
        // With every variable missing the sentinel render would read
        // `-1 IN ( -1 )`, which is true; evaluation must deny instead.
        let template = Template::parse("$deptName IN ( $scopeIds )").unwrap();
        assert_eq!(evaluator.evaluate(&template, &[]).unwrap(), FilterExpr::False);
    }

    #[test]
    fn test_evaluate_parses_complete_fragment() {
        let evaluator = ExpressionEvaluator::default();
        let template = Template::parse("$userName = $user.userId").unwrap();
        let vars = bindings(&[
            ("userName", Binding::Column("owner_column".into())),
            ("user.userId", Binding::Value(Value::from("u123"))),
        ]);
        assert_eq!(
            evaluator.evaluate(&template, &[&vars]).unwrap(),
            FilterExpr::eq("owner_column", "u123")
        );
    }
}
