//! Data-scope classifications and their filter templates.
//!
//! Each role grants one [`DataScope`]. Every scope except [`DataScope::All`]
//! maps to a fragment template over rule variables (`$deptName`,
//! `$userName`) and context variables (`$scopeIds`, `$user.*`, `$role.*`),
//! plus a fallback fragment used when no column mapping of a rule touches the
//! template.

use crate::error::{Error, Result};
use datascope_lang::{parse_filter, Template};
use datascope_proto::FilterExpr;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Fallback fragment for every filtered scope: matches nothing.
pub const DENY_FRAGMENT: &str = "1 = 0";

/// Prefixes of placeholders supplied by the context rather than by a rule.
const CONTEXT_PREFIXES: [&str; 2] = ["user.", "role."];

/// Placeholder bound to the resolved id set of a role.
pub const SCOPE_IDS_VARIABLE: &str = "scopeIds";

/// Row-visibility classification granted by a role.
///
/// Serialized as its stable code (`"1"` to `"6"`); names such as
/// `"dept_and_child"` are accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DataScope {
    /// Every row.
    All,
    /// Rows of an explicit department set attached to the role.
    Custom,
    /// Rows of the user's own department.
    Dept,
    /// Rows of the user's department and all of its descendants.
    DeptAndChild,
    /// Rows the user owns.
    SelfOnly,
    /// Rows of the user's department subtree, or rows the user owns.
    DeptAndChildOrSelf,
}

impl DataScope {
    /// All scopes, in code order.
    pub const ALL: [DataScope; 6] = [
        DataScope::All,
        DataScope::Custom,
        DataScope::Dept,
        DataScope::DeptAndChild,
        DataScope::SelfOnly,
        DataScope::DeptAndChildOrSelf,
    ];

    /// Stable code.
    pub fn code(self) -> &'static str {
        match self {
            DataScope::All => "1",
            DataScope::Custom => "2",
            DataScope::Dept => "3",
            DataScope::DeptAndChild => "4",
            DataScope::SelfOnly => "5",
            DataScope::DeptAndChildOrSelf => "6",
        }
    }

    /// Snake-case name.
    pub fn name(self) -> &'static str {
        match self {
            DataScope::All => "all",
            DataScope::Custom => "custom",
            DataScope::Dept => "dept",
            DataScope::DeptAndChild => "dept_and_child",
            DataScope::SelfOnly => "self",
            DataScope::DeptAndChildOrSelf => "dept_and_child_or_self",
        }
    }

    /// Parse a stable code.
    pub fn from_code(code: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.code() == code.trim())
            .ok_or_else(|| Error::UnknownScope(code.to_string()))
    }

    /// Template text and fallback fragment, or `None` for [`DataScope::All`].
    pub fn template_source(self) -> Option<(&'static str, &'static str)> {
        let template = match self {
            DataScope::All => return None,
            DataScope::Custom | DataScope::DeptAndChild => "$deptName IN ( $scopeIds )",
            DataScope::Dept => "$deptName = $user.deptId",
            DataScope::SelfOnly => "$userName = $user.userId",
            DataScope::DeptAndChildOrSelf => {
                "$deptName IN ( $scopeIds ) OR $userName = $user.userId"
            }
        };
        Some((template, DENY_FRAGMENT))
    }

    /// Whether resolving this scope needs an id set.
    pub fn needs_ids(self) -> bool {
        matches!(
            self,
            DataScope::Custom | DataScope::DeptAndChild | DataScope::DeptAndChildOrSelf
        )
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_code(s).or_else(|_| {
            Self::ALL
                .into_iter()
                .find(|scope| scope.name().eq_ignore_ascii_case(s.trim()))
                .ok_or_else(|| Error::UnknownScope(s.to_string()))
        })
    }
}

impl TryFrom<String> for DataScope {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DataScope> for String {
    fn from(scope: DataScope) -> Self {
        scope.code().to_string()
    }
}

/// Whether a placeholder is bound by a rule's column mappings rather than by
/// the context.
pub fn is_rule_variable(name: &str) -> bool {
    name != SCOPE_IDS_VARIABLE && !CONTEXT_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// A parsed, validated template for one scope.
#[derive(Debug, Clone)]
pub struct ScopeTemplate {
    scope: DataScope,
    template: Template,
    else_fragment: FilterExpr,
}

impl ScopeTemplate {
    /// Parse and validate template text and its fallback fragment.
    ///
    /// The template is rendered with every placeholder replaced by
    /// `placeholder` and the result must parse as a fragment.
    pub fn compile(
        scope: DataScope,
        template: &str,
        else_fragment: &str,
        placeholder: &str,
    ) -> Result<Self> {
        let malformed = |source| Error::MalformedTemplate {
            template: template.to_string(),
            source,
        };
        let parsed = Template::parse(template).map_err(malformed)?;
        let probe = parsed.render(|_| None, placeholder);
        parse_filter(&probe.text).map_err(malformed)?;

        let else_fragment = parse_filter(else_fragment).map_err(|source| {
            Error::MalformedTemplate {
                template: else_fragment.to_string(),
                source,
            }
        })?;

        Ok(Self {
            scope,
            template: parsed,
            else_fragment,
        })
    }

    pub fn scope(&self) -> DataScope {
        self.scope
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Fragment used when no mapping of a rule overlaps the template.
    pub fn else_fragment(&self) -> &FilterExpr {
        &self.else_fragment
    }

    /// Rule variables referenced by the template.
    pub fn rule_variables(&self) -> impl Iterator<Item = &str> {
        self.template
            .variables()
            .into_iter()
            .filter(|name| is_rule_variable(name))
    }

    /// Whether any of `keys` is a rule variable of this template.
    pub fn overlaps<S: AsRef<str>>(&self, keys: &[S]) -> bool {
        self.rule_variables()
            .any(|name| keys.iter().any(|k| k.as_ref() == name))
    }
}

/// The compiled template table.
#[derive(Debug, Clone)]
pub struct ScopeTemplates {
    templates: HashMap<DataScope, ScopeTemplate>,
}

impl ScopeTemplates {
    /// Compile and validate the built-in templates.
    pub fn builtin(placeholder: &str) -> Result<Self> {
        let mut templates = HashMap::new();
        for scope in DataScope::ALL {
            if let Some((template, else_fragment)) = scope.template_source() {
                templates.insert(
                    scope,
                    ScopeTemplate::compile(scope, template, else_fragment, placeholder)?,
                );
            }
        }
        Ok(Self { templates })
    }

    /// Template for a scope. `None` for [`DataScope::All`].
    pub fn get(&self, scope: DataScope) -> Option<&ScopeTemplate> {
        self.templates.get(&scope)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
