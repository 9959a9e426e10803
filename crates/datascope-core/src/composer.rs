//! Scope filter composition.
//!
//! For one rule and one user the composer renders a fragment per role and
//! column mapping, groups the fragments of each role, and joins the role
//! groups: OR for reads, AND for writes, unless the rule overrides the
//! operator. Per-role grouping is kept; roles are never flattened into one
//! disjunction.

use crate::config::EngineConfig;
use crate::context::{CurrentUser, EvaluationContext, RoleRef};
use crate::error::Result;
use crate::evaluator::{Binding, Bindings, ExpressionEvaluator};
use crate::resolver::{ResolvedScope, ScopeResolver};
use crate::rule::PolicyRule;
use crate::scope::{DataScope, ScopeTemplates, SCOPE_IDS_VARIABLE};
use datascope_proto::{FilterExpr, StatementKind, Value};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Result of composing a scope filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Composed {
    /// The user holds a privileged capability.
    Privileged,
    /// A role grants every row.
    AllRows,
    /// The user has no roles, so nothing was produced. Callers pass the
    /// statement through unfiltered.
    NoFragment,
    /// The scope group to conjoin to the existing filter.
    Filtered(FilterExpr),
}

/// Builds scope filters from rules, roles and resolved scopes.
#[derive(Debug, Clone)]
pub struct FilterComposer {
    templates: ScopeTemplates,
    evaluator: ExpressionEvaluator,
    privileged: BTreeSet<String>,
}

impl FilterComposer {
    /// Compile the scope templates for `config`.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Ok(Self {
            templates: ScopeTemplates::builtin(&config.default_placeholder)?,
            evaluator: ExpressionEvaluator::new(config.default_placeholder.clone()),
            privileged: config.privileged_capabilities.clone(),
        })
    }

    /// Whether `user` holds one of the privileged capabilities.
    pub fn is_privileged(&self, user: &CurrentUser) -> bool {
        user.capabilities
            .iter()
            .any(|cap| self.privileged.contains(cap))
    }

    /// Compose the scope filter of `rule` for `user`.
    ///
    /// Roles are resolved through `resolver` with the context bypassed.
    /// Resolver failures and unparsable fragments are returned as errors.
    pub fn compose(
        &self,
        rule: &PolicyRule,
        user: &CurrentUser,
        kind: StatementKind,
        ctx: &mut EvaluationContext,
        resolver: &dyn ScopeResolver,
    ) -> Result<Composed> {
        if self.is_privileged(user) {
            debug!("Privileged user, scope filter skipped");
            return Ok(Composed::Privileged);
        }

        let join = rule.join_for(kind);
        // Every mapping not satisfied by a capability binds its columns into
        // one shared layer, so a template spanning several mappings renders
        // completely.
        let mut rule_vars = Bindings::new();
        let satisfied: Vec<bool> = rule
            .mappings()
            .iter()
            .map(|mapping| match mapping.capability() {
                Some(cap) if user.has_capability(cap) => true,
                _ => {
                    for (key, column) in mapping.bindings() {
                        rule_vars.insert(key.to_string(), Binding::Column(column.to_string()));
                    }
                    false
                }
            })
            .collect();
        let user_vars = user.bindings();

        let mut seen_roles = HashSet::new();
        let mut groups: Vec<FilterExpr> = Vec::new();
        for role in &user.roles {
            if !seen_roles.insert(role.id) {
                continue;
            }
            let resolved = {
                let mut guard = ctx.bypass();
                resolver.resolve(role, user, &mut guard)?
            };
            let Some(template) = self.templates.get(resolved.scope) else {
                debug!(role = %role.key, "Role grants all rows");
                return Ok(Composed::AllRows);
            };

            let role_vars = role_bindings(role, &resolved);
            let mut fragments = Vec::new();
            for (mapping, satisfied) in rule.mappings().iter().zip(&satisfied) {
                let fragment = if *satisfied {
                    FilterExpr::True
                } else if template.overlaps(mapping.keys()) {
                    let layers = [&rule_vars, &role_vars, &user_vars, ctx.variables()];
                    self.evaluator.evaluate(template.template(), &layers)?
                } else {
                    continue;
                };
                if !fragments.contains(&fragment) {
                    fragments.push(fragment);
                }
            }
            if fragments.is_empty() {
                fragments.push(template.else_fragment().clone());
            }

            if let Some(joined) = FilterExpr::join(join, fragments) {
                let group = FilterExpr::group(joined);
                if !groups.contains(&group) {
                    groups.push(group);
                }
            }
        }

        Ok(match FilterExpr::join(join, groups) {
            None => Composed::NoFragment,
            Some(expr) if expr.is_group() => Composed::Filtered(expr),
            Some(expr) => Composed::Filtered(FilterExpr::group(expr)),
        })
    }
}

/// Variables contributed by one role: `role.id`, `role.key`,
/// `role.dataScope` and the resolved `scopeIds`.
fn role_bindings(role: &RoleRef, resolved: &ResolvedScope) -> Bindings {
    let mut vars = Bindings::new();
    vars.insert("role.id".into(), Binding::Value(Value::Int64(role.id)));
    vars.insert("role.key".into(), Binding::Value(Value::from(role.key.as_str())));
    vars.insert(
        "role.dataScope".into(),
        Binding::Value(Value::from(resolved.scope.code())),
    );
    if resolved.scope != DataScope::All {
        vars.insert(
            SCOPE_IDS_VARIABLE.into(),
            Binding::List(resolved.ids.clone()),
        );
    }
    vars
}

/// Conjoin a scope group to the caller's filter without replacing it.
pub fn conjoin(existing: Option<FilterExpr>, scope: FilterExpr) -> FilterExpr {
    match existing {
        None => scope,
        Some(existing) => FilterExpr::and(vec![existing, scope]),
    }
}
