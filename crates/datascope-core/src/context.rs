//! Per-operation evaluation context.
//!
//! The context travels explicitly (`&mut`) through one logical storage
//! operation. It carries:
//! - the acting user, bound at most once per evaluation
//! - named variable bindings visible to every template
//! - a counting bypass that suppresses the engine for nested operations
//! - an optional rule override for the next intercepted statement

use crate::evaluator::{Binding, Bindings};
use crate::rule::PolicyRule;
use crate::scope::DataScope;
use datascope_proto::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A role held by the acting user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleRef {
    /// Role id.
    pub id: i64,
    /// Role key, e.g. `common`.
    pub key: String,
    /// Scope the role grants.
    pub data_scope: DataScope,
}

impl RoleRef {
    pub fn new(id: i64, key: impl Into<String>, data_scope: DataScope) -> Self {
        Self {
            id,
            key: key.into(),
            data_scope,
        }
    }
}

/// The authenticated user a statement runs for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User id, numeric or textual.
    pub user_id: Value,
    /// Department id, if the user belongs to one.
    #[serde(default)]
    pub dept_id: Option<i64>,
    /// Roles, each contributing one scope condition.
    #[serde(default)]
    pub roles: Vec<RoleRef>,
    /// Capability names (permission strings and privileged markers).
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Extra attributes, visible to templates as `$user.<name>`.
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl CurrentUser {
    pub fn new(user_id: impl Into<Value>) -> Self {
        Self {
            user_id: user_id.into(),
            dept_id: None,
            roles: Vec::new(),
            capabilities: BTreeSet::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_dept(mut self, dept_id: i64) -> Self {
        self.dept_id = Some(dept_id);
        self
    }

    pub fn with_role(mut self, role: RoleRef) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Bindings for the `$user.*` placeholders.
    pub fn bindings(&self) -> Bindings {
        let mut vars = Bindings::new();
        for (name, value) in &self.attributes {
            vars.insert(format!("user.{name}"), Binding::Value(value.clone()));
        }
        if !self.user_id.is_null() {
            vars.insert("user.userId".into(), Binding::Value(self.user_id.clone()));
        }
        if let Some(dept_id) = self.dept_id {
            vars.insert("user.deptId".into(), Binding::Value(Value::Int64(dept_id)));
        }
        vars
    }
}

#[derive(Debug, Clone, Default)]
enum UserSlot {
    /// Not looked up yet.
    #[default]
    Unresolved,
    /// Looked up; nobody is signed in.
    Anonymous,
    Bound(CurrentUser),
}

/// State for one logical storage operation.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    user: UserSlot,
    variables: Bindings,
    bypass_depth: usize,
    rule_override: Option<Arc<PolicyRule>>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context with the acting user already bound.
    pub fn for_user(user: CurrentUser) -> Self {
        let mut ctx = Self::new();
        ctx.bind_user(user);
        ctx
    }

    /// Bind the acting user for this evaluation.
    pub fn bind_user(&mut self, user: CurrentUser) {
        self.user = UserSlot::Bound(user);
    }

    /// Record that the user lookup found nobody.
    pub fn bind_anonymous(&mut self) {
        self.user = UserSlot::Anonymous;
    }

    /// Whether the user still has to be looked up.
    pub fn needs_user_lookup(&self) -> bool {
        matches!(self.user, UserSlot::Unresolved)
    }

    pub fn current_user(&self) -> Option<&CurrentUser> {
        match &self.user {
            UserSlot::Bound(user) => Some(user),
            _ => None,
        }
    }

    /// Bind a variable visible to every template in this operation.
    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<Binding>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&Binding> {
        self.variables.get(name)
    }

    /// All variables set through [`set_variable`](Self::set_variable).
    pub fn variables(&self) -> &Bindings {
        &self.variables
    }

    /// Suppress the engine until the matching [`pop_bypass`](Self::pop_bypass).
    pub fn push_bypass(&mut self) {
        self.bypass_depth += 1;
    }

    /// Undo one [`push_bypass`](Self::push_bypass). Saturates at zero.
    pub fn pop_bypass(&mut self) {
        if self.bypass_depth == 0 {
            tracing::warn!("Bypass popped without a matching push");
            return;
        }
        self.bypass_depth -= 1;
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass_depth > 0
    }

    pub fn bypass_depth(&self) -> usize {
        self.bypass_depth
    }

    /// Push a bypass that is popped when the guard drops, including on
    /// early return or unwinding.
    pub fn bypass(&mut self) -> BypassGuard<'_> {
        self.push_bypass();
        BypassGuard { ctx: self }
    }

    /// Run `f` with the engine suppressed.
    pub fn ignore<T>(&mut self, f: impl FnOnce(&mut EvaluationContext) -> T) -> T {
        let mut guard = self.bypass();
        f(&mut guard)
    }

    /// Use `rule` instead of the registered rule for the next statement.
    pub fn set_rule_override(&mut self, rule: Arc<PolicyRule>) {
        self.rule_override = Some(rule);
    }

    /// Remove and return the rule override.
    pub fn take_rule_override(&mut self) -> Option<Arc<PolicyRule>> {
        self.rule_override.take()
    }

    /// Clear all state so the context can serve a new operation.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Keeps a bypass active while alive. Dereferences to the context.
#[must_use = "the bypass ends as soon as the guard is dropped"]
pub struct BypassGuard<'a> {
    ctx: &'a mut EvaluationContext,
}

impl Deref for BypassGuard<'_> {
    type Target = EvaluationContext;

    fn deref(&self) -> &EvaluationContext {
        self.ctx
    }
}

impl DerefMut for BypassGuard<'_> {
    fn deref_mut(&mut self) -> &mut EvaluationContext {
        self.ctx
    }
}

impl Drop for BypassGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop_bypass();
    }
}
