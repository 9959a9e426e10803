//! Storage-access hook.
//!
//! [`DataScopeInterceptor::intercept`] runs in-line with every statement the
//! storage layer issues. It finds the rule for the statement, composes the
//! scope filter for the acting user and conjoins it to the statement's
//! filter. It never fails: composition errors deny every row.

use crate::composer::{conjoin, Composed, FilterComposer};
use crate::config::EngineConfig;
use crate::context::EvaluationContext;
use crate::error::Result;
use crate::registry::RuleRegistry;
use crate::resolver::{CurrentUserProvider, ScopeResolver};
use datascope_proto::{FilterExpr, StatementKind};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Why a statement was left unfiltered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// The context bypass is active.
    Bypassed,
    /// No rule applies to the statement.
    NoRule,
    /// Nobody is signed in.
    NoUser,
    /// The user holds a privileged capability.
    Privileged,
    /// A role grants every row.
    AllRows,
    /// The user holds no roles. Such a user is left unfiltered, the same
    /// as a missing user.
    NoFragment,
}

impl fmt::Display for PassThroughReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            PassThroughReason::Bypassed => "bypassed",
            PassThroughReason::NoRule => "no rule",
            PassThroughReason::NoUser => "no user",
            PassThroughReason::Privileged => "privileged user",
            PassThroughReason::AllRows => "all rows granted",
            PassThroughReason::NoFragment => "no fragment",
        };
        f.write_str(reason)
    }
}

/// What one interception did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptOutcome {
    /// The filter was returned unchanged.
    PassThrough(PassThroughReason),
    /// A scope group was conjoined to the filter.
    Filtered,
    /// Composition failed; an always-false group was conjoined.
    Denied,
}

impl fmt::Display for InterceptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterceptOutcome::PassThrough(reason) => write!(f, "pass-through ({reason})"),
            InterceptOutcome::Filtered => f.write_str("filtered"),
            InterceptOutcome::Denied => f.write_str("denied"),
        }
    }
}

/// The row-level permission hook.
pub struct DataScopeInterceptor {
    registry: Arc<RuleRegistry>,
    composer: FilterComposer,
    resolver: Arc<dyn ScopeResolver>,
    user_provider: Option<Arc<dyn CurrentUserProvider>>,
}

impl DataScopeInterceptor {
    /// Create an interceptor. Fails when the scope templates do not compile
    /// under `config`.
    pub fn new(
        config: &EngineConfig,
        registry: Arc<RuleRegistry>,
        resolver: Arc<dyn ScopeResolver>,
    ) -> Result<Self> {
        Ok(Self {
            registry,
            composer: FilterComposer::new(config)?,
            resolver,
            user_provider: None,
        })
    }

    /// Look up the acting user through `provider` when the context has none.
    pub fn with_user_provider(mut self, provider: Arc<dyn CurrentUserProvider>) -> Self {
        self.user_provider = Some(provider);
        self
    }

    pub fn registry(&self) -> &Arc<RuleRegistry> {
        &self.registry
    }

    pub fn composer(&self) -> &FilterComposer {
        &self.composer
    }

    /// Rewrite the filter of one statement.
    pub fn intercept(
        &self,
        query_id: &str,
        existing: Option<FilterExpr>,
        kind: StatementKind,
        ctx: &mut EvaluationContext,
    ) -> Option<FilterExpr> {
        self.intercept_traced(query_id, existing, kind, ctx).0
    }

    /// [`intercept`](Self::intercept), also reporting what happened.
    pub fn intercept_traced(
        &self,
        query_id: &str,
        existing: Option<FilterExpr>,
        kind: StatementKind,
        ctx: &mut EvaluationContext,
    ) -> (Option<FilterExpr>, InterceptOutcome) {
        // The override applies to one statement only, whatever the outcome.
        let override_rule = ctx.take_rule_override();

        if ctx.is_bypassed() {
            return pass(query_id, existing, PassThroughReason::Bypassed);
        }
        let Some(rule) = self.registry.lookup(query_id, override_rule.as_ref()) else {
            return pass(query_id, existing, PassThroughReason::NoRule);
        };

        if ctx.needs_user_lookup() {
            if let Err(e) = self.load_user(ctx) {
                warn!(query = query_id, error = %e, "Current user lookup failed, denying all rows");
                return deny(existing);
            }
        }
        let Some(user) = ctx.current_user().cloned() else {
            return pass(query_id, existing, PassThroughReason::NoUser);
        };

        match self
            .composer
            .compose(&rule, &user, kind, ctx, self.resolver.as_ref())
        {
            Ok(Composed::Privileged) => pass(query_id, existing, PassThroughReason::Privileged),
            Ok(Composed::AllRows) => pass(query_id, existing, PassThroughReason::AllRows),
            Ok(Composed::NoFragment) => {
                debug!(query = query_id, roles = 0, "User holds no roles, statement left unfiltered");
                pass(query_id, existing, PassThroughReason::NoFragment)
            }
            Ok(Composed::Filtered(scope)) => {
                debug!(query = query_id, %kind, filter = %scope, "Scope filter applied");
                (Some(conjoin(existing, scope)), InterceptOutcome::Filtered)
            }
            Err(e) => {
                warn!(query = query_id, error = %e, "Scope composition failed, denying all rows");
                deny(existing)
            }
        }
    }

    fn load_user(&self, ctx: &mut EvaluationContext) -> Result<()> {
        let user = match &self.user_provider {
            Some(provider) => provider.current_user()?,
            None => None,
        };
        match user {
            Some(user) => ctx.bind_user(user),
            None => ctx.bind_anonymous(),
        }
        Ok(())
    }
}

impl fmt::Debug for DataScopeInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataScopeInterceptor")
            .field("registry", &self.registry)
            .field("user_provider", &self.user_provider.is_some())
            .finish()
    }
}

fn pass(
    query_id: &str,
    existing: Option<FilterExpr>,
    reason: PassThroughReason,
) -> (Option<FilterExpr>, InterceptOutcome) {
    debug!(query = query_id, %reason, "Statement passed through");
    (existing, InterceptOutcome::PassThrough(reason))
}

fn deny(existing: Option<FilterExpr>) -> (Option<FilterExpr>, InterceptOutcome) {
    (
        Some(conjoin(existing, FilterExpr::group(FilterExpr::False))),
        InterceptOutcome::Denied,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CurrentUser, RoleRef};
    use crate::error::ResolveError;
    use crate::resolver::{Directory, DirectoryScopeResolver};
    use crate::rule::{ColumnMapping, PolicyRule};
    use crate::scope::DataScope;

    struct Provider(std::result::Result<Option<CurrentUser>, ResolveError>);

    impl CurrentUserProvider for Provider {
        fn current_user(&self) -> std::result::Result<Option<CurrentUser>, ResolveError> {
            self.0.clone()
        }
    }

    fn interceptor() -> DataScopeInterceptor {
        let registry = RuleRegistry::new();
        registry
            .register(
                "SysDeptMapper",
                PolicyRule::new(vec![ColumnMapping::new(["deptName"], ["dept_id"]).unwrap()])
                    .unwrap(),
            )
            .unwrap();
        let resolver = DirectoryScopeResolver::new(Directory::default().with_department(103, None));
        DataScopeInterceptor::new(&EngineConfig::default(), Arc::new(registry), Arc::new(resolver))
            .unwrap()
    }

    fn lead() -> CurrentUser {
        CurrentUser::new(1i64)
            .with_dept(103)
            .with_role(RoleRef::new(3, "lead", DataScope::Dept))
    }

    #[test]
    fn test_filtered() {
        let mut ctx = EvaluationContext::for_user(lead());
        let (filter, outcome) =
            interceptor().intercept_traced("SysDeptMapper.list", None, StatementKind::Select, &mut ctx);
        assert_eq!(outcome, InterceptOutcome::Filtered);
        assert_eq!(filter.unwrap().to_string(), "(dept_id = 103)");
    }

    #[test]
    fn test_bypassed() {
        let mut ctx = EvaluationContext::for_user(lead());
        let mut guard = ctx.bypass();
        let (filter, outcome) = interceptor().intercept_traced(
            "SysDeptMapper.list",
            None,
            StatementKind::Select,
            &mut guard,
        );
        assert_eq!(filter, None);
        assert_eq!(outcome, InterceptOutcome::PassThrough(PassThroughReason::Bypassed));
    }

    #[test]
    fn test_user_from_provider() {
        let interceptor = interceptor().with_user_provider(Arc::new(Provider(Ok(Some(lead())))));
        let mut ctx = EvaluationContext::new();
        let (_, outcome) =
            interceptor.intercept_traced("SysDeptMapper.list", None, StatementKind::Select, &mut ctx);
        assert_eq!(outcome, InterceptOutcome::Filtered);
        assert!(ctx.current_user().is_some());
    }

    #[test]
    fn test_anonymous_passes() {
        let interceptor = interceptor().with_user_provider(Arc::new(Provider(Ok(None))));
        let mut ctx = EvaluationContext::new();
        let (_, outcome) =
            interceptor.intercept_traced("SysDeptMapper.list", None, StatementKind::Select, &mut ctx);
        assert_eq!(outcome, InterceptOutcome::PassThrough(PassThroughReason::NoUser));
    }

    #[test]
    fn test_user_without_roles_passes() {
        let mut ctx = EvaluationContext::for_user(CurrentUser::new(1i64).with_dept(103));
        let existing = FilterExpr::eq("status", "0");
        let (filter, outcome) = interceptor().intercept_traced(
            "SysDeptMapper.list",
            Some(existing.clone()),
            StatementKind::Select,
            &mut ctx,
        );
        assert_eq!(outcome, InterceptOutcome::PassThrough(PassThroughReason::NoFragment));
        assert_eq!(filter, Some(existing));
    }

    #[test]
    fn test_provider_failure_denies() {
        let interceptor = interceptor().with_user_provider(Arc::new(Provider(Err(
            ResolveError::UserProvider("session store down".into()),
        ))));
        let mut ctx = EvaluationContext::new();
        let (filter, outcome) = interceptor.intercept_traced(
            "SysDeptMapper.list",
            Some(FilterExpr::eq("status", "0")),
            StatementKind::Select,
            &mut ctx,
        );
        assert_eq!(outcome, InterceptOutcome::Denied);
        assert_eq!(filter.unwrap().to_string(), "status = '0' AND (1 = 0)");
    }

    #[test]
    fn test_override_is_consumed() {
        let mut ctx = EvaluationContext::for_user(lead());
        ctx.set_rule_override(Arc::new(
            PolicyRule::new(vec![ColumnMapping::new(["deptName"], ["x.dept_id"]).unwrap()])
                .unwrap(),
        ));
        let interceptor = interceptor();
        let filter = interceptor.intercept("Other.list", None, StatementKind::Select, &mut ctx);
        assert_eq!(filter.unwrap().to_string(), "(x.dept_id = 103)");

        let (_, outcome) =
            interceptor.intercept_traced("Other.list", None, StatementKind::Select, &mut ctx);
        assert_eq!(outcome, InterceptOutcome::PassThrough(PassThroughReason::NoRule));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(
            InterceptOutcome::PassThrough(PassThroughReason::NoRule).to_string(),
            "pass-through (no rule)"
        );
        assert_eq!(InterceptOutcome::Denied.to_string(), "denied");
    }
}
