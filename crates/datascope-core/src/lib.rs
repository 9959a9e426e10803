//! datascope core - row-level data-permission engine.
//!
//! The engine sits between application code and the storage layer. For every
//! statement it looks up the [`PolicyRule`] registered for the statement's
//! query identifier, resolves the scope each of the acting user's roles
//! grants, renders the scope templates against the rule's column mappings and
//! conjoins the result to the statement's filter.
//!
//! ```ignore
//! let registry = Arc::new(RuleRegistry::from_declarations(&declarations)?);
//! let resolver = Arc::new(CachingScopeResolver::new(DirectoryScopeResolver::new(directory)));
//! let interceptor = DataScopeInterceptor::new(&EngineConfig::default(), registry, resolver)?;
//!
//! let mut ctx = EvaluationContext::for_user(user);
//! let filter = interceptor.intercept("SysUserMapper.selectUserList", filter, StatementKind::Select, &mut ctx);
//! ```
//!
//! Failures never widen access: unresolved variables render an always-false
//! fragment and composition errors deny every row.

pub mod composer;
pub mod config;
pub mod context;
pub mod declaration;
pub mod error;
pub mod evaluator;
pub mod interceptor;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod scope;

pub use composer::{conjoin, Composed, FilterComposer};
pub use config::EngineConfig;
pub use context::{BypassGuard, CurrentUser, EvaluationContext, RoleRef};
pub use declaration::{MappingDeclaration, PolicyDeclaration, PolicyDeclarations};
pub use error::{Error, ResolveError, Result};
pub use evaluator::{Binding, Bindings, ExpressionEvaluator};
pub use interceptor::{DataScopeInterceptor, InterceptOutcome, PassThroughReason};
pub use registry::RuleRegistry;
pub use resolver::{
    CacheStats, CachingScopeResolver, CurrentUserProvider, Department, Directory,
    DirectoryScopeResolver, ResolvedScope, RoleRecord, ScopeResolver,
};
pub use rule::{ColumnMapping, PolicyRule};
pub use scope::{DataScope, ScopeTemplate, ScopeTemplates};

/// Re-export shared filter and value types.
pub use datascope_proto as proto;
